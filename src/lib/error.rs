use crate::executor::Cancelled;
use crate::name::NameError;
use crate::parse::ParseError;
use crate::store::StoreError;

/// Errors returned by parameter operations.
///
/// Validation errors ([`Error::Name`], [`Error::Parse`],
/// [`Error::SlashWithoutRecursive`], [`Error::ProgramNotFound`]) and the
/// `Require*` preconditions are raised before any remote call is made.
/// [`Error::Store`] is passed through from the store unchanged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("command is required")]
  RequireCommand,
  #[error("command not found: {program}")]
  ProgramNotFound {
    program: String,
    #[source]
    source: which::Error,
  },
  #[error("name=value is required")]
  RequireNameAndValue,
  #[error("path is required")]
  RequirePath,
  #[error("a name must not contain slashes without a recursive flag: {0}")]
  SlashWithoutRecursive(String),
  #[error(transparent)]
  Name(#[from] NameError),
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Cancelled(#[from] Cancelled),
  /// Writing to the activity log or command output failed.
  #[error("output error: {0}")]
  Output(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
