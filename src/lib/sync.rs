//! Reconciliation of desired parameters against the store.
//!
//! # Sync Logic
//!
//! A targeted update:
//! 1. Fetches the current values of the names about to be written
//! 2. Builds a [`Plan`]: a desired parameter whose kind and value already match
//!    is `UNCHANGED`, every other one is `PUT`, and each name on the delete list
//!    is `DELETE`d
//! 3. Runs all writes and deletes concurrently on one executor, logging one
//!    line per decision as it completes
//!
//! A path replacement first lists what exists under the path, keeps the names
//! that are also desired and deletes the rest, then runs a targeted update.
//! Afterwards the path holds exactly the desired parameters.
//!
//! Nothing is rolled back on failure. Completed writes stay, and rerunning
//! the same operation picks up where it stopped.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ssmenv::remote::{Remote, RemoteOptions};
//! use ssmenv::store::{LocalStore, Parameter, ParameterKind};
//! use ssmenv::sync::{ActivityLog, ParameterSync};
//!
//! # async fn run() -> ssmenv::error::Result<()> {
//! let remote = Remote::new(Arc::new(LocalStore::new()), RemoteOptions::default());
//! let desired = vec![Parameter::new("/app/foo", ParameterKind::Plain, "v1")];
//!
//! let log = ActivityLog::new(std::io::stdout());
//! ParameterSync::replace(&remote, "/app", false, desired, &log).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "tracing")]
use tracing::{debug, info, trace};

use crate::error::Result;
use crate::name::{abs, rel, validate_name};
use crate::parse::Expression;
use crate::remote::Remote;
use crate::store::Parameter;

/// Reconciliation entry points.
pub struct ParameterSync;

impl ParameterSync {
  /// Writes `parameters` and deletes `delete_names`.
  ///
  /// `names` are the parameters whose current values are compared against
  /// the desired ones; a desired parameter not among them is always written.
  pub async fn update(
    remote: &Remote,
    parameters: Vec<Parameter>,
    names: &[String],
    delete_names: Vec<String>,
    log: &ActivityLog,
  ) -> Result<()> {
    #[cfg(feature = "tracing")]
    info!(
      desired = parameters.len(),
      compared = names.len(),
      deleted = delete_names.len(),
      "Starting parameter update"
    );

    for parameter in &parameters {
      validate_name(&parameter.name)?;
    }
    for name in &delete_names {
      validate_name(name)?;
    }

    let current = remote.get_parameters_by_names(names).await?;
    let plan = Plan::new(parameters, current, delete_names)?;

    Self::apply(remote, plan, log).await
  }

  /// Makes the parameters under `path` exactly `parameters`.
  ///
  /// Every parameter must lie under `path`; one that does not is a
  /// [`NameError::PathMismatch`](crate::name::NameError::PathMismatch).
  pub async fn replace(
    remote: &Remote,
    path: &str,
    recursive: bool,
    parameters: Vec<Parameter>,
    log: &ActivityLog,
  ) -> Result<()> {
    for parameter in &parameters {
      validate_name(&parameter.name)?;
      rel(&parameter.name, path)?;
    }

    let existing = remote
      .describe_parameters(&[path.to_string()], recursive)
      .await?;

    let desired: HashSet<String> = parameters
      .iter()
      .map(|parameter| abs(&parameter.name).into_owned())
      .collect();

    let (retained, deleted): (Vec<String>, Vec<String>) = existing
      .into_iter()
      .map(|metadata| metadata.name)
      .partition(|name| desired.contains(abs(name).as_ref()));

    #[cfg(feature = "tracing")]
    debug!(
      path,
      recursive,
      retained = retained.len(),
      deleted = deleted.len(),
      "Computed replacement"
    );

    Self::update(remote, parameters, &retained, deleted, log).await
  }

  /// Executes `plan`. Unchanged entries are logged up front, then every write
  /// and delete runs on one executor.
  async fn apply(remote: &Remote, plan: Plan, log: &ActivityLog) -> Result<()> {
    let (unchanged, mutations): (Vec<Change>, Vec<Change>) = plan
      .changes
      .into_iter()
      .partition(|change| matches!(change, Change::Unchanged { .. }));

    for change in &unchanged {
      log.record(change.action(), change.line())?;
    }

    let mut executor = remote.executor();
    for change in mutations {
      let log = log.clone();
      match change {
        Change::Put { parameter, line } => {
          let put = remote.put_parameter(parameter);
          executor.spawn(async move {
            put.await?;
            log.record(Action::Put, &line)?;
            Ok(())
          });
        }
        Change::Delete { name, line } => {
          let delete = remote.delete_parameter(name);
          executor.spawn(async move {
            delete.await?;
            log.record(Action::Delete, &line)?;
            Ok(())
          });
        }
        Change::Unchanged { .. } => {}
      }
    }

    executor.wait().await?;

    #[cfg(feature = "tracing")]
    info!("Parameter update completed");

    Ok(())
  }
}

/// What happens to one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Unchanged,
  Put,
  Delete,
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Action::Unchanged => write!(f, "UNCHANGED"),
      Action::Put => write!(f, "PUT"),
      Action::Delete => write!(f, "DELETE"),
    }
  }
}

/// A decision for one parameter, with its rendered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
  Unchanged { line: String },
  Put { parameter: Parameter, line: String },
  Delete { name: String, line: String },
}

impl Change {
  pub fn action(&self) -> Action {
    match self {
      Change::Unchanged { .. } => Action::Unchanged,
      Change::Put { .. } => Action::Put,
      Change::Delete { .. } => Action::Delete,
    }
  }

  pub fn line(&self) -> &str {
    match self {
      Change::Unchanged { line } | Change::Put { line, .. } | Change::Delete { line, .. } => line,
    }
  }
}

/// The diff between desired and current parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
  pub changes: Vec<Change>,
}

impl Plan {
  /// Compares `desired` against `current` by absolute name. A desired
  /// parameter is unchanged only when both kind and value match.
  pub fn new(
    desired: Vec<Parameter>,
    current: Vec<Parameter>,
    delete_names: Vec<String>,
  ) -> Result<Self> {
    let current: HashMap<String, Parameter> = current
      .into_iter()
      .map(|parameter| (abs(&parameter.name).into_owned(), parameter))
      .collect();

    let mut changes = Vec::with_capacity(desired.len() + delete_names.len());

    for parameter in desired {
      let line = Expression::from(&parameter).log()?;
      let unchanged = current
        .get(abs(&parameter.name).as_ref())
        .is_some_and(|old| old.kind == parameter.kind && old.value == parameter.value);

      #[cfg(feature = "tracing")]
      trace!(name = %parameter.name, unchanged, "Planned parameter");

      changes.push(if unchanged {
        Change::Unchanged { line }
      } else {
        Change::Put { parameter, line }
      });
    }

    changes.extend(delete_names.into_iter().map(|name| Change::Delete {
      line: abs(&name).into_owned(),
      name,
    }));

    Ok(Self { changes })
  }
}

/// Line sink shared by concurrent tasks. Each line is written under a lock.
#[derive(Clone, Default)]
pub struct ActivityLog {
  sink: Option<Arc<Mutex<dyn Write + Send>>>,
}

impl ActivityLog {
  pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
    Self {
      sink: Some(Arc::new(Mutex::new(writer))),
    }
  }

  /// A log that drops every line.
  pub fn discard() -> Self {
    Self::default()
  }

  pub fn record(&self, action: Action, line: &str) -> std::io::Result<()> {
    let Some(sink) = &self.sink else {
      return Ok(());
    };

    let mut writer = sink.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(writer, "{action} {line}")?;
    writer.flush()
  }
}
