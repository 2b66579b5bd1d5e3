//! Parameter name and path grammar.
//!
//! A name is either a single segment (`foo`) or one to six `/`-prefixed
//! segments (`/app/prod/db-host`). A path is one to five `/`-prefixed segments,
//! optionally ending in `/`, or the root `/`. Segments are made of
//! `[A-Za-z0-9._-]`.
//!
//! Names and paths starting with `aws` or `ssm` (any case, with or without a
//! leading `/`) are reserved by the store and always rejected, even when they
//! match the character grammar.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

const SEPARATOR: char = '/';

static NAME: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?:/[-.A-Za-z0-9_]+){1,6}$|^[-.A-Za-z0-9_]+$").expect("invalid name pattern")
});

static PATH: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?:/[-.A-Za-z0-9_]+){1,5}/?$|^/$").expect("invalid path pattern")
});

static BASE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[-.A-Za-z0-9_]+$").expect("invalid base pattern"));

static REL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[-.A-Za-z0-9_]+(?:/[-.A-Za-z0-9_]+)*$").expect("invalid relative name pattern")
});

static RESERVED: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)^/?(?:aws|ssm)").expect("invalid reserved pattern"));

pub fn is_name(name: &str) -> bool {
  NAME.is_match(name) && !RESERVED.is_match(name)
}

pub fn is_path(path: &str) -> bool {
  PATH.is_match(path) && !RESERVED.is_match(path)
}

/// A single segment without separators.
pub fn is_base(base: &str) -> bool {
  BASE.is_match(base)
}

/// One or more segments without a leading separator.
pub fn is_rel(rel: &str) -> bool {
  REL.is_match(rel)
}

pub fn validate_name(name: &str) -> Result<(), NameError> {
  if is_name(name) {
    Ok(())
  } else {
    Err(NameError::InvalidName(name.to_string()))
  }
}

pub fn validate_path(path: &str) -> Result<(), NameError> {
  if is_path(path) {
    Ok(())
  } else {
    Err(NameError::InvalidPath(path.to_string()))
  }
}

/// Returns `name` with a leading separator.
pub fn abs(name: &str) -> Cow<'_, str> {
  if name.starts_with(SEPARATOR) {
    Cow::Borrowed(name)
  } else {
    Cow::Owned(format!("{SEPARATOR}{name}"))
  }
}

/// Anchors `name` at `path`.
///
/// With an empty `path` the name must already be a valid name and is returned
/// as is. Otherwise `path` must be a valid path, `name` must be relative, and
/// the cleaned concatenation must again be a valid name.
pub fn join(path: &str, name: &str) -> Result<String, NameError> {
  let joined = if path.is_empty() {
    name.to_string()
  } else {
    validate_path(path)?;
    if !is_rel(name) {
      return Err(NameError::AbsNameWithPath {
        path: path.to_string(),
        name: name.to_string(),
      });
    }
    clean(&format!("{path}{SEPARATOR}{name}"))
  };

  validate_name(&joined)?;
  Ok(joined)
}

/// Returns the absolute form of `name` relative to `path`.
///
/// An empty `path` yields the absolute name itself.
pub fn rel(name: &str, path: &str) -> Result<String, NameError> {
  let abs_name = abs(name);

  if path.is_empty() {
    return Ok(abs_name.into_owned());
  }

  let prefix = if path.ends_with(SEPARATOR) {
    Cow::Borrowed(path)
  } else {
    Cow::Owned(format!("{path}{SEPARATOR}"))
  };

  match abs_name.strip_prefix(prefix.as_ref()) {
    Some(rest) => Ok(rest.to_string()),
    None => Err(NameError::PathMismatch {
      path: path.to_string(),
      name: abs_name.into_owned(),
    }),
  }
}

/// Final segment of a name.
pub fn base(name: &str) -> &str {
  let trimmed = name.trim_end_matches(SEPARATOR);
  match trimmed.rsplit_once(SEPARATOR) {
    Some((_, last)) => last,
    None => trimmed,
  }
}

/// Lexically resolves `.` and `..` segments and collapses repeated separators.
fn clean(name: &str) -> String {
  let rooted = name.starts_with(SEPARATOR);
  let mut segments: Vec<&str> = Vec::new();

  for segment in name.split(SEPARATOR) {
    match segment {
      "" | "." => {}
      ".." => {
        if segments.last().is_some_and(|last| *last != "..") {
          segments.pop();
        } else if !rooted {
          segments.push(segment);
        }
      }
      _ => segments.push(segment),
    }
  }

  let joined = segments.join("/");
  if rooted {
    format!("{SEPARATOR}{joined}")
  } else {
    joined
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
  #[error("invalid name: {0}")]
  InvalidName(String),
  #[error("invalid path: {0}")]
  InvalidPath(String),
  #[error("an absolute name can not be given with a path: path={path:?}, name={name:?}")]
  AbsNameWithPath { path: String, name: String },
  #[error("a name must begin with a path: path={path:?}, name={name:?}")]
  PathMismatch { path: String, name: String },
}
