//! Expressions of the form `name[@]=value`.
//!
//! A trailing `@` on the name marks the parameter as secret. A value wrapped in
//! double quotes is decoded as a JSON string literal, so it may carry quotes,
//! newlines, tabs and backslashes; any other value is taken verbatim.
//!
//! Rendering is the inverse: a value is JSON-encoded when it is itself wrapped
//! in quotes or contains a control character, and emitted verbatim otherwise.

use std::borrow::Cow;
use std::io::BufRead;

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::name::{self, NameError};
use crate::store::{Parameter, ParameterKind};

pub const SECURE_MARK: &str = "@";
const ASSIGNMENT_OPERATOR: &str = "=";
const COMMENT_PREFIX: &str = "#";
const EXPORT_PREFIX: &str = "export ";
const QUOTE: &str = "\"";
const SECRET_MASK: &str = "****************";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression<'a> {
  pub name: Cow<'a, str>,
  pub value: Cow<'a, str>,
  pub secure: bool,
}

impl<'a> TryFrom<&'a str> for Expression<'a> {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    #[cfg(feature = "tracing")]
    trace!("Parsing expression: {:?}", s);

    let Some((lhs, rhs)) = s.split_once(ASSIGNMENT_OPERATOR) else {
      return Err(ParseError::InvalidExpression(s.to_string()));
    };

    let (name, secure) = match lhs.strip_suffix(SECURE_MARK) {
      Some(name) => (name, true),
      None => (lhs, false),
    };

    Ok(Expression {
      name: Cow::Borrowed(name),
      value: unescape(rhs)?,
      secure,
    })
  }
}

impl<'a> From<&'a Parameter> for Expression<'a> {
  fn from(parameter: &'a Parameter) -> Self {
    Expression {
      name: Cow::Borrowed(&parameter.name),
      value: Cow::Borrowed(&parameter.value),
      secure: parameter.kind == ParameterKind::Secret,
    }
  }
}

impl<'a> Expression<'a> {
  /// `name[@]=value` with the name relative to `path`. Secret values are shown.
  pub fn serialize(&self, path: &str) -> Result<String, ParseError> {
    let lhs = name::rel(&self.name, path)?;
    build("", &lhs, &self.value, self.secure)
  }

  /// `base=value`, suitable as a process environment assignment.
  pub fn env(&self) -> Result<String, ParseError> {
    build("", name::base(&self.name), &self.value, false)
  }

  /// `export base=value` with `.` and `-` in the base replaced by `_`.
  pub fn export(&self) -> Result<String, ParseError> {
    build(EXPORT_PREFIX, &exportable_name(&self.name), &self.value, false)
  }

  /// `/absolute/name[@]=value` with secret values masked.
  pub fn log(&self) -> Result<String, ParseError> {
    let value: &str = if self.secure { SECRET_MASK } else { &self.value };
    build("", &name::abs(&self.name), value, self.secure)
  }

  /// Builds the parameter this expression describes, anchored at `path`.
  pub fn parameter(&self, path: &str) -> Result<Parameter, NameError> {
    let kind = if self.secure {
      ParameterKind::Secret
    } else {
      ParameterKind::Plain
    };

    Ok(Parameter::new(
      name::join(path, &self.name)?,
      kind,
      self.value.clone().into_owned(),
    ))
  }
}

fn build(prefix: &str, lhs: &str, value: &str, secure: bool) -> Result<String, ParseError> {
  let rhs = escape(value)?;
  let mark = if secure { SECURE_MARK } else { "" };
  Ok(format!("{prefix}{lhs}{mark}{ASSIGNMENT_OPERATOR}{rhs}"))
}

fn exportable_name(name: &str) -> String {
  name::base(name).replace(['.', '-'], "_")
}

fn is_quoted(value: &str) -> bool {
  value.starts_with(QUOTE) && value.ends_with(QUOTE)
}

/// Encodes `value` as a JSON string when it is quoted or has control characters.
pub fn escape(value: &str) -> Result<Cow<'_, str>, ParseError> {
  if is_quoted(value) || value.bytes().any(|byte| byte < b' ') {
    Ok(Cow::Owned(
      serde_json::to_string(value).map_err(ParseError::Marshal)?,
    ))
  } else {
    Ok(Cow::Borrowed(value))
  }
}

/// Decodes a quoted value as a JSON string literal; anything else is verbatim.
pub fn unescape(value: &str) -> Result<Cow<'_, str>, ParseError> {
  if !is_quoted(value) {
    return Ok(Cow::Borrowed(value));
  }

  serde_json::from_str::<String>(value)
    .map(Cow::Owned)
    .map_err(|source| ParseError::Unmarshal {
      value: value.to_string(),
      source,
    })
}

/// Reads expressions one per line, trimming whitespace and skipping blank and
/// `#` comment lines.
pub fn read_expressions<R: BufRead>(reader: R) -> std::io::Result<Vec<String>> {
  let mut expressions = Vec::new();

  for line in reader.lines() {
    let line = line?;
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(COMMENT_PREFIX) {
      continue;
    }
    expressions.push(trimmed.to_string());
  }

  Ok(expressions)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("a expression must be \"name[@]=value\": {0:?}")]
  InvalidExpression(String),
  #[error("invalid value {value:?}: {source}")]
  Unmarshal {
    value: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("failed to encode value: {0}")]
  Marshal(#[source] serde_json::Error),
  #[error(transparent)]
  Name(#[from] NameError),
}
