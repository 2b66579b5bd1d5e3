//! Parameter store abstraction.
//!
//! [`ParameterStore`] is the small operation set the rest of the crate needs
//! from a hierarchical key/value service: listing by path (values or metadata
//! only), fetching by name, and single-item writes and deletes. Pagination is
//! exposed through opaque page tokens; callers loop until no token is returned.
//!
//! [`LocalStore`] keeps parameters in memory and can persist them to a JSON
//! file, which makes the CLI usable without a network service and gives tests a
//! faithful stand-in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::name::abs;

/// Maximum number of names accepted by a single [`ParameterStore::get_parameters`] call.
pub const MAX_NAMES_PER_CALL: usize = 10;

const VALUES_PAGE_SIZE: usize = 10;
const METADATA_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterKind {
  #[default]
  #[serde(rename = "String")]
  Plain,
  /// Encrypted at rest, decrypted on read.
  #[serde(rename = "SecureString")]
  Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
  pub name: String,
  pub value: String,
  #[serde(rename = "type", default)]
  pub kind: ParameterKind,
}

impl Parameter {
  pub fn new(name: impl Into<String>, kind: ParameterKind, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value: value.into(),
      kind,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMetadata {
  pub name: String,
  pub kind: ParameterKind,
}

/// One page of a listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub next_token: Option<String>,
}

#[async_trait]
pub trait ParameterStore: Send + Sync {
  /// Lists decrypted parameters directly under `path`, or at any depth when
  /// `recursive` is set.
  async fn get_parameters_by_path(
    &self,
    path: &str,
    recursive: bool,
    page_token: Option<String>,
  ) -> Result<Page<Parameter>, StoreError>;

  /// Lists metadata of parameters under any of `paths`.
  async fn describe_parameters(
    &self,
    paths: &[String],
    recursive: bool,
    page_token: Option<String>,
  ) -> Result<Page<ParameterMetadata>, StoreError>;

  /// Fetches up to [`MAX_NAMES_PER_CALL`] decrypted parameters. Unknown names
  /// are omitted from the result.
  async fn get_parameters(&self, names: &[String]) -> Result<Vec<Parameter>, StoreError>;

  async fn get_parameter(&self, name: &str) -> Result<Parameter, StoreError>;

  /// Creates or overwrites a parameter.
  async fn put_parameter(&self, parameter: &Parameter) -> Result<(), StoreError>;

  async fn delete_parameter(&self, name: &str) -> Result<(), StoreError>;
}

/// Failures reported by a [`ParameterStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("parameter not found: {0}")]
  ParameterNotFound(String),
  #[error("too many names in one request: {0} > {MAX_NAMES_PER_CALL}")]
  TooManyNames(usize),
  #[error("invalid page token: {0}")]
  InvalidPageToken(String),
  #[error("request rejected: {0}")]
  Rejected(String),
  #[error("store file IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("store file format error: {0}")]
  Format(#[from] serde_json::Error),
}

/// In-memory store, optionally backed by a JSON file.
///
/// Parameters are identified by their absolute name, so `foo` and `/foo` refer
/// to the same entry.
#[derive(Debug, Default)]
pub struct LocalStore {
  parameters: Mutex<BTreeMap<String, Parameter>>,
  file: Option<PathBuf>,
}

impl LocalStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_parameters(parameters: impl IntoIterator<Item = Parameter>) -> Self {
    let parameters = parameters
      .into_iter()
      .map(|parameter| (abs(&parameter.name).into_owned(), parameter))
      .collect();

    Self {
      parameters: Mutex::new(parameters),
      file: None,
    }
  }

  /// Opens a file-backed store. A missing file is an empty store; it is
  /// created on the first write.
  pub fn open(file: impl AsRef<Path>) -> Result<Self, StoreError> {
    let file = file.as_ref().to_path_buf();

    let parameters: Vec<Parameter> = if file.exists() {
      let content = std::fs::read_to_string(&file)?;
      if content.trim().is_empty() {
        Vec::new()
      } else {
        serde_json::from_str(&content)?
      }
    } else {
      Vec::new()
    };

    #[cfg(feature = "tracing")]
    debug!(?file, count = parameters.len(), "Opened local store");

    let mut store = Self::with_parameters(parameters);
    store.file = Some(file);
    Ok(store)
  }

  /// Snapshot of every stored parameter, ordered by absolute name.
  pub fn parameters(&self) -> Vec<Parameter> {
    self.lock().values().cloned().collect()
  }

  fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Parameter>> {
    self.parameters.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn persist(&self, parameters: &BTreeMap<String, Parameter>) -> Result<(), StoreError> {
    if let Some(file) = &self.file {
      #[cfg(feature = "tracing")]
      trace!(?file, count = parameters.len(), "Persisting local store");

      let values: Vec<&Parameter> = parameters.values().collect();
      std::fs::write(file, serde_json::to_string_pretty(&values)?)?;
    }
    Ok(())
  }
}

/// Whether the absolute `name` lies under `path`.
fn under_path(name: &str, path: &str, recursive: bool) -> bool {
  let prefix = if path.ends_with('/') {
    path.to_string()
  } else {
    format!("{path}/")
  };

  match name.strip_prefix(&prefix) {
    Some(rest) if !rest.is_empty() => recursive || !rest.contains('/'),
    _ => false,
  }
}

fn paginate<T>(
  items: Vec<T>,
  page_size: usize,
  page_token: Option<String>,
) -> Result<Page<T>, StoreError> {
  let start = match page_token {
    Some(token) => token
      .parse::<usize>()
      .map_err(|_| StoreError::InvalidPageToken(token))?,
    None => 0,
  };

  let total = items.len();
  let end = start.saturating_add(page_size).min(total);
  let items: Vec<T> = items.into_iter().skip(start).take(page_size).collect();
  let next_token = (end < total).then(|| end.to_string());

  Ok(Page { items, next_token })
}

#[async_trait]
impl ParameterStore for LocalStore {
  async fn get_parameters_by_path(
    &self,
    path: &str,
    recursive: bool,
    page_token: Option<String>,
  ) -> Result<Page<Parameter>, StoreError> {
    let matching: Vec<Parameter> = self
      .lock()
      .iter()
      .filter(|(name, _)| under_path(name, path, recursive))
      .map(|(_, parameter)| parameter.clone())
      .collect();

    paginate(matching, VALUES_PAGE_SIZE, page_token)
  }

  async fn describe_parameters(
    &self,
    paths: &[String],
    recursive: bool,
    page_token: Option<String>,
  ) -> Result<Page<ParameterMetadata>, StoreError> {
    let matching: Vec<ParameterMetadata> = self
      .lock()
      .iter()
      .filter(|(name, _)| paths.iter().any(|path| under_path(name, path, recursive)))
      .map(|(_, parameter)| ParameterMetadata {
        name: parameter.name.clone(),
        kind: parameter.kind,
      })
      .collect();

    paginate(matching, METADATA_PAGE_SIZE, page_token)
  }

  async fn get_parameters(&self, names: &[String]) -> Result<Vec<Parameter>, StoreError> {
    if names.len() > MAX_NAMES_PER_CALL {
      return Err(StoreError::TooManyNames(names.len()));
    }

    let parameters = self.lock();
    Ok(
      names
        .iter()
        .filter_map(|name| parameters.get(abs(name).as_ref()).cloned())
        .collect(),
    )
  }

  async fn get_parameter(&self, name: &str) -> Result<Parameter, StoreError> {
    self
      .lock()
      .get(abs(name).as_ref())
      .cloned()
      .ok_or_else(|| StoreError::ParameterNotFound(name.to_string()))
  }

  async fn put_parameter(&self, parameter: &Parameter) -> Result<(), StoreError> {
    let mut parameters = self.lock();
    parameters.insert(abs(&parameter.name).into_owned(), parameter.clone());
    self.persist(&parameters)
  }

  async fn delete_parameter(&self, name: &str) -> Result<(), StoreError> {
    let mut parameters = self.lock();
    if parameters.remove(abs(name).as_ref()).is_none() {
      return Err(StoreError::ParameterNotFound(name.to_string()));
    }
    self.persist(&parameters)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn store() -> LocalStore {
    LocalStore::with_parameters([
      Parameter::new("foo", ParameterKind::Plain, "v0"),
      Parameter::new("/rpl/foo", ParameterKind::Plain, "v1"),
      Parameter::new("/rpl/bar", ParameterKind::Secret, "v2"),
      Parameter::new("/rpl/baz/foo", ParameterKind::Plain, "v3"),
      Parameter::new("/rplx/foo", ParameterKind::Plain, "v4"),
    ])
  }

  fn names<T>(items: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
    items.iter().map(|item| name(item).to_string()).collect()
  }

  #[tokio::test]
  async fn test_get_by_path_scopes() {
    let store = store();

    let page = store.get_parameters_by_path("/rpl", false, None).await.unwrap();
    assert_eq!(names(&page.items, |p| &p.name), ["/rpl/bar", "/rpl/foo"]);
    assert!(page.next_token.is_none());

    let page = store.get_parameters_by_path("/rpl/", true, None).await.unwrap();
    assert_eq!(
      names(&page.items, |p| &p.name),
      ["/rpl/bar", "/rpl/baz/foo", "/rpl/foo"]
    );

    let page = store.get_parameters_by_path("/", false, None).await.unwrap();
    assert_eq!(names(&page.items, |p| &p.name), ["foo"]);
  }

  #[tokio::test]
  async fn test_get_by_path_pages() {
    let store = LocalStore::with_parameters(
      (0..23).map(|i| Parameter::new(format!("/gt10/p{i:02}"), ParameterKind::Plain, "v")),
    );

    let first = store.get_parameters_by_path("/gt10", false, None).await.unwrap();
    assert_eq!(first.items.len(), 10);
    let second = store
      .get_parameters_by_path("/gt10", false, first.next_token)
      .await
      .unwrap();
    assert_eq!(second.items.len(), 10);
    let third = store
      .get_parameters_by_path("/gt10", false, second.next_token)
      .await
      .unwrap();
    assert_eq!(third.items.len(), 3);
    assert!(third.next_token.is_none());

    let bad = store
      .get_parameters_by_path("/gt10", false, Some("x".to_string()))
      .await;
    assert!(matches!(bad, Err(StoreError::InvalidPageToken(_))));
  }

  #[tokio::test]
  async fn test_describe_multiple_paths() {
    let store = store();
    let paths = vec!["/rpl/baz".to_string(), "/rplx".to_string()];

    let page = store.describe_parameters(&paths, false, None).await.unwrap();
    assert_eq!(names(&page.items, |m| &m.name), ["/rpl/baz/foo", "/rplx/foo"]);
  }

  #[tokio::test]
  async fn test_get_parameters() {
    let store = store();

    let found = store
      .get_parameters(&["/foo".to_string(), "rpl/missing".to_string(), "/rpl/bar".to_string()])
      .await
      .unwrap();
    assert_eq!(names(&found, |p| &p.name), ["foo", "/rpl/bar"]);
    assert_eq!(found[1].kind, ParameterKind::Secret);

    let too_many: Vec<String> = (0..11).map(|i| format!("/n{i}")).collect();
    assert!(matches!(
      store.get_parameters(&too_many).await,
      Err(StoreError::TooManyNames(11))
    ));
  }

  #[tokio::test]
  async fn test_put_and_delete() {
    let store = store();

    store
      .put_parameter(&Parameter::new("/foo", ParameterKind::Plain, "n0"))
      .await
      .unwrap();
    assert_eq!(store.get_parameter("foo").await.unwrap().value, "n0");

    store.delete_parameter("/rpl/foo").await.unwrap();
    assert!(matches!(
      store.get_parameter("/rpl/foo").await,
      Err(StoreError::ParameterNotFound(_))
    ));
    assert!(matches!(
      store.delete_parameter("/rpl/foo").await,
      Err(StoreError::ParameterNotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_file_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("store.json");

    let store = LocalStore::open(&file).unwrap();
    assert!(store.parameters().is_empty());
    store
      .put_parameter(&Parameter::new("/secure/password", ParameterKind::Secret, "pwd"))
      .await
      .unwrap();

    let content = std::fs::read_to_string(&file).unwrap();
    assert!(content.contains("\"SecureString\""));

    let reopened = LocalStore::open(&file).unwrap();
    assert_eq!(
      reopened.parameters(),
      [Parameter::new("/secure/password", ParameterKind::Secret, "pwd")]
    );
  }
}
