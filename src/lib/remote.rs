//! Parallel access to a [`ParameterStore`].
//!
//! Every operation validates its input before the first remote call, follows
//! pagination to the end, and runs independent calls through a fresh
//! [`Executor`] bounded by [`RemoteOptions::concurrency`].

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::name::{validate_name, validate_path};
use crate::store::{MAX_NAMES_PER_CALL, Parameter, ParameterMetadata, ParameterStore};

/// Default number of concurrent calls to the store.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration for remote access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOptions {
  /// Maximum number of store calls in flight for one operation.
  pub concurrency: usize,
}

impl Default for RemoteOptions {
  fn default() -> Self {
    Self {
      concurrency: DEFAULT_CONCURRENCY,
    }
  }
}

#[derive(Clone)]
pub struct Remote {
  store: Arc<dyn ParameterStore>,
  options: RemoteOptions,
}

impl Remote {
  pub fn new(store: Arc<dyn ParameterStore>, options: RemoteOptions) -> Self {
    Self { store, options }
  }

  /// A fresh executor for one top-level operation.
  pub fn executor(&self) -> Executor<Error> {
    Executor::new(self.options.concurrency)
  }

  /// Fetches every parameter under `path`; an empty path means `/`.
  pub async fn get_parameters_by_path(
    &self,
    path: &str,
    recursive: bool,
  ) -> Result<Vec<Parameter>> {
    let path = normalize_path(path)?;
    fetch_by_path(Arc::clone(&self.store), path, recursive).await
  }

  /// Fetches several paths concurrently. The result keeps the order of
  /// `paths`; entries within one path keep the store's order.
  pub async fn get_parameters_by_paths(
    &self,
    paths: &[String],
    recursive: bool,
  ) -> Result<Vec<Parameter>> {
    let paths = paths
      .iter()
      .map(|path| normalize_path(path))
      .collect::<Result<Vec<_>>>()?;

    let slots: Arc<Mutex<Vec<Vec<Parameter>>>> =
      Arc::new(Mutex::new(vec![Vec::new(); paths.len()]));

    let mut executor = self.executor();
    for (index, path) in paths.into_iter().enumerate() {
      let store = Arc::clone(&self.store);
      let slots = Arc::clone(&slots);
      executor.spawn(async move {
        let parameters = fetch_by_path(store, path, recursive).await?;
        slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = parameters;
        Ok(())
      });
    }
    executor.wait().await?;

    let slots = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(slots.into_iter().flatten().collect())
  }

  /// Lists metadata under any of `paths` with a single combined filter.
  pub async fn describe_parameters(
    &self,
    paths: &[String],
    recursive: bool,
  ) -> Result<Vec<ParameterMetadata>> {
    let paths = paths
      .iter()
      .map(|path| normalize_path(path))
      .collect::<Result<Vec<_>>>()?;

    let mut metadata = Vec::new();
    let mut page_token = None;
    loop {
      let page = self
        .store
        .describe_parameters(&paths, recursive, page_token)
        .await?;

      #[cfg(feature = "tracing")]
      trace!(count = page.items.len(), "Described page");

      metadata.extend(page.items);
      match page.next_token {
        Some(token) => page_token = Some(token),
        None => break,
      }
    }

    #[cfg(feature = "tracing")]
    debug!(?paths, recursive, count = metadata.len(), "Described parameters");

    Ok(metadata)
  }

  /// Fetches `names` in batches of [`MAX_NAMES_PER_CALL`]. Missing names are
  /// absent from the result, which is in no particular order.
  pub async fn get_parameters_by_names(&self, names: &[String]) -> Result<Vec<Parameter>> {
    for name in names {
      validate_name(name)?;
    }

    let found: Arc<Mutex<Vec<Parameter>>> = Arc::new(Mutex::new(Vec::new()));

    let mut executor = self.executor();
    for batch in names.chunks(MAX_NAMES_PER_CALL) {
      let store = Arc::clone(&self.store);
      let found = Arc::clone(&found);
      let batch = batch.to_vec();
      executor.spawn(async move {
        let parameters = store.get_parameters(&batch).await?;

        #[cfg(feature = "tracing")]
        trace!(requested = batch.len(), found = parameters.len(), "Fetched batch");

        found
          .lock()
          .unwrap_or_else(PoisonError::into_inner)
          .extend(parameters);
        Ok(())
      });
    }
    executor.wait().await?;

    let found = std::mem::take(&mut *found.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(found)
  }

  pub async fn get_parameter(&self, name: &str) -> Result<Parameter> {
    validate_name(name)?;
    Ok(self.store.get_parameter(name).await?)
  }

  /// A task writing one parameter, to be run on an [`Executor`].
  pub fn put_parameter(
    &self,
    parameter: Parameter,
  ) -> impl Future<Output = Result<()>> + Send + use<> {
    let store = Arc::clone(&self.store);
    async move {
      #[cfg(feature = "tracing")]
      trace!(name = %parameter.name, "Putting parameter");

      store.put_parameter(&parameter).await?;
      Ok(())
    }
  }

  /// A task deleting one parameter, to be run on an [`Executor`].
  pub fn delete_parameter(&self, name: String) -> impl Future<Output = Result<()>> + Send + use<> {
    let store = Arc::clone(&self.store);
    async move {
      #[cfg(feature = "tracing")]
      trace!(%name, "Deleting parameter");

      store.delete_parameter(&name).await?;
      Ok(())
    }
  }
}

fn normalize_path(path: &str) -> Result<String> {
  let path = if path.is_empty() { "/" } else { path };
  validate_path(path)?;
  Ok(path.to_string())
}

async fn fetch_by_path(
  store: Arc<dyn ParameterStore>,
  path: String,
  recursive: bool,
) -> Result<Vec<Parameter>> {
  let mut parameters = Vec::new();
  let mut page_token = None;
  loop {
    let page = store
      .get_parameters_by_path(&path, recursive, page_token)
      .await?;
    parameters.extend(page.items);
    match page.next_token {
      Some(token) => page_token = Some(token),
      None => break,
    }
  }

  #[cfg(feature = "tracing")]
  debug!(%path, recursive, count = parameters.len(), "Fetched parameters by path");

  Ok(parameters)
}
