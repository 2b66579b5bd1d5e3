#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ssmenv::remote::{Remote, RemoteOptions};
use ssmenv::store::{
  LocalStore, Page, Parameter, ParameterKind, ParameterMetadata, ParameterStore, StoreError,
};
use ssmenv::sync::ActivityLog;

/// A [`LocalStore`] that counts calls, tracks how many are in flight, and can
/// be told to slow down or fail on particular names.
#[derive(Default)]
pub struct StubStore {
  inner: LocalStore,
  latency: Option<Duration>,
  failing: HashSet<String>,
  in_flight: AtomicUsize,
  pub peak_in_flight: AtomicUsize,
  pub puts: AtomicUsize,
  pub deletes: AtomicUsize,
  pub reads: AtomicUsize,
}

impl StubStore {
  pub fn new(parameters: Vec<Parameter>) -> Self {
    Self {
      inner: LocalStore::with_parameters(parameters),
      ..Self::default()
    }
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  /// Puts and deletes of `name` fail with [`StoreError::Rejected`].
  pub fn failing_on(mut self, name: &str) -> Self {
    self.failing.insert(name.to_string());
    self
  }

  pub fn parameters(&self) -> Vec<Parameter> {
    self.inner.parameters()
  }

  pub fn mutations(&self) -> usize {
    self.puts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
  }

  async fn enter(&self) -> InFlight<'_> {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }
    InFlight(&self.in_flight)
  }

  fn check(&self, name: &str) -> Result<(), StoreError> {
    if self.failing.contains(name) {
      Err(StoreError::Rejected(name.to_string()))
    } else {
      Ok(())
    }
  }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl ParameterStore for StubStore {
  async fn get_parameters_by_path(
    &self,
    path: &str,
    recursive: bool,
    page_token: Option<String>,
  ) -> Result<Page<Parameter>, StoreError> {
    let _guard = self.enter().await;
    self.reads.fetch_add(1, Ordering::SeqCst);
    self
      .inner
      .get_parameters_by_path(path, recursive, page_token)
      .await
  }

  async fn describe_parameters(
    &self,
    paths: &[String],
    recursive: bool,
    page_token: Option<String>,
  ) -> Result<Page<ParameterMetadata>, StoreError> {
    let _guard = self.enter().await;
    self.reads.fetch_add(1, Ordering::SeqCst);
    self
      .inner
      .describe_parameters(paths, recursive, page_token)
      .await
  }

  async fn get_parameters(&self, names: &[String]) -> Result<Vec<Parameter>, StoreError> {
    let _guard = self.enter().await;
    self.reads.fetch_add(1, Ordering::SeqCst);
    self.inner.get_parameters(names).await
  }

  async fn get_parameter(&self, name: &str) -> Result<Parameter, StoreError> {
    let _guard = self.enter().await;
    self.reads.fetch_add(1, Ordering::SeqCst);
    self.inner.get_parameter(name).await
  }

  async fn put_parameter(&self, parameter: &Parameter) -> Result<(), StoreError> {
    let _guard = self.enter().await;
    self.check(&parameter.name)?;
    self.puts.fetch_add(1, Ordering::SeqCst);
    self.inner.put_parameter(parameter).await
  }

  async fn delete_parameter(&self, name: &str) -> Result<(), StoreError> {
    let _guard = self.enter().await;
    self.check(name)?;
    self.deletes.fetch_add(1, Ordering::SeqCst);
    self.inner.delete_parameter(name).await
  }
}

/// Captures activity log output.
#[derive(Clone, Default)]
pub struct Output(Arc<Mutex<Vec<u8>>>);

impl Write for Output {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().unwrap().write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

impl Output {
  pub fn log(&self) -> ActivityLog {
    ActivityLog::new(self.clone())
  }

  /// Lines in sorted order, since completion order is not deterministic.
  pub fn sorted_lines(&self) -> Vec<String> {
    let content = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    lines.sort();
    lines
  }

  pub fn take(&self) -> Vec<String> {
    let lines = self.sorted_lines();
    self.0.lock().unwrap().clear();
    lines
  }
}

pub fn remote(store: &Arc<StubStore>, concurrency: usize) -> Remote {
  Remote::new(store.clone(), RemoteOptions { concurrency })
}

pub fn plain(name: &str, value: &str) -> Parameter {
  Parameter::new(name, ParameterKind::Plain, value)
}

pub fn secret(name: &str, value: &str) -> Parameter {
  Parameter::new(name, ParameterKind::Secret, value)
}

pub fn strings(values: &[&str]) -> Vec<String> {
  values.iter().map(|value| value.to_string()).collect()
}

pub fn sorted(mut lines: Vec<&str>) -> Vec<String> {
  lines.sort();
  lines.into_iter().map(str::to_string).collect()
}
