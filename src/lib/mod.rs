//! Hierarchical parameter store as a source of environment variables.
//!
//! This library reads parameters under a path to build a process environment,
//! prints them, writes them, and replaces the contents of a path so that it
//! matches a desired set. Writes are reconciled against the store: parameters
//! whose type and value already match are left alone, so repeated runs are
//! idempotent.
//!
//! # Features
//!
//! - **Restricted grammar**: names and paths are validated before any remote call
//! - **Reversible quoting**: values with quotes or control characters round-trip
//!   through `name[@]=value` expressions as JSON string literals
//! - **Bounded concurrency**: remote calls run in parallel under a fixed ceiling,
//!   and the first failure cancels work that has not started yet
//! - **Optional tracing**: Detailed logging when the `tracing` feature is enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ssmenv::command;
//! use ssmenv::remote::{Remote, RemoteOptions};
//! use ssmenv::store::LocalStore;
//! use ssmenv::sync::ActivityLog;
//!
//! # async fn run() -> ssmenv::error::Result<()> {
//! let store = LocalStore::open(".ssmenv.json")?;
//! let remote = Remote::new(Arc::new(store), RemoteOptions::default());
//! let log = ActivityLog::new(std::io::stdout());
//!
//! command::set(&log, &remote, "/app", &["password@=pwd".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod executor;
pub mod name;
pub mod parse;
pub mod remote;
pub mod store;
pub mod sync;
