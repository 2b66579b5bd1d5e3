use clap::{Parser, Subcommand};
use ssmenv::command::{self, ExecCommand};
use ssmenv::parse::read_expressions;
use ssmenv::remote::{DEFAULT_CONCURRENCY, Remote, RemoteOptions};
use ssmenv::store::LocalStore;
use ssmenv::sync::ActivityLog;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
  name = "ssmenv",
  about = "Use a hierarchical parameter store as environment variables",
  version,
  author
)]
struct Cli {
  /// The hierarchy for the parameter
  #[arg(long, global = true, default_value = "")]
  path: String,

  /// Parameter store file
  #[arg(long, global = true, env = "SSMENV_STORE", default_value = ".ssmenv.json")]
  store: PathBuf,

  /// Maximum number of concurrent store calls
  #[arg(long, global = true, env = "SSMENV_MAX_CONNECTIONS", default_value_t = DEFAULT_CONCURRENCY)]
  concurrency: usize,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Exec the command with environment variables
  Exec {
    /// Comma separated multiple paths
    #[arg(long, value_delimiter = ',')]
    paths: Vec<String>,

    /// Retrieve all parameters within a hierarchy
    #[arg(long)]
    recursive: bool,

    /// Command to run
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    argv: Vec<String>,
  },
  /// Print parameters
  Get {
    /// Retrieve all parameters within a hierarchy
    #[arg(long)]
    recursive: bool,

    /// Print export statements for shells
    #[arg(long)]
    export: bool,

    /// Print only the value of this parameter
    #[arg(conflicts_with_all = ["recursive", "export"])]
    name: Option<String>,
  },
  /// Set parameters
  Set {
    /// `name[@]=value` expressions; read from stdin when omitted
    exprs: Vec<String>,
  },
  /// Replace all the parameters of the given path
  Replace {
    /// Replace all parameters within a hierarchy
    #[arg(long)]
    recursive: bool,

    /// `name[@]=value` expressions; read from stdin when omitted
    exprs: Vec<String>,
  },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
  #[error("--path and --paths can not be given at the same time")]
  PathAndPaths,
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

/// Expressions from the command line, or from stdin when none were given.
fn expressions(exprs: Vec<String>) -> std::io::Result<Vec<String>> {
  let stdin = std::io::stdin();
  if !exprs.is_empty() || stdin.is_terminal() {
    return Ok(exprs);
  }
  read_expressions(stdin.lock())
}

#[cfg(unix)]
fn run(command: ExecCommand) -> Result<(), Box<dyn std::error::Error>> {
  use std::os::unix::process::CommandExt;

  let error = std::process::Command::new(&command.program)
    .args(&command.args)
    .envs(command.envs)
    .exec();
  Err(error.into())
}

#[cfg(not(unix))]
fn run(command: ExecCommand) -> Result<(), Box<dyn std::error::Error>> {
  let status = std::process::Command::new(&command.program)
    .args(&command.args)
    .envs(command.envs)
    .status()?;
  std::process::exit(status.code().unwrap_or(1));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  let store = LocalStore::open(&cli.store)?;
  let options = RemoteOptions {
    concurrency: cli.concurrency,
  };
  let remote = Remote::new(Arc::new(store), options);
  let log = ActivityLog::new(std::io::stdout());
  let mut out = std::io::stdout();

  match cli.command {
    Command::Exec {
      mut paths,
      recursive,
      argv,
    } => {
      if !cli.path.is_empty() {
        if !paths.is_empty() {
          return Err(CliError::PathAndPaths.into());
        }
        paths.push(cli.path);
      }
      let exec = command::exec_command(&remote, &paths, recursive, &argv).await?;
      run(exec)?;
    }
    Command::Get {
      recursive,
      export,
      name: None,
    } => command::get_by_path(&mut out, &remote, &cli.path, recursive, export).await?,
    Command::Get {
      name: Some(name), ..
    } => command::get_by_name(&mut out, &remote, &cli.path, &name).await?,
    Command::Set { exprs } => {
      command::set(&log, &remote, &cli.path, &expressions(exprs)?).await?;
    }
    Command::Replace { recursive, exprs } => {
      command::replace(&log, &remote, &cli.path, recursive, &expressions(exprs)?).await?;
    }
  }

  Ok(())
}
