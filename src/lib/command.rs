//! Operations behind the `get`, `set`, `replace` and `exec` commands.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::error::{Error, Result};
use crate::name::{self, is_base};
use crate::parse::Expression;
use crate::remote::Remote;
use crate::store::Parameter;
use crate::sync::{ActivityLog, ParameterSync};

/// Prints every parameter under `path`, either as `name[@]=value` relative to
/// `path` or as shell `export` statements.
pub async fn get_by_path<W: Write>(
  out: &mut W,
  remote: &Remote,
  path: &str,
  recursive: bool,
  export: bool,
) -> Result<()> {
  let parameters = remote.get_parameters_by_path(path, recursive).await?;

  for parameter in &parameters {
    let expr = Expression::from(parameter);
    let line = if export {
      expr.export()?
    } else {
      expr.serialize(path)?
    };
    writeln!(out, "{line}")?;
  }

  Ok(())
}

/// Prints the raw value of one parameter.
pub async fn get_by_name<W: Write>(
  out: &mut W,
  remote: &Remote,
  path: &str,
  name: &str,
) -> Result<()> {
  let name = name::join(path, name)?;
  let parameter = remote.get_parameter(&name).await?;
  writeln!(out, "{}", parameter.value)?;
  Ok(())
}

/// Writes the parameters described by `exprs`, skipping unchanged ones.
pub async fn set(log: &ActivityLog, remote: &Remote, path: &str, exprs: &[String]) -> Result<()> {
  if exprs.is_empty() {
    return Err(Error::RequireNameAndValue);
  }

  let mut parameters = Vec::with_capacity(exprs.len());
  for expr in exprs {
    parameters.push(Expression::try_from(expr.as_str())?.parameter(path)?);
  }
  let names: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();

  ParameterSync::update(remote, parameters, &names, Vec::new(), log).await
}

/// Replaces everything under `path` with the parameters described by `exprs`.
///
/// Without `recursive`, names must be single segments.
pub async fn replace(
  log: &ActivityLog,
  remote: &Remote,
  path: &str,
  recursive: bool,
  exprs: &[String],
) -> Result<()> {
  if path.is_empty() {
    return Err(Error::RequirePath);
  }
  if exprs.is_empty() {
    return Err(Error::RequireNameAndValue);
  }

  let mut parameters = Vec::with_capacity(exprs.len());
  for expr in exprs {
    let parsed = Expression::try_from(expr.as_str())?;
    if !recursive && !is_base(&parsed.name) {
      return Err(Error::SlashWithoutRecursive(expr.clone()));
    }
    parameters.push(parsed.parameter(path)?);
  }

  ParameterSync::replace(remote, path, recursive, parameters, log).await
}

/// A command to run with parameters as environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
  /// Resolved location of the program.
  pub program: PathBuf,
  pub args: Vec<String>,
  /// Variables added to the inherited environment.
  pub envs: Vec<(String, String)>,
}

/// Resolves `argv` and the environment built from `paths`.
///
/// Variables are named after the final segment of each parameter name. When
/// several parameters share that segment, the one from the later path wins.
/// No paths means the root path. The program is looked up on `PATH` before
/// any parameter is fetched.
pub async fn exec_command(
  remote: &Remote,
  paths: &[String],
  recursive: bool,
  argv: &[String],
) -> Result<ExecCommand> {
  let Some((program, args)) = argv.split_first() else {
    return Err(Error::RequireCommand);
  };
  let program = which::which(program).map_err(|source| Error::ProgramNotFound {
    program: program.clone(),
    source,
  })?;

  let paths = if paths.is_empty() {
    vec![String::new()]
  } else {
    paths.to_vec()
  };

  let parameters = remote.get_parameters_by_paths(&paths, recursive).await?;

  let mut by_base: BTreeMap<&str, &Parameter> = BTreeMap::new();
  for parameter in &parameters {
    by_base.insert(name::base(&parameter.name), parameter);
  }

  let mut envs = Vec::with_capacity(by_base.len());
  for parameter in by_base.values() {
    let assignment = Expression::from(*parameter).env()?;
    if let Some((key, value)) = assignment.split_once('=') {
      envs.push((key.to_string(), value.to_string()));
    }
  }

  #[cfg(feature = "tracing")]
  debug!(?program, count = envs.len(), "Resolved exec environment");

  Ok(ExecCommand {
    program,
    args: args.to_vec(),
    envs,
  })
}
