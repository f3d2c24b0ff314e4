use std::process::{Command, ExitCode};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use crate::{
    aws::env::aws_env,
    cli::SessionArgs,
    constants::DEFAULT_WRAPPED_PROGRAM,
};

#[derive(Debug, Clone, Args)]
pub struct ExecCommand {
    #[arg(long, default_value = DEFAULT_WRAPPED_PROGRAM, help = "Program to run")]
    pub program: String,

    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Arguments passed to the program"
    )]
    pub args: Vec<String>,
}

impl ExecCommand {
    pub async fn execute(self, session: &SessionArgs) -> Result<ExitCode> {
        let (account, creds) = session.acquire().await?;
        let vars = aws_env(&creds, account.default_region.as_deref());
        debug!(
            "Injecting {}",
            vars.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(", ")
        );

        info!("Running {} {}", self.program, self.args.join(" "));
        run(self.command(vars), &self.program)
    }

    fn command(&self, vars: Vec<(&'static str, String)>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(vars);
        command
    }
}

/// Replace this process with `command`; only returns if that fails.
///
/// The stdin reader thread may still be blocked on a read, so the wrapped
/// program must not run as a child sharing our stdin.
#[cfg(unix)]
fn run(mut command: Command, program: &str) -> Result<ExitCode> {
    use std::os::unix::process::CommandExt;

    let err = command.exec();
    Err(err).with_context(|| format!("Failed to execute {program}"))
}

#[cfg(not(unix))]
fn run(mut command: Command, program: &str) -> Result<ExitCode> {
    let status = command
        .status()
        .with_context(|| format!("Failed to execute {program}"))?;
    Ok(exit_code(status))
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}
