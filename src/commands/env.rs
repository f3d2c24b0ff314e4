use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;

use crate::{
    aws::env::{aws_env, export_lines},
    cli::SessionArgs,
};

#[derive(Debug, Clone, Args)]
pub struct EnvCommand {}

impl EnvCommand {
    pub async fn execute(self, session: &SessionArgs) -> Result<()> {
        let (account, creds) = session.acquire().await?;
        let lines = export_lines(&aws_env(&creds, account.default_region.as_deref()));

        let mut stdout = io::stdout().lock();
        stdout
            .write_all(lines.as_bytes())
            .and_then(|()| stdout.flush())
            .context("Failed to write environment")
    }
}
