use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use crate::{
    acquire::CredentialAcquirer,
    aws::{Credentials, sts::AwsSessionService},
    cache::CredentialCache,
    commands::{CompletionsCommand, EnvCommand, ExecCommand},
    config::{self, AccountConfig},
    constants::{self, DEFAULT_TOKEN_TIMEOUT},
    mfa::CodeValidation,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "awsmfa", version, about = "Run AWS commands with cached MFA session credentials", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(flatten)]
    pub session: SessionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where account settings come from and how a session is obtained.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    #[arg(
        short = 'c',
        long,
        global = true,
        help = "Account config JSON file (default: $AWS_CREDENTIALS_PATH)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        conflicts_with = "config",
        help = "Read keys from ~/.aws/credentials instead of a JSON config"
    )]
    pub local: bool,

    #[arg(
        short = 'p',
        long,
        global = true,
        default_value = "default",
        help = "AWS profile name used with --local"
    )]
    pub profile: String,

    #[arg(
        long,
        global = true,
        help = "Credential cache directory (default: $AWSMFA_CACHE_DIR or /tmp/aws)"
    )]
    pub cache_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_TOKEN_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds to wait for an MFA token"
    )]
    pub timeout: u64,

    #[arg(
        long,
        global = true,
        help = "Only accept six-digit MFA tokens"
    )]
    pub digits_only: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Run a program with session credentials in its environment")]
    Exec(ExecCommand),
    #[command(about = "Print session credentials as shell export lines")]
    Env(EnvCommand),
    #[command(about = "Generate shell completion scripts for awsmfa")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        match self.command {
            Commands::Exec(cmd) => cmd.execute(&self.session).await,
            Commands::Env(cmd) => cmd.execute(&self.session).await.map(|()| ExitCode::SUCCESS),
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

impl SessionArgs {
    pub async fn load_account(&self) -> Result<AccountConfig> {
        if self.local {
            let profile = self.profile.as_str();
            return config::load_local(profile)
                .await
                .with_context(|| format!("Failed to load AWS profile '{profile}'"));
        }

        match &self.config {
            Some(path) => config::load(path)
                .await
                .with_context(|| format!("Failed to load account config {}", path.display())),
            None => config::load_from_env()
                .await
                .context("Failed to load account config"),
        }
    }

    pub fn cache(&self) -> CredentialCache {
        CredentialCache::new(
            self.cache_dir
                .clone()
                .unwrap_or_else(constants::default_cache_dir),
        )
    }

    pub fn code_validation(&self) -> CodeValidation {
        if self.digits_only {
            CodeValidation::Digits
        } else {
            CodeValidation::Length
        }
    }

    /// Load the account and return it with fresh session credentials.
    pub async fn acquire(&self) -> Result<(AccountConfig, Credentials)> {
        let account = self.load_account().await?;
        let cache = self.cache();
        info!("Using credential cache at {}", cache.root().display());

        let creds = CredentialAcquirer::new(cache, AwsSessionService::new())
            .with_token_timeout(Duration::from_secs(self.timeout))
            .with_code_validation(self.code_validation())
            .acquire(&account)
            .await
            .context("Failed to acquire MFA session credentials")?;

        Ok((account, creds))
    }
}
