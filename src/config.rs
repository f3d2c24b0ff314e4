use std::{path::Path, time::Duration};

use ini::{Ini, Properties};
use serde::Deserialize;
use tokio::fs;
use tracing::debug;

use crate::{
    aws::BaseCredentials,
    constants::{self, DEFAULT_AWS_REGION, DEFAULT_SESSION_DURATION},
    error::{MfaError, Result},
};

/// Static configuration for one AWS account
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountConfig {
    #[serde(rename = "aws_access_key_id", default)]
    pub access_key_id: String,
    #[serde(rename = "aws_secret_access_key", default)]
    pub secret_access_key: String,
    #[serde(rename = "aws_default_region", default)]
    pub default_region: Option<String>,
    #[serde(rename = "aws_account_name", default)]
    pub account_name: Option<String>,
    #[serde(rename = "aws_duration", default)]
    pub duration: Option<String>,
    #[serde(rename = "aws_yubikey", default)]
    pub hardware_key_name: Option<String>,
}

impl AccountConfig {
    fn from_ini_sections(creds: &Properties, config: Option<&Properties>) -> Self {
        let get = |section: &Properties, key: &str| {
            section
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            access_key_id: get(creds, "aws_access_key_id").unwrap_or_default(),
            secret_access_key: get(creds, "aws_secret_access_key").unwrap_or_default(),
            default_region: config.and_then(|c| get(c, "region")),
            account_name: None,
            duration: None,
            hardware_key_name: None,
        }
    }

    /// Check that the fields needed for authentication are present.
    pub fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(MfaError::config(
                "aws_access_key_id and aws_secret_access_key must be set",
            ));
        }
        if self.access_key_id.contains(['/', '\\']) || self.access_key_id.starts_with('.') {
            return Err(MfaError::config(format!(
                "aws_access_key_id {:?} is not a valid key id",
                self.access_key_id
            )));
        }
        Ok(())
    }

    /// Session duration to request, defaulting to six hours.
    pub fn session_duration(&self) -> Result<Duration> {
        match self.duration.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_SESSION_DURATION),
            Some(raw) => parse_duration(raw),
        }
    }

    /// Region for IAM/STS calls.
    pub fn region(&self) -> &str {
        self.default_region
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_AWS_REGION)
    }

    /// The configured hardware key label, if any.
    pub fn hardware_key(&self) -> Option<&str> {
        self.hardware_key_name.as_deref().filter(|k| !k.is_empty())
    }

    pub fn base_credentials(&self) -> BaseCredentials {
        BaseCredentials {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            region: self.region().to_string(),
        }
    }
}

/// Parse a duration such as `6h`, `90m`, `1h 30m` or `1.5h`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let duration = match humantime::parse_duration(raw) {
        Ok(duration) => duration,
        Err(e) => parse_decimal_duration(raw).ok_or_else(|| {
            MfaError::config(format!("invalid aws_duration {raw:?}: {e}"))
        })?,
    };

    if duration.as_secs() == 0 || duration.as_secs() > i32::MAX as u64 {
        return Err(MfaError::config(format!(
            "aws_duration {raw:?} is out of range"
        )));
    }
    Ok(duration)
}

/// Number-and-unit sequences with decimal fractions, e.g. `1.5h` or `1h0.5m`.
fn parse_decimal_duration(raw: &str) -> Option<Duration> {
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = raw.trim();
    if rest.is_empty() {
        return None;
    }

    let mut secs = 0f64;
    while !rest.is_empty() {
        let split = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let value: f64 = rest[..split].parse().ok()?;
        rest = &rest[split..];

        let split = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..split] {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        secs += value * scale;
        rest = &rest[split..];
    }

    Duration::try_from_secs_f64(secs).ok()
}

/// Load the account config from a JSON file.
pub async fn load(path: &Path) -> Result<AccountConfig> {
    debug!("Reading account config from {}", path.display());

    let raw = fs::read(path).await.map_err(|e| {
        MfaError::config(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: AccountConfig = serde_json::from_slice(&raw).map_err(|e| {
        MfaError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    Ok(config)
}

/// Load the account config from the path in `AWS_CREDENTIALS_PATH`.
pub async fn load_from_env() -> Result<AccountConfig> {
    let path = std::env::var_os(constants::CREDENTIALS_PATH_ENV)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            MfaError::config(format!(
                "{} must be set",
                constants::CREDENTIALS_PATH_ENV
            ))
        })?;
    load(Path::new(&path)).await
}

/// Load the account config from the shared AWS CLI files.
///
/// Keys come from `[profile]` in the credentials file, the region from the
/// matching section in the config file.
pub async fn load_local(profile: &str) -> Result<AccountConfig> {
    let creds_path = constants::get_aws_credentials_path()
        .ok_or_else(|| MfaError::config("failed to determine AWS credentials path"))?;

    let creds_ini = Ini::load_from_file(&creds_path).map_err(|e| {
        MfaError::config(format!("failed to load {}: {e}", creds_path.display()))
    })?;

    let creds = creds_ini.section(Some(profile)).ok_or_else(|| {
        MfaError::config(format!("profile '{profile}' not found in credentials"))
    })?;

    let config_ini = constants::get_aws_config_path()
        .filter(|p| p.exists())
        .and_then(|p| Ini::load_from_file(p).ok());

    let section_name = if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    };
    let region_section = config_ini
        .as_ref()
        .and_then(|ini| ini.section(Some(section_name.as_str())));

    let config = AccountConfig::from_ini_sections(creds, region_section);
    config.validate()?;
    Ok(config)
}
