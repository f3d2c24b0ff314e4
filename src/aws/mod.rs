use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{constants::EXPIRY_SAFETY_MARGIN_SECS, error::Result};

pub mod env;
pub mod sts;

/// AWS temporary credentials structure
///
/// Serialized with the STS field names so cache files stay readable by other
/// tools that understand `GetSessionToken` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl Credentials {
    /// Whether the credentials are well formed and outlive `now` by more than
    /// the safety margin.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.is_well_formed()
            && self.expiration > now + TimeDelta::seconds(EXPIRY_SAFETY_MARGIN_SECS)
    }

    /// Whether every field is populated.
    pub fn is_well_formed(&self) -> bool {
        !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
            && !self.session_token.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Long-lived account keys used to call IAM and STS
#[derive(Clone)]
pub struct BaseCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl fmt::Debug for BaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BaseCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// A virtual or hardware MFA device registered for an IAM user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaDevice {
    pub serial_number: String,
}

/// Lists the MFA devices registered for the caller's IAM user.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn list_mfa_devices(&self, base: &BaseCredentials) -> Result<Vec<MfaDevice>>;
}

/// Exchanges an MFA code for temporary session credentials.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_token(
        &self,
        device: &MfaDevice,
        code: &str,
        duration_seconds: i32,
        base: &BaseCredentials,
    ) -> Result<Credentials>;
}

#[async_trait]
impl<T: IdentityService + ?Sized> IdentityService for Arc<T> {
    async fn list_mfa_devices(&self, base: &BaseCredentials) -> Result<Vec<MfaDevice>> {
        (**self).list_mfa_devices(base).await
    }
}

#[async_trait]
impl<T: TokenExchange + ?Sized> TokenExchange for Arc<T> {
    async fn exchange_token(
        &self,
        device: &MfaDevice,
        code: &str,
        duration_seconds: i32,
        base: &BaseCredentials,
    ) -> Result<Credentials> {
        (**self)
            .exchange_token(device, code, duration_seconds, base)
            .await
    }
}
