use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::Client as IamClient;
use aws_sdk_sts::{Client as StsClient, config::Credentials as StaticCredentials};
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{BaseCredentials, Credentials, IdentityService, MfaDevice, TokenExchange};
use crate::error::{MfaError, Result};

/// IAM and STS backed by the AWS SDK, authenticated with the account's
/// long-lived keys
#[derive(Debug, Clone, Default)]
pub struct AwsSessionService;

impl AwsSessionService {
    pub fn new() -> Self {
        Self
    }

    async fn sdk_config(base: &BaseCredentials) -> SdkConfig {
        let credentials = StaticCredentials::new(
            base.access_key_id.clone(),
            base.secret_access_key.clone(),
            None,
            None,
            "awsmfa-account-config",
        );

        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(base.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await
    }
}

#[async_trait]
impl IdentityService for AwsSessionService {
    async fn list_mfa_devices(&self, base: &BaseCredentials) -> Result<Vec<MfaDevice>> {
        info!("Calling AWS IAM ListMFADevices");
        debug!("Region: {}", base.region);

        let config = Self::sdk_config(base).await;
        let client = IamClient::new(&config);

        let response = client
            .list_mfa_devices()
            .send()
            .await
            .map_err(|e| MfaError::service("ListMFADevices", DisplayErrorContext(&e)))?;

        let devices: Vec<MfaDevice> = response
            .mfa_devices()
            .iter()
            .map(|d| MfaDevice {
                serial_number: d.serial_number().to_string(),
            })
            .collect();

        debug!("Found {} MFA device(s)", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl TokenExchange for AwsSessionService {
    async fn exchange_token(
        &self,
        device: &MfaDevice,
        code: &str,
        duration_seconds: i32,
        base: &BaseCredentials,
    ) -> Result<Credentials> {
        info!("Calling AWS STS GetSessionToken");
        debug!("MFA device: {}", device.serial_number);
        debug!("Duration: {} seconds", duration_seconds);

        let config = Self::sdk_config(base).await;
        let client = StsClient::new(&config);

        let response = client
            .get_session_token()
            .serial_number(&device.serial_number)
            .token_code(code)
            .duration_seconds(duration_seconds)
            .send()
            .await
            .map_err(|e| MfaError::service("GetSessionToken", DisplayErrorContext(&e)))?;

        let sts_creds = response.credentials().ok_or_else(|| {
            MfaError::service("GetSessionToken", "AWS STS returned no credentials")
        })?;

        let expiration = to_chrono(sts_creds.expiration())?;

        let credentials = Credentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: sts_creds.session_token().to_string(),
            expiration,
        };

        if !credentials.is_well_formed() {
            return Err(MfaError::service(
                "GetSessionToken",
                "AWS STS returned incomplete credentials",
            ));
        }

        info!("Successfully obtained AWS session credentials");
        Ok(credentials)
    }
}

fn to_chrono(expiration: &aws_smithy_types::DateTime) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()).ok_or_else(|| {
        MfaError::service(
            "GetSessionToken",
            format!("expiration out of range: {}", expiration.secs()),
        )
    })
}
