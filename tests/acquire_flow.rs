use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use awsmfa::{
    CredentialAcquirer,
    aws::{BaseCredentials, Credentials, IdentityService, MfaDevice, TokenExchange},
    cache::CredentialCache,
    config::AccountConfig,
    error::Result,
    mfa::{CommandOutput, Commander, LineStream, Prompter},
};
use chrono::{TimeDelta, Utc};
use futures::{StreamExt, stream};

/// Hardware helper that reports no key inserted, for either helper name.
struct NoKeyInserted;

#[async_trait]
impl Commander for NoKeyInserted {
    async fn invoke(&self, program: &str, _args: &[&str]) -> io::Result<CommandOutput> {
        let marker = match program {
            "ykman" => "No YubiKey detected!",
            _ => "No YubiKey found!",
        };
        Ok(CommandOutput {
            combined: marker.as_bytes().to_vec(),
            success: false,
        })
    }
}

#[derive(Default)]
struct FakeAws {
    discovered_with: Mutex<Vec<String>>,
    exchanges: Mutex<Vec<(String, String, i32)>>,
}

#[async_trait]
impl IdentityService for FakeAws {
    async fn list_mfa_devices(&self, base: &BaseCredentials) -> Result<Vec<MfaDevice>> {
        self.discovered_with
            .lock()
            .unwrap()
            .push(base.access_key_id.clone());
        Ok(vec![MfaDevice {
            serial_number: "serial-123".to_string(),
        }])
    }
}

#[async_trait]
impl TokenExchange for FakeAws {
    async fn exchange_token(
        &self,
        device: &MfaDevice,
        code: &str,
        duration_seconds: i32,
        _base: &BaseCredentials,
    ) -> Result<Credentials> {
        self.exchanges.lock().unwrap().push((
            device.serial_number.clone(),
            code.to_string(),
            duration_seconds,
        ));
        Ok(Credentials {
            access_key_id: "ASIAACMESESSION".to_string(),
            secret_access_key: "session-secret".to_string(),
            session_token: "session-token".to_string(),
            expiration: Utc::now() + TimeDelta::hours(6),
        })
    }
}

fn acme() -> AccountConfig {
    AccountConfig {
        access_key_id: "AKIAACME".to_string(),
        secret_access_key: "long-lived-secret".to_string(),
        default_region: Some("eu-central-1".to_string()),
        account_name: Some("acme".to_string()),
        hardware_key_name: Some("Amazon Web Services:acme".to_string()),
        ..Default::default()
    }
}

fn typed(lines: &[&str]) -> LineStream {
    let owned: Vec<io::Result<String>> = lines.iter().map(|l| Ok(l.to_string())).collect();
    // keep the stream open after the last line, like a terminal
    stream::iter(owned).chain(stream::pending()).boxed()
}

#[tokio::test]
async fn test_typed_code_when_no_key_inserted() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CredentialCache::new(dir.path());
    let aws = Arc::new(FakeAws::default());

    let creds = CredentialAcquirer::new(cache.clone(), aws.clone())
        .with_commander(Arc::new(NoKeyInserted))
        .with_input(typed(&["abcdef"]))
        .with_prompter(Prompter::silent())
        .with_poll_interval(Duration::from_millis(5))
        .with_token_timeout(Duration::from_secs(5))
        .acquire(&acme())
        .await
        .unwrap();

    assert_eq!(creds.access_key_id, "ASIAACMESESSION");
    assert_eq!(*aws.discovered_with.lock().unwrap(), vec!["AKIAACME"]);
    assert_eq!(
        *aws.exchanges.lock().unwrap(),
        vec![("serial-123".to_string(), "abcdef".to_string(), 21600)]
    );

    assert!(cache.path_for("AKIAACME").exists());
    assert_eq!(cache.lookup("AKIAACME").await.unwrap(), Some(creds));
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CredentialCache::new(dir.path());
    let aws = Arc::new(FakeAws::default());

    let first = CredentialAcquirer::new(cache.clone(), aws.clone())
        .with_commander(Arc::new(NoKeyInserted))
        .with_input(typed(&["123456"]))
        .with_prompter(Prompter::silent())
        .with_poll_interval(Duration::from_millis(5))
        .acquire(&acme())
        .await
        .unwrap();

    let second = CredentialAcquirer::new(cache, aws.clone())
        .with_input(stream::pending().boxed())
        .with_prompter(Prompter::silent())
        .acquire(&acme())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(aws.exchanges.lock().unwrap().len(), 1);
    assert_eq!(aws.discovered_with.lock().unwrap().len(), 1);
}
