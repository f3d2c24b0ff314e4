//! Cache-first acquisition of MFA-backed session credentials.
//!
//! ```text
//! CacheCheck -> DeviceDiscovery -> TokenRace -> Exchange -> CacheStore -> Done
//!     |                                                                   ^
//!     +---------------------------- hit ----------------------------------+
//! ```
//!
//! Any state except `CacheCheck` and `CacheStore` may fail the acquisition;
//! cache errors only ever degrade to re-authentication.

use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    aws::{Credentials, IdentityService, MfaDevice, TokenExchange},
    cache::CredentialCache,
    config::AccountConfig,
    constants::HARDWARE_POLL_INTERVAL,
    error::{MfaError, Result},
    mfa::{
        CodeValidation, Commander, HardwareKeyPoller, HardwareReader, InteractiveReader,
        LineStream, Prompter, SystemCommander, TokenRace, TokenSource, stdin_lines,
    },
};

enum State {
    CacheCheck,
    DeviceDiscovery,
    TokenRace { device: MfaDevice },
    Exchange { device: MfaDevice, code: String },
    CacheStore { creds: Credentials },
    Done(Credentials),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            State::CacheCheck => "cache-check",
            State::DeviceDiscovery => "device-discovery",
            State::TokenRace { .. } => "token-race",
            State::Exchange { .. } => "exchange",
            State::CacheStore { .. } => "cache-store",
            State::Done(_) => "done",
        })
    }
}

/// Obtains session credentials for one account, reusing cached ones while
/// they are fresh.
pub struct CredentialAcquirer<S> {
    cache: CredentialCache,
    service: S,
    commander: Arc<dyn Commander>,
    input: Option<LineStream>,
    prompter: Prompter,
    race: TokenRace,
    validation: CodeValidation,
    poll_interval: Duration,
}

impl<S> CredentialAcquirer<S>
where
    S: IdentityService + TokenExchange,
{
    pub fn new(cache: CredentialCache, service: S) -> Self {
        Self {
            cache,
            service,
            commander: Arc::new(SystemCommander),
            input: None,
            prompter: Prompter::stderr(),
            race: TokenRace::default(),
            validation: CodeValidation::default(),
            poll_interval: HARDWARE_POLL_INTERVAL,
        }
    }

    /// Runs hardware key helpers through `commander`.
    pub fn with_commander(mut self, commander: Arc<dyn Commander>) -> Self {
        self.commander = commander;
        self
    }

    /// Reads typed codes from `input` instead of standard input.
    pub fn with_input(mut self, input: LineStream) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_prompter(mut self, prompter: Prompter) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.race = TokenRace::new(timeout);
        self
    }

    pub fn with_code_validation(mut self, validation: CodeValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Return fresh credentials for `account`, authenticating with MFA when
    /// the cache has none.
    pub async fn acquire(mut self, account: &AccountConfig) -> Result<Credentials> {
        account.validate()?;

        let identity_key = account.access_key_id.as_str();
        let base = account.base_credentials();
        let mut duration_seconds = 0;
        let mut state = State::CacheCheck;

        loop {
            debug!("Credential acquisition state: {}", state);

            state = match state {
                State::CacheCheck => match self.cache.lookup(identity_key).await {
                    Ok(Some(creds)) => {
                        info!("Using cached credentials");
                        State::Done(creds)
                    }
                    Ok(None) => State::DeviceDiscovery,
                    Err(e) => {
                        warn!("Ignoring credential cache: {}", e);
                        State::DeviceDiscovery
                    }
                },

                State::DeviceDiscovery => {
                    duration_seconds = session_duration_seconds(account)?;
                    let devices = self.service.list_mfa_devices(&base).await?;
                    let device = single_device(devices)?;
                    debug!("Using MFA device {}", device.serial_number);
                    State::TokenRace { device }
                }

                State::TokenRace { device } => {
                    let sources = self.token_sources(account);
                    let code = self.race.acquire(sources).await?;
                    State::Exchange { device, code }
                }

                State::Exchange { device, code } => {
                    let creds = self
                        .service
                        .exchange_token(&device, &code, duration_seconds, &base)
                        .await?;
                    if !creds.is_fresh_at(Utc::now()) {
                        return Err(MfaError::service(
                            "GetSessionToken",
                            "returned credentials are incomplete or already expired",
                        ));
                    }
                    State::CacheStore { creds }
                }

                State::CacheStore { creds } => {
                    if let Err(e) = self.cache.store(identity_key, &creds).await {
                        warn!("Error storing credentials: {}", e);
                    }
                    State::Done(creds)
                }

                State::Done(creds) => return Ok(creds),
            };
        }
    }

    /// Interactive entry always; the hardware key only when a label is set.
    fn token_sources(&mut self, account: &AccountConfig) -> Vec<Box<dyn TokenSource>> {
        let mut sources: Vec<Box<dyn TokenSource>> = Vec::with_capacity(2);

        let input = self.input.take().unwrap_or_else(stdin_lines);
        sources.push(Box::new(
            InteractiveReader::new(input, self.prompter.clone())
                .with_account_name(account.account_name.clone())
                .with_validation(self.validation),
        ));

        if let Some(label) = account.hardware_key() {
            let poller = HardwareKeyPoller::new(self.commander.clone())
                .with_interval(self.poll_interval)
                .with_prompter(self.prompter.clone());
            sources.push(Box::new(HardwareReader::new(
                poller,
                label,
                self.race.timeout(),
            )));
        }

        sources
    }
}

fn session_duration_seconds(account: &AccountConfig) -> Result<i32> {
    let duration = account.session_duration()?;
    i32::try_from(duration.as_secs())
        .map_err(|_| MfaError::config(format!("session duration {duration:?} is too long")))
}

fn single_device(mut devices: Vec<MfaDevice>) -> Result<MfaDevice> {
    match devices.len() {
        1 => Ok(devices.remove(0)),
        n => Err(MfaError::config(format!("expected 1 mfa device, was {n}"))),
    }
}
