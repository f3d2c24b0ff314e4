//! Hardware key (YubiKey OATH) codes via an external helper process.

use std::{collections::BTreeMap, io, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    process::Command,
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Prompter, TokenSource, publish};
use crate::{
    constants::{
        HARDWARE_POLL_INTERVAL, INSERT_KEY_MSG, YKMAN_ARGS, YKMAN_NOT_FOUND, YKMAN_PROGRAM,
        YUBIOATH_NOT_FOUND, YUBIOATH_PROGRAM,
    },
    error::{MfaError, Result},
};

/// Captured result of one helper invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout followed by stderr
    pub combined: Vec<u8>,
    pub success: bool,
}

/// Runs an external program to completion.
#[async_trait]
pub trait Commander: Send + Sync {
    /// Spawn `program` with `args`; an `Err` means it could not be started.
    async fn invoke(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Spawns real processes. Dropping an in-flight invocation leaves the child
/// running to completion; its output is discarded.
#[derive(Debug, Clone, Default)]
pub struct SystemCommander;

#[async_trait]
impl Commander for SystemCommander {
    async fn invoke(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(CommandOutput {
            combined,
            success: output.status.success(),
        })
    }
}

/// Current codes by credential label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap(BTreeMap<String, String>);

impl KeyMap {
    pub fn lookup(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for KeyMap {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Parse helper output: one `<label tokens...> <code>` record per line.
///
/// The last field is the code and the rest, joined by single spaces, the
/// label. Lines with fewer than two fields are skipped.
pub fn parse_output(text: &str) -> KeyMap {
    let mut keys = BTreeMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((code, label)) = fields.split_last() else {
            continue;
        };
        if label.is_empty() {
            continue;
        }
        keys.insert(label.join(" "), code.to_string());
    }
    KeyMap(keys)
}

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Keys(KeyMap),
    NotPresent,
}

#[derive(Debug, Clone, Copy)]
struct Helper {
    program: &'static str,
    args: &'static [&'static str],
    not_found_marker: &'static str,
}

const HELPERS: &[Helper] = &[
    Helper {
        program: YKMAN_PROGRAM,
        args: YKMAN_ARGS,
        not_found_marker: YKMAN_NOT_FOUND,
    },
    Helper {
        program: YUBIOATH_PROGRAM,
        args: &[],
        not_found_marker: YUBIOATH_NOT_FOUND,
    },
];

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Polls the helper binaries for the codes on an inserted hardware key.
#[derive(Clone)]
pub struct HardwareKeyPoller {
    commander: Arc<dyn Commander>,
    interval: Duration,
    prompter: Prompter,
}

impl HardwareKeyPoller {
    pub fn new(commander: Arc<dyn Commander>) -> Self {
        Self {
            commander,
            interval: HARDWARE_POLL_INTERVAL,
            prompter: Prompter::silent(),
        }
    }

    /// Delay between polls while no key is present; clamped to at least 1ms.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Where to print the "insert your key" notice.
    pub fn with_prompter(mut self, prompter: Prompter) -> Self {
        self.prompter = prompter;
        self
    }

    /// Invoke the helpers once, in order, until one gives a definite answer.
    ///
    /// A helper that cannot be started, or fails without its not-found
    /// marker, hands over to the next one; the last failure is returned.
    pub async fn poll(&self) -> Result<PollOutcome> {
        let mut last_err = None;

        for helper in HELPERS {
            let output = match self.commander.invoke(helper.program, helper.args).await {
                Ok(output) => output,
                Err(e) => {
                    debug!("{} unavailable: {}", helper.program, e);
                    last_err = Some(MfaError::HelperProcess {
                        output: String::new(),
                        cause: format!("{}: {e}", helper.program),
                    });
                    continue;
                }
            };

            let text = String::from_utf8_lossy(&output.combined);
            if text.contains(helper.not_found_marker) {
                debug!("{} reports no hardware key present", helper.program);
                return Ok(PollOutcome::NotPresent);
            }
            if output.success {
                let keys = parse_output(&text);
                debug!("{} returned {} code(s)", helper.program, keys.len());
                return Ok(PollOutcome::Keys(keys));
            }

            debug!("{} failed: {}", helper.program, text.trim());
            last_err = Some(MfaError::HelperProcess {
                output: text.trim().to_string(),
                cause: format!("{} exited unsuccessfully", helper.program),
            });
        }

        Err(last_err.unwrap_or_else(|| MfaError::HelperProcess {
            output: String::new(),
            cause: "no hardware key helper configured".to_string(),
        }))
    }

    /// Poll until a key is present, `deadline` passes, or `cancel` fires.
    pub async fn wait_for_keys(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<KeyMap> {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut announced = false;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MfaError::Cancelled),
                outcome = self.poll() => outcome?,
            };

            if let PollOutcome::Keys(keys) = outcome {
                if announced {
                    self.prompter.say("\nloaded mfa tokens\n");
                }
                return Ok(keys);
            }

            if !announced {
                info!("Waiting for hardware key");
                self.prompter.say(INSERT_KEY_MSG);
                announced = true;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MfaError::Cancelled),
                _ = time::sleep_until(deadline) => {
                    self.prompter.say("\n");
                    return Err(MfaError::Timeout("hardware key"));
                }
                _ = ticker.tick() => {}
            }
        }
    }
}

/// Publishes the code for one configured label from the hardware key.
pub struct HardwareReader {
    poller: HardwareKeyPoller,
    label: String,
    timeout: Duration,
}

impl HardwareReader {
    pub fn new(poller: HardwareKeyPoller, label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            poller,
            label: label.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TokenSource for HardwareReader {
    fn name(&self) -> &'static str {
        "hardware"
    }

    async fn run(
        self: Box<Self>,
        cancel: CancellationToken,
        results: mpsc::Sender<String>,
    ) -> Result<()> {
        let deadline = Instant::now() + self.timeout;

        let keys = match self.poller.wait_for_keys(&cancel, deadline).await {
            Ok(keys) => keys,
            Err(MfaError::Cancelled) => return Ok(()),
            Err(e) => {
                warn!("Error loading key from hardware token: {}", e);
                return Err(e);
            }
        };

        match keys.lookup(&self.label) {
            Some(code) => {
                publish(&results, self.name(), code.to_string());
                Ok(())
            }
            None => {
                debug!(
                    "Labels on hardware key: {}",
                    keys.labels().collect::<Vec<_>>().join(", ")
                );
                Err(MfaError::NoTokenForLabel(self.label))
            }
        }
    }
}
