//! One-time MFA code acquisition.
//!
//! Each [`TokenSource`] runs as its own task and publishes at most one code
//! to a shared channel; [`TokenRace`] takes the first one and cancels the rest.

use std::{
    fmt,
    io::Write,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{constants::MFA_CODE_LEN, error::Result};

pub mod hardware;
pub mod interactive;
pub mod race;

pub use hardware::{
    Commander, CommandOutput, HardwareKeyPoller, HardwareReader, KeyMap, PollOutcome,
    SystemCommander, parse_output,
};
pub use interactive::{InteractiveReader, LineStream, stdin_lines};
pub use race::TokenRace;

/// A strategy for obtaining one MFA code.
#[async_trait]
pub trait TokenSource: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run until a code is published, the source is exhausted, or `cancel`
    /// fires. Publishes at most one value and never blocks on `results`.
    async fn run(
        self: Box<Self>,
        cancel: CancellationToken,
        results: mpsc::Sender<String>,
    ) -> Result<()>;
}

/// Which lines count as candidate codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodeValidation {
    /// Any six-character line after trimming.
    #[default]
    Length,
    /// Exactly six ASCII digits.
    Digits,
}

impl CodeValidation {
    pub fn accepts(self, code: &str) -> bool {
        match self {
            CodeValidation::Length => code.chars().count() == MFA_CODE_LEN,
            CodeValidation::Digits => {
                code.len() == MFA_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
            }
        }
    }
}

/// Shared sink for operator-facing messages (prompts and notices).
#[derive(Clone)]
pub struct Prompter(Arc<Mutex<dyn Write + Send>>);

impl Prompter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    pub fn silent() -> Self {
        Self::new(std::io::sink())
    }

    /// Write `msg` without a trailing newline and flush.
    pub fn say(&self, msg: &str) {
        let Ok(mut out) = self.0.lock() else {
            return;
        };
        let written = out.write_all(msg.as_bytes());
        if let Err(e) = written.and_then(|()| out.flush()) {
            debug!("Failed to write prompt: {}", e);
        }
    }
}

impl fmt::Debug for Prompter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Prompter")
    }
}

/// Publish `code` without waiting for channel capacity.
///
/// Returns false when the race is already decided (channel full or closed).
pub(crate) fn publish(results: &mpsc::Sender<String>, source: &str, code: String) -> bool {
    match results.try_send(code) {
        Ok(()) => {
            debug!("Token source {} published a code", source);
            true
        }
        Err(_) => {
            debug!("Token source {} produced a code after the race ended", source);
            false
        }
    }
}
