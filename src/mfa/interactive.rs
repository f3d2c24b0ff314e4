//! MFA codes typed by the operator.

use std::{
    io::{self, BufRead},
    thread,
};

use async_trait::async_trait;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CodeValidation, Prompter, TokenSource, publish};
use crate::error::{MfaError, Result};

/// Lines of operator input, without line terminators
pub type LineStream = BoxStream<'static, io::Result<String>>;

/// Lines from standard input.
///
/// Reading happens on a dedicated thread started on first poll, so nothing is
/// consumed from stdin unless a code is actually requested, and a reader left
/// blocked after the race ends never holds up runtime shutdown.
pub fn stdin_lines() -> LineStream {
    stream::once(async {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let spawned = thread::Builder::new()
            .name("awsmfa-stdin".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    if tx.unbounded_send(line).is_err() {
                        break;
                    }
                }
            });

        match spawned {
            Ok(_) => rx.boxed(),
            Err(e) => stream::iter([Err(e)]).boxed(),
        }
    })
    .flatten()
    .boxed()
}

/// Prompt text shown before every read attempt.
pub fn prompt_message(account_name: Option<&str>) -> String {
    let mut msg = String::from("AWS MFA token");
    if let Some(name) = account_name.filter(|n| !n.is_empty()) {
        msg.push_str(&format!(" for account {name}"));
    }
    msg.push_str(" please: ");
    msg
}

/// Prompts for and reads a code from a line-oriented input stream.
pub struct InteractiveReader {
    account_name: Option<String>,
    lines: LineStream,
    prompter: Prompter,
    validation: CodeValidation,
}

impl InteractiveReader {
    pub fn new(lines: LineStream, prompter: Prompter) -> Self {
        Self {
            account_name: None,
            lines,
            prompter,
            validation: CodeValidation::default(),
        }
    }

    pub fn with_account_name(mut self, account_name: Option<String>) -> Self {
        self.account_name = account_name;
        self
    }

    pub fn with_validation(mut self, validation: CodeValidation) -> Self {
        self.validation = validation;
        self
    }
}

#[async_trait]
impl TokenSource for InteractiveReader {
    fn name(&self) -> &'static str {
        "interactive"
    }

    async fn run(
        self: Box<Self>,
        cancel: CancellationToken,
        results: mpsc::Sender<String>,
    ) -> Result<()> {
        let name = self.name();
        let InteractiveReader {
            account_name,
            mut lines,
            prompter,
            validation,
        } = *self;
        let msg = prompt_message(account_name.as_deref());

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            prompter.say(&msg);

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = lines.next() => next,
            };

            match next {
                None => return Err(MfaError::InputClosed),
                Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    debug!("Ignoring undecodable input line: {}", e);
                }
                Some(Err(e)) => return Err(MfaError::Input(e)),
                Some(Ok(line)) => {
                    let code = line.trim();
                    if validation.accepts(code) {
                        publish(&results, name, code.to_string());
                        return Ok(());
                    }
                    debug!("Ignoring input of length {}", code.chars().count());
                }
            }
        }
    }
}
