use std::time::Duration;

use tokio::{sync::mpsc, task::JoinSet, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TokenSource;
use crate::{
    constants::DEFAULT_TOKEN_TIMEOUT,
    error::{MfaError, Result},
};

/// Runs token sources concurrently and returns the first code produced.
#[derive(Debug, Clone, Copy)]
pub struct TokenRace {
    timeout: Duration,
}

impl Default for TokenRace {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TIMEOUT)
    }
}

impl TokenRace {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start every source and return the first code any of them publishes.
    ///
    /// Losing sources are cancelled, not aborted: they stop at their next
    /// suspension point and any helper process already running is left to
    /// finish. Fails with `Timeout` when the deadline passes first and with
    /// `AllSourcesFailed` as soon as every source has ended without a code.
    pub async fn acquire(&self, sources: Vec<Box<dyn TokenSource>>) -> Result<String> {
        if sources.is_empty() {
            return Err(MfaError::config("no MFA token sources configured"));
        }

        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();
        let (tx, mut rx) = mpsc::channel(sources.len());

        let mut tasks = JoinSet::new();
        for source in sources {
            let name = source.name();
            debug!("Starting token source {}", name);
            let (cancel, tx) = (cancel.clone(), tx.clone());
            tasks.spawn(async move { (name, source.run(cancel, tx).await) });
        }
        drop(tx);

        let deadline = time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut last_err = None;

        loop {
            tokio::select! {
                biased;
                Some(code) = rx.recv() => {
                    info!("MFA token received");
                    cancel.cancel();
                    tasks.detach_all();
                    return Ok(code);
                }
                Some(joined) = tasks.join_next() => {
                    match joined {
                        Ok((name, Ok(()))) => debug!("Token source {} finished", name),
                        Ok((name, Err(e))) => {
                            warn!("Token source {} failed: {}", name, e);
                            last_err = Some(e);
                        }
                        Err(e) => {
                            warn!("Token source task failed: {}", e);
                            last_err = Some(MfaError::SourceTask(e.to_string()));
                        }
                    }

                    if tasks.is_empty() {
                        if let Ok(code) = rx.try_recv() {
                            info!("MFA token received");
                            return Ok(code);
                        }
                        return Err(MfaError::AllSourcesFailed(Box::new(
                            last_err.unwrap_or(MfaError::Cancelled),
                        )));
                    }
                }
                _ = &mut deadline => {
                    warn!("Timed out after {:?} waiting for an MFA token", self.timeout);
                    cancel.cancel();
                    tasks.detach_all();
                    return Err(MfaError::Timeout("MFA token"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfa::{
        HardwareKeyPoller, HardwareReader, InteractiveReader, Prompter,
        hardware::tests::{FnCommander, ok},
        publish,
    };
    use async_trait::async_trait;
    use futures::{StreamExt, stream};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Instant,
    };

    /// Publishes `code` after `delay`, or never when `code` is None.
    struct Scripted {
        delay: Duration,
        code: Option<&'static str>,
        saw_cancel: Arc<AtomicBool>,
    }

    impl Scripted {
        fn boxed(delay_ms: u64, code: Option<&'static str>) -> Box<dyn TokenSource> {
            Box::new(Self {
                delay: Duration::from_millis(delay_ms),
                code,
                saw_cancel: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    #[async_trait]
    impl TokenSource for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run(
            self: Box<Self>,
            cancel: CancellationToken,
            results: mpsc::Sender<String>,
        ) -> Result<()> {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    Ok(())
                }
                _ = time::sleep(self.delay) => match self.code {
                    Some(code) => {
                        publish(&results, "scripted", code.to_string());
                        Ok(())
                    }
                    None => {
                        cancel.cancelled().await;
                        Ok(())
                    }
                },
            }
        }
    }

    struct Failing;

    #[async_trait]
    impl TokenSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(
            self: Box<Self>,
            _cancel: CancellationToken,
            _results: mpsc::Sender<String>,
        ) -> Result<()> {
            Err(MfaError::NoTokenForLabel("acme".to_string()))
        }
    }

    #[tokio::test]
    async fn test_no_sources_is_configuration_error() {
        let started = Instant::now();
        let err = TokenRace::new(Duration::from_secs(60))
            .acquire(Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_returns_first_code() {
        let code = TokenRace::new(Duration::from_secs(5))
            .acquire(vec![
                Scripted::boxed(200, Some("222222")),
                Scripted::boxed(10, Some("111111")),
            ])
            .await
            .unwrap();
        assert_eq!(code, "111111");
    }

    #[tokio::test]
    async fn test_times_out_within_deadline() {
        let started = Instant::now();
        let err = TokenRace::new(Duration::from_millis(50))
            .acquire(vec![Scripted::boxed(0, None)])
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(matches!(err, MfaError::Timeout(_)));
        assert!(elapsed >= Duration::from_millis(45), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(200), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_losers_are_cancelled() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let slow: Box<dyn TokenSource> = Box::new(Scripted {
            delay: Duration::from_secs(30),
            code: Some("999999"),
            saw_cancel: saw_cancel.clone(),
        });

        let code = TokenRace::new(Duration::from_secs(5))
            .acquire(vec![slow, Scripted::boxed(5, Some("123456"))])
            .await
            .unwrap();
        assert_eq!(code, "123456");

        for _ in 0..50 {
            if saw_cancel.load(Ordering::SeqCst) {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_source_does_not_end_race() {
        let code = TokenRace::new(Duration::from_secs(5))
            .acquire(vec![
                Box::new(Failing) as Box<dyn TokenSource>,
                Scripted::boxed(30, Some("123456")),
            ])
            .await
            .unwrap();
        assert_eq!(code, "123456");
    }

    #[tokio::test]
    async fn test_all_sources_failed_returns_early() {
        let started = Instant::now();
        let err = TokenRace::new(Duration::from_secs(60))
            .acquire(vec![Box::new(Failing) as Box<dyn TokenSource>])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MfaError::AllSourcesFailed(inner) if matches!(*inner, MfaError::NoTokenForLabel(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_hardware_wins_over_waiting_operator() {
        let cmd = Arc::new(FnCommander::new(|_, _| ok("acme 314159")));
        let hardware: Box<dyn TokenSource> = Box::new(HardwareReader::new(
            HardwareKeyPoller::new(cmd),
            "acme",
            Duration::from_secs(5),
        ));
        let interactive: Box<dyn TokenSource> = Box::new(InteractiveReader::new(
            stream::pending().boxed(),
            Prompter::silent(),
        ));

        let started = Instant::now();
        let code = TokenRace::new(Duration::from_secs(5))
            .acquire(vec![interactive, hardware])
            .await
            .unwrap();

        assert_eq!(code, "314159");
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
