use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded "try, wait, check" executor.
///
/// Distinct from the per-order retry loop in `dispatch`, which has its own
/// terminal-status rules. Failures are logged and folded into the returned
/// `bool`; nothing propagates.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A completed `action` counts as success.
    pub async fn execute<A, AF, E>(&self, label: &str, action: A) -> bool
    where
        A: FnMut() -> AF,
        AF: Future<Output = Result<(), E>>,
        E: Display,
    {
        self.run(label, action, None::<fn() -> std::future::Ready<bool>>)
            .await
    }

    /// After each completed `action`, wait `delay` and ask `success_check`.
    pub async fn execute_with_check<A, AF, E, C, CF>(
        &self,
        label: &str,
        action: A,
        success_check: C,
    ) -> bool
    where
        A: FnMut() -> AF,
        AF: Future<Output = Result<(), E>>,
        E: Display,
        C: FnMut() -> CF,
        CF: Future<Output = bool>,
    {
        self.run(label, action, Some(success_check)).await
    }

    async fn run<A, AF, E, C, CF>(
        &self,
        label: &str,
        mut action: A,
        mut success_check: Option<C>,
    ) -> bool
    where
        A: FnMut() -> AF,
        AF: Future<Output = Result<(), E>>,
        E: Display,
        C: FnMut() -> CF,
        CF: Future<Output = bool>,
    {
        for attempt in 1..=self.max_attempts {
            tracing::info!("{label} attempt {attempt}/{}", self.max_attempts);

            match action().await {
                Ok(()) => match success_check.as_mut() {
                    None => return true,
                    Some(check) => {
                        tokio::time::sleep(self.delay).await;
                        if check().await {
                            tracing::info!("{label} succeeded");
                            return true;
                        }
                        tracing::warn!("{label} check failed, retrying");
                    }
                },
                Err(e) => {
                    tracing::warn!("{label} failed: {e}");
                    if attempt < self.max_attempts {
                        tracing::debug!("Retrying {label} in {:?}", self.delay);
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        tracing::warn!("{label} gave up after {} attempts", self.max_attempts);
        false
    }
}
