//! Cancellation signal shared by the app and every in-flight request.
//!
//! The app owns one [`CancelSource`]. Each request context receives a
//! [`CancelToken`] derived from it; handlers doing long I/O can race their
//! work against [`CancelToken::cancelled`]. A token may carry a deadline,
//! which the `timeout` middleware tightens per request.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// The sending half: cancelling it cancels every token it issued.
#[derive(Clone, Debug)]
pub struct CancelSource {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken { rx: Some(self.tx.subscribe()), deadline: None }
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving half carried by a request context.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is never cancelled and has no deadline.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A copy whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            rx: self.rx.clone(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the source is cancelled (or dropped) or the deadline passes.
    pub async fn cancelled(&self) {
        let signal = async {
            match self.rx.clone() {
                // a dropped source can never un-cancel, so it counts as cancelled
                Some(mut rx) => {
                    let _ = rx.wait_for(|cancelled| *cancelled).await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = signal => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => signal.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_reaches_tokens() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test]
    async fn timeout_only_tightens() {
        let token = CancelToken::never().with_timeout(Duration::from_secs(10));
        let tighter = token.with_timeout(Duration::from_millis(20));
        let looser = tighter.with_timeout(Duration::from_secs(60));
        assert_eq!(tighter.deadline(), looser.deadline());
        looser.cancelled().await;
        assert!(looser.is_cancelled());
    }
}
