//! Timer-driven cancellation.
//!
//! The pipeline has no timeouts of its own. A caller wanting one hands the
//! request a token that a timer fires.

use courier_core::{ApiError, ApiResult, CancelToken};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

/// Returns a token that fires after `duration`.
///
/// The timer holds only a weak reference, so dropping every handle to the
/// token lets the timer task finish without firing anything.
pub fn cancel_after(duration: Duration) -> ApiResult<CancelToken> {
    let token = CancelToken::new();
    arm(&token, duration)?;
    Ok(token)
}

/// Returns a child of `parent` that also fires after `duration`.
///
/// Firing `parent` fires the child; the timer never fires `parent`.
pub fn cancel_after_with(parent: &CancelToken, duration: Duration) -> ApiResult<CancelToken> {
    let (token, _) = parent.child();
    arm(&token, duration)?;
    Ok(token)
}

fn arm(token: &CancelToken, duration: Duration) -> ApiResult<()> {
    let handle = Handle::try_current()
        .map_err(|e| ApiError::Internal(format!("Timeout requires a Tokio runtime: {e}")))?;

    let target = token.downgrade();
    handle.spawn(async move {
        tokio::time::sleep(duration).await;
        if let Some(token) = target.upgrade() {
            trace!(timeout_ms = duration.as_millis() as u64, "Timeout elapsed, cancelling");
            token.fire();
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_duration() {
        let token = cancel_after(Duration::from_millis(50)).unwrap();
        assert!(!token.is_fired());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(token.is_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_resolves_on_timer() {
        let token = cancel_after(Duration::from_secs(3)).unwrap();
        let started = tokio::time::Instant::now();

        token.cancelled().await;
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_follows_parent_but_not_back() {
        let parent = CancelToken::new();
        let token = cancel_after_with(&parent, Duration::from_secs(10)).unwrap();

        parent.fire();
        assert!(token.is_fired());

        let parent = CancelToken::new();
        let token = cancel_after_with(&parent, Duration::from_millis(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(token.is_fired());
        assert!(!parent.is_fired());
    }

    #[test]
    fn test_requires_runtime() {
        let err = cancel_after(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
