use std::time::Duration;

/// Error taxonomy for the analytics engine.
///
/// The analysis entry point surfaces only `Input`, `Storage` (permanent) and
/// `Timeout`; everything else degrades — scores fall back to fabricated
/// values, forecast fields are omitted, chart days carry price 0.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Unresolved origin/destination, malformed date, unsupported cabin or
    /// trip type. Surfaced to the caller as-is.
    #[error("Invalid input: {0}")]
    Input(String),

    /// Permanent database error. Transient errors are retried inside
    /// [`with_storage_retries`] before they become this variant.
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Upstream API failure (holiday or weather). Per-item during ingestion;
    /// never surfaced on the read path.
    #[error("External service error: {0}")]
    Upstream(String),

    /// The forecaster has no usable training data. Forecast fields are
    /// omitted, not an error, so this never crosses the orchestrator.
    #[error("Forecast model unavailable: {0}")]
    ModelUnavailable(String),

    /// Per-request deadline exceeded.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Maximum retry attempts for transient storage errors.
const STORAGE_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between storage retries (milliseconds).
const STORAGE_RETRY_BASE_MS: u64 = 100;

/// Whether a sqlx error is worth retrying (connection-level trouble) rather
/// than a permanent failure (constraint violation, bad SQL, decode error).
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Run a storage operation, retrying transient failures up to
/// [`STORAGE_MAX_RETRIES`] times with exponential backoff (100/200/400 ms).
/// Permanent failures surface immediately.
pub async fn with_storage_retries<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if is_transient(&e) && attempt < STORAGE_MAX_RETRIES => {
                attempt += 1;
                let delay = STORAGE_RETRY_BASE_MS * (1 << (attempt - 1));
                tracing::warn!(
                    "Transient storage error in {} (attempt {}/{}), retrying in {}ms: {}",
                    op_name,
                    attempt,
                    STORAGE_MAX_RETRIES,
                    delay,
                    e,
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(AppError::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, AppError> = with_storage_retries("test_op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "Two retries then success");
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, AppError> = with_storage_retries("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Permanent errors fail fast");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, AppError> = with_storage_retries("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::PoolTimedOut) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1 + STORAGE_MAX_RETRIES,
            "Initial attempt plus {} retries",
            STORAGE_MAX_RETRIES
        );
    }

    #[test]
    fn test_error_messages_carry_kind() {
        let e = AppError::Input("unknown origin 'Atlantis'".to_string());
        assert!(e.to_string().contains("Invalid input"));
        let e = AppError::Timeout(Duration::from_secs(30));
        assert!(e.to_string().contains("timed out"));
    }
}
