pub mod credentials;
pub mod error;
pub mod messages;
pub mod routes;
pub mod state;
pub mod users;

use tracing::error;

use crate::error::AppError;

/// Run blocking work (SQLite, password hashing) off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        AppError::Internal("background task failed".into())
    })?
}
