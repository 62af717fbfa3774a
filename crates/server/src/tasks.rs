use std::fmt::Display;
use std::future::Future;
use tokio::task::JoinHandle;

/// Run a side effect off the request path.
///
/// Errors and panics are logged under `name` and never reach the caller, which
/// has usually already reported success.
pub fn spawn_background<F, E>(name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(task = name, error = %e, "background task failed"),
            Err(e) if e.is_panic() => tracing::warn!(task = name, "background task panicked"),
            Err(_) => tracing::debug!(task = name, "background task cancelled"),
        }
    })
}
