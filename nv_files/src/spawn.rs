use std::future::Future;
use std::time::Duration;

/// Runs `future` after `delay` on the ambient tokio runtime.
///
/// Returns `false` without scheduling anything when called outside a
/// runtime.
pub(crate) fn spawn_delayed<F>(delay: Duration, future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return false;
    };
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        future.await;
    });
    true
}
