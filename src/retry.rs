use std::{fmt::Display, future::Future, time::Duration};

use tracing::warn;

pub const CONNECT_ATTEMPTS: u32 = 5;
pub const CONNECT_DELAY: Duration = Duration::from_millis(500);

/// Runs `op` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the first success or the error of the last attempt. The delay is
/// constant; there is no backoff growth and no jitter. Zero attempts is
/// treated as one.
pub async fn with_delay<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "attempt failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
