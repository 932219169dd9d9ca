use std::future::Future;
use std::time::Duration;

/// Runs `operation` up to `attempts` times, sleeping `delay` between failures.
///
/// The bound is attempt count × fixed delay, not a wall-clock deadline. The
/// sleep is injected so callers and tests control it. `attempts` of zero is
/// treated as one.
///
/// # Errors
/// Returns the error of the final attempt if none succeeded.
pub async fn poll_with_fixed_delay<T, E, F, Fut, S, SFut>(
    attempts: u32,
    delay: Duration,
    mut operation: F,
    mut sleep_fn: S,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                sleep_fn(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Parses a humantime duration such as `2s` or `720h`.
///
/// # Errors
/// Returns an error naming `label` when the value does not parse.
pub fn parse_duration(value: &str, label: &str) -> anyhow::Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|err| anyhow::anyhow!("{label} is not a valid duration ({value:?}): {err}"))
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    const DELAY: Duration = Duration::from_secs(2);

    fn recording_sleep(
        log: &Arc<Mutex<Vec<Duration>>>,
    ) -> impl FnMut(Duration) -> std::future::Ready<()> {
        let log = Arc::clone(log);
        move |duration| {
            log.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_poll_succeeds_after_failures() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let result: Result<u32, String> = poll_with_fixed_delay(
            5,
            DELAY,
            |attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt}"))
                } else {
                    Ok(attempt)
                }
            },
            recording_sleep(&sleeps),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(*sleeps.lock().unwrap(), vec![DELAY, DELAY]);
    }

    #[tokio::test]
    async fn test_poll_returns_last_error_when_exhausted() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let result: Result<(), String> = poll_with_fixed_delay(
            3,
            DELAY,
            |attempt| async move { Err(format!("attempt {attempt}")) },
            recording_sleep(&sleeps),
        )
        .await;

        assert_eq!(result, Err("attempt 3".to_string()));
        assert_eq!(sleeps.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_zero_attempts_runs_once() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let result: Result<(), &str> =
            poll_with_fixed_delay(0, DELAY, |_| async { Err("down") }, recording_sleep(&sleeps))
                .await;

        assert_eq!(result, Err("down"));
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_duration_accepts_humantime() {
        assert_eq!(
            parse_duration("720h", "tls.ttl").unwrap(),
            Duration::from_secs(720 * 3600)
        );
        let err = parse_duration("soon", "probe.delay").unwrap_err();
        assert!(err.to_string().contains("probe.delay"));
    }
}
