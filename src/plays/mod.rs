pub mod file;
pub mod provider;
pub mod sportradar;

pub use file::PlaysFile;
pub use provider::PlaySource;
pub use sportradar::SportradarFeed;

use std::time::Duration;
use tracing::{info, warn};

use crate::db::models::PlayRecord;
use crate::error::CoordinatorError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Fetch the play list before the clock starts, retrying the whole fetch with
/// exponential backoff. Running out of attempts is fatal to startup.
pub async fn load_plays(
    source: &dyn PlaySource,
    attempts: u32,
    initial_backoff: Duration,
) -> Result<Vec<PlayRecord>, CoordinatorError> {
    let attempts = attempts.max(1);
    let mut backoff = initial_backoff;
    let mut attempt = 1;

    loop {
        match source.fetch_plays().await {
            Ok(plays) => {
                info!("Loaded {} plays from {}", plays.len(), source.name());
                if plays.is_empty() {
                    warn!("{} returned no plays yet; the clock will idle", source.name());
                }
                return Ok(plays);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "[{}] fetch attempt {}/{} failed: {}. Retrying in {:?}",
                    source.name(),
                    attempt,
                    attempts,
                    e,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
            Err(e) => {
                return Err(CoordinatorError::SourceUnavailable {
                    attempts,
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PlaySource for Flaky {
        fn name(&self) -> &str {
            "Flaky"
        }

        async fn fetch_plays(&self) -> Result<Vec<PlayRecord>, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Malformed(format!("attempt {}", n)))
            } else {
                Ok(vec![PlayRecord::default(); 4])
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_the_source_recovers() {
        let source = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let plays = load_plays(&source, 5, Duration::from_secs(1)).await.unwrap();
        assert_eq!(plays.len(), 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_last_attempt() {
        let source = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = load_plays(&source, 3, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CoordinatorError::SourceUnavailable { attempts: 3, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_game_is_not_an_error() {
        struct Empty;

        #[async_trait]
        impl PlaySource for Empty {
            fn name(&self) -> &str {
                "Empty"
            }

            async fn fetch_plays(&self) -> Result<Vec<PlayRecord>, FetchError> {
                Ok(vec![])
            }
        }

        assert!(load_plays(&Empty, 1, Duration::ZERO).await.unwrap().is_empty());
    }
}
