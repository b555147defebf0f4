//! Recorded price path replayed into the paper venue.
//!
//! The file is a JSON array of ticks, each mapping instrument names to a
//! quote. One tick is applied per interval; after the last one the quotes
//! stay where they are.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::PaperVenue;

/// Price path loading errors.
#[derive(Debug, Error)]
pub enum PricePathError {
    #[error("failed to read price path {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse price path: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Quotes applied together, keyed by instrument.
pub type PriceTick = HashMap<String, f64>;

/// PricePath moves paper quotes along a recorded path.
pub struct PricePath {
    venue: Arc<PaperVenue>,
    ticks: Vec<PriceTick>,
    interval: Duration,
}

impl PricePath {
    pub fn new(venue: Arc<PaperVenue>, ticks: Vec<PriceTick>, interval: Duration) -> Self {
        Self {
            venue,
            ticks,
            interval,
        }
    }

    /// Reads a price path file.
    pub fn load(
        path: &str,
        venue: Arc<PaperVenue>,
        interval: Duration,
    ) -> Result<Self, PricePathError> {
        let raw = fs::read_to_string(path).map_err(|source| PricePathError::Read {
            path: path.to_string(),
            source,
        })?;
        let ticks: Vec<PriceTick> = serde_json::from_str(&raw)?;

        info!(path = %path, ticks = ticks.len(), "Price path loaded");
        Ok(Self::new(venue, ticks, interval))
    }

    /// Applies one tick and returns how many quotes moved. Unknown
    /// instruments and non-positive prices are skipped.
    pub fn apply(&self, tick: &PriceTick) -> usize {
        let mut moved = 0;
        for (instrument, &price) in tick {
            if !(price.is_finite() && price > 0.0) {
                warn!(instrument = %instrument, price = price, "Invalid price in path, skipped");
                continue;
            }
            match self.venue.set_price(instrument, price) {
                Ok(()) => moved += 1,
                Err(e) => warn!(instrument = %instrument, error = %e, "Price tick skipped"),
            }
        }
        moved
    }

    /// Steps through the path until it runs out or shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        let mut ticks = self.ticks.iter().enumerate();
        info!(
            ticks = self.ticks.len(),
            interval = ?self.interval,
            "Price path replay started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some((index, tick)) = ticks.next() else {
                        info!("Price path exhausted, quotes held");
                        break;
                    };
                    let moved = self.apply(tick);
                    debug!(tick = index, moved = moved, "Price tick applied");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaperConfig;
    use crate::venue::Venue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn venue() -> Arc<PaperVenue> {
        let config: PaperConfig = serde_yaml::from_str(
            r#"
instruments:
  EUR_USD:
    price: 1.1
    pip_value: 0.0001
    pip_size: 0.0001
    margin_rate: 0.0333
"#,
        )
        .unwrap();
        Arc::new(PaperVenue::from_config(&config))
    }

    fn tick(quotes: &[(&str, f64)]) -> PriceTick {
        quotes.iter().map(|(i, p)| (i.to_string(), *p)).collect()
    }

    fn write_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_apply_skips_unknown_and_invalid_quotes() {
        let venue = venue();
        let path = PricePath::new(venue.clone(), Vec::new(), Duration::from_millis(10));

        let moved = path.apply(&tick(&[("EUR_USD", 1.105), ("GBP_USD", 1.27)]));
        assert_eq!(moved, 1);
        assert_eq!(venue.current_price("EUR_USD").await.unwrap(), 1.105);

        assert_eq!(path.apply(&tick(&[("EUR_USD", -1.0)])), 0);
        assert_eq!(path.apply(&tick(&[("EUR_USD", f64::NAN)])), 0);
        assert_eq!(venue.current_price("EUR_USD").await.unwrap(), 1.105);
    }

    #[tokio::test]
    async fn test_run_walks_path_then_holds_last_quote() {
        let venue = venue();
        let file = write_json(r#"[{"EUR_USD": 1.101}, {"EUR_USD": 1.102}, {"EUR_USD": 1.103}]"#);
        let path =
            PricePath::load(file.path().to_str().unwrap(), venue.clone(), Duration::from_millis(5))
                .unwrap();

        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(1), path.run(rx))
            .await
            .unwrap();

        assert_eq!(venue.current_price("EUR_USD").await.unwrap(), 1.103);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let path = PricePath::new(
            venue(),
            vec![tick(&[("EUR_USD", 1.2)]); 100],
            Duration::from_secs(60),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { path.run(rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_load_errors() {
        let missing = PricePath::load("/nonexistent/prices.json", venue(), Duration::from_secs(1));
        assert!(matches!(missing, Err(PricePathError::Read { .. })));

        let file = write_json("{not json");
        let path = file.path().to_str().unwrap();
        let invalid = PricePath::load(path, venue(), Duration::from_secs(1));
        assert!(matches!(invalid, Err(PricePathError::Parse(_))));
    }
}
