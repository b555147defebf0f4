//! Process-lifetime cache of instrument metadata.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::{Result, Venue};
use crate::domain::InstrumentMetadata;

/// MetadataCache fetches each instrument's metadata once.
pub struct MetadataCache {
    venue: Arc<dyn Venue>,
    entries: RwLock<HashMap<String, InstrumentMetadata>>,
}

impl MetadataCache {
    pub fn new(venue: Arc<dyn Venue>) -> Self {
        Self {
            venue,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, instrument: &str) -> Result<InstrumentMetadata> {
        if let Some(metadata) = self.entries.read().await.get(instrument) {
            return Ok(metadata.clone());
        }

        let metadata = self.venue.get_instrument_metadata(instrument).await?;
        info!(
            instrument = %instrument,
            pip_value = metadata.pip_value,
            pip_size = metadata.pip_size,
            margin_rate = metadata.margin_rate,
            minimum_trade_size = metadata.minimum_trade_size,
            precision = metadata.precision,
            "Instrument metadata cached"
        );
        self.entries
            .write()
            .await
            .insert(instrument.to_string(), metadata.clone());
        Ok(metadata)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
