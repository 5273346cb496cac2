//! Revenue master cache
//!
//! Read-mostly snapshot of the revenue catalog keyed by revenue item
//! id. Loaded once at startup and explicitly refreshable; a refresh
//! swaps the whole snapshot atomically, so readers never observe a
//! partially-updated catalog and never take a per-read lock beyond the
//! snapshot clone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use rating_core::Result;
use tracing::info;

use crate::ports::RevenueMasterQueryPort;
use crate::types::RevenueMasterData;

pub struct RevenueMasterCache {
    snapshot: RwLock<Arc<HashMap<String, RevenueMasterData>>>,
}

impl RevenueMasterCache {
    pub fn empty() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn with_items(items: HashMap<String, RevenueMasterData>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(items)),
        }
    }

    /// Current snapshot handle; stays coherent for the caller even if a
    /// refresh lands concurrently.
    pub fn snapshot(&self) -> Arc<HashMap<String, RevenueMasterData>> {
        self.snapshot.read().clone()
    }

    /// Re-queries the catalog as of `base_date` and swaps the snapshot.
    pub async fn refresh(
        &self,
        port: &dyn RevenueMasterQueryPort,
        base_date: NaiveDate,
    ) -> Result<usize> {
        let items = port.find_by_base_date(base_date).await?;
        let count = items.len();
        *self.snapshot.write() = Arc::new(items);
        info!(revenue_items = count, %base_date, "Revenue master cache refreshed");
        Ok(count)
    }
}
