//! Size-bounded eviction of the image partition.
//!
//! Sizes and ages come from the stored `content-length` and `date` headers.
//! A missing or unparseable size counts as 0 bytes; a missing or unparseable
//! date sorts as the Unix epoch, so such entries go first. Ties break on the
//! key for a deterministic order.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Error;
use crate::cache::{EntryMeta, Partition, Role};
use crate::engine::CacheEngine;

/// Byte ceiling and eviction fraction of a bounded partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionBudget {
    pub max_bytes: u64,
    /// Share of entries deleted once over budget, in (0, 1].
    pub fraction: f64,
}

impl Default for EvictionBudget {
    fn default() -> Self {
        Self { max_bytes: 50 * 1024 * 1024, fraction: 0.2 }
    }
}

/// Outcome of one eviction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct EvictionReport {
    pub partition: String,
    pub entries: usize,
    pub total_bytes: u64,
    pub evicted: Vec<String>,
}

/// Keys to evict, oldest first; empty while the total fits the budget.
pub fn plan_eviction(entries: &[EntryMeta], budget: &EvictionBudget) -> Vec<String> {
    let total: u64 = entries.iter().fold(0u64, |acc, e| acc.saturating_add(e.declared_size));
    if total <= budget.max_bytes || entries.is_empty() {
        return Vec::new();
    }

    let n = entries.len();
    // Epsilon keeps 0.2 * 5 from rounding up to 2.
    let count = ((n as f64 * budget.fraction) - 1e-9).ceil().max(1.0) as usize;

    let mut ordered: Vec<&EntryMeta> = entries.iter().collect();
    ordered.sort_by(|a, b| a.declared_date.cmp(&b.declared_date).then_with(|| a.key.cmp(&b.key)));
    ordered.into_iter().take(count.min(n)).map(|e| e.key.clone()).collect()
}

impl CacheEngine {
    /// Enforce the byte budget on the current image partition.
    ///
    /// # Errors
    ///
    /// Returns a store error when the partition cannot be read. Keys already
    /// removed by a concurrent purge are skipped.
    pub async fn evict_images(&self) -> Result<EvictionReport, Error> {
        let name = self.partition_name(Role::Images);
        if !self.store().has_partition(&name).await? {
            return Ok(EvictionReport { partition: name, ..Default::default() });
        }
        let partition = self.store().open_partition(&name).await?;
        self.evict(&partition).await
    }

    async fn evict(&self, partition: &Partition) -> Result<EvictionReport, Error> {
        let entries = partition.entry_meta().await?;
        let total_bytes = entries.iter().fold(0u64, |acc, e| acc.saturating_add(e.declared_size));
        let planned = plan_eviction(&entries, &self.config().budget);

        let mut evicted = Vec::with_capacity(planned.len());
        for key in planned {
            if partition.delete(&key).await? {
                evicted.push(key);
            }
        }

        if !evicted.is_empty() {
            tracing::info!(
                partition = %partition.name(),
                total_bytes,
                budget = self.config().budget.max_bytes,
                evicted = evicted.len(),
                "evicted oldest entries"
            );
        }
        Ok(EvictionReport { partition: partition.name().to_string(), entries: entries.len(), total_bytes, evicted })
    }

    /// Opportunistic run after an image write-back, once the entry count
    /// crosses the configured threshold.
    pub(crate) async fn evict_after_image_write(&self, partition: &Partition) {
        let Some(threshold) = self.config().eviction_entry_threshold else {
            return;
        };
        let result = match partition.len().await {
            Ok(len) if len > threshold => self.evict(partition).await.map(|_| ()),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(partition = %partition.name(), "opportunistic eviction failed: {e}");
        }
    }
}

/// Run [`CacheEngine::evict_images`] every `period` until the handle is aborted.
pub fn spawn_eviction_task(engine: CacheEngine, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = engine.evict_images().await {
                tracing::warn!("scheduled eviction failed: {e}");
            }
        }
    })
}
