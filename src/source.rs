use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::domain::Bar;
use crate::error::{Result, TraderError};

/// Bars returned per chart page by the broker.
pub const PAGE_SIZE: usize = 30;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `Ok(None)` means no price for this tick; the instrument is skipped.
    async fn current_price(&self, code: &str, step: u64) -> Result<Option<u64>>;

    /// Up to one page of bars at or before `end`, in any order.
    async fn historical_page(&self, code: &str, end: NaiveTime) -> Result<Vec<Bar>>;
}

/// Time-ordered, time-unique bars for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayDataset {
    pub code: String,
    pub bars: Vec<Bar>,
}

impl ReplayDataset {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Serves prices out of pre-collected datasets, one bar per step.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    datasets: BTreeMap<String, Vec<Bar>>,
    steps: usize,
}

impl ReplaySource {
    /// Drops empty datasets and truncates the rest to the shortest length.
    pub fn new(datasets: Vec<ReplayDataset>) -> Result<Self> {
        let mut kept = BTreeMap::new();
        for ds in datasets {
            if ds.is_empty() {
                warn!(code = %ds.code, "replay.dataset_empty.excluded");
                continue;
            }
            kept.insert(ds.code, ds.bars);
        }

        let steps = kept.values().map(Vec::len).min().ok_or(TraderError::EmptyReplay)?;
        for bars in kept.values_mut() {
            bars.truncate(steps);
        }

        info!(instruments = kept.len(), steps, "replay.ready");
        Ok(Self { datasets: kept, steps })
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn contains(&self, code: &str) -> bool {
        self.datasets.contains_key(code)
    }
}

#[async_trait]
impl PriceSource for ReplaySource {
    async fn current_price(&self, code: &str, step: u64) -> Result<Option<u64>> {
        Ok(self
            .datasets
            .get(code)
            .and_then(|bars| bars.get(step as usize))
            .map(|bar| bar.price))
    }

    async fn historical_page(&self, code: &str, end: NaiveTime) -> Result<Vec<Bar>> {
        let Some(bars) = self.datasets.get(code) else {
            return Ok(vec![]);
        };
        let upto = bars.partition_point(|b| b.time <= end);
        let from = upto.saturating_sub(PAGE_SIZE);
        Ok(bars[from..upto].iter().rev().cloned().collect())
    }
}
