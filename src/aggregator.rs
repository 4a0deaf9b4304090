//! Replay dataset collection.
//!
//! The broker only serves minute bars in fixed-size pages that end at a given
//! time, so a trading day is assembled by walking backwards from the close
//! until the open (or a page budget) is reached. Adjacent pages may share a
//! boundary bar; the merge keeps one bar per timestamp.

use chrono::NaiveTime;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::Bar;
use crate::error::Result;
use crate::source::{PriceSource, ReplayDataset};
use crate::time::{format_hhmmss, second_before};

#[derive(Debug, Clone)]
pub struct BarAggregator {
    pub market_open: NaiveTime,
    pub max_pages: usize,
    pub page_delay: Duration,
}

impl BarAggregator {
    pub fn new(market_open: NaiveTime, max_pages: usize, page_delay: Duration) -> Self {
        Self { market_open, max_pages, page_delay }
    }

    pub async fn collect(
        &self,
        source: &dyn PriceSource,
        code: &str,
        anchor: NaiveTime,
    ) -> Result<ReplayDataset> {
        let mut pages: Vec<Vec<Bar>> = Vec::new();
        let mut next_anchor = Some(anchor);

        while let Some(anchor) = next_anchor.take() {
            if anchor < self.market_open || pages.len() >= self.max_pages {
                break;
            }
            if !pages.is_empty() && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page = source.historical_page(code, anchor).await?;
            let Some(earliest) = page.iter().map(|b| b.time).min() else {
                debug!(code, anchor = %format_hhmmss(anchor), "aggregator.page_empty");
                break;
            };
            debug!(
                code,
                anchor = %format_hhmmss(anchor),
                earliest = %format_hhmmss(earliest),
                bars = page.len(),
                "aggregator.page"
            );

            pages.push(page);
            next_anchor = second_before(earliest);
        }

        let page_count = pages.len();
        let bars = merge_pages(pages);
        info!(code, pages = page_count, bars = bars.len(), "aggregator.collected");

        Ok(ReplayDataset { code: code.to_string(), bars })
    }
}

/// Concatenates pages, sorts by time and keeps the first bar seen per time.
pub fn merge_pages(pages: Vec<Vec<Bar>>) -> Vec<Bar> {
    let mut bars: Vec<Bar> = pages.into_iter().flatten().collect();
    bars.sort_by_key(|b| b.time);
    bars.dedup_by_key(|b| b.time);
    bars
}
