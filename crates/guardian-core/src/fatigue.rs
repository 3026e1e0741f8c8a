//! Weekly emotional fatigue scoring over the intervention ledger.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::ledger::{Impact, InterventionEvent, Ledger};

/// Trailing window the score is computed over.
pub const FATIGUE_WINDOW_DAYS: i64 = 7;

/// Alert threshold used when none is configured.
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Weighted event counts for the trailing week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatigueSummary {
    pub high_count: u32,
    pub moderate_count: u32,
    pub mild_count: u32,
    /// `3 * high + 2 * moderate + mild`
    pub score: u32,
}

/// Summarize events with `timestamp >= now - 7 days`.
pub fn compute_summary(events: &[InterventionEvent], now: DateTime<Utc>) -> FatigueSummary {
    let window_start = now - Duration::days(FATIGUE_WINDOW_DAYS);

    let mut summary = FatigueSummary::default();
    for event in events.iter().filter(|e| e.timestamp >= window_start) {
        match event.impact {
            Impact::High => summary.high_count += 1,
            Impact::Moderate => summary.moderate_count += 1,
            Impact::Mild => summary.mild_count += 1,
        }
        summary.score += event.impact.weight();
    }
    summary
}

/// Whether the summary warrants an alert.
pub fn check_threshold(summary: &FatigueSummary, threshold: u32) -> bool {
    summary.score >= threshold
}

/// Delivers fatigue alerts to the user (system notification, email, ...).
pub trait FatigueNotifier: Send + Sync {
    fn notify(&self, title: &str, message: &str) -> Result<()>;
}

/// Reads the ledger on demand and raises an alert past the threshold.
pub struct FatigueMonitor {
    ledger: Arc<Ledger>,
    threshold: u32,
}

impl FatigueMonitor {
    pub fn new(ledger: Arc<Ledger>, threshold: u32) -> Self {
        Self { ledger, threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub async fn summary(&self, now: DateTime<Utc>) -> Result<FatigueSummary> {
        let events = self.ledger.read_all().await?;
        Ok(compute_summary(&events, now))
    }

    /// Compute the summary and notify when the threshold is reached.
    /// Returns the summary and whether an alert was sent.
    pub async fn check_and_notify(
        &self,
        now: DateTime<Utc>,
        notifier: &dyn FatigueNotifier,
    ) -> Result<(FatigueSummary, bool)> {
        let summary = self.summary(now).await?;
        if !check_threshold(&summary, self.threshold) {
            return Ok((summary, false));
        }

        tracing::info!(score = summary.score, threshold = self.threshold, "fatigue threshold reached");
        notifier.notify(
            "Guardian Alert",
            &format!(
                "High emotional fatigue detected: {} points this week.",
                summary.score
            ),
        )?;
        Ok((summary, true))
    }
}
