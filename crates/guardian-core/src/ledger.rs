//! Intervention ledger.
//!
//! Append-only record of every prompt shown, persisted as one JSON array in
//! the device store. It is the single input of fatigue scoring. Each event
//! carries an [`Impact`] assigned at append time by an [`ImpactClassifier`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::storage::{KvStore, LEDGER_KEY};

/// Events older than this are dropped on append (12 weeks).
pub const DEFAULT_RETENTION_DAYS: u32 = 84;

/// Severity of an intervention, used to weight the fatigue score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Impact {
    #[default]
    Mild,
    Moderate,
    High,
}

impl Impact {
    pub fn weight(self) -> u32 {
        match self {
            Impact::Mild => 1,
            Impact::Moderate => 2,
            Impact::High => 3,
        }
    }
}

/// Strategy for rating a prompt's impact.
pub trait ImpactClassifier: Send + Sync {
    fn classify(&self, prompt_text: &str) -> Impact;
}

/// Case-insensitive keyword lookup; the first tier with a hit wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

const KEYWORD_TIERS: [(Impact, &[&str]); 2] = [
    (Impact::High, &["trauma", "rescue"]),
    (Impact::Moderate, &["redirect", "dignity"]),
];

impl ImpactClassifier for KeywordClassifier {
    fn classify(&self, prompt_text: &str) -> Impact {
        let text = prompt_text.to_lowercase();
        KEYWORD_TIERS
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(impact, _)| *impact)
            .unwrap_or(Impact::Mild)
    }
}

/// One shown prompt. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionEvent {
    pub site: String,
    #[serde(alias = "clauseText")]
    pub prompt_text: String,
    // Entries written before impact rating existed count as mild.
    #[serde(default)]
    pub impact: Impact,
    pub timestamp: DateTime<Utc>,
}

/// Append-only event log over a [`KvStore`].
pub struct Ledger {
    store: Arc<dyn KvStore>,
    classifier: Box<dyn ImpactClassifier>,
    retention: Option<Duration>,
}

impl Ledger {
    /// Ledger with keyword classification and the default retention window.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            classifier: Box::new(KeywordClassifier),
            retention: Some(Duration::days(DEFAULT_RETENTION_DAYS.into())),
        }
    }

    pub fn with_classifier(mut self, classifier: impl ImpactClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Keep events for `days` days; `0` keeps everything.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = (days > 0).then(|| Duration::days(days.into()));
        self
    }

    pub fn classify(&self, prompt_text: &str) -> Impact {
        self.classifier.classify(prompt_text)
    }

    /// Record that `prompt_text` was shown on `site` just now.
    pub async fn append(&self, site: &str, prompt_text: &str) -> Result<InterventionEvent> {
        self.append_at(site, prompt_text, Utc::now()).await
    }

    /// Record an event with an explicit timestamp.
    ///
    /// The whole log is rewritten in one atomic store update, so concurrent
    /// appends are serialized and none are lost. Events that fell out of the
    /// retention window relative to `timestamp` are dropped in the same
    /// write.
    pub async fn append_at(
        &self,
        site: &str,
        prompt_text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<InterventionEvent> {
        let event = InterventionEvent {
            site: site.to_string(),
            prompt_text: prompt_text.to_string(),
            impact: self.classify(prompt_text),
            timestamp,
        };

        let retention = self.retention;
        let appended = event.clone();
        self.store
            .update(
                LEDGER_KEY,
                Box::new(move |current: Option<String>| {
                    let mut events = decode(current.as_deref())?;
                    if let Some(window) = retention {
                        let cutoff = timestamp - window;
                        events.retain(|e| e.timestamp >= cutoff);
                    }
                    events.push(appended);
                    encode(&events)
                }),
            )
            .await?;

        tracing::info!(site = %event.site, impact = ?event.impact, "intervention logged");
        Ok(event)
    }

    /// All events in insertion order.
    pub async fn read_all(&self) -> Result<Vec<InterventionEvent>> {
        let raw = self.store.get(LEDGER_KEY).await?;
        Ok(decode(raw.as_deref())?)
    }

    /// Drop events older than the retention window. Returns how many went.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(window) = self.retention else {
            return Ok(0);
        };
        let cutoff = now - window;

        let counter = Arc::new(AtomicUsize::new(0));
        let removed_by_update = Arc::clone(&counter);
        self.store
            .update(
                LEDGER_KEY,
                Box::new(move |current: Option<String>| {
                    let mut events = decode(current.as_deref())?;
                    let before = events.len();
                    events.retain(|e| e.timestamp >= cutoff);
                    removed_by_update.store(before - events.len(), Ordering::SeqCst);
                    encode(&events)
                }),
            )
            .await?;

        let removed = counter.load(Ordering::SeqCst);
        if removed > 0 {
            tracing::info!(removed, "pruned intervention ledger");
        }
        Ok(removed)
    }
}

fn decode(raw: Option<&str>) -> std::result::Result<Vec<InterventionEvent>, StorageError> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| StorageError::Corrupt {
            key: LEDGER_KEY.to_string(),
            message: e.to_string(),
        }),
    }
}

fn encode(events: &[InterventionEvent]) -> std::result::Result<String, StorageError> {
    serde_json::to_string(events).map_err(|e| StorageError::Corrupt {
        key: LEDGER_KEY.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SqliteStore};

    fn ledger() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Ledger::new(store))
    }

    #[test]
    fn keyword_classification() {
        let c = KeywordClassifier;
        assert_eq!(c.classify("This space might not honor your dignity."), Impact::Moderate);
        assert_eq!(c.classify("We need to rescue you from trauma."), Impact::High);
        assert_eq!(c.classify("Hello there."), Impact::Mild);
        assert_eq!(c.classify("Want to REDIRECT?"), Impact::Moderate);
        // high keywords win over moderate ones
        assert_eq!(c.classify("Redirect before the trauma"), Impact::High);
        assert_eq!(c.classify(""), Impact::Mild);
    }

    #[tokio::test]
    async fn append_then_read_preserves_order_and_impact() {
        let (_, ledger) = ledger();
        let prompts = [
            ("https://www.tiktok.com/", "This space might not honor your dignity.", Impact::Moderate),
            ("https://snapchat.com/", "We need to rescue you from trauma.", Impact::High),
            ("https://roblox.com/", "Hello there.", Impact::Mild),
        ];
        for (site, prompt, _) in &prompts {
            ledger.append(site, prompt).await.unwrap();
        }

        let events = ledger.read_all().await.unwrap();
        assert_eq!(events.len(), prompts.len());
        for (event, (site, prompt, impact)) in events.iter().zip(prompts.iter()) {
            assert_eq!(event.site, *site);
            assert_eq!(event.prompt_text, *prompt);
            assert_eq!(event.impact, *impact);
        }
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn empty_ledger_reads_empty() {
        let (_, ledger) = ledger();
        assert!(ledger.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persisted_shape_uses_original_keys() {
        let (store, ledger) = ledger();
        ledger.append("https://roblox.com", "Hello there.").await.unwrap();
        let raw = store.get(LEDGER_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = &json[0];
        assert_eq!(first["site"], "https://roblox.com");
        assert_eq!(first["promptText"], "Hello there.");
        assert_eq!(first["impact"], "Mild");
        assert!(first["timestamp"].is_string());
    }

    #[tokio::test]
    async fn legacy_entries_without_impact_are_mild() {
        let (store, ledger) = ledger();
        store
            .set(
                LEDGER_KEY,
                r#"[{"site":"https://tiktok.com","clauseText":"hi","timestamp":"2026-10-18T10:00:00.000Z"}]"#,
            )
            .await
            .unwrap();
        let events = ledger.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].impact, Impact::Mild);
        assert_eq!(events[0].prompt_text, "hi");
    }

    #[tokio::test]
    async fn corrupt_ledger_is_reported_not_overwritten() {
        let (store, ledger) = ledger();
        store.set(LEDGER_KEY, "{not json").await.unwrap();

        assert!(ledger.read_all().await.is_err());
        assert!(ledger.append("https://tiktok.com", "hi").await.is_err());
        assert_eq!(
            store.get(LEDGER_KEY).await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn append_drops_events_past_retention() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        ledger
            .append_at("old", "Hello", now - Duration::days(100))
            .await
            .unwrap();
        ledger
            .append_at("recent", "Hello", now - Duration::days(3))
            .await
            .unwrap();
        ledger.append_at("now", "Hello", now).await.unwrap();

        let sites: Vec<String> = ledger
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.site)
            .collect();
        assert_eq!(sites, vec!["recent", "now"]);
    }

    #[tokio::test]
    async fn zero_retention_keeps_everything() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store).with_retention_days(0);
        let now = Utc::now();
        ledger
            .append_at("ancient", "Hello", now - Duration::days(1000))
            .await
            .unwrap();
        ledger.append_at("now", "Hello", now).await.unwrap();
        assert_eq!(ledger.read_all().await.unwrap().len(), 2);
        assert_eq!(ledger.prune(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prune_reports_removed_count() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store).with_retention_days(0);
        let now = Utc::now();
        ledger.append_at("a", "x", now - Duration::days(30)).await.unwrap();
        ledger.append_at("b", "x", now - Duration::days(2)).await.unwrap();

        let ledger = ledger.with_retention_days(7);
        assert_eq!(ledger.prune(now).await.unwrap(), 1);
        let events = ledger.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].site, "b");
    }

    struct AlwaysHigh;

    impl ImpactClassifier for AlwaysHigh {
        fn classify(&self, _prompt_text: &str) -> Impact {
            Impact::High
        }
    }

    #[tokio::test]
    async fn classifier_is_swappable() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store).with_classifier(AlwaysHigh);
        let event = ledger.append("https://x.com", "Hello there.").await.unwrap();
        assert_eq!(event.impact, Impact::High);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_all_kept() {
        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open_memory().unwrap());
        let ledger = Arc::new(Ledger::new(store));
        let mut handles = Vec::new();
        for i in 0..25 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .append(&format!("https://tab{i}.tiktok.com"), "Hello")
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(ledger.read_all().await.unwrap().len(), 25);
    }
}
