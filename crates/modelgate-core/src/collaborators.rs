//! External collaborator interfaces consumed by the pipeline: sensitive-word
//! screening, price lookup, and the statistics sink. The core only ever sees
//! these traits; the default implementations are deliberately small.

use serde_json::Value as JsonValue;

/// Boolean guard over the request body.
pub trait SensitiveWordGuard: Send + Sync {
    fn check(&self, body: &JsonValue) -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct NoopSensitiveWordGuard;

impl SensitiveWordGuard for NoopSensitiveWordGuard {
    fn check(&self, _body: &JsonValue) -> Result<(), String> {
        Ok(())
    }
}

/// Substring screen over the serialized body.
#[derive(Debug, Default)]
pub struct ListSensitiveWordGuard {
    words: Vec<String>,
}

impl ListSensitiveWordGuard {
    pub fn new(words: Vec<String>) -> Self {
        Self { words }
    }
}

impl SensitiveWordGuard for ListSensitiveWordGuard {
    fn check(&self, body: &JsonValue) -> Result<(), String> {
        if self.words.is_empty() {
            return Ok(());
        }
        let haystack = body.to_string();
        for word in &self.words {
            if !word.is_empty() && haystack.contains(word.as_str()) {
                return Err(format!("request contains a blocked term: {word}"));
            }
        }
        Ok(())
    }
}

/// USD per million tokens for a model, when the provider record has no
/// price of its own.
pub trait PriceBook: Send + Sync {
    fn lookup(&self, model: &str) -> Option<f64>;
}

#[derive(Debug, Default)]
pub struct StaticPriceBook;

impl PriceBook for StaticPriceBook {
    fn lookup(&self, model: &str) -> Option<f64> {
        // Blended USD/Mtok figures, close enough for budget accounting.
        const TABLE: &[(&str, f64)] = &[
            ("claude-opus", 30.0),
            ("claude-sonnet", 9.0),
            ("claude-haiku", 2.0),
            ("gpt-5-codex", 7.0),
            ("gpt-5", 6.0),
            ("gpt-4o", 7.5),
            ("gemini-2.5-pro", 5.0),
            ("gemini", 2.0),
        ];
        TABLE
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix))
            .map(|(_, price)| *price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    UpstreamError,
    Cancelled,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::UpstreamError => "upstream_error",
            RequestOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatisticsRecord {
    pub user_id: Option<String>,
    pub provider_id: i64,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u128,
    pub outcome: RequestOutcome,
}

pub trait StatisticsSink: Send + Sync {
    fn record(&self, record: StatisticsRecord);
}

#[derive(Debug, Default)]
pub struct NoopStatisticsSink;

impl StatisticsSink for NoopStatisticsSink {
    fn record(&self, _record: StatisticsRecord) {}
}

/// Emits each record as a structured tracing event; the aggregation store
/// is out of scope.
#[derive(Debug, Default)]
pub struct TracingStatisticsSink;

impl StatisticsSink for TracingStatisticsSink {
    fn record(&self, record: StatisticsRecord) {
        tracing::info!(
            event = "request_stats",
            user_id = record.user_id.as_deref().unwrap_or("-"),
            provider_id = record.provider_id,
            model = %record.model,
            tokens_in = record.tokens_in,
            tokens_out = record.tokens_out,
            latency_ms = record.latency_ms as u64,
            outcome = record.outcome.as_str(),
        );
    }
}
