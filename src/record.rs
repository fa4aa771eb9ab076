//! Game result record types.
//!
//! A [`RawResultEvent`] is what arrives from a live game feed; a
//! [`GameResultRecord`] is what the ingest pipeline persists after
//! classification. Records reference the durable store's copy transiently —
//! the engine never owns them beyond a single operation.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sizing::SizedValue;

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// The outcome payload of a single game round, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ResultValue {
    /// Numeric outcome (e.g. a roulette pocket or crash multiplier)
    Number(f64),
    /// Free-text outcome
    Text(String),
    /// Card outcome (e.g. "KH" for king of hearts)
    Card(String),
    /// Color outcome (e.g. "red")
    Color(String),
}

/// Operator-facing record priority, ordered `Low < Normal < High < Permanent`.
///
/// `Permanent` records are immune to the cleanup sweep regardless of their
/// `expires_at` horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Permanent,
}

/// Audit note appended whenever a record's retention is extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionAuditNote {
    pub reason: String,
    /// Epoch millis at which the extension was applied
    pub extended_at: i64,
}

/// An incoming result event as delivered by a live game feed.
///
/// `extracted_at` defaults to the ingest time when the feed omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResultEvent {
    pub game_id: String,
    pub table_id: String,
    pub result: ResultValue,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub round_id: Option<String>,
    /// Epoch millis when the event occurred (defaults to now on ingest)
    #[serde(default)]
    pub extracted_at: Option<i64>,
}

impl RawResultEvent {
    pub fn new(game_id: impl Into<String>, table_id: impl Into<String>, result: ResultValue) -> Self {
        Self {
            game_id: game_id.into(),
            table_id: table_id.into(),
            result,
            winner: None,
            multiplier: None,
            round_id: None,
            extracted_at: None,
        }
    }

    /// Event occurrence time, falling back to the current clock.
    #[must_use]
    pub fn occurred_at(&self) -> i64 {
        self.extracted_at.unwrap_or_else(now_millis)
    }
}

/// A persisted game result with its retention envelope.
///
/// Created by the ingest pipeline, mutated only by an explicit retention
/// extension, destroyed only by the cleanup sweep or a per-game purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResultRecord {
    /// Store-assigned identifier
    pub id: Uuid,
    pub game_id: String,
    pub table_id: String,
    pub result: ResultValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
    /// Epoch millis when the event occurred
    pub extracted_at: i64,
    /// Epoch millis deletion horizon (ignored for `Priority::Permanent`)
    pub expires_at: i64,
    /// Named retention tier the record was classified into
    pub retention_tier: String,
    pub priority: Priority,
    /// Extension history, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit: Vec<RetentionAuditNote>,

    /// Cached approximate in-memory size (lazily computed, not serialized)
    #[serde(skip)]
    cached_size: OnceLock<usize>,
}

impl GameResultRecord {
    /// Build a record from a raw event and its classification outcome.
    pub fn from_event(
        event: RawResultEvent,
        tier: String,
        priority: Priority,
        expires_at: i64,
    ) -> Self {
        let extracted_at = event.occurred_at();
        Self {
            id: Uuid::new_v4(),
            game_id: event.game_id,
            table_id: event.table_id,
            result: event.result,
            winner: event.winner,
            multiplier: event.multiplier,
            round_id: event.round_id,
            extracted_at,
            expires_at,
            retention_tier: tier,
            priority,
            audit: Vec::new(),
            cached_size: OnceLock::new(),
        }
    }

    /// Whether this record and the event describe the same logical outcome
    /// (identical game, table, and result payload).
    #[must_use]
    pub fn matches_event(&self, event: &RawResultEvent) -> bool {
        self.game_id == event.game_id
            && self.table_id == event.table_id
            && self.result == event.result
    }

    /// Whether the deletion horizon has passed at `now` (epoch millis).
    /// Permanent records report their horizon like any other; sweep immunity
    /// is enforced by the store, not here.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

impl SizedValue for GameResultRecord {
    fn size_bytes(&self) -> usize {
        *self.cached_size.get_or_init(|| {
            std::mem::size_of::<Self>()
                + self.game_id.len()
                + self.table_id.len()
                + result_value_size(&self.result)
                + self.winner.as_ref().map_or(0, String::len)
                + self.round_id.as_ref().map_or(0, String::len)
                + self.retention_tier.len()
                + self
                    .audit
                    .iter()
                    .map(|n| std::mem::size_of::<RetentionAuditNote>() + n.reason.len())
                    .sum::<usize>()
        })
    }
}

fn result_value_size(value: &ResultValue) -> usize {
    match value {
        ResultValue::Number(_) => std::mem::size_of::<f64>(),
        ResultValue::Text(s) | ResultValue::Card(s) | ResultValue::Color(s) => s.len(),
    }
}
