use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A lifecycle fact fed to the badge evaluator.
///
/// Each variant carries the named fields its predicates may read; optional
/// fields are absent when the caller did not supply them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngagementEvent {
    RitualCompleted {
        ritual_id: String,
        assignment_date: NaiveDate,
        category: String,
        streak_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        journal_word_count: Option<u32>,
    },
    RitualRerolled {
        assignment_date: NaiveDate,
        replaced: Vec<String>,
    },
    CheckInCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mood: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        journal_word_count: Option<u32>,
    },
    WallInteraction {
        kind: String,
    },
    ShieldConsumed {
        assignment_date: NaiveDate,
        shields: u32,
    },
}

/// Discriminant of [`EngagementEvent`], used as the event log's type column
/// and as the `event` key of badge rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RitualCompleted,
    RitualRerolled,
    CheckInCompleted,
    WallInteraction,
    ShieldConsumed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RitualCompleted => "ritual_completed",
            EventKind::RitualRerolled => "ritual_rerolled",
            EventKind::CheckInCompleted => "check_in_completed",
            EventKind::WallInteraction => "wall_interaction",
            EventKind::ShieldConsumed => "shield_consumed",
        }
    }

    /// Kinds written by the engine as side effects of its own operations.
    pub fn is_engine_owned(&self) -> bool {
        matches!(
            self,
            EventKind::RitualCompleted | EventKind::RitualRerolled | EventKind::ShieldConsumed
        )
    }

    /// Fields a rule may reference for this kind.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::RitualCompleted => &[
                "ritual_id",
                "assignment_date",
                "category",
                "streak_count",
                "journal_word_count",
            ],
            EventKind::RitualRerolled => &["assignment_date", "replaced_count"],
            EventKind::CheckInCompleted => &["mood", "journal_word_count"],
            EventKind::WallInteraction => &["kind"],
            EventKind::ShieldConsumed => &["assignment_date", "shields"],
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ritual_completed" => Ok(EventKind::RitualCompleted),
            "ritual_rerolled" => Ok(EventKind::RitualRerolled),
            "check_in_completed" => Ok(EventKind::CheckInCompleted),
            "wall_interaction" => Ok(EventKind::WallInteraction),
            "shield_consumed" => Ok(EventKind::ShieldConsumed),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// A typed field value read out of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

impl EngagementEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngagementEvent::RitualCompleted { .. } => EventKind::RitualCompleted,
            EngagementEvent::RitualRerolled { .. } => EventKind::RitualRerolled,
            EngagementEvent::CheckInCompleted { .. } => EventKind::CheckInCompleted,
            EngagementEvent::WallInteraction { .. } => EventKind::WallInteraction,
            EngagementEvent::ShieldConsumed { .. } => EventKind::ShieldConsumed,
        }
    }

    /// Read a named field. Missing optional fields and names that do not
    /// belong to this variant yield `None`.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        use FieldValue::{Number, Text};
        match (self, name) {
            (EngagementEvent::RitualCompleted { ritual_id, .. }, "ritual_id") => {
                Some(Text(ritual_id.clone()))
            }
            (EngagementEvent::RitualCompleted { assignment_date, .. }, "assignment_date")
            | (EngagementEvent::RitualRerolled { assignment_date, .. }, "assignment_date")
            | (EngagementEvent::ShieldConsumed { assignment_date, .. }, "assignment_date") => {
                Some(Text(assignment_date.to_string()))
            }
            (EngagementEvent::RitualCompleted { category, .. }, "category") => {
                Some(Text(category.clone()))
            }
            (EngagementEvent::RitualCompleted { streak_count, .. }, "streak_count") => {
                Some(Number(f64::from(*streak_count)))
            }
            (EngagementEvent::RitualCompleted { journal_word_count, .. }, "journal_word_count")
            | (EngagementEvent::CheckInCompleted { journal_word_count, .. }, "journal_word_count") => {
                journal_word_count.map(|n| Number(f64::from(n)))
            }
            (EngagementEvent::RitualRerolled { replaced, .. }, "replaced_count") => {
                Some(Number(replaced.len() as f64))
            }
            (EngagementEvent::CheckInCompleted { mood, .. }, "mood") => {
                mood.map(|m| Number(f64::from(m)))
            }
            (EngagementEvent::WallInteraction { kind }, "kind") => Some(Text(kind.clone())),
            (EngagementEvent::ShieldConsumed { shields, .. }, "shields") => {
                Some(Number(f64::from(*shields)))
            }
            _ => None,
        }
    }
}

/// A persisted entry of the badge event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeEvent {
    pub id: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    pub event: EngagementEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(words: Option<u32>) -> EngagementEvent {
        EngagementEvent::RitualCompleted {
            ritual_id: "breath-box".into(),
            assignment_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            category: "breath".into(),
            streak_count: 3,
            journal_word_count: words,
        }
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let json = serde_json::to_value(completed(Some(25))).unwrap();
        assert_eq!(json["type"], "ritual_completed");
        assert_eq!(json["journal_word_count"], 25);
    }

    #[test]
    fn missing_optional_field_deserializes_as_none() {
        let json = r#"{"type":"check_in_completed"}"#;
        let event: EngagementEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.field("journal_word_count"), None);
        assert_eq!(event.kind(), EventKind::CheckInCompleted);
    }

    #[test]
    fn field_reads_are_variant_specific() {
        let event = completed(None);
        assert_eq!(event.field("streak_count"), Some(FieldValue::Number(3.0)));
        assert_eq!(event.field("journal_word_count"), None);
        assert_eq!(event.field("mood"), None);
        assert_eq!(
            event.field("category"),
            Some(FieldValue::Text("breath".into()))
        );
    }

    #[test]
    fn every_declared_field_is_readable_when_present() {
        let event = completed(Some(10));
        for field in EventKind::RitualCompleted.fields() {
            assert!(event.field(field).is_some(), "field {field} unreadable");
        }
    }

    #[test]
    fn only_lifecycle_kinds_are_open_to_callers() {
        assert!(EventKind::RitualCompleted.is_engine_owned());
        assert!(!EventKind::CheckInCompleted.is_engine_owned());
        assert!(!EventKind::WallInteraction.is_engine_owned());
    }

    #[test]
    fn kind_roundtrips_through_str() {
        for kind in [
            EventKind::RitualCompleted,
            EventKind::RitualRerolled,
            EventKind::CheckInCompleted,
            EventKind::WallInteraction,
            EventKind::ShieldConsumed,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }
}
