//! Engine operations: today, reroll, complete, badges, emit, streak, history.

use chrono::{DateTime, Utc};
use clap::Args;
use daybreak_core::{
    CompletionDetails, Config, Database, Engine, EngagementEvent, FixedClock, OutboxLedger, Tier,
    UserContext,
};
use std::sync::Arc;

use super::print_json;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Caller identity, as the identity collaborator would resolve it.
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// User id
    #[arg(long, global = true)]
    pub user: Option<String>,
    /// Subscription tier
    #[arg(long, global = true, default_value = "ghost")]
    pub tier: Tier,
    /// Minutes east of UTC
    #[arg(long, global = true, default_value_t = 0, allow_hyphen_values = true)]
    pub tz_offset: i32,
    /// Archetype used by archetype selection and badge scopes
    #[arg(long, global = true)]
    pub archetype: Option<String>,
    /// Pin the clock to an RFC 3339 instant
    #[arg(long, global = true)]
    pub at: Option<DateTime<Utc>>,
}

impl UserArgs {
    fn context(&self) -> Result<UserContext, Box<dyn std::error::Error>> {
        let user_id = self.user.clone().ok_or("--user is required")?;
        let mut ctx = UserContext::new(user_id, self.tier).with_offset(self.tz_offset);
        if let Some(archetype) = &self.archetype {
            ctx = ctx.with_archetype(archetype.clone());
        }
        Ok(ctx)
    }
}

struct Session {
    engine: Engine,
    db: Database,
    user: UserContext,
}

fn open(args: &UserArgs) -> Result<Session, Box<dyn std::error::Error>> {
    let user = args.context()?;
    let config = Config::load()?;
    let mut engine = Engine::new(config)?.with_ledger(Arc::new(OutboxLedger::new(Database::open()?)));
    if let Some(at) = args.at {
        tracing::debug!(%at, "clock pinned");
        engine = engine.with_clock(Arc::new(FixedClock(at)));
    }
    Ok(Session {
        engine,
        db: Database::open()?,
        user,
    })
}

pub fn today(args: &UserArgs) -> CliResult {
    let s = open(args)?;
    print_json(&s.engine.today(&s.db, &s.user)?)
}

pub fn reroll(args: &UserArgs) -> CliResult {
    let s = open(args)?;
    print_json(&s.engine.reroll(&s.db, &s.user)?)
}

pub fn complete(args: &UserArgs, ritual_id: &str, words: Option<u32>) -> CliResult {
    let s = open(args)?;
    let details = CompletionDetails {
        journal_word_count: words,
    };
    print_json(&s.engine.complete(&s.db, &s.user, ritual_id, &details)?)
}

pub fn badges(args: &UserArgs) -> CliResult {
    let s = open(args)?;
    print_json(&s.engine.badges(&s.db, &s.user)?)
}

pub fn emit(args: &UserArgs, event_type: &str, json: Option<&str>) -> CliResult {
    let s = open(args)?;
    let event = parse_event(event_type, json)?;
    print_json(&s.engine.emit_event(&s.db, &s.user, event)?)
}

pub fn streak(args: &UserArgs) -> CliResult {
    let s = open(args)?;
    print_json(&s.engine.streak(&s.db, &s.user)?)
}

pub fn history(args: &UserArgs, days: u32) -> CliResult {
    let s = open(args)?;
    print_json(&s.engine.history(&s.db, &s.user, days)?)
}

/// Build a typed event from its type name and a JSON object of fields.
fn parse_event(
    event_type: &str,
    json: Option<&str>,
) -> Result<EngagementEvent, Box<dyn std::error::Error>> {
    let mut fields = match json {
        Some(raw) => serde_json::from_str::<serde_json::Value>(raw)?,
        None => serde_json::json!({}),
    };
    let obj = fields
        .as_object_mut()
        .ok_or("--json must be a JSON object")?;
    obj.insert("type".into(), serde_json::Value::String(event_type.into()));
    Ok(serde_json::from_value(fields)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_in_with_fields() {
        let event =
            parse_event("check_in_completed", Some(r#"{"mood":4,"journal_word_count":30}"#))
                .unwrap();
        assert_eq!(
            event,
            EngagementEvent::CheckInCompleted {
                mood: Some(4),
                journal_word_count: Some(30),
            }
        );
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(parse_event("wall_interaction", Some("[1]")).is_err());
        assert!(parse_event("no_such_event", None).is_err());
    }
}
