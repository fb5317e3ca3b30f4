//! End-to-end engine scenarios over an in-memory database.
//!
//! Each test drives the public [`Engine`] API day by day with a pinned
//! clock, the way a request handler would.

use chrono::{NaiveDate, TimeZone, Utc};
use daybreak_core::badges::BadgeCatalog;
use daybreak_core::storage::AssignmentStore;
use daybreak_core::{
    CompletionDetails, Config, CoreError, Database, Engine, EngagementEvent, EngineError,
    FixedClock, MemoryLedger, RitualCatalog, Tier, UserContext,
};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

const DEEP_WRITER_ONLY: &str = r#"
[[badges]]
id = "deep-writer"
name = "Deep Writer"
priority = 20
reward = { points = 200 }
rule = { event = "ritual_completed", aggregate = { kind = "count" }, comparator = "gte", threshold = 25, filters = [{ field = "journal_word_count", comparator = "gte", value = 20 }] }
"#;

const TALKER_ONLY: &str = r#"
[[badges]]
id = "talker"
name = "Talker"
rule = { event = "wall_interaction", aggregate = { kind = "count" }, comparator = "gte", threshold = 1 }
"#;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Engine pinned to noon UTC, `offset` days after the start date.
fn engine_on(config: &Config, badges: &BadgeCatalog, offset: i64) -> Engine {
    Engine::with_catalogs(config.clone(), RitualCatalog::builtin().unwrap(), badges.clone())
        .with_clock(Arc::new(FixedClock::at_noon(start()).advance_days(offset)))
}

/// Show today's assignment and complete its first ritual.
fn complete_first(
    engine: &Engine,
    db: &Database,
    user: &UserContext,
    words: Option<u32>,
) -> daybreak_core::CompletionOutcome {
    let assignment = engine.today(db, user).unwrap();
    engine
        .complete(
            db,
            user,
            &assignment.ritual_ids[0],
            &CompletionDetails {
                journal_word_count: words,
            },
        )
        .unwrap()
}

fn ghost() -> UserContext {
    UserContext::new("u1", Tier::Ghost)
}

// ============================================================================
// Streak scenarios
// ============================================================================

#[test]
fn ghost_user_two_day_streak() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::builtin().unwrap();
    let user = ghost();

    let day1 = engine_on(&config, &badges, 0);
    let r1 = day1.today(&db, &user).unwrap();
    assert_eq!(r1.ritual_ids.len(), 1);
    let outcome = day1
        .complete(&db, &user, &r1.ritual_ids[0], &CompletionDetails::default())
        .unwrap();
    assert_eq!(outcome.daily_state.rituals_completed_today, 1);
    assert_eq!(outcome.daily_state.streak_length, 1);

    let day2 = engine_on(&config, &badges, 1);
    let r2 = day2.today(&db, &user).unwrap();
    assert_ne!(r2.ritual_ids, r1.ritual_ids);
    let outcome = day2
        .complete(&db, &user, &r2.ritual_ids[0], &CompletionDetails::default())
        .unwrap();
    assert_eq!(outcome.daily_state.streak_length, 2);
}

#[test]
fn shield_bridges_missed_day() {
    let db = Database::open_memory().unwrap();
    let mut config = Config::default();
    config.tiers.ghost.shield_budget = 1;
    let badges = BadgeCatalog::default();
    let user = ghost();

    complete_first(&engine_on(&config, &badges, 0), &db, &user, None);
    complete_first(&engine_on(&config, &badges, 1), &db, &user, None);
    // Day 3 is skipped entirely.
    let day4 = engine_on(&config, &badges, 3);
    assert_eq!(day4.streak(&db, &user).unwrap().shields_remaining, 1);
    let outcome = complete_first(&day4, &db, &user, None);
    assert_eq!(outcome.daily_state.streak_length, 3);
    assert_eq!(outcome.daily_state.shields_consumed, 1);

    let summary = day4.streak(&db, &user).unwrap();
    assert_eq!(summary.current_streak, 3);
    assert_eq!(summary.shields_remaining, 0);

    let kinds: Vec<&str> = day4
        .events(&db, &user, 10)
        .unwrap()
        .iter()
        .map(|e| e.event.kind().as_str())
        .collect();
    assert!(kinds.contains(&"shield_consumed"));
}

#[test]
fn gap_without_shield_resets_streak() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::default();
    let user = ghost();

    complete_first(&engine_on(&config, &badges, 0), &db, &user, None);
    complete_first(&engine_on(&config, &badges, 1), &db, &user, None);
    let outcome = complete_first(&engine_on(&config, &badges, 3), &db, &user, None);
    assert_eq!(outcome.daily_state.streak_length, 1);
}

#[test]
fn showing_a_ritual_without_completing_does_not_extend_streak() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::default();
    let user = ghost();

    complete_first(&engine_on(&config, &badges, 0), &db, &user, None);
    engine_on(&config, &badges, 1).today(&db, &user).unwrap();
    let outcome = complete_first(&engine_on(&config, &badges, 2), &db, &user, None);
    assert_eq!(outcome.daily_state.streak_length, 1);
}

#[test]
fn firewall_weekly_refill_restores_shields() {
    let db = Database::open_memory().unwrap();
    let mut config = Config::default();
    config.shield.refill = daybreak_core::storage::ShieldRefill::Weekly;
    config.tiers.firewall.shield_budget = 1;
    let badges = BadgeCatalog::default();
    let user = UserContext::new("fw", Tier::Firewall);

    // 2024-01-01 is a Monday.
    complete_first(&engine_on(&config, &badges, 0), &db, &user, None);
    let wed = complete_first(&engine_on(&config, &badges, 2), &db, &user, None);
    assert_eq!(wed.daily_state.streak_length, 2);
    let next_mon = engine_on(&config, &badges, 7);
    assert_eq!(next_mon.streak(&db, &user).unwrap().shields_remaining, 1);
}

// ============================================================================
// Assignment rules
// ============================================================================

#[test]
fn consecutive_assignments_never_repeat() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::default();

    for tier in Tier::ALL {
        let user = UserContext::new(format!("user-{tier}"), tier);
        let mut previous: Option<Vec<String>> = None;
        for day in 0..30 {
            let assignment = engine_on(&config, &badges, day).today(&db, &user).unwrap();
            if let Some(prev) = &previous {
                for id in &assignment.ritual_ids {
                    assert!(!prev.contains(id), "{tier} repeated {id} on day {day}");
                }
            }
            previous = Some(assignment.ritual_ids);
        }
    }
}

#[test]
fn single_ritual_pool_repeats() {
    let db = Database::open_memory().unwrap();
    let rituals = RitualCatalog::from_toml_str(
        r#"
        [[rituals]]
        id = "only"
        title = "Only"
        tiers = ["ghost"]
        category = "breath"
        "#,
    )
    .unwrap();
    let user = ghost();
    for day in 0..3 {
        let engine = Engine::with_catalogs(Config::default(), rituals.clone(), BadgeCatalog::default())
            .with_clock(Arc::new(FixedClock::at_noon(start()).advance_days(day)));
        assert_eq!(engine.today(&db, &user).unwrap().ritual_ids, vec!["only".to_string()]);
    }
}

#[test]
fn timezone_decides_the_assignment_date() {
    let db = Database::open_memory().unwrap();
    let instant = Utc.with_ymd_and_hms(2024, 3, 10, 11, 0, 0).unwrap();
    let engine = Engine::with_catalogs(
        Config::default(),
        RitualCatalog::builtin().unwrap(),
        BadgeCatalog::default(),
    )
    .with_clock(Arc::new(FixedClock(instant)));

    let east = UserContext::new("east", Tier::Ghost).with_offset(14 * 60);
    let west = UserContext::new("west", Tier::Ghost).with_offset(-12 * 60);
    let bogus = UserContext::new("bogus", Tier::Ghost).with_offset(20 * 60);
    assert_eq!(
        engine.today(&db, &east).unwrap().assignment_date,
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    );
    assert_eq!(
        engine.today(&db, &west).unwrap().assignment_date,
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    );
    assert_eq!(
        engine.today(&db, &bogus).unwrap().assignment_date,
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    );
}

#[test]
fn reroll_rules() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::default();
    let user = ghost();
    let engine = engine_on(&config, &badges, 0);

    let original = engine.today(&db, &user).unwrap();
    let rerolled = engine.reroll(&db, &user).unwrap();
    assert_ne!(rerolled.assignment.ritual_ids, original.ritual_ids);
    assert!(matches!(
        engine.reroll(&db, &user),
        Err(CoreError::Engine(EngineError::RerollExhausted { .. }))
    ));

    // The replaced ritual can no longer be completed; the new one can.
    assert!(matches!(
        engine.complete(&db, &user, &original.ritual_ids[0], &CompletionDetails::default()),
        Err(CoreError::Engine(EngineError::NotAssigned { .. }))
    ));
    let outcome = engine
        .complete(
            &db,
            &user,
            &rerolled.assignment.ritual_ids[0],
            &CompletionDetails::default(),
        )
        .unwrap();
    assert_eq!(outcome.daily_state.rituals_completed_today, 1);

    let store = AssignmentStore::new(db.conn());
    assert_eq!(store.count_live("u1", start()).unwrap(), 1);
    assert_eq!(store.list_for_date("u1", start()).unwrap().len(), 2);
}

#[test]
fn reroll_after_completion_is_refused() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::default();
    let user = UserContext::new("fw", Tier::Firewall);
    let engine = engine_on(&config, &badges, 0);

    complete_first(&engine, &db, &user, None);
    assert!(matches!(
        engine.reroll(&db, &user),
        Err(CoreError::Engine(EngineError::RerollNotAllowed { .. }))
    ));
}

#[test]
fn firewall_cap_and_assignment_completion() {
    let db = Database::open_memory().unwrap();
    let mut config = Config::default();
    let badges = BadgeCatalog::default();
    let user = UserContext::new("fw", Tier::Firewall);
    let engine = engine_on(&config, &badges, 0);

    let assignment = engine.today(&db, &user).unwrap();
    assert_eq!(assignment.ritual_ids.len(), 2);
    for id in &assignment.ritual_ids {
        engine
            .complete(&db, &user, id, &CompletionDetails::default())
            .unwrap();
    }
    let day = engine.history(&db, &user, 1).unwrap().remove(0);
    assert_eq!(day.rituals_completed_today, 2);
    assert!(day.daily_cap_reached);
    assert_eq!(day.streak_length, 1);
    let stored = AssignmentStore::new(db.conn())
        .find_live("fw", start())
        .unwrap()
        .unwrap();
    assert!(stored.completed);
    assert!(stored.completed_at.is_some());

    // A tighter cap rejects the second ritual of the next day.
    config.tiers.firewall.daily_cap = 1;
    let next = engine_on(&config, &badges, 1);
    let assignment = next.today(&db, &user).unwrap();
    next.complete(&db, &user, &assignment.ritual_ids[0], &CompletionDetails::default())
        .unwrap();
    assert!(matches!(
        next.complete(&db, &user, &assignment.ritual_ids[1], &CompletionDetails::default()),
        Err(CoreError::Engine(EngineError::DailyCapReached { cap: 1, .. }))
    ));
}

#[test]
fn completion_is_idempotent() {
    let db = Database::open_memory().unwrap();
    let engine = engine_on(&Config::default(), &BadgeCatalog::builtin().unwrap(), 0);
    let user = ghost();

    let assignment = engine.today(&db, &user).unwrap();
    let ritual = &assignment.ritual_ids[0];
    let first = engine
        .complete(&db, &user, ritual, &CompletionDetails::default())
        .unwrap();
    let second = engine
        .complete(&db, &user, ritual, &CompletionDetails::default())
        .unwrap();
    assert!(!first.already_completed);
    assert!(second.already_completed);
    assert!(second.new_badges.is_empty());
    assert_eq!(first.daily_state, second.daily_state);
    assert_eq!(second.daily_state.rituals_completed_today, 1);
    let completions = engine
        .events(&db, &user, 10)
        .unwrap()
        .iter()
        .filter(|e| e.event.kind().as_str() == "ritual_completed")
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn offset_change_cannot_reopen_a_closed_day() {
    let db = Database::open_memory().unwrap();
    let at = |hour: u32| {
        Engine::with_catalogs(
            Config::default(),
            RitualCatalog::builtin().unwrap(),
            BadgeCatalog::default(),
        )
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap(),
        )))
    };
    let utc = ghost();
    let kiribati = ghost().with_offset(14 * 60);
    let may = |d: u32| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();

    let shown = at(12).today(&db, &utc).unwrap();
    assert_eq!(shown.assignment_date, may(10));

    let ahead = at(13).today(&db, &kiribati).unwrap();
    assert_eq!(ahead.assignment_date, may(11));
    let done = at(13)
        .complete(&db, &kiribati, &ahead.ritual_ids[0], &CompletionDetails::default())
        .unwrap();
    assert_eq!(done.daily_state.streak_length, 1);

    // Back at UTC the clock says May 10, but May 11 already exists.
    let back = at(14);
    assert_eq!(back.today_date(&db, &utc).unwrap(), may(11));
    assert_eq!(back.today(&db, &utc).unwrap().id, ahead.id);
    assert!(matches!(
        back.complete(&db, &utc, &shown.ritual_ids[0], &CompletionDetails::default()),
        Err(CoreError::Engine(EngineError::NotAssigned { date, .. })) if date == may(11)
    ));
    let again = back
        .complete(&db, &utc, &ahead.ritual_ids[0], &CompletionDetails::default())
        .unwrap();
    assert!(again.already_completed);

    let history = back.history(&db, &utc, 7).unwrap();
    let days: Vec<(NaiveDate, u32)> = history
        .iter()
        .map(|s| (s.state_date, s.rituals_completed_today))
        .collect();
    assert_eq!(days, vec![(may(11), 1), (may(10), 0)]);

    let summary = back.streak(&db, &utc).unwrap();
    assert_eq!(summary.last_completed, Some(may(11)));
    assert!(summary.completed_today);
    assert_eq!(summary.current_streak, 1);
}

// ============================================================================
// Badges
// ============================================================================

#[test]
fn deep_writer_granted_on_25th_qualifying_completion() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::from_toml_str(DEEP_WRITER_ONLY).unwrap();
    let user = ghost();

    // Short entries never qualify.
    let outcome = complete_first(&engine_on(&config, &badges, 0), &db, &user, Some(5));
    assert!(outcome.new_badges.is_empty());

    for day in 1..=24 {
        let outcome = complete_first(&engine_on(&config, &badges, day), &db, &user, Some(20));
        assert!(outcome.new_badges.is_empty(), "granted early on day {day}");
    }
    let outcome = complete_first(&engine_on(&config, &badges, 25), &db, &user, Some(40));
    let ids: Vec<&str> = outcome.new_badges.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["deep-writer"]);

    let outcome = complete_first(&engine_on(&config, &badges, 26), &db, &user, Some(40));
    assert!(outcome.new_badges.is_empty());

    let grants = engine_on(&config, &badges, 26).badges(&db, &user).unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].badge_id, "deep-writer");
}

#[test]
fn grant_is_at_most_once_across_repeated_events() {
    let db = Database::open_memory().unwrap();
    let badges = BadgeCatalog::from_toml_str(TALKER_ONLY).unwrap();
    let engine = engine_on(&Config::default(), &badges, 0);
    let user = ghost();

    let mut seen = 0;
    for _ in 0..5 {
        let granted = engine
            .emit_event(&db, &user, EngagementEvent::WallInteraction { kind: "like".into() })
            .unwrap();
        seen += granted.iter().filter(|b| b.id == "talker").count();
    }
    assert_eq!(seen, 1);
    assert_eq!(engine.badges(&db, &user).unwrap().len(), 1);
    assert_eq!(engine.events(&db, &user, 100).unwrap().len(), 5);
}

#[test]
fn week_streak_badge_follows_the_tracker() {
    let db = Database::open_memory().unwrap();
    let config = Config::default();
    let badges = BadgeCatalog::builtin().unwrap();
    let user = ghost();

    for day in 0..6 {
        let outcome = complete_first(&engine_on(&config, &badges, day), &db, &user, None);
        assert!(outcome.new_badges.iter().all(|b| b.id != "week-streak"));
    }
    let outcome = complete_first(&engine_on(&config, &badges, 6), &db, &user, None);
    assert_eq!(outcome.daily_state.streak_length, 7);
    assert!(outcome.new_badges.iter().any(|b| b.id == "week-streak"));

    // Display order puts the higher-priority streak badge first.
    let grants = engine_on(&config, &badges, 6).badges(&db, &user).unwrap();
    assert_eq!(grants[0].badge_id, "week-streak");
}

#[test]
fn rewards_reach_the_ledger() {
    let db = Database::open_memory().unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    let engine = engine_on(&Config::default(), &BadgeCatalog::builtin().unwrap(), 0)
        .with_ledger(ledger.clone());
    let user = ghost();

    complete_first(&engine, &db, &user, None);
    let labels: Vec<String> = ledger.notices().iter().map(|n| n.source.label()).collect();
    assert!(labels.iter().any(|l| l.starts_with("ritual:")));
    assert!(labels.contains(&"badge:first-light".to_string()));
}
