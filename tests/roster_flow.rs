use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

use lrm_roster::config::{FilterConfig, RolesConfig, TeamConfig};
use lrm_roster::roster::{
    Allocator, AssignmentKey, EventFilter, ExternalRow, Ledger, LedgerStore, RosterEngine,
};
use lrm_roster::Event;

fn team(families: &[&str]) -> TeamConfig {
    TeamConfig {
        name: "12A".to_string(),
        families: families.iter().map(|s| s.to_string()).collect(),
        feed: "12a.ics".to_string(),
        home_location: Some("New Hope".to_string()),
        output: None,
        reconcile: true,
    }
}

fn event(uid: &str, summary: &str, location: &str, day: u32) -> Event {
    let start = Utc.with_ymd_and_hms(2026, 11, day, 23, 0, 0).unwrap();
    Event::new(uid, summary)
        .with_location(location)
        .with_times(start, start + Duration::minutes(60))
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
}

fn season() -> Vec<Event> {
    vec![
        event("p3", "Practice", "Breck", 12),
        event("p1", "Practice", "Breck", 5),
        event("d1", "Dryland", "Breck", 6),
        event("g1", "Game vs Edina", "New Hope North", 8),
        event("p2", "Practice", "Bloomington Ice Garden", 9),
        event("t1", "Tournament Game", "New Hope North", 10),
    ]
}

#[test]
fn three_events_three_families_each_once() {
    let team = team(&["Anderson", "Becker", "Carlson"]);
    let filter = EventFilter::new(&FilterConfig::default(), false);
    let roles = RolesConfig {
        names: Vec::new(),
        ..RolesConfig::default()
    };
    let mut allocator = Allocator::seeded(11);
    let mut ledger = Ledger::new();

    let events = vec![
        event("a", "Practice", "Breck", 5),
        event("b", "Practice", "Breck", 6),
        event("c", "Practice", "Breck", 7),
    ];
    let roster = RosterEngine::new(&team, &filter, &roles, chrono_tz::UTC, &mut allocator)
        .run(&mut ledger, &events, now())
        .unwrap();

    let mut monitors: Vec<String> = roster
        .decisions
        .iter()
        .filter_map(|d| d.monitor.clone())
        .collect();
    monitors.sort();
    assert_eq!(monitors, vec!["Anderson", "Becker", "Carlson"]);
    assert!(ledger.counts("12A").values().all(|c| *c == 1));
}

#[test]
fn rerun_is_idempotent() {
    let team = team(&["Anderson", "Becker", "Carlson", "Dahl"]);
    let filter = EventFilter::new(&FilterConfig::default(), false);
    let roles = RolesConfig::default();
    let mut allocator = Allocator::seeded(3);
    let mut ledger = Ledger::new();
    let events = season();

    let first = RosterEngine::new(&team, &filter, &roles, chrono_tz::America::Chicago, &mut allocator)
        .run(&mut ledger, &events, now())
        .unwrap();
    let snapshot = ledger.clone();

    let second = RosterEngine::new(&team, &filter, &roles, chrono_tz::America::Chicago, &mut allocator)
        .run(&mut ledger, &events, now())
        .unwrap();

    assert_eq!(first.decisions, second.decisions);
    assert_eq!(second.new_assignments, 0);
    assert_eq!(ledger, snapshot);
}

#[test]
fn season_roster_is_filtered_and_sorted() {
    let team = team(&["Anderson", "Becker", "Carlson", "Dahl"]);
    let filter = EventFilter::new(&FilterConfig::default(), false);
    let roles = RolesConfig::default();
    let mut allocator = Allocator::seeded(5);
    let mut ledger = Ledger::new();

    let roster = RosterEngine::new(&team, &filter, &roles, chrono_tz::America::Chicago, &mut allocator)
        .run(&mut ledger, &season(), now())
        .unwrap();

    let ids: Vec<&str> = roster.decisions.iter().map(|d| d.event_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "g1", "p2", "p3"]);
    assert_eq!(roster.skipped, 2);

    let game = &roster.decisions[1];
    assert!(game.monitor.is_some());
    assert_eq!(game.roles.len(), 3);
    let unmonitored = &roster.decisions[2];
    assert!(unmonitored.monitor.is_none());
    assert!(unmonitored.roles.is_empty());

    // 3 monitors + 3 home game roles
    assert_eq!(roster.new_assignments, 6);
    let total: u32 = ledger.counts("12A").values().sum();
    assert_eq!(total, 6);
}

#[test]
fn fairness_stays_within_one_and_never_repeats() {
    let pool: Vec<String> = ["Anderson", "Becker", "Carlson", "Dahl", "Erickson"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut allocator = Allocator::seeded(42);
    let mut counts: BTreeMap<String, u32> = pool.iter().map(|n| (n.clone(), 0)).collect();
    let mut last_assigned = None;
    let mut previous: Option<String> = None;

    for _ in 0..200 {
        let picked = allocator.choose("12A", &pool, &counts, &mut last_assigned, 1);
        assert_eq!(picked.len(), 1);
        let name = picked[0].clone();
        assert_ne!(previous.as_deref(), Some(name.as_str()));
        *counts.entry(name.clone()).or_insert(0) += 1;
        previous = Some(name);

        let max = counts.values().max().copied().unwrap_or(0);
        let min = counts.values().min().copied().unwrap_or(0);
        assert!(max - min <= 1, "counts drifted: {:?}", counts);
    }
}

#[test]
fn external_edit_wins_over_ledger() {
    let team = team(&["Anderson", "Becker", "Carlson"]);
    let filter = EventFilter::new(&FilterConfig::default(), false);
    let roles = RolesConfig::default();
    let mut allocator = Allocator::seeded(9);
    let mut ledger = Ledger::new();
    let events = vec![event("a", "Practice", "Breck", 5)];

    let roster = RosterEngine::new(&team, &filter, &roles, chrono_tz::UTC, &mut allocator)
        .run(&mut ledger, &events, now())
        .unwrap();
    let original = roster.decisions[0].monitor.clone().unwrap();
    let replacement = if original == "Becker" { "Carlson" } else { "Becker" };

    let changed = ledger.reconcile(
        "12A",
        &[ExternalRow {
            key: AssignmentKey::monitor("a"),
            assignee: replacement.to_string(),
        }],
    );
    assert_eq!(changed, 1);
    assert_eq!(ledger.count("12A", &original), 0);
    assert_eq!(ledger.count("12A", replacement), 1);

    let roster = RosterEngine::new(&team, &filter, &roles, chrono_tz::UTC, &mut allocator)
        .run(&mut ledger, &events, now())
        .unwrap();
    assert_eq!(roster.decisions[0].monitor.as_deref(), Some(replacement));
    assert_eq!(roster.new_assignments, 0);
}

#[test]
fn ledger_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("counts.csv"), dir.path().join("records.csv"));

    let team = team(&["Anderson", "Becker", "Carlson", "Dahl"]);
    let filter = EventFilter::new(&FilterConfig::default(), false);
    let roles = RolesConfig::default();
    let mut allocator = Allocator::seeded(1);
    let mut ledger = Ledger::new();
    RosterEngine::new(&team, &filter, &roles, chrono_tz::America::Chicago, &mut allocator)
        .run(&mut ledger, &season(), now())
        .unwrap();
    ledger.save(&store).unwrap();

    let (loaded, report) = Ledger::load(&store);
    assert!(report.warning.is_none());
    assert!(report.rebuilt_teams.is_empty());
    assert_eq!(report.records, 6);
    assert_eq!(loaded, ledger);
}
