use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;

use lrm_roster::config::{RosterConfig, StorageConfig, TeamConfig};
use lrm_roster::output::read_roster;
use lrm_roster::roster::{Allocator, AssignmentKey, Ledger, LedgerStore};
use lrm_roster::{RosterError, Runner};

const FEED: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:practice-1@teamsnap\r
SUMMARY:Practice\r
LOCATION:Breck\r
DTSTART:20261106T000000Z\r
DTEND:20261106T010000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:game-1@teamsnap\r
SUMMARY:Game vs Edina\r
LOCATION:New Hope North\r
DTSTART:20261108T000000Z\r
DTEND:20261108T011500Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:dryland-1@teamsnap\r
SUMMARY:Dryland\r
LOCATION:Breck\r
DTSTART:20261109T000000Z\r
DTEND:20261109T010000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:practice-2@teamsnap\r
SUMMARY:Practice\r
LOCATION:Breck\r
DTSTART:20261111T000000Z\r
DTEND:20261111T010000Z\r
END:VEVENT\r
END:VCALENDAR\r
";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
}

fn config(dir: &Path) -> RosterConfig {
    let feed = dir.join("12a.ics");
    std::fs::write(&feed, FEED).unwrap();

    RosterConfig {
        output_dir: dir.join("out"),
        storage: StorageConfig {
            counts_path: dir.join("assignment_counts.csv"),
            records_path: dir.join("assignment_records.csv"),
        },
        teams: vec![
            TeamConfig {
                name: "12A".to_string(),
                families: vec![
                    "Anderson".to_string(),
                    "Becker".to_string(),
                    "Carlson".to_string(),
                    "Dahl".to_string(),
                ],
                feed: feed.display().to_string(),
                home_location: Some("New Hope".to_string()),
                output: None,
                reconcile: true,
            },
            TeamConfig {
                name: "10B".to_string(),
                families: vec!["Erickson".to_string(), "Fisher".to_string()],
                feed: dir.join("missing.ics").display().to_string(),
                home_location: None,
                output: None,
                reconcile: true,
            },
        ],
        ..RosterConfig::default()
    }
}

#[tokio::test]
async fn failing_team_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(21));

    let summary = runner.run(&[], now()).await.unwrap();
    assert_eq!(summary.outcomes.len(), 2);
    assert!(!summary.all_failed());

    let ok = summary.outcomes[0].result.as_ref().unwrap();
    assert_eq!(ok.roster.decisions.len(), 3);
    assert!(ok.sink_errors.is_empty());
    assert!(ok.roster_path.exists());
    assert!(ok.calendar_path.exists());

    assert!(matches!(
        summary.outcomes[1].result,
        Err(RosterError::SourceUnavailable { .. })
    ));
    assert_eq!(summary.ledger.record_count("10B"), 0);

    let store = LedgerStore::from_config(&config.storage);
    let (saved, _) = Ledger::load(&store);
    assert_eq!(saved.record_count("12A"), 6);

    let json = summary.to_json();
    assert_eq!(json["teams"][0]["status"], "ok");
    assert_eq!(json["teams"][1]["status"], "failed");
}

#[tokio::test]
async fn second_run_keeps_assignments() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let selection = vec!["12a".to_string()];

    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(2));
    let first = runner.run(&selection, now()).await.unwrap();
    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(99));
    let second = runner.run(&selection, now()).await.unwrap();

    assert_eq!(second.outcomes.len(), 1);
    let first = first.outcomes[0].result.as_ref().unwrap();
    let second = second.outcomes[0].result.as_ref().unwrap();
    assert_eq!(first.roster.decisions, second.roster.decisions);
    assert_eq!(second.roster.new_assignments, 0);
    assert_eq!(second.reconciled, 0);
}

#[tokio::test]
async fn hand_edit_in_roster_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let selection = vec!["12A".to_string()];

    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(4));
    let summary = runner.run(&selection, now()).await.unwrap();
    let report = summary.outcomes[0].result.as_ref().unwrap();
    let path = report.roster_path.clone();

    // swap the first line's monitor for someone else
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let mut records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    let original = records[0].get(5).unwrap().to_string();
    let replacement = if original == "Dahl" { "Anderson" } else { "Dahl" };
    let edited: Vec<String> = records[0]
        .iter()
        .enumerate()
        .map(|(i, field)| if i == 5 { replacement.to_string() } else { field.to_string() })
        .collect();
    records[0] = csv::StringRecord::from(edited);

    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(&headers).unwrap();
    for record in &records {
        writer.write_record(record).unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let before = summary.ledger.count("12A", replacement);
    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(4));
    let rerun = runner.run(&selection, now()).await.unwrap();
    let report = rerun.outcomes[0].result.as_ref().unwrap();

    assert_eq!(report.reconciled, 1);
    assert_eq!(report.roster.new_assignments, 0);
    assert_eq!(report.roster.decisions[0].monitor.as_deref(), Some(replacement));
    assert_eq!(rerun.ledger.count("12A", replacement), before + 1);

    let rows = read_roster("12A", &path).unwrap();
    assert_eq!(rows[0].monitor, replacement);
}

#[tokio::test]
async fn role_cell_on_practice_row_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let selection = vec!["12A".to_string()];

    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(8));
    let summary = runner.run(&selection, now()).await.unwrap();
    let path = summary.outcomes[0].result.as_ref().unwrap().roster_path.clone();

    // type a name into the Scorekeeper cell of the first practice
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let scorekeeper = headers.iter().position(|h| h == "Scorekeeper").unwrap();
    let mut records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records[0].get(0), Some("Practice"));
    let edited: Vec<String> = records[0]
        .iter()
        .enumerate()
        .map(|(i, field)| if i == scorekeeper { "Zed".to_string() } else { field.to_string() })
        .collect();
    records[0] = csv::StringRecord::from(edited);

    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(&headers).unwrap();
    for record in &records {
        writer.write_record(record).unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(8));
    let rerun = runner.run(&selection, now()).await.unwrap();
    let report = rerun.outcomes[0].result.as_ref().unwrap();

    assert_eq!(report.reconciled, 0);
    assert!(report.roster.decisions[0].roles.is_empty());
    let key = AssignmentKey::role("practice-1@teamsnap", "Scorekeeper");
    assert_eq!(rerun.ledger.get("12A", &key), None);
    assert_eq!(rerun.ledger.count("12A", "Zed"), 0);
    assert_eq!(rerun.ledger.record_count("12A"), 6);
}

#[tokio::test]
async fn blocked_roster_file_still_saves_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    // a directory where the roster file should go
    std::fs::create_dir_all(dir.path().join("out/locker_room_monitors_12a.csv")).unwrap();

    let mut runner = Runner::new(&config).unwrap().with_allocator(Allocator::seeded(13));
    let summary = runner.run(&["12A".to_string()], now()).await.unwrap();
    let report = summary.outcomes[0].result.as_ref().unwrap();

    assert_eq!(report.sink_errors.len(), 1);
    assert!(matches!(
        report.sink_errors[0],
        RosterError::SinkUnavailable { .. }
    ));
    assert!(report.calendar_path.exists());

    let json = summary.to_json();
    assert_eq!(json["teams"][0]["status"], "partial");
    assert_eq!(json["teams"][0]["error_kinds"][0], "sink");

    let store = LedgerStore::from_config(&config.storage);
    let (saved, report) = Ledger::load(&store);
    assert!(report.warning.is_none());
    assert_eq!(saved.record_count("12A"), 6);
    assert_eq!(saved, summary.ledger);
}

#[tokio::test]
async fn unknown_team_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut runner = Runner::new(&config).unwrap();
    let err = runner.run(&["Squirt C".to_string()], now()).await.unwrap_err();
    assert!(matches!(err, RosterError::Config(_)));
}
