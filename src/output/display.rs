use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::event::Event;
use crate::roster::{Ledger, RejectReason, TeamRoster, Verdict};
use crate::runner::{RunSummary, TeamOutcome};

/// Formats an assignee cell, marking unassigned lines
pub fn format_assignee(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "[EMPTY]".to_string(),
    }
}

fn describe_reason(reason: &RejectReason) -> String {
    match reason {
        RejectReason::MissingTime => "no start/end time".to_string(),
        RejectReason::MissingLocation => "no location".to_string(),
        RejectReason::MetaLocation(location) => format!("meta location '{}'", location),
        RejectReason::ExcludedTerm(term) => format!("excluded term '{}'", term),
        RejectReason::AlreadyStarted => "already started".to_string(),
    }
}

/// Prints a team's roster in a readable format
pub fn print_team_roster(roster: &TeamRoster) {
    println!("\n=== {} Locker Room Monitors ===", roster.team);
    println!(
        "Roster lines: {} (new assignments: {}, skipped events: {})",
        roster.decisions.len(),
        roster.new_assignments,
        roster.skipped
    );

    for decision in &roster.decisions {
        let monitor = match &decision.monitor {
            Some(name) => name.clone(),
            None => "-".to_string(),
        };
        println!(
            "  {} {}  {} @ {} -> {}",
            decision.date, decision.time, decision.event, decision.location, monitor
        );
        for role in &decision.roles {
            println!("      {}: {}", role.role, format_assignee(Some(&role.name)));
        }
    }
}

/// Prints per-family assignment counts for one team
pub fn print_team_counts(team: &str, ledger: &Ledger) {
    println!("\n=== {} Assignment Counts ===", team);
    let counts = ledger.counts(team);
    if counts.is_empty() {
        println!("  (no families recorded)");
        return;
    }

    let mut sorted: Vec<(&String, &u32)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (family, count) in sorted {
        println!("  {:<24} {}", family, count);
    }
    println!("  Assignment records: {}", ledger.record_count(team));
}

fn print_outcome(outcome: &TeamOutcome) {
    match &outcome.result {
        Ok(report) => {
            print_team_roster(&report.roster);
            if report.reconciled > 0 {
                println!("Applied {} edit(s) from the previous roster", report.reconciled);
            }
            println!("Roster:   {}", report.roster_path.display());
            println!("Calendar: {}", report.calendar_path.display());
            for err in &report.sink_errors {
                println!("⚠️  {}", err);
            }
        }
        Err(err) => {
            println!("\n=== {} ===", outcome.team);
            println!("❌ {}", err);
        }
    }
}

/// Prints everything a run produced, followed by the updated counts
pub fn print_run_summary(summary: &RunSummary) {
    if let Some(warning) = &summary.ledger_warning {
        println!("⚠️  {} (started from an empty ledger)", warning);
    }
    for outcome in &summary.outcomes {
        print_outcome(outcome);
        if outcome.is_success() {
            print_team_counts(&outcome.team, &summary.ledger);
        }
    }

    let failed = summary.outcomes.iter().filter(|o| !o.is_success()).count();
    println!(
        "\n{} team(s) processed, {} failed",
        summary.outcomes.len(),
        failed
    );
}

fn local_time(instant: Option<DateTime<Utc>>, all_day: bool, tz: Tz) -> String {
    match instant {
        Some(instant) if all_day => {
            format!("{} (all day)", instant.with_timezone(&tz).format("%Y-%m-%d"))
        }
        Some(instant) => instant.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
        None => "(none)".to_string(),
    }
}

/// Prints each feed event and whether it would land on the roster
pub fn print_check(team: &str, events: &[(Event, Verdict)], tz: Tz, now: DateTime<Utc>) {
    println!("\n=== {} Feed Check ===", team);
    println!("Evaluated at {}", now.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"));

    for (event, verdict) in events {
        println!("Event:    {}", event.summary);
        println!("Location: {}", event.location_str());
        println!("Start:    {}", local_time(event.start, event.all_day, tz));
        println!("End:      {}", local_time(event.end, event.all_day, tz));
        let outcome = match verdict {
            Verdict::Accepted { needs_monitor: true } => "on roster, needs monitor".to_string(),
            Verdict::Accepted { needs_monitor: false } => "on roster, no monitor".to_string(),
            Verdict::Rejected(reason) => format!("skipped: {}", describe_reason(reason)),
        };
        println!("Result:   {}", outcome);
        println!("{}", "-".repeat(40));
    }

    let eligible = events.iter().filter(|(_, v)| v.is_eligible()).count();
    println!("{} of {} event(s) eligible", eligible, events.len());
}
