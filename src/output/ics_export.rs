use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::config::{ExportConfig, ExportStyle};
use crate::error::{Result, RosterError};
use crate::roster::{Decision, TeamRoster};

const PRODID: &str = "-//lrm-roster//Locker Room Monitors//EN";
const MAX_LINE_OCTETS: usize = 75;

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Folds a content line at 75 octets without splitting a character
fn fold(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            // the leading space counts toward the continuation line
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str("\r\n");
    out
}

fn utc_stamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

fn friendly(instant: DateTime<Utc>, tz: Tz) -> String {
    instant
        .with_timezone(&tz)
        .format("%a, %b %-d, %Y at %-I:%M %p")
        .to_string()
}

/// Body text handed to the family along with the calendar entry
pub fn monitor_instructions(decision: &Decision, export: &ExportConfig, tz: Tz) -> String {
    let monitor = decision.monitor.as_deref().unwrap_or("");
    let mut text = format!("Locker Room Monitor: {}\n\nInstructions:\n", monitor);
    let _ = writeln!(
        text,
        "- Locker rooms should be monitored {} minutes before and closed {} minutes after the scheduled practice/game.",
        export.lead_minutes, export.trail_minutes
    );
    let _ = write!(
        text,
        "\nEvent: {}\nLocation: {}\nScheduled Event Time: {} to {}\n",
        decision.event,
        decision.location,
        friendly(decision.start, tz),
        friendly(decision.end, tz)
    );
    if !decision.roles.is_empty() {
        text.push_str("\nGame Roles:\n");
        for role in &decision.roles {
            let _ = writeln!(text, "- {}: {}", role.role, role.name);
        }
    }
    text
}

/// Renders one calendar entry per monitored line of the roster
pub fn render_calendar(
    roster: &TeamRoster,
    export: &ExportConfig,
    tz: Tz,
    stamp: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let header = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", PRODID),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        format!(
            "X-WR-CALNAME:{}",
            escape_text(&format!("{} Locker Room Monitors", roster.team))
        ),
    ];
    for line in &header {
        out.push_str(&fold(line));
    }

    for decision in roster.monitored() {
        let Some(monitor) = decision.monitor.as_deref() else {
            continue;
        };
        let mut lines = vec![
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", escape_text(&format!("lrm-{}", decision.event_id))),
            format!("DTSTAMP:{}", utc_stamp(stamp)),
        ];

        match export.style {
            ExportStyle::AllDay => {
                let date = decision.start.with_timezone(&tz).date_naive();
                let next = date.succ_opt().unwrap_or(date);
                lines.push(format!("DTSTART;VALUE=DATE:{}", date.format("%Y%m%d")));
                lines.push(format!("DTEND;VALUE=DATE:{}", next.format("%Y%m%d")));
            }
            ExportStyle::Timed => {
                let start = Duration::try_minutes(export.lead_minutes)
                    .and_then(|lead| decision.start.checked_sub_signed(lead))
                    .unwrap_or(decision.start);
                let end = Duration::try_minutes(export.trail_minutes)
                    .and_then(|trail| decision.end.checked_add_signed(trail))
                    .unwrap_or(decision.end);
                lines.push(format!("DTSTART:{}", utc_stamp(start)));
                lines.push(format!("DTEND:{}", utc_stamp(end)));
            }
        }

        lines.push(format!("SUMMARY:{}", escape_text(monitor)));
        lines.push(format!(
            "DESCRIPTION:{}",
            escape_text(&monitor_instructions(decision, export, tz))
        ));
        lines.push(format!("LOCATION:{}", escape_text(&decision.location)));
        lines.push("END:VEVENT".to_string());

        for line in &lines {
            out.push_str(&fold(line));
        }
    }

    out.push_str(&fold("END:VCALENDAR"));
    out
}

/// Writes the team's calendar export file
pub fn write_calendar(
    path: &Path,
    roster: &TeamRoster,
    export: &ExportConfig,
    tz: Tz,
    stamp: DateTime<Utc>,
) -> Result<()> {
    let body = render_calendar(roster, export, tz, stamp);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| RosterError::sink_unavailable(&roster.team, path, e))?;
        }
    }
    fs::write(path, body).map_err(|e| RosterError::sink_unavailable(&roster.team, path, e))?;
    tracing::debug!(team = %roster.team, path = %path.display(), "Wrote calendar export");
    Ok(())
}
