//! Minimal iCalendar (RFC 5545) reader for team feeds
//!
//! Only `VEVENT` components are read, and only the properties the roster
//! needs. Unknown properties and components are ignored.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use thiserror::Error;

use crate::event::Event;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IcsError {
    #[error("body is not an iCalendar document")]
    NotACalendar,

    #[error("VEVENT starting at line {0} is never closed")]
    UnterminatedEvent(usize),
}

/// Joins folded continuation lines
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

/// A content line split into name, parameters and value
struct ContentLine<'a> {
    name: String,
    params: HashMap<String, String>,
    value: &'a str,
}

fn split_content_line(line: &str) -> Option<ContentLine<'_>> {
    // the value starts at the first colon outside a quoted parameter
    let mut in_quotes = false;
    let mut colon = None;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }
    let colon = colon?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut parts = head.split(';');
    let name = parts.next()?.trim().to_uppercase();
    let params = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_uppercase(), v.trim().trim_matches('"').to_string()))
        .collect();

    Some(ContentLine {
        name,
        params,
        value,
    })
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parses a DTSTART/DTEND value. Returns the instant and whether it was a
/// plain date.
fn parse_time(value: &str, params: &HashMap<String, String>, tz: Tz) -> Option<(DateTime<Utc>, bool)> {
    let value = value.trim();
    let is_date = params.get("VALUE").map(|v| v.eq_ignore_ascii_case("DATE")).unwrap_or(false)
        || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()));

    let local_tz = match params.get("TZID") {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(tzid = %name, "Unknown TZID, using configured timezone");
            tz
        }),
        None => tz,
    };

    if is_date {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let local = local_tz.from_local_datetime(&midnight).earliest()?;
        return Some((local.with_timezone(&Utc), true));
    }

    if let Some(utc) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some((Utc.from_utc_datetime(&naive), false));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    let local = local_tz.from_local_datetime(&naive).earliest()?;
    Some((local.with_timezone(&Utc), false))
}

#[derive(Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    raw_start: Option<String>,
    all_day: bool,
}

impl EventBuilder {
    fn apply(&mut self, line: &ContentLine<'_>, tz: Tz) {
        match line.name.as_str() {
            "UID" => self.uid = Some(line.value.trim().to_string()),
            "SUMMARY" => self.summary = Some(unescape(line.value)),
            "DESCRIPTION" => self.description = Some(unescape(line.value)),
            "LOCATION" => self.location = Some(unescape(line.value)),
            "DTSTART" => {
                self.raw_start = Some(line.value.trim().to_string());
                if let Some((start, all_day)) = parse_time(line.value, &line.params, tz) {
                    self.start = Some(start);
                    self.all_day = all_day;
                }
            }
            "DTEND" => self.end = parse_time(line.value, &line.params, tz).map(|(end, _)| end),
            _ => {}
        }
    }

    fn build(self) -> Event {
        let summary = self.summary.unwrap_or_default();
        let uid = match self.uid.filter(|u| !u.is_empty()) {
            Some(uid) => uid,
            None => format!("{}@{}", summary, self.raw_start.unwrap_or_default()),
        };
        Event {
            uid,
            summary,
            description: self.description,
            location: self.location,
            start: self.start,
            end: self.end,
            all_day: self.all_day,
        }
    }
}

/// Parses a feed body into events, in feed order. Floating times and
/// all-day dates are read in `tz`.
pub fn parse_ics(text: &str, tz: Tz) -> Result<Vec<Event>, IcsError> {
    let lines = unfold(text);
    if !lines
        .iter()
        .any(|l| l.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"))
    {
        return Err(IcsError::NotACalendar);
    }

    let mut events = Vec::new();
    let mut current: Option<(usize, EventBuilder)> = None;
    // nested components (VALARM) inside an event
    let mut depth = 0usize;

    for (index, raw) in lines.iter().enumerate() {
        let Some(line) = split_content_line(raw) else {
            continue;
        };
        let value = line.value.trim().to_uppercase();

        match (line.name.as_str(), current.is_some()) {
            ("BEGIN", false) if value == "VEVENT" => {
                current = Some((index + 1, EventBuilder::default()));
                depth = 0;
            }
            ("BEGIN", true) => depth += 1,
            ("END", true) if depth > 0 => depth -= 1,
            ("END", true) if value == "VEVENT" => {
                if let Some((_, builder)) = current.take() {
                    events.push(builder.build());
                }
            }
            (_, true) if depth == 0 => {
                if let Some((_, builder)) = current.as_mut() {
                    builder.apply(&line, tz);
                }
            }
            _ => {}
        }
    }

    if let Some((line, _)) = current {
        return Err(IcsError::UnterminatedEvent(line));
    }
    Ok(events)
}
