//! VEVENT extraction using the icalendar crate's parser.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};

use crate::CalendarError;

/// A DTSTART/DTEND/EXDATE value exactly as the feed wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    /// All-day value.
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    /// Wall time without zone information.
    Floating(NaiveDateTime),
    /// Wall time in a named zone (`TZID=`).
    Zoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
}

/// The parts of a VEVENT the sync needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: EventTime,
    pub end: Option<EventTime>,
    pub duration: Option<TimeDelta>,
    pub rrule: Option<String>,
    pub exdates: Vec<EventTime>,
    pub recurrence_id: Option<EventTime>,
}

/// Parses every VEVENT in an ICS document, at any nesting depth.
pub fn parse_calendar(content: &str) -> Result<Vec<RawEvent>, CalendarError> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|err| CalendarError::Parse(err.to_string()))?;

    let mut events = Vec::new();
    collect_events(&calendar.components, &mut events);
    Ok(events)
}

fn collect_events(components: &[Component<'_>], events: &mut Vec<RawEvent>) {
    for component in components {
        if component.name == "VEVENT" {
            match parse_event(component) {
                Some(event) => events.push(event),
                None => tracing::debug!("skipping VEVENT without a usable DTSTART"),
            }
        } else {
            collect_events(&component.components, events);
        }
    }
}

fn parse_event(vevent: &Component<'_>) -> Option<RawEvent> {
    let start = to_event_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);
    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_default();
    let uid = vevent.find_prop("UID").map(|p| p.val.to_string());

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();
    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    Some(RawEvent {
        uid,
        summary,
        start,
        end,
        duration,
        rrule,
        exdates,
        recurrence_id,
    })
}

fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => EventTime::Utc(dt),
            CalendarDateTime::Floating(naive) => EventTime::Floating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::Zoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// Parses an EXDATE property, which may hold several comma-separated values.
fn parse_exdate_property(prop: &Property<'_>) -> Vec<EventTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(ToString::to_string));
    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                return NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(EventTime::Date);
            }
            if let Some(utc) = s.strip_suffix('Z') {
                return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::Utc(dt.and_utc()));
            }
            let datetime = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
            Some(match &tzid {
                Some(tzid) => EventTime::Zoned {
                    datetime,
                    tzid: tzid.clone(),
                },
                None => EventTime::Floating(datetime),
            })
        })
        .collect()
}

fn parse_duration(value: &str) -> Option<TimeDelta> {
    let duration: std::time::Duration = iso8601::duration(value.trim()).ok()?.into();
    TimeDelta::from_std(duration).ok()
}

/// Reverses RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}
