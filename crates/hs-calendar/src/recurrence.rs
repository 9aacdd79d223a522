//! RRULE expansion for recurring events.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use rrule::{RRuleError, RRuleSet};

use crate::parse::EventTime;

/// Upper bound on generated instances per master event.
const MAX_INSTANCES: u16 = 1000;

/// Expands a master event's RRULE into instance start times that fall in
/// `[range_start, range_end]`.
///
/// Floating starts, and zones chrono-tz does not know, are read as wall time
/// in `zone`. EXDATEs are excluded by the rule set. Date-only masters
/// produce nothing.
pub fn expand(
    start: &EventTime,
    rrule: &str,
    exdates: &[EventTime],
    zone: Tz,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, RRuleError> {
    let Some(dtstart) = format_time("DTSTART", start, zone) else {
        return Ok(Vec::new());
    };

    let mut lines = vec![dtstart, format!("RRULE:{rrule}")];
    lines.extend(
        exdates
            .iter()
            .filter_map(|exdate| format_time("EXDATE", exdate, zone)),
    );

    let rule_set: RRuleSet = lines.join("\n").parse()?;

    // after/before are exclusive.
    let tz: rrule::Tz = Utc.into();
    let after = (range_start - TimeDelta::seconds(1)).with_timezone(&tz);
    let before = (range_end + TimeDelta::seconds(1)).with_timezone(&tz);

    let result = rule_set.after(after).before(before).all(MAX_INSTANCES);
    if result.limited {
        tracing::warn!(rrule, "recurrence expansion hit the instance limit");
    }

    Ok(result
        .dates
        .iter()
        .map(|occurrence| occurrence.with_timezone(&Utc))
        .collect())
}

fn format_time(name: &str, time: &EventTime, zone: Tz) -> Option<String> {
    const LOCAL: &str = "%Y%m%dT%H%M%S";
    match time {
        EventTime::Date(_) => None,
        EventTime::Utc(dt) => Some(format!("{name}:{}", dt.format("%Y%m%dT%H%M%SZ"))),
        EventTime::Floating(naive) => Some(format!(
            "{name};TZID={}:{}",
            zone.name(),
            naive.format(LOCAL)
        )),
        EventTime::Zoned { datetime, tzid } => {
            let tzid = tzid
                .parse::<Tz>()
                .map_or_else(|_| zone.name().to_string(), |tz| tz.name().to_string());
            Some(format!("{name};TZID={tzid}:{}", datetime.format(LOCAL)))
        }
    }
}
