use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::meetup::{Event, Venue};

/// Same layout as Go's `time.ANSIC`: `Mon Jan  2 15:04:05 2006`.
const EVENT_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

pub fn format_next_event(event: &Event) -> String {
    format!(
        "Next event: `{}` - {}{}\n{}",
        event.name,
        format_event_time(event.time, event.utc_offset),
        venue_clause(event.venue.as_ref()),
        event.link
    )
}

/// Renders epoch milliseconds in the event's own UTC offset.
pub fn format_event_time(time_ms: i64, utc_offset_ms: i64) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(time_ms) else {
        return time_ms.to_string();
    };

    let offset = i32::try_from(utc_offset_ms / 1000)
        .ok()
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());

    utc.with_timezone(&offset)
        .format(EVENT_TIME_FORMAT)
        .to_string()
}

fn venue_clause(venue: Option<&Venue>) -> String {
    match venue {
        Some(venue) if !venue.name.is_empty() => {
            if venue.address_1.is_empty() {
                format!("\nAt: `{}`", venue.name)
            } else {
                format!(
                    "\nAt: `{}` - {} {}, {} {}",
                    venue.name, venue.address_1, venue.city, venue.state, venue.zip
                )
            }
        }
        _ => String::new(),
    }
}
