//! Turning raw transport API records into what the board shows.

use log::debug;

use crate::config::LineDirectionRule;
use crate::platform::TransportDeparture;
use crate::Departure;

/// Why a departure is or is not shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relevance {
    Relevant,
    /// No scheduled time: the trip is cancelled.
    Cancelled,
    /// Scheduled before the fetch started.
    Departed,
    /// No line/direction rule selects it.
    NotConfigured,
}

pub fn relevance(
    departure: &TransportDeparture,
    rules: &[LineDirectionRule],
    now: i64,
) -> Relevance {
    let Some(when) = departure.scheduled_time else {
        return Relevance::Cancelled;
    };
    if when < now {
        return Relevance::Departed;
    }
    if rules
        .iter()
        .any(|rule| rule.matches(&departure.line_name, &departure.direction))
    {
        Relevance::Relevant
    } else {
        Relevance::NotConfigured
    }
}

/// Remove every occurrence of each phrase, in order.
pub fn clean_text(input: &str, phrases: &[String]) -> String {
    phrases
        .iter()
        .fold(input.to_string(), |text, phrase| text.replace(phrase.as_str(), ""))
}

/// Filter one stop's API records down to display departures, keeping API
/// order. `fetch_started` is the reference for `time_left_seconds`.
pub fn select_departures(
    records: &[TransportDeparture],
    rules: &[LineDirectionRule],
    cleanup_phrases: &[String],
    fetch_started: i64,
) -> Vec<Departure> {
    let mut cancelled = 0;
    let mut departed = 0;
    let mut selected = Vec::new();

    for record in records {
        match relevance(record, rules, fetch_started) {
            Relevance::Relevant => {}
            Relevance::Cancelled => {
                cancelled += 1;
                continue;
            }
            Relevance::Departed => {
                departed += 1;
                continue;
            }
            Relevance::NotConfigured => continue,
        }

        let when = record.scheduled_time.unwrap_or(fetch_started);
        let time_left = (when - fetch_started).clamp(0, i64::from(i32::MAX)) as i32;
        selected.push(Departure {
            line_name: record.line_name.clone(),
            direction: clean_text(&record.direction, cleanup_phrases),
            time_left_seconds: time_left,
            stop_name: clean_text(&record.stop_name, cleanup_phrases),
        });
    }

    debug!(
        "{} of {} departures relevant ({cancelled} cancelled, {departed} already gone)",
        selected.len(),
        records.len()
    );
    selected
}

/// Group by stop name, stops in order of first appearance.
pub fn group_by_stop(departures: &[Departure]) -> Vec<(String, Vec<Departure>)> {
    let mut groups: Vec<(String, Vec<Departure>)> = Vec::new();
    for departure in departures {
        match groups.iter_mut().find(|(stop, _)| *stop == departure.stop_name) {
            Some((_, list)) => list.push(departure.clone()),
            None => groups.push((departure.stop_name.clone(), vec![departure.clone()])),
        }
    }
    groups
}

/// Compact "time left" label: `now`, `1m`, `12m`, `1h5m`, `2h`.
///
/// Anything under `now_threshold` seconds reads `now`; the rest of the first
/// minute rounds up to `1m`.
pub fn format_time_left(seconds: i32, now_threshold: i32) -> String {
    if seconds < 60 {
        return if seconds < now_threshold {
            "now".to_string()
        } else {
            "1m".to_string()
        };
    }

    let minutes_total = seconds / 60;
    let hours = minutes_total / 60;
    let minutes = minutes_total % 60;

    let mut formatted = String::new();
    if hours > 0 {
        formatted.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        formatted.push_str(&format!("{minutes}m"));
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{tests::SAMPLE, Config};

    fn rules() -> Vec<LineDirectionRule> {
        Config::from_toml(SAMPLE).unwrap().line_direction_rules
    }

    fn record(line: &str, direction: &str, when: Option<i64>) -> TransportDeparture {
        TransportDeparture {
            line_name: line.into(),
            direction: direction.into(),
            scheduled_time: when,
            stop_name: "S+U Eberswalder Str. (Berlin)".into(),
        }
    }

    #[test]
    fn cancelled_and_departed_are_distinct() {
        let rules = rules();
        let now = 1000;
        assert_eq!(
            relevance(&record("M10", "S+U Warschauer Str.", None), &rules, now),
            Relevance::Cancelled
        );
        assert_eq!(
            relevance(&record("M10", "S+U Warschauer Str.", Some(999)), &rules, now),
            Relevance::Departed
        );
        assert_eq!(
            relevance(&record("M10", "Nordbahnhof", Some(1200)), &rules, now),
            Relevance::NotConfigured
        );
        assert_eq!(
            relevance(&record("M10", "S+U Warschauer Str.", Some(1000)), &rules, now),
            Relevance::Relevant
        );
    }

    #[test]
    fn clean_text_removes_all_phrases() {
        let phrases = vec!["S+U ".to_string(), " (Berlin)".to_string()];
        assert_eq!(
            clean_text("S+U Eberswalder Str. (Berlin)", &phrases),
            "Eberswalder Str."
        );
        assert_eq!(clean_text("Plain", &[]), "Plain");
    }

    #[test]
    fn select_keeps_order_and_snapshots_time_left() {
        let phrases = vec!["S+U ".to_string(), " (Berlin)".to_string()];
        let records = vec![
            record("M10", "S+U Warschauer Str.", Some(1300)),
            record("M10", "S+U Warschauer Str.", None),
            record("U8", "Paracelsus-Bad", Some(1100)),
            record("U8", "S+U Wittenau", Some(1060)),
            record("M10", "S+U Warschauer Str.", Some(900)),
        ];
        let selected = select_departures(&records, &rules(), &phrases, 1000);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].line_name, "M10");
        assert_eq!(selected[0].direction, "Warschauer Str.");
        assert_eq!(selected[0].time_left_seconds, 300);
        assert_eq!(selected[0].stop_name, "Eberswalder Str.");
        assert_eq!(selected[1].line_name, "U8");
        assert_eq!(selected[1].time_left_seconds, 60);
    }

    #[test]
    fn grouping_preserves_first_appearance() {
        let dep = |stop: &str, line: &str| Departure {
            line_name: line.into(),
            direction: "x".into(),
            time_left_seconds: 60,
            stop_name: stop.into(),
        };
        let grouped = group_by_stop(&[dep("B", "1"), dep("A", "2"), dep("B", "3")]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "B");
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[0].1[1].line_name, "3");
        assert_eq!(grouped[1].0, "A");
        assert!(group_by_stop(&[]).is_empty());
    }

    #[test]
    fn time_left_labels() {
        assert_eq!(format_time_left(-30, 30), "now");
        assert_eq!(format_time_left(10, 30), "now");
        assert_eq!(format_time_left(45, 30), "1m");
        assert_eq!(format_time_left(60, 30), "1m");
        assert_eq!(format_time_left(12 * 60 + 59, 30), "12m");
        assert_eq!(format_time_left(65 * 60, 30), "1h5m");
        assert_eq!(format_time_left(2 * 3600, 30), "2h");
    }
}
