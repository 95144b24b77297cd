//! Stops-template rows: per-trip stop and break events kept in their own
//! list, used for trips whose template row carries no events.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use shiftgen_core::{pick_first, value_as_string, Fields, ListRecord, TripEvent};

use crate::store::ListColumn;

/// Optional column overrides for the stops-template list. Blank means "use the
/// common names".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopTemplateFieldNames {
    pub trip_id: String,
    pub stop_name: String,
    pub time: String,
    pub sort_order: String,
    pub event_type: String,
    pub duration: String,
}

const TRIP_KEYS: [&str; 4] = ["Trip", "TripLookupId", "trip", "tripLookupId"];
const LABEL_KEYS: [&str; 4] = ["field_1", "StopName", "Title", "LinkTitle"];
const TIME_KEYS: [&str; 3] = ["field_2", "Time", "time"];
const SORT_KEYS: [&str; 6] = ["SortOrder", "sortOrder", "Order", "order", "Sequence", "sequence"];
const TYPE_KEYS: [&str; 4] = ["EventType", "eventType", "Type", "type"];
const DURATION_KEYS: [&str; 6] = [
    "Duration",
    "duration",
    "DurationMin",
    "durationMin",
    "Minutes",
    "minutes",
];

const SORT_ALIASES: [&str; 3] = ["sortorder", "order", "sequence"];
const TYPE_ALIASES: [&str; 2] = ["eventtype", "type"];
const DURATION_ALIASES: [&str; 3] = ["duration", "minutes", "breakduration"];

const BREAK_WORDS: [&str; 5] = ["break", "pause", "rest", "lunch", "meal"];
const STOP_WORDS: [&str; 2] = ["stop", "drive"];
const MAX_BREAK_MINUTES: f64 = 600.0;
const UNORDERED: f64 = 1_000_000.0;

/// Internal names of columns whose display names match the sort, type and
/// duration aliases. Lists created by hand often carry these as `field_N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopColumnKeys {
    pub sort_order: Option<String>,
    pub event_type: Option<String>,
    pub duration: Option<String>,
}

impl StopColumnKeys {
    pub fn resolve(columns: &[ListColumn]) -> Self {
        let find = |aliases: &[&str]| {
            columns
                .iter()
                .filter(|column| {
                    !column.name.trim().is_empty() && !column.display_name.trim().is_empty()
                })
                .find(|column| {
                    let key = normalize_column_key(&column.display_name);
                    aliases.contains(&key.as_str())
                })
                .map(|column| column.name.trim().to_owned())
        };

        Self {
            sort_order: find(&SORT_ALIASES),
            event_type: find(&TYPE_ALIASES),
            duration: find(&DURATION_ALIASES),
        }
    }
}

/// Lowercase with whitespace and punctuation removed: `"Break Duration"`
/// becomes `"breakduration"`.
pub fn normalize_column_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Unwraps SharePoint `id;#text` lookup encoding, preferring the first
/// non-numeric part.
pub fn decode_lookup_text(raw: &str) -> String {
    if !raw.contains(";#") {
        return raw.to_owned();
    }
    let parts = raw
        .split(";#")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    parts
        .iter()
        .find(|part| part.parse::<f64>().is_err())
        .or_else(|| parts.first())
        .map(|part| (*part).to_owned())
        .unwrap_or_default()
}

/// Minutes from a number, `H:MM` text, or the first number in free text such
/// as `"20 min"`. Decimal commas are accepted.
pub fn parse_duration_minutes(value: &Value) -> Option<f64> {
    if let Value::Number(number) = value {
        return number.as_f64();
    }
    let text = decode_lookup_text(&value_as_string(value)).replace(',', ".");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(minutes) = text.parse::<f64>() {
        return minutes.is_finite().then_some(minutes);
    }
    if let Some((hours, minutes)) = text.split_once([':', '.']) {
        let clock = (1..=2).contains(&hours.len())
            && minutes.len() == 2
            && hours.chars().chain(minutes.chars()).all(|c| c.is_ascii_digit());
        if clock {
            let hours = hours.parse::<f64>().ok()?;
            let minutes = minutes.parse::<f64>().ok()?;
            return Some(hours * 60.0 + minutes);
        }
    }
    first_number(text, false)
}

/// `HH:MM` from `7:05`, `07.05`, `7 : 05` or bare `705`/`0705`.
pub fn normalize_stop_time(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some((hours, minutes)) = clock_in(raw) {
        return valid_clock(hours, minutes);
    }
    if (3..=4).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_digit()) {
        let padded = format!("{raw:0>4}");
        let hours = padded[..2].parse().ok()?;
        let minutes = padded[2..].parse().ok()?;
        return valid_clock(hours, minutes);
    }
    None
}

fn valid_clock(hours: u32, minutes: u32) -> Option<String> {
    (hours <= 23 && minutes <= 59).then(|| format!("{hours:02}:{minutes:02}"))
}

/// Leftmost `d{1,2} [:.] dd` in `text`, whitespace allowed around the
/// separator.
fn clock_in(text: &str) -> Option<(u32, u32)> {
    let bytes = text.as_bytes();
    let digits = |from: usize, len: usize| {
        bytes
            .get(from..from + len)
            .filter(|slice| slice.iter().all(u8::is_ascii_digit))
            .and_then(|slice| std::str::from_utf8(slice).ok())
            .and_then(|slice| slice.parse::<u32>().ok())
    };
    let skip_spaces = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_whitespace) {
            at += 1;
        }
        at
    };

    for start in 0..bytes.len() {
        for len in [2, 1] {
            let Some(hours) = digits(start, len) else {
                continue;
            };
            let at = skip_spaces(start + len);
            if !matches!(bytes.get(at), Some(b':') | Some(b'.')) {
                continue;
            }
            let at = skip_spaces(at + 1);
            if let Some(minutes) = digits(at, 2) {
                return Some((hours, minutes));
            }
        }
    }
    None
}

fn clock_minutes(clock: &str) -> Option<f64> {
    let (hours, minutes) = clock.split_once(':')?;
    Some(hours.parse::<f64>().ok()? * 60.0 + minutes.parse::<f64>().ok()?)
}

/// First `-?d+(.d+)?` in `text`.
fn first_number(text: &str, signed: bool) -> Option<f64> {
    let chars = text.char_indices().collect::<Vec<_>>();
    let start = chars.iter().position(|(_, c)| c.is_ascii_digit())?;
    let mut begin = chars[start].0;
    if signed && start > 0 && chars[start - 1].1 == '-' {
        begin = chars[start - 1].0;
    }

    let mut end = start;
    while chars.get(end).is_some_and(|(_, c)| c.is_ascii_digit()) {
        end += 1;
    }
    let fraction = chars.get(end).is_some_and(|(_, c)| *c == '.')
        && chars.get(end + 1).is_some_and(|(_, c)| c.is_ascii_digit());
    if fraction {
        end += 1;
        while chars.get(end).is_some_and(|(_, c)| c.is_ascii_digit()) {
            end += 1;
        }
    }
    let stop = chars.get(end).map(|(index, _)| *index).unwrap_or(text.len());
    text[begin..stop].parse().ok()
}

fn sort_number(value: &Value) -> Option<f64> {
    if let Value::Number(number) = value {
        return number.as_f64();
    }
    let text = decode_lookup_text(&value_as_string(value)).replace(',', ".");
    first_number(&text, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Stop,
    Break,
}

fn candidate_keys<'a>(
    configured: &'a str,
    resolved: Option<&'a str>,
    defaults: &[&'a str],
) -> Vec<&'a str> {
    let mut keys = Vec::with_capacity(defaults.len() + 2);
    keys.extend([configured.trim()].into_iter().filter(|key| !key.is_empty()));
    keys.extend(resolved.map(str::trim).filter(|key| !key.is_empty()));
    keys.extend_from_slice(defaults);
    keys
}

fn row_kind(fields: &Fields, keys: &[&str]) -> Option<RowKind> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .map(|value| decode_lookup_text(&value_as_string(value)).to_lowercase())
        .find_map(|kind| {
            if BREAK_WORDS.iter().any(|word| kind.contains(word)) {
                Some(RowKind::Break)
            } else if STOP_WORDS.iter().any(|word| kind.contains(word)) {
                Some(RowKind::Stop)
            } else {
                None
            }
        })
}

fn trip_id(fields: &Fields, configured: &str) -> Option<String> {
    candidate_keys(configured, None, &TRIP_KEYS)
        .into_iter()
        .find_map(|key| {
            pick_first(fields, &[key])
                .or_else(|| pick_first(fields, &[format!("{key}LookupId").as_str()]))
        })
}

#[derive(Default)]
struct TripProgress {
    breaks_since_stop: u32,
    last_timed_stop: Option<f64>,
}

struct PlacedEvent {
    sort_key: f64,
    item: f64,
    event: TripEvent,
}

/// Stop and break events per trip item id for the trips in `trip_ids`.
///
/// Rows are read in item id order. A row is a break when its type says so,
/// or when it has no recognisable type but carries a duration or an all-digit
/// time. Breaks without their own sort order or clock time are placed just
/// after the last timed stop before them.
pub fn stops_for_trips(
    records: &[ListRecord],
    trip_ids: &BTreeSet<String>,
    names: &StopTemplateFieldNames,
    columns: &StopColumnKeys,
) -> HashMap<String, Vec<TripEvent>> {
    let label_keys = candidate_keys(&names.stop_name, None, &LABEL_KEYS);
    let time_keys = candidate_keys(&names.time, None, &TIME_KEYS);
    let sort_keys = candidate_keys(&names.sort_order, columns.sort_order.as_deref(), &SORT_KEYS);
    let type_keys = candidate_keys(&names.event_type, columns.event_type.as_deref(), &TYPE_KEYS);
    let duration_keys =
        candidate_keys(&names.duration, columns.duration.as_deref(), &DURATION_KEYS);

    let numeric_id = |record: &ListRecord| record.id.trim().parse::<f64>().ok();
    let mut ordered = records.iter().collect::<Vec<_>>();
    ordered.sort_by(|left, right| match (numeric_id(*left), numeric_id(*right)) {
        (Some(left), Some(right)) => left.total_cmp(&right),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut progress: HashMap<String, TripProgress> = HashMap::new();
    let mut placed: HashMap<String, Vec<PlacedEvent>> = HashMap::new();

    for record in ordered {
        let fields = &record.fields;
        let Some(trip) = trip_id(fields, &names.trip_id).filter(|trip| trip_ids.contains(trip))
        else {
            continue;
        };

        let item = numeric_id(record).unwrap_or(UNORDERED);
        let unordered = UNORDERED + item / 1000.0;
        let label = pick_first(fields, &label_keys)
            .map(|label| decode_lookup_text(&label))
            .unwrap_or_default();
        let time_raw = pick_first(fields, &time_keys).unwrap_or_default();
        let time = normalize_stop_time(&time_raw);
        let sort_order = sort_keys
            .iter()
            .filter_map(|key| fields.get(*key))
            .find_map(sort_number);
        let kind = row_kind(fields, &type_keys);
        let duration = duration_keys
            .iter()
            .filter_map(|key| fields.get(*key))
            .find_map(parse_duration_minutes);
        let numeric_time = (!time_raw.is_empty() && time_raw.chars().all(|c| c.is_ascii_digit()))
            .then(|| time_raw.parse::<f64>().ok())
            .flatten();

        let is_break = kind == Some(RowKind::Break)
            || (kind.is_none() && (duration.is_some() || numeric_time.is_some()));
        let state = progress.entry(trip.clone()).or_default();

        let entry = if is_break {
            let in_range = |minutes: &f64| {
                minutes.is_finite() && *minutes > 0.0 && *minutes <= MAX_BREAK_MINUTES
            };
            let Some(minutes) = duration.or(numeric_time).filter(in_range) else {
                continue;
            };
            state.breaks_since_stop += 1;
            let offset = f64::from(state.breaks_since_stop) * 0.001;
            let starts_at = if time_raw.contains([':', '.']) {
                time.as_deref().and_then(clock_minutes)
            } else {
                None
            };
            let sort_key = sort_order
                .or_else(|| starts_at.map(|start| start + offset))
                .or_else(|| state.last_timed_stop.map(|stop| stop + offset))
                .unwrap_or(unordered);
            PlacedEvent {
                sort_key,
                item,
                event: TripEvent::Break {
                    duration_minutes: Some(minutes.round() as u32),
                    label,
                },
            }
        } else {
            let time = time.or_else(|| Some(time_raw.clone())).filter(|time| !time.is_empty());
            if label.is_empty() && time.is_none() {
                continue;
            }
            let minutes = time.as_deref().and_then(clock_minutes);
            if minutes.is_some() {
                state.last_timed_stop = minutes;
            }
            state.breaks_since_stop = 0;
            PlacedEvent {
                sort_key: sort_order.or(minutes).unwrap_or(unordered),
                item,
                event: TripEvent::Stop { time, label },
            }
        };
        placed.entry(trip).or_default().push(entry);
    }

    placed
        .into_iter()
        .map(|(trip, mut events)| {
            events.sort_by(|left, right| {
                left.sort_key
                    .total_cmp(&right.sort_key)
                    .then(left.item.total_cmp(&right.item))
            });
            (trip, events.into_iter().map(|placed| placed.event).collect())
        })
        .collect()
}
