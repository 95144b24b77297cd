//! Trip-template rows: which shift template a trip belongs to, its label,
//! time window, bus override and timeline events.

use serde_json::Value;
use shiftgen_core::{
    pick_first, value_as_number, value_as_string, Fields, ListRecord, Reference, Trip, TripEvent,
};

/// Optional column overrides for the trip-template list; blank means "use the
/// common names".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripTemplateFieldNames {
    pub template_id: String,
    pub name: String,
    pub time: String,
    pub start: String,
    pub end: String,
    pub bus_override: String,
    pub events: String,
}

const TEMPLATE_KEYS: [&str; 8] = [
    "templateId",
    "Template",
    "TemplateLookupId",
    "TemplateId",
    "ShiftTemplate",
    "ShiftTemplateLookupId",
    "ShiftLookupId",
    "Shift",
];
const NAME_KEYS: [&str; 6] = ["Title", "name", "Name", "TripName", "tripName", "LinkTitle"];
const TIME_KEYS: [&str; 4] = ["time", "Time", "TimeRange", "timeRange"];
const START_KEYS: [&str; 5] = ["field_3", "startTime", "StartTime", "start", "Start"];
const END_KEYS: [&str; 5] = ["field_4", "endTime", "EndTime", "end", "End"];
const BUS_OVERRIDE_KEYS: [&str; 7] = [
    "busOverride",
    "BusOverride",
    "bus",
    "Bus",
    "BusLookupId",
    "BusPlate",
    "Plate",
];
const ORDER_KEYS: [&str; 4] = ["SortOrder", "sortOrder", "Order", "order"];
const EVENT_KEYS: [&str; 6] = ["events", "Events", "EventsJson", "eventsJson", "Stops", "stops"];

/// A parsed trip plus what is needed to group and order it.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRow {
    pub template: Reference,
    pub sort_key: f64,
    pub trip: Trip,
}

impl TripRow {
    /// `None` when the row cannot be tied to a template.
    pub fn parse(record: &ListRecord, names: &TripTemplateFieldNames) -> Option<Self> {
        let fields = &record.fields;
        let template = read_template_id(fields, &names.template_id)?;

        let name = pick_first(fields, &with_override(&names.name, &NAME_KEYS))
            .unwrap_or_else(|| format!("Trip {}", record.id));
        let time = trip_time(fields, names);
        let bus_override = pick_first(fields, &with_override(&names.bus_override, &BUS_OVERRIDE_KEYS));

        let sort_key = ORDER_KEYS
            .iter()
            .filter_map(|key| fields.get(*key))
            .find_map(value_as_number)
            .or_else(|| start_minutes(&time))
            .unwrap_or(f64::MAX);

        Some(Self {
            template: Reference::new(template),
            sort_key,
            trip: Trip {
                name,
                time,
                trip_item_id: Some(record.id.clone()),
                bus_override,
                events: read_events(fields, &names.events),
            },
        })
    }
}

fn with_override<'a>(configured: &'a str, defaults: &[&'a str]) -> Vec<&'a str> {
    let configured = configured.trim();
    let mut keys = Vec::with_capacity(defaults.len() + 1);
    if !configured.is_empty() {
        keys.push(configured);
    }
    keys.extend_from_slice(defaults);
    keys
}

/// Template lookup id of a trip row. Each candidate is tried bare and as its
/// `<key>LookupId` companion; failing that, any numeric `*LookupId` column
/// whose name mentions a template.
pub fn read_template_id(fields: &Fields, configured: &str) -> Option<String> {
    for key in with_override(configured, &TEMPLATE_KEYS) {
        let direct = pick_first(fields, &[key]);
        if direct.is_some() {
            return direct;
        }
        let lookup = pick_first(fields, &[format!("{key}LookupId").as_str()]);
        if lookup.is_some() {
            return lookup;
        }
    }

    fields
        .iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            key.ends_with("lookupid") && key.contains("template")
        })
        .map(|(_, value)| value_as_string(value).trim().to_owned())
        .find(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
}

fn trip_time(fields: &Fields, names: &TripTemplateFieldNames) -> String {
    let range = pick_first(fields, &with_override(&names.time, &TIME_KEYS))
        .map(|raw| normalize_time_range(&raw))
        .unwrap_or_default();
    if !range.is_empty() {
        return range;
    }

    let start = pick_first(fields, &with_override(&names.start, &START_KEYS))
        .and_then(|raw| normalize_clock(&raw));
    let end = pick_first(fields, &with_override(&names.end, &END_KEYS))
        .and_then(|raw| normalize_clock(&raw));
    match (start, end) {
        (Some(start), Some(end)) => format!("{start}–{end}"),
        _ => String::new(),
    }
}

/// `H:MM` or `HH:MM` to zero-padded `HH:MM`.
pub fn normalize_clock(raw: &str) -> Option<String> {
    let (hours, minutes) = raw.trim().split_once(':')?;
    let valid_hours = (1..=2).contains(&hours.len()) && hours.chars().all(|c| c.is_ascii_digit());
    let valid_minutes = minutes.len() == 2 && minutes.chars().all(|c| c.is_ascii_digit());
    if !valid_hours || !valid_minutes {
        return None;
    }
    let hours = hours.parse::<u32>().ok()?;
    Some(format!("{hours:02}:{minutes}"))
}

/// Splits on any dash and rebuilds `HH:MM–HH:MM`. Text that does not look
/// like a range is returned trimmed but otherwise untouched.
pub fn normalize_time_range(raw: &str) -> String {
    let raw = raw.trim();
    let parts = raw
        .split(['-', '–', '—'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.len() < 2 {
        return raw.to_owned();
    }
    match (normalize_clock(parts[0]), normalize_clock(parts[1])) {
        (Some(start), Some(end)) => format!("{start}–{end}"),
        _ => raw.to_owned(),
    }
}

fn start_minutes(time: &str) -> Option<f64> {
    let clock = time.get(..5)?;
    let (hours, minutes) = clock.split_once(':')?;
    if hours.len() != 2 {
        return None;
    }
    let hours = hours.parse::<u32>().ok()?;
    let minutes = minutes.parse::<u32>().ok()?;
    Some(f64::from(hours * 60 + minutes))
}

/// Events stored either as a JSON array column or as JSON text.
fn read_events(fields: &Fields, configured: &str) -> Vec<TripEvent> {
    for key in with_override(configured, &EVENT_KEYS) {
        let Some(raw) = fields.get(key) else {
            continue;
        };
        let parsed = match raw {
            Value::Array(items) => Some(items.clone()),
            other => {
                let text = value_as_string(other);
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    match serde_json::from_str::<Value>(text) {
                        Ok(Value::Array(items)) => Some(items),
                        _ => None,
                    }
                }
            }
        };
        if let Some(items) = parsed {
            return items.iter().filter_map(event_from_value).collect();
        }
    }
    Vec::new()
}

fn event_from_value(value: &Value) -> Option<TripEvent> {
    let object = value.as_object()?;
    let label = object.get("label").map(value_as_string).unwrap_or_default();
    let kind = object.get("type").map(value_as_string).unwrap_or_default();
    match kind.trim().to_ascii_lowercase().as_str() {
        "stop" => Some(TripEvent::Stop {
            time: object
                .get("time")
                .map(value_as_string)
                .map(|time| normalize_clock(&time).unwrap_or(time))
                .filter(|time| !time.trim().is_empty()),
            label,
        }),
        "break" => Some(TripEvent::Break {
            duration_minutes: object
                .get("duration")
                .and_then(value_as_number)
                .filter(|minutes| *minutes >= 0.0)
                .map(|minutes| minutes.round() as u32),
            label,
        }),
        _ => None,
    }
}
