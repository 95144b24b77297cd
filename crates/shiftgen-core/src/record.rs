//! Raw list records and the defensive readers used to turn loosely typed
//! column values into domain fields.

use crate::model::LookupValue;
use serde_json::Value;

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRecord {
    pub id: String,
    pub fields: Fields,
}

impl ListRecord {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn text(&self, key: &str) -> String {
        self.fields.get(key).map(value_as_string).unwrap_or_default()
    }
}

/// Renders a column value the way list UIs show it: scalars verbatim,
/// multi-choice arrays joined with commas, null as empty.
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_as_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(*flag),
        other => match value_as_string(other).to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
    }
}

pub fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Reads a lookup column, preferring the `<name>LookupId` companion over the
/// display value when both are present and non-blank.
pub fn read_lookup(fields: &Fields, name: &str) -> Option<LookupValue> {
    if name.is_empty() {
        return None;
    }

    let lookup = fields
        .get(&format!("{name}LookupId"))
        .map(value_as_string)
        .filter(|value| !value.trim().is_empty());
    if let Some(id) = lookup {
        return Some(LookupValue::Id(id));
    }

    fields
        .get(name)
        .map(value_as_string)
        .filter(|value| !value.trim().is_empty())
        .map(LookupValue::Display)
}

/// First key that exists on the record, regardless of its value.
pub fn read_any<'a>(fields: &'a Fields, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter(|key| !key.is_empty())
        .find_map(|key| fields.get(*key))
}

/// First key whose trimmed string value is non-empty.
pub fn pick_first(fields: &Fields, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter(|key| !key.is_empty())
        .filter_map(|key| fields.get(*key))
        .map(|value| value_as_string(value).trim().to_owned())
        .find(|value| !value.is_empty())
}

pub fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().expect("object fixture")
    }

    #[test]
    fn lookup_id_wins_over_display_value() {
        let record = fields(json!({ "driverId": "Ada Lovelace", "driverIdLookupId": 12 }));
        assert_eq!(
            read_lookup(&record, "driverId"),
            Some(LookupValue::Id("12".to_owned()))
        );

        let display_only = fields(json!({ "driverId": "Ada Lovelace", "driverIdLookupId": " " }));
        assert_eq!(
            read_lookup(&display_only, "driverId"),
            Some(LookupValue::Display("Ada Lovelace".to_owned()))
        );
        assert_eq!(read_lookup(&fields(json!({})), "driverId"), None);
        assert_eq!(read_lookup(&record, ""), None);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(value_as_bool(&json!(true)), Some(true));
        assert_eq!(value_as_bool(&json!("Yes")), Some(true));
        assert_eq!(value_as_bool(&json!(0)), Some(false));
        assert_eq!(value_as_bool(&json!("NO")), Some(false));
        assert_eq!(value_as_bool(&json!("maybe")), None);
        assert_eq!(value_as_bool(&Value::Null), None);
    }

    #[test]
    fn multi_choice_arrays_render_joined() {
        assert_eq!(value_as_string(&json!(["accepted"])), "accepted");
        assert_eq!(value_as_string(&json!(["Mon", "Wed"])), "Mon,Wed");
        assert_eq!(value_as_string(&json!(12)), "12");
    }

    #[test]
    fn pick_first_skips_blank_values() {
        let record = fields(json!({ "field_1": "  ", "Plate": "AB-123" }));
        assert_eq!(
            pick_first(&record, &["field_1", "Plate", "Title"]).as_deref(),
            Some("AB-123")
        );
        assert_eq!(read_any(&record, &["", "field_1"]), Some(&json!("  ")));
    }

    #[test]
    fn numbers_parse_from_strings() {
        assert_eq!(value_as_number(&json!("3")), Some(3.0));
        assert_eq!(value_as_number(&json!(2.5)), Some(2.5));
        assert_eq!(value_as_number(&json!("x")), None);
    }
}
