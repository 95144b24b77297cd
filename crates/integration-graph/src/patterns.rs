//! Recurring shift patterns read from the pattern list. Column names vary
//! between sites, so every field is read from the configured name first and
//! then from the names Microsoft Lists commonly generates.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use shiftgen_core::{
    non_blank, read_any, value_as_string, ItemId, ListId, ListQuery, ListRecord, ListStore,
    PatternCatalog, Reference, ReferenceResolver, ShiftError, ShiftPattern, WorkspaceId,
};
use tracing::{debug, warn};

use crate::config::PatternFieldNames;

const WEEKDAY_PREFIXES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

pub struct GraphPatternCatalog {
    store: Arc<dyn ListStore>,
    list: ListId,
    fields: PatternFieldNames,
    resolver: Arc<dyn ReferenceResolver>,
}

impl GraphPatternCatalog {
    pub fn new(
        store: Arc<dyn ListStore>,
        list: ListId,
        fields: PatternFieldNames,
        resolver: Arc<dyn ReferenceResolver>,
    ) -> Self {
        Self {
            store,
            list,
            fields,
            resolver,
        }
    }

    /// Route names of the templates that patterns without their own route
    /// name point at. Failed lookups are skipped.
    async fn template_route_names(&self, drafts: &[PatternDraft]) -> HashMap<Reference, String> {
        let templates = drafts
            .iter()
            .filter(|draft| draft.route_name.is_none())
            .filter_map(|draft| draft.template_id.clone())
            .collect::<BTreeSet<_>>();

        let lookups = templates.into_iter().map(|template| async move {
            match self.resolver.template_defaults(&template).await {
                Ok(defaults) => defaults
                    .route_name
                    .and_then(|name| non_blank(name.trim().to_owned()))
                    .map(|name| (template, name)),
                Err(error) => {
                    warn!(template = %template, error = %error, "template route name lookup failed");
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }
}

#[async_trait]
impl PatternCatalog for GraphPatternCatalog {
    async fn list_patterns(
        &self,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Vec<ShiftPattern>, ShiftError> {
        let records = self
            .store
            .list_items(&self.list, &ListQuery::default())
            .await?;
        let drafts = records
            .iter()
            .map(|record| PatternDraft::read(record, &self.fields))
            .collect::<Vec<_>>();

        let template_names = self.template_route_names(&drafts).await;

        let route_ids = drafts
            .iter()
            .map(|draft| draft.route.trim())
            .filter(|route| !route.is_empty())
            .map(Reference::new)
            .collect::<BTreeSet<_>>();
        let route_titles = if route_ids.is_empty() {
            HashMap::new()
        } else {
            self.resolver.resolve_route_titles(&route_ids).await?
        };

        let patterns = drafts
            .into_iter()
            .map(|draft| draft.finish(&template_names, &route_titles))
            .filter(ShiftPattern::is_usable)
            .collect::<Vec<_>>();

        let patterns = filter_by_workspace(patterns, workspace);
        debug!(
            list = %self.list,
            records = records.len(),
            patterns = patterns.len(),
            "shift patterns loaded"
        );
        Ok(patterns)
    }
}

/// Only filters when at least one pattern carries a workspace; sites
/// without that column share every pattern.
pub fn filter_by_workspace(
    patterns: Vec<ShiftPattern>,
    workspace: Option<&WorkspaceId>,
) -> Vec<ShiftPattern> {
    let Some(workspace) = workspace else {
        return patterns;
    };
    if !patterns.iter().any(|pattern| pattern.workspace_id.is_some()) {
        return patterns;
    }
    patterns
        .into_iter()
        .filter(|pattern| pattern.workspace_id.as_ref() == Some(workspace))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PatternDraft {
    id: String,
    route: String,
    route_name: Option<String>,
    title: Option<String>,
    shift_type: String,
    week_part: Option<String>,
    weekdays: Vec<u32>,
    start_time: String,
    end_time: String,
    workspace_id: Option<String>,
    template_id: Option<Reference>,
}

impl PatternDraft {
    fn read(record: &ListRecord, names: &PatternFieldNames) -> Self {
        let fields = &record.fields;
        let text = |keys: &[&str]| read_any(fields, keys).map(value_as_string).unwrap_or_default();
        let trimmed = |keys: &[&str]| non_blank(text(keys).trim().to_owned());
        let configured = |name: &str| {
            if name.is_empty() {
                None
            } else {
                fields.get(name).map(value_as_string).and_then(non_blank)
            }
        };

        let template_id = configured(&names.template_id)
            .or_else(|| non_blank(text(&[names.template_id.as_str(), "ShiftLookupId", "Shift"])))
            .map(Reference::new);

        Self {
            id: record.id.clone(),
            route: text(&[names.route.as_str(), "RouteLookupId", "Route"]),
            route_name: trimmed(&[
                names.route_name.as_str(),
                "routeName",
                "RouteName",
                "routeTitle",
                "RouteTitle",
            ]),
            title: trimmed(&["Title", "LinkTitle", "LinkTitleNoMenu"]),
            shift_type: normalize_shift_type(&text(&[names.shift_type.as_str(), "Type0"])),
            week_part: normalize_week_part(&text(&[
                names.week_part.as_str(),
                "ShiftType",
                "WeekPart",
                "WeekType",
                "DayType",
            ])),
            weekdays: parse_weekdays(read_any(fields, &[names.day_of_week.as_str(), "DayOfWeek"])),
            start_time: text(&[names.start_time.as_str(), "field_5", "StartTime"]),
            end_time: text(&[names.end_time.as_str(), "field_6", "EndTime"]),
            workspace_id: configured(&names.workspace_id),
            template_id,
        }
    }

    fn finish(
        self,
        template_names: &HashMap<Reference, String>,
        route_titles: &HashMap<Reference, String>,
    ) -> ShiftPattern {
        let template_name = self
            .template_id
            .as_ref()
            .and_then(|template| template_names.get(template))
            .cloned();
        let route_name = template_name
            .or(self.route_name)
            .or(self.title)
            .and_then(|name| non_blank(name.trim().to_owned()));
        let route = route_titles
            .get(&Reference::new(self.route.trim()))
            .cloned()
            .unwrap_or(self.route);

        ShiftPattern {
            id: ItemId::new(self.id),
            route,
            route_name,
            shift_type: self.shift_type,
            week_part: self.week_part,
            weekdays: self.weekdays,
            start_time: self.start_time,
            end_time: self.end_time,
            workspace_id: self.workspace_id.map(WorkspaceId::new),
            template_id: self.template_id,
        }
    }
}

/// Known shift types are lower-cased; anything else is kept verbatim.
pub fn normalize_shift_type(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    match lowered.as_str() {
        "morning" | "evening" | "single" => lowered,
        _ => raw.to_owned(),
    }
}

pub fn normalize_week_part(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.to_lowercase().as_str() {
        "weekday" | "weekdays" | "workday" | "workdays" | "work days" => {
            Some("weekdays".to_owned())
        }
        "weekend" | "weekends" => Some("weekend".to_owned()),
        _ => Some(raw.to_owned()),
    }
}

/// Day names from a single value or a multi-choice array, matched on their
/// first three letters. Sunday is 0. Unknown names are dropped.
pub fn parse_weekdays(value: Option<&Value>) -> Vec<u32> {
    let names = match value {
        Some(Value::Array(items)) => items.iter().map(value_as_string).collect::<Vec<_>>(),
        Some(other) => vec![value_as_string(other)],
        None => Vec::new(),
    };

    let mut days = Vec::new();
    for name in names {
        let prefix = name.trim().to_lowercase().chars().take(3).collect::<String>();
        let Some(day) = WEEKDAY_PREFIXES.iter().position(|known| *known == prefix) else {
            continue;
        };
        let day = day as u32;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(value: Value) -> PatternDraft {
        let record = ListRecord::new("5", value.as_object().cloned().expect("object fixture"));
        PatternDraft::read(&record, &PatternFieldNames::default())
    }

    #[test]
    fn weekdays_parse_single_values_and_arrays() {
        assert_eq!(parse_weekdays(Some(&json!("Monday"))), vec![1]);
        assert_eq!(
            parse_weekdays(Some(&json!(["Mon", "wed", "FRIDAY", "Mon", "Funday"]))),
            vec![1, 3, 5]
        );
        assert_eq!(parse_weekdays(Some(&json!("Sun"))), vec![0]);
        assert!(parse_weekdays(None).is_empty());
        assert!(parse_weekdays(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn shift_types_and_week_parts_normalise() {
        assert_eq!(normalize_shift_type(" Morning "), "morning");
        assert_eq!(normalize_shift_type("Split"), "Split");
        assert_eq!(normalize_week_part("Work days").as_deref(), Some("weekdays"));
        assert_eq!(normalize_week_part("Weekends").as_deref(), Some("weekend"));
        assert_eq!(normalize_week_part("Holidays").as_deref(), Some("Holidays"));
        assert_eq!(normalize_week_part("  "), None);
    }

    #[test]
    fn drafts_fall_back_to_generated_column_names() {
        let draft = draft(json!({
            "RouteLookupId": 8,
            "Title": "Harbour",
            "Type0": "Evening",
            "ShiftType": "Weekdays",
            "DayOfWeek": ["Tue", "Thu"],
            "field_5": "15:00",
            "field_6": "22:00",
            "ShiftLookupId": "30",
        }));
        assert_eq!(draft.route, "8");
        assert_eq!(draft.route_name, None);
        assert_eq!(draft.title.as_deref(), Some("Harbour"));
        assert_eq!(draft.shift_type, "evening");
        assert_eq!(draft.week_part.as_deref(), Some("weekdays"));
        assert_eq!(draft.weekdays, vec![2, 4]);
        assert_eq!(draft.start_time, "15:00");
        assert_eq!(draft.end_time, "22:00");
        assert_eq!(draft.template_id, Some(Reference::new("30")));
        assert_eq!(draft.workspace_id, None);
    }

    #[test]
    fn configured_names_win_over_fallbacks() {
        let draft = draft(json!({
            "route": "R1",
            "RouteLookupId": 8,
            "routeName": "  ",
            "RouteName": "Ignored",
            "shiftType": "single",
            "dayOfWeek": "Saturday",
            "startTime": "06:00",
            "endTime": "10:00",
        }));
        assert_eq!(draft.route, "R1");
        assert_eq!(draft.route_name, None);
        assert_eq!(draft.shift_type, "single");
        assert_eq!(draft.weekdays, vec![6]);
    }

    #[test]
    fn finish_prefers_template_route_name_and_resolves_route_titles() {
        let draft = draft(json!({
            "RouteLookupId": 8,
            "routeName": "Own name",
            "Type0": "morning",
            "DayOfWeek": "Mon",
            "field_5": "06:00",
            "field_6": "14:00",
            "ShiftLookupId": "30",
        }));
        let template_names = HashMap::from([(Reference::new("30"), "Template name".to_owned())]);
        let route_titles = HashMap::from([(Reference::new("8"), "R8".to_owned())]);

        let pattern = draft.clone().finish(&template_names, &route_titles);
        assert_eq!(pattern.route, "R8");
        assert_eq!(pattern.route_name.as_deref(), Some("Template name"));

        let own = draft.finish(&HashMap::new(), &HashMap::new());
        assert_eq!(own.route, "8");
        assert_eq!(own.route_name.as_deref(), Some("Own name"));
    }

    #[test]
    fn workspace_filter_applies_only_when_patterns_carry_workspaces() {
        let mut south = shiftgen_core::test_support::pattern("1", "morning", &[1]);
        south.workspace_id = Some(WorkspaceId::new("south"));
        let shared = shiftgen_core::test_support::pattern("2", "morning", &[1]);
        let target = WorkspaceId::new("south");

        let filtered = filter_by_workspace(vec![south.clone(), shared.clone()], Some(&target));
        assert_eq!(filtered, vec![south]);

        let unfiltered = filter_by_workspace(vec![shared.clone()], Some(&target));
        assert_eq!(unfiltered, vec![shared.clone()]);
        assert_eq!(filter_by_workspace(vec![shared.clone()], None), vec![shared]);
    }
}
