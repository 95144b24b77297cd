use crate::calendar::{midnight_utc, parse_iso_date, DateWindow};
use crate::dedup::dedupe_instances;
use crate::error::ShiftError;
use crate::identifiers::{ItemId, ListId, WorkspaceId};
use crate::model::{ConfirmationStatus, Reference, ShiftInstance};
use crate::record::{non_blank, read_lookup, value_as_bool, Fields, ListRecord};
use crate::store::{DateRangeFilter, ListQuery, ListStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Column names of the shift-instance list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFieldNames {
    pub workspace_id: String,
    pub date: String,
    pub template_id: String,
    pub pattern_id: String,
    pub driver_id: String,
    pub bus_id: String,
    pub confirmation_status: String,
    pub notes: String,
    pub generated: String,
    pub manual_override: String,
}

impl Default for InstanceFieldNames {
    fn default() -> Self {
        Self {
            workspace_id: "workspaceId".to_owned(),
            date: "date".to_owned(),
            template_id: "templateId".to_owned(),
            pattern_id: "patternId".to_owned(),
            driver_id: "driverId".to_owned(),
            bus_id: "busId".to_owned(),
            confirmation_status: "confirmationStatus".to_owned(),
            notes: "notes".to_owned(),
            generated: "generated".to_owned(),
            manual_override: "manualOverride".to_owned(),
        }
    }
}

impl InstanceFieldNames {
    fn select(&self) -> Vec<String> {
        let lookup = |name: &str| format!("{name}LookupId");
        let mut select = vec![
            self.workspace_id.clone(),
            self.date.clone(),
            self.template_id.clone(),
            lookup(&self.template_id),
            self.pattern_id.clone(),
            lookup(&self.pattern_id),
            self.driver_id.clone(),
            lookup(&self.driver_id),
            self.bus_id.clone(),
            lookup(&self.bus_id),
            self.confirmation_status.clone(),
            self.notes.clone(),
            self.generated.clone(),
            self.manual_override.clone(),
        ];
        let mut seen = std::collections::HashSet::new();
        select.retain(|name| seen.insert(name.clone()));
        select
    }
}

/// Filters for [`ShiftInstanceRepository::list`]. An explicit window takes
/// precedence over `month`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceQuery {
    pub workspace_id: Option<WorkspaceId>,
    pub month: Option<String>,
    pub window: Option<DateWindow>,
}

impl InstanceQuery {
    pub fn month(workspace_id: Option<WorkspaceId>, month: Option<String>) -> Self {
        Self {
            workspace_id,
            month,
            window: None,
        }
    }

    pub fn window(workspace_id: WorkspaceId, window: DateWindow) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            month: None,
            window: Some(window),
        }
    }

    fn resolve_window(&self) -> Result<Option<DateWindow>, ShiftError> {
        if let Some(window) = self.window {
            return Ok(Some(window));
        }
        self.month.as_deref().map(DateWindow::month).transpose()
    }
}

/// Query, dedup and field writes over the shift-instance list.
#[derive(Clone)]
pub struct ShiftInstanceRepository {
    store: Arc<dyn ListStore>,
    list_id: ListId,
    fields: InstanceFieldNames,
}

impl ShiftInstanceRepository {
    pub fn new(store: Arc<dyn ListStore>, list_id: ListId, fields: InstanceFieldNames) -> Self {
        Self {
            store,
            list_id,
            fields,
        }
    }

    pub fn fields(&self) -> &InstanceFieldNames {
        &self.fields
    }

    pub async fn list(&self, query: &InstanceQuery) -> Result<Vec<ShiftInstance>, ShiftError> {
        let window = query.resolve_window()?;
        let workspace = query
            .workspace_id
            .as_ref()
            .filter(|workspace| !workspace.as_str().is_empty());

        let mut list_query = ListQuery {
            select: self.fields.select(),
            ..ListQuery::default()
        };
        if let Some(workspace) = workspace {
            list_query
                .equals
                .push((self.fields.workspace_id.clone(), workspace.as_str().to_owned()));
        }
        if let Some(window) = window {
            list_query.date_range = Some(DateRangeFilter {
                field: self.fields.date.clone(),
                start: window.start,
                end_exclusive: window.end_exclusive,
            });
        }

        let records = match self.store.list_items(&self.list_id, &list_query).await {
            Ok(records) => records,
            Err(error) if list_query.has_filter() && error.is_non_indexed_filter_rejection() => {
                debug!(
                    list = %self.list_id,
                    error = %error,
                    "filter rejected on non-indexed column; scanning unfiltered"
                );
                self.store
                    .list_items(&self.list_id, &list_query.without_filter())
                    .await?
            }
            Err(error) => return Err(error),
        };

        let instances = records
            .iter()
            .filter_map(|record| self.instance_from_record(record))
            .filter(|instance| workspace.map_or(true, |ws| instance.workspace_id == *ws))
            .filter(|instance| window.map_or(true, |window| window.contains(instance.date)))
            .collect::<Vec<_>>();

        Ok(dedupe_instances(instances))
    }

    /// Single record, without dedup. `None` when absent or unusable.
    pub async fn get(&self, id: &ItemId) -> Result<Option<ShiftInstance>, ShiftError> {
        let record = self.store.get_item(&self.list_id, id).await?;
        Ok(record.and_then(|record| self.instance_from_record(&record)))
    }

    pub async fn create(&self, fields: Fields) -> Result<ItemId, ShiftError> {
        self.store.create_item(&self.list_id, fields).await
    }

    /// Multi-choice columns only accept a collection, even for one value.
    pub async fn set_confirmation_status(
        &self,
        id: &ItemId,
        status: ConfirmationStatus,
    ) -> Result<(), ShiftError> {
        self.store
            .patch_fields(&self.list_id, id, self.confirmation_fields(status))
            .await
    }

    pub async fn assign_driver(&self, id: &ItemId, driver: &Reference) -> Result<(), ShiftError> {
        let mut fields = Fields::new();
        fields.insert(
            lookup_column(&self.fields.driver_id),
            json!(driver.lookup_number()?),
        );
        self.store.patch_fields(&self.list_id, id, fields).await
    }

    pub fn confirmation_fields(&self, status: ConfirmationStatus) -> Fields {
        let key = &self.fields.confirmation_status;
        let mut fields = Fields::new();
        fields.insert(
            format!("{key}@odata.type"),
            Value::String("Collection(Edm.String)".to_owned()),
        );
        fields.insert(key.clone(), json!([status.as_str()]));
        fields
    }

    /// Field payload for a generated instance.
    pub fn generated_fields(
        &self,
        workspace_id: &WorkspaceId,
        date: chrono::NaiveDate,
        pattern: &Reference,
        template: Option<&Reference>,
        bus: &Reference,
    ) -> Result<Fields, ShiftError> {
        let mut fields = Fields::new();
        fields.insert(
            self.fields.workspace_id.clone(),
            Value::String(workspace_id.as_str().to_owned()),
        );
        fields.insert(self.fields.date.clone(), Value::String(midnight_utc(date)));
        fields.insert(self.fields.generated.clone(), Value::Bool(true));
        fields.insert(self.fields.manual_override.clone(), Value::Bool(false));
        fields.insert(
            lookup_column(&self.fields.pattern_id),
            json!(pattern.lookup_number()?),
        );
        if let Some(template) = template {
            fields.insert(
                lookup_column(&self.fields.template_id),
                json!(template.lookup_number()?),
            );
        }
        fields.insert(lookup_column(&self.fields.bus_id), json!(bus.lookup_number()?));
        Ok(fields)
    }

    pub fn instance_from_record(&self, record: &ListRecord) -> Option<ShiftInstance> {
        let fields = &record.fields;
        let workspace = non_blank(record.text(&self.fields.workspace_id))?;
        let date = parse_iso_date(&record.text(&self.fields.date))?;
        let reference = |name: &str| read_lookup(fields, name).map(|value| value.into_reference());

        Some(ShiftInstance {
            id: ItemId::new(record.id.clone()),
            workspace_id: WorkspaceId::new(workspace),
            date,
            template_id: reference(&self.fields.template_id),
            pattern_id: reference(&self.fields.pattern_id),
            driver_id: reference(&self.fields.driver_id),
            bus_id: reference(&self.fields.bus_id),
            confirmation_status: non_blank(record.text(&self.fields.confirmation_status)),
            notes: non_blank(record.text(&self.fields.notes)),
            generated: fields.get(&self.fields.generated).and_then(value_as_bool),
            manual_override: fields
                .get(&self.fields.manual_override)
                .and_then(value_as_bool),
        })
    }
}

fn lookup_column(name: &str) -> String {
    format!("{name}LookupId")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryListStore;
    use chrono::NaiveDate;

    fn repository(store: Arc<InMemoryListStore>) -> ShiftInstanceRepository {
        ShiftInstanceRepository::new(store, ListId::new("instances"), InstanceFieldNames::default())
    }

    fn record(id: &str, fields: Value) -> ListRecord {
        ListRecord::new(id, fields.as_object().cloned().expect("object fixture"))
    }

    #[test]
    fn records_without_workspace_or_date_are_unusable() {
        let repository = repository(Arc::new(InMemoryListStore::default()));
        assert!(repository
            .instance_from_record(&record("1", json!({ "date": "2026-02-02" })))
            .is_none());
        assert!(repository
            .instance_from_record(&record("2", json!({ "workspaceId": "south" })))
            .is_none());
    }

    #[test]
    fn record_parsing_normalizes_lookups_and_flags() {
        let repository = repository(Arc::new(InMemoryListStore::default()));
        let instance = repository
            .instance_from_record(&record(
                "14",
                json!({
                    "workspaceId": "south",
                    "date": "2026-02-02T00:00:00Z",
                    "patternId": "Morning R12",
                    "patternIdLookupId": "5",
                    "driverId": "7",
                    "confirmationStatus": ["pending"],
                    "notes": "  ",
                    "generated": "Yes",
                    "manualOverride": false
                }),
            ))
            .expect("usable record");

        assert_eq!(instance.date, NaiveDate::from_ymd_opt(2026, 2, 2).expect("date"));
        assert_eq!(instance.pattern_id, Some(Reference::new("5")));
        assert_eq!(instance.driver_id, Some(Reference::new("7")));
        assert_eq!(instance.bus_id, None);
        assert_eq!(instance.confirmation_status.as_deref(), Some("pending"));
        assert_eq!(instance.notes, None);
        assert_eq!(instance.generated, Some(true));
        assert_eq!(instance.manual_override, Some(false));
    }

    #[tokio::test]
    async fn confirmation_status_is_written_as_single_element_collection() {
        let store = Arc::new(InMemoryListStore::default());
        let repository = repository(store.clone());

        repository
            .set_confirmation_status(&ItemId::new("3"), ConfirmationStatus::Accepted)
            .await
            .expect("patch status");

        let patches = store.patches();
        assert_eq!(patches.len(), 1);
        let (id, fields) = &patches[0];
        assert_eq!(id.as_str(), "3");
        assert_eq!(fields.get("confirmationStatus"), Some(&json!(["accepted"])));
        assert_ne!(fields.get("confirmationStatus"), Some(&json!("accepted")));
        assert_eq!(
            fields.get("confirmationStatus@odata.type"),
            Some(&json!("Collection(Edm.String)"))
        );
    }

    #[tokio::test]
    async fn assign_driver_writes_numeric_lookup() {
        let store = Arc::new(InMemoryListStore::default());
        let repository = repository(store.clone());

        repository
            .assign_driver(&ItemId::new("3"), &Reference::new("42"))
            .await
            .expect("assign");
        let error = repository
            .assign_driver(&ItemId::new("3"), &Reference::new("Ada"))
            .await
            .expect_err("non-numeric driver");

        assert!(matches!(error, ShiftError::InvalidInput(_)));
        let patches = store.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].1.get("driverIdLookupId"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn list_filters_server_side_and_again_locally() {
        let store = Arc::new(InMemoryListStore::default());
        store.insert(
            "instances",
            record("1", json!({ "workspaceId": "south", "date": "2026-02-03", "patternIdLookupId": 5 })),
        );
        store.insert(
            "instances",
            record("2", json!({ "workspaceId": "north", "date": "2026-02-03", "patternIdLookupId": 5 })),
        );
        store.insert(
            "instances",
            record("3", json!({ "workspaceId": "south", "date": "2026-03-01", "patternIdLookupId": 5 })),
        );
        let repository = repository(store.clone());

        let listed = repository
            .list(&InstanceQuery::month(
                Some(WorkspaceId::new("south")),
                Some("2026-02".to_owned()),
            ))
            .await
            .expect("list");

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "1");
        let queries = store.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].has_filter());
        assert!(queries[0].select.contains(&"patternIdLookupId".to_owned()));
    }

    #[tokio::test]
    async fn invalid_month_fails_before_any_store_call() {
        let store = Arc::new(InMemoryListStore::default());
        let repository = repository(store.clone());
        let error = repository
            .list(&InstanceQuery::month(None, Some("02-2026x".to_owned())))
            .await
            .expect_err("invalid month");
        assert!(matches!(error, ShiftError::InvalidInput(_)));
        assert!(store.queries().is_empty());
    }
}
