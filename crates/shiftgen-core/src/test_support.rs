//! In-memory doubles for the store, catalog and resolver seams.
//!
//! Compiled into the library so integration tests in `tests/` and downstream
//! crates can drive the engines without a remote store.

use crate::calendar::parse_iso_date;
use crate::catalog::{PatternCatalog, ReferenceResolver};
use crate::error::{RemoteStoreError, ShiftError};
use crate::identifiers::{ItemId, ListId, WorkspaceId};
use crate::model::{DriverSummary, Reference, ShiftPattern, TemplateDefaults, Trip};
use crate::record::{Fields, ListRecord};
use crate::store::{ListQuery, ListStore};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn non_indexed_filter_error(field: &str) -> ShiftError {
    ShiftError::Remote(
        RemoteStoreError::new(400, "Graph GET failed: 400 (invalidRequest: Invalid request)")
            .with_code("invalidRequest")
            .with_details(format!(
                r#"{{"error":{{"code":"invalidRequest","message":"Field '{field}' cannot be referenced in filter or orderby as it is not indexed. Provide the 'Prefer: HonorNonIndexedQueriesWarningMayFailRandomly' header to allow this, but be warned that such queries may fail on large lists."}}}}"#
            )),
    )
}

/// List store backed by vectors, with switches for the failure modes the
/// engines must handle.
pub struct InMemoryListStore {
    lists: Mutex<HashMap<String, Vec<ListRecord>>>,
    queries: Mutex<Vec<ListQuery>>,
    patches: Mutex<Vec<(ItemId, Fields)>>,
    created: Mutex<Vec<Fields>>,
    next_id: AtomicUsize,
    reject_filters: AtomicBool,
    create_budget: Mutex<Option<usize>>,
    failing_patch_fields: Mutex<Vec<String>>,
    write_delay: Mutex<Option<Duration>>,
    writes_in_flight: AtomicUsize,
    peak_writes_in_flight: AtomicUsize,
}

impl Default for InMemoryListStore {
    fn default() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1000),
            reject_filters: AtomicBool::new(false),
            create_budget: Mutex::new(None),
            failing_patch_fields: Mutex::new(Vec::new()),
            write_delay: Mutex::new(None),
            writes_in_flight: AtomicUsize::new(0),
            peak_writes_in_flight: AtomicUsize::new(0),
        }
    }
}

impl InMemoryListStore {
    pub fn insert(&self, list: &str, record: ListRecord) {
        lock(&self.lists)
            .entry(list.to_owned())
            .or_default()
            .push(record);
    }

    pub fn records(&self, list: &str) -> Vec<ListRecord> {
        lock(&self.lists).get(list).cloned().unwrap_or_default()
    }

    pub fn queries(&self) -> Vec<ListQuery> {
        lock(&self.queries).clone()
    }

    pub fn patches(&self) -> Vec<(ItemId, Fields)> {
        lock(&self.patches).clone()
    }

    pub fn created(&self) -> Vec<Fields> {
        lock(&self.created).clone()
    }

    /// Every filtered query fails the way the remote store rejects filters
    /// on non-indexed columns.
    pub fn reject_filtered_queries(&self) {
        self.reject_filters.store(true, Ordering::SeqCst);
    }

    /// Lets `successes` creations through, then fails every later one.
    pub fn fail_creates_after(&self, successes: usize) {
        *lock(&self.create_budget) = Some(successes);
    }

    /// Fails any patch whose payload contains `field`.
    pub fn fail_patches_touching(&self, field: &str) {
        lock(&self.failing_patch_fields).push(field.to_owned());
    }

    pub fn delay_writes(&self, delay: Duration) {
        *lock(&self.write_delay) = Some(delay);
    }

    pub fn peak_writes_in_flight(&self) -> usize {
        self.peak_writes_in_flight.load(Ordering::SeqCst)
    }

    async fn enter_write(&self) {
        let now = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_writes_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *lock(&self.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave_write(&self) {
        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn matches(record: &ListRecord, query: &ListQuery) -> bool {
        let equal = query
            .equals
            .iter()
            .all(|(field, value)| record.text(field) == *value);
        let in_range = query.date_range.as_ref().map_or(true, |range| {
            parse_iso_date(&record.text(&range.field))
                .map(|date| date >= range.start && date < range.end_exclusive)
                .unwrap_or(false)
        });
        equal && in_range
    }

    fn try_create(&self, list: &ListId, fields: Fields) -> Result<ItemId, ShiftError> {
        {
            let mut budget = lock(&self.create_budget);
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(ShiftError::Remote(RemoteStoreError::new(
                        503,
                        "Graph POST failed: 503 (serviceUnavailable: try later)",
                    )));
                }
                *remaining -= 1;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        lock(&self.created).push(fields.clone());
        self.insert(list.as_str(), ListRecord::new(id.clone(), fields));
        Ok(ItemId::new(id))
    }

    fn try_patch(&self, list: &ListId, id: &ItemId, fields: Fields) -> Result<(), ShiftError> {
        let rejected = lock(&self.failing_patch_fields)
            .iter()
            .any(|field| fields.contains_key(field));
        if rejected {
            return Err(ShiftError::Remote(RemoteStoreError::new(
                400,
                "Graph PATCH failed: 400 (invalidRequest: field rejected)",
            )));
        }

        lock(&self.patches).push((id.clone(), fields.clone()));
        if let Some(records) = lock(&self.lists).get_mut(list.as_str()) {
            if let Some(record) = records.iter_mut().find(|record| record.id == id.as_str()) {
                record.fields.extend(fields);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ListStore for InMemoryListStore {
    async fn list_items(
        &self,
        list: &ListId,
        query: &ListQuery,
    ) -> Result<Vec<ListRecord>, ShiftError> {
        lock(&self.queries).push(query.clone());
        if query.has_filter() && self.reject_filters.load(Ordering::SeqCst) {
            let field = query
                .equals
                .first()
                .map(|(field, _)| field.as_str())
                .unwrap_or("date");
            return Err(non_indexed_filter_error(field));
        }

        Ok(self
            .records(list.as_str())
            .into_iter()
            .filter(|record| Self::matches(record, query))
            .collect())
    }

    async fn get_item(&self, list: &ListId, id: &ItemId) -> Result<Option<ListRecord>, ShiftError> {
        Ok(self
            .records(list.as_str())
            .into_iter()
            .find(|record| record.id == id.as_str()))
    }

    async fn create_item(&self, list: &ListId, fields: Fields) -> Result<ItemId, ShiftError> {
        self.enter_write().await;
        let result = self.try_create(list, fields);
        self.leave_write();
        result
    }

    async fn patch_fields(
        &self,
        list: &ListId,
        id: &ItemId,
        fields: Fields,
    ) -> Result<(), ShiftError> {
        self.enter_write().await;
        let result = self.try_patch(list, id, fields);
        self.leave_write();
        result
    }
}

#[derive(Default)]
pub struct StaticPatternCatalog {
    patterns: Vec<ShiftPattern>,
    calls: AtomicUsize,
}

impl StaticPatternCatalog {
    pub fn new(patterns: Vec<ShiftPattern>) -> Self {
        Self {
            patterns,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatternCatalog for StaticPatternCatalog {
    async fn list_patterns(
        &self,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Vec<ShiftPattern>, ShiftError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scoped = workspace.is_some()
            && self
                .patterns
                .iter()
                .any(|pattern| pattern.workspace_id.is_some());
        Ok(self
            .patterns
            .iter()
            .filter(|pattern| pattern.is_usable())
            .filter(|pattern| !scoped || pattern.workspace_id.as_ref() == workspace)
            .cloned()
            .collect())
    }
}

/// Which resolver method was called, with the id set it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverCall {
    Buses(BTreeSet<Reference>),
    Drivers(BTreeSet<Reference>),
    Routes(BTreeSet<Reference>),
    TemplateDefaults(Reference),
    Trips(BTreeSet<Reference>),
}

#[derive(Default)]
pub struct StaticResolver {
    buses: HashMap<Reference, String>,
    drivers: HashMap<Reference, DriverSummary>,
    routes: HashMap<Reference, String>,
    templates: HashMap<Reference, TemplateDefaults>,
    trips: HashMap<Reference, Vec<Trip>>,
    calls: Mutex<Vec<ResolverCall>>,
}

impl StaticResolver {
    pub fn with_bus(mut self, id: &str, title: &str) -> Self {
        self.buses.insert(Reference::new(id), title.to_owned());
        self
    }

    pub fn with_driver(mut self, id: &str, name: &str, email: Option<&str>) -> Self {
        self.drivers.insert(
            Reference::new(id),
            DriverSummary {
                id: id.to_owned(),
                name: name.to_owned(),
                email: email.map(str::to_owned),
            },
        );
        self
    }

    pub fn with_route(mut self, id: &str, title: &str) -> Self {
        self.routes.insert(Reference::new(id), title.to_owned());
        self
    }

    pub fn with_template(mut self, id: &str, defaults: TemplateDefaults) -> Self {
        self.templates.insert(Reference::new(id), defaults);
        self
    }

    pub fn with_trips(mut self, template: &str, trips: Vec<Trip>) -> Self {
        self.trips.insert(Reference::new(template), trips);
        self
    }

    pub fn calls(&self) -> Vec<ResolverCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: ResolverCall) {
        lock(&self.calls).push(call);
    }
}

fn subset<V: Clone>(source: &HashMap<Reference, V>, ids: &BTreeSet<Reference>) -> HashMap<Reference, V> {
    ids.iter()
        .filter_map(|id| source.get(id).map(|value| (id.clone(), value.clone())))
        .collect()
}

#[async_trait]
impl ReferenceResolver for StaticResolver {
    async fn resolve_bus_titles(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, String>, ShiftError> {
        self.record(ResolverCall::Buses(ids.clone()));
        Ok(subset(&self.buses, ids))
    }

    async fn resolve_drivers(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, DriverSummary>, ShiftError> {
        self.record(ResolverCall::Drivers(ids.clone()));
        Ok(subset(&self.drivers, ids))
    }

    async fn resolve_route_titles(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, String>, ShiftError> {
        self.record(ResolverCall::Routes(ids.clone()));
        Ok(subset(&self.routes, ids))
    }

    async fn template_defaults(&self, template: &Reference) -> Result<TemplateDefaults, ShiftError> {
        self.record(ResolverCall::TemplateDefaults(template.clone()));
        Ok(self.templates.get(template).cloned().unwrap_or_default())
    }

    async fn trips_for_templates(
        &self,
        templates: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, Vec<Trip>>, ShiftError> {
        self.record(ResolverCall::Trips(templates.clone()));
        Ok(subset(&self.trips, templates))
    }
}

/// Usable pattern fixture: route `R<id>`, 06:00–14:00 on `weekdays`.
pub fn pattern(id: &str, shift_type: &str, weekdays: &[u32]) -> ShiftPattern {
    ShiftPattern {
        id: ItemId::new(id),
        route: format!("R{id}"),
        route_name: None,
        shift_type: shift_type.to_owned(),
        week_part: None,
        weekdays: weekdays.to_vec(),
        start_time: "06:00".to_owned(),
        end_time: "14:00".to_owned(),
        workspace_id: None,
        template_id: None,
    }
}
