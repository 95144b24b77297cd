use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use shiftgen_core::{
    pick_first, value_as_number, value_as_string, CacheKey, DriverSummary, Fields, ItemId, ListId,
    ListQuery, ListRecord, ListStore, ReadThroughCache, Reference, ReferenceResolver, ShiftError,
    TemplateDefaults, Trip, TripEvent,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::ResolverSettings;
use crate::stops::{stops_for_trips, StopColumnKeys};
use crate::store::GraphListStore;
use crate::trips::TripRow;

const BUS_TITLE_KEYS: [&str; 10] = [
    "field_1",
    "Plate",
    "plate",
    "LicensePlate",
    "licensePlate",
    "Registration",
    "registration",
    "Title",
    "LinkTitle",
    "Name",
];
const DRIVER_NAME_KEYS: [&str; 4] = ["Title", "LinkTitle", "Name", "FullName"];
const DRIVER_EMAIL_KEYS: [&str; 9] = [
    "Email",
    "email",
    "E-mail",
    "Mail",
    "mail",
    "DriverEmail",
    "driverEmail",
    "field_1",
    "field_2",
];
const ROUTE_TITLE_KEYS: [&str; 2] = ["Title", "LinkTitle"];
const TRIP_TEMPLATES_KEY: &str = "trip-templates";
const STOPS_TEMPLATES_KEY: &str = "stops-templates";

/// Resolves bus, driver, route, template and trip references against the
/// site's reference lists. Lists that are not configured are discovered once
/// and remembered for the life of the resolver.
pub struct GraphReferenceResolver {
    store: GraphListStore,
    settings: ResolverSettings,
    bus_list: OnceCell<Option<ListId>>,
    driver_list: OnceCell<Option<ListId>>,
    trip_list: OnceCell<Option<ListId>>,
    stops_list: OnceCell<Option<ListId>>,
    stop_columns: OnceCell<StopColumnKeys>,
    template_defaults: Mutex<HashMap<Reference, TemplateDefaults>>,
    template_items: ReadThroughCache<Vec<ListRecord>>,
}

impl GraphReferenceResolver {
    pub fn new(store: GraphListStore, settings: ResolverSettings) -> Self {
        Self {
            store,
            settings,
            bus_list: OnceCell::new(),
            driver_list: OnceCell::new(),
            trip_list: OnceCell::new(),
            stops_list: OnceCell::new(),
            stop_columns: OnceCell::new(),
            template_defaults: Mutex::new(HashMap::new()),
            template_items: ReadThroughCache::new(),
        }
    }

    /// Configured list, else the target of the instance list's bus lookup
    /// (unless that points at the routes list), else a site list named like
    /// buses.
    async fn bus_list(&self) -> Result<Option<ListId>, ShiftError> {
        self.bus_list
            .get_or_try_init(|| async {
                if let Some(list) = &self.settings.lists.buses {
                    return Ok(Some(list.clone()));
                }

                let from_lookup = self
                    .store
                    .lookup_target_list(
                        &self.settings.instances,
                        &self.settings.instance_fields.bus_id,
                        "busid",
                    )
                    .await?;
                let points_at_routes = from_lookup.is_some()
                    && from_lookup.as_ref() == self.settings.lists.routes.as_ref();
                if let Some(list) = from_lookup.filter(|_| !points_at_routes) {
                    debug!(list = %list, "bus list discovered from lookup column");
                    return Ok(Some(list));
                }

                let by_name = self
                    .store
                    .find_list_id_by_name(|list| list.name_contains_all(&["bus"]))
                    .await?;
                debug!(list = ?by_name, "bus list discovered by name");
                Ok::<_, ShiftError>(by_name)
            })
            .await
            .cloned()
    }

    async fn driver_list(&self) -> Result<Option<ListId>, ShiftError> {
        self.driver_list
            .get_or_try_init(|| async {
                if let Some(list) = &self.settings.lists.drivers {
                    return Ok(Some(list.clone()));
                }
                self.store
                    .lookup_target_list(
                        &self.settings.instances,
                        &self.settings.instance_fields.driver_id,
                        "driverid",
                    )
                    .await
            })
            .await
            .cloned()
    }

    async fn trip_list(&self) -> Result<Option<ListId>, ShiftError> {
        self.trip_list
            .get_or_try_init(|| async {
                if let Some(list) = &self.settings.lists.trip_templates {
                    return Ok(Some(list.clone()));
                }
                self.store
                    .find_list_id_by_name(|list| list.name_contains_all(&["trip", "template"]))
                    .await
            })
            .await
            .cloned()
    }

    async fn stops_list(&self) -> Result<Option<ListId>, ShiftError> {
        self.stops_list
            .get_or_try_init(|| async {
                if let Some(list) = &self.settings.lists.stops_templates {
                    return Ok(Some(list.clone()));
                }
                let by_name = self
                    .store
                    .find_list_id_by_name(|list| list.name_contains_all(&["stop", "template"]))
                    .await?;
                debug!(list = ?by_name, "stops-template list discovered by name");
                Ok::<_, ShiftError>(by_name)
            })
            .await
            .cloned()
    }

    async fn all_items(&self, list: &ListId) -> Result<Vec<ListRecord>, ShiftError> {
        self.store.list_items(list, &ListQuery::default()).await
    }

    async fn trip_rows(&self) -> Result<Vec<ListRecord>, ShiftError> {
        let Some(list) = self.trip_list().await? else {
            return Ok(Vec::new());
        };
        self.cached_items(TRIP_TEMPLATES_KEY, list).await
    }

    async fn cached_items(&self, key: &str, list: ListId) -> Result<Vec<ListRecord>, ShiftError> {
        let store = self.store.clone();
        self.template_items
            .get_or_set(
                CacheKey::new(key),
                self.settings.trip_templates_ttl,
                move || async move { store.list_items(&list, &ListQuery::default()).await },
            )
            .await
    }

    /// Stop and break events from the stops-template list, keyed by trip item
    /// id. Column aliases are resolved once per resolver.
    async fn stop_events(
        &self,
        trip_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, Vec<TripEvent>>, ShiftError> {
        let Some(list) = self.stops_list().await? else {
            return Ok(HashMap::new());
        };
        let columns = self
            .stop_columns
            .get_or_try_init(|| async {
                let columns = self.store.list_columns(&list).await?;
                Ok::<_, ShiftError>(StopColumnKeys::resolve(&columns))
            })
            .await?;
        let records = self.cached_items(STOPS_TEMPLATES_KEY, list).await?;
        Ok(stops_for_trips(
            &records,
            trip_ids,
            &self.settings.stop_fields,
            columns,
        ))
    }
}

#[async_trait]
impl ReferenceResolver for GraphReferenceResolver {
    async fn resolve_bus_titles(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, String>, ShiftError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let Some(list) = self.bus_list().await? else {
            return Ok(HashMap::new());
        };

        Ok(self
            .all_items(&list)
            .await?
            .iter()
            .filter_map(|record| {
                let id = Reference::new(record.id.clone());
                ids.contains(&id).then(|| {
                    let title = pick_first(&record.fields, &BUS_TITLE_KEYS)
                        .unwrap_or_else(|| record.id.clone());
                    (id, title)
                })
            })
            .collect())
    }

    async fn resolve_drivers(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, DriverSummary>, ShiftError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let Some(list) = self.driver_list().await? else {
            return Ok(HashMap::new());
        };

        Ok(self
            .all_items(&list)
            .await?
            .iter()
            .filter_map(|record| {
                let id = Reference::new(record.id.clone());
                ids.contains(&id).then(|| (id, driver_summary(record)))
            })
            .collect())
    }

    async fn resolve_route_titles(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, String>, ShiftError> {
        let Some(list) = self.settings.lists.routes.clone() else {
            return Ok(HashMap::new());
        };
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        Ok(self
            .all_items(&list)
            .await?
            .iter()
            .filter_map(|record| {
                let id = Reference::new(record.id.clone());
                if !ids.contains(&id) {
                    return None;
                }
                pick_first(&record.fields, &ROUTE_TITLE_KEYS).map(|title| (id, title))
            })
            .collect())
    }

    async fn template_defaults(
        &self,
        template: &Reference,
    ) -> Result<TemplateDefaults, ShiftError> {
        let Some(list) = self.settings.lists.templates.as_ref() else {
            return Ok(TemplateDefaults::default());
        };
        let id = template.as_str().trim();
        if id.is_empty() {
            return Ok(TemplateDefaults::default());
        }
        let key = Reference::new(id);

        let cached = self
            .template_defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let record = self.store.get_item(list, &ItemId::new(id)).await?;
        let defaults = record
            .map(|record| {
                template_defaults_from(&record.fields, &self.settings.template_fields.route_name)
            })
            .unwrap_or_default();

        self.template_defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, defaults.clone());
        Ok(defaults)
    }

    async fn trips_for_templates(
        &self,
        templates: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, Vec<Trip>>, ShiftError> {
        if templates.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.trip_rows().await?;
        let mut grouped: HashMap<Reference, Vec<TripRow>> = templates
            .iter()
            .map(|template| (template.clone(), Vec::new()))
            .collect();
        for record in &rows {
            let Some(row) = TripRow::parse(record, &self.settings.trip_fields) else {
                continue;
            };
            if let Some(bucket) = grouped.get_mut(&row.template) {
                bucket.push(row);
            }
        }

        let without_events = grouped
            .values()
            .flatten()
            .filter(|row| row.trip.events.is_empty())
            .filter_map(|row| row.trip.trip_item_id.clone())
            .collect::<BTreeSet<_>>();
        if !without_events.is_empty() {
            match self.stop_events(&without_events).await {
                Ok(mut stops) => {
                    for row in grouped.values_mut().flatten() {
                        if !row.trip.events.is_empty() {
                            continue;
                        }
                        if let Some(events) = row
                            .trip
                            .trip_item_id
                            .as_ref()
                            .and_then(|id| stops.remove(id))
                        {
                            row.trip.events = events;
                        }
                    }
                }
                Err(error) => {
                    warn!(error = %error, "stops-template lookup failed; trips keep no events");
                }
            }
        }

        let override_ids = grouped
            .values()
            .flatten()
            .filter_map(|row| row.trip.bus_override.as_deref())
            .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
            .map(Reference::new)
            .collect::<BTreeSet<_>>();
        let plates = if override_ids.is_empty() {
            HashMap::new()
        } else {
            match self.resolve_bus_titles(&override_ids).await {
                Ok(plates) => plates,
                Err(error) => {
                    warn!(error = %error, "bus override lookup failed; keeping raw ids");
                    HashMap::new()
                }
            }
        };

        Ok(grouped
            .into_iter()
            .map(|(template, mut rows)| {
                rows.sort_by(|left, right| left.sort_key.total_cmp(&right.sort_key));
                let trips = rows
                    .into_iter()
                    .map(|row| {
                        let mut trip = row.trip;
                        if let Some(plate) = trip
                            .bus_override
                            .as_ref()
                            .and_then(|id| plates.get(&Reference::new(id.clone())))
                        {
                            trip.bus_override = Some(plate.clone());
                        }
                        trip
                    })
                    .collect();
                (template, trips)
            })
            .collect())
    }
}

fn driver_summary(record: &ListRecord) -> DriverSummary {
    DriverSummary {
        id: record.id.clone(),
        name: pick_first(&record.fields, &DRIVER_NAME_KEYS).unwrap_or_else(|| record.id.clone()),
        email: driver_email(&record.fields),
    }
}

/// First email-looking value among the usual columns, else anywhere on the
/// record.
fn driver_email(fields: &Fields) -> Option<String> {
    DRIVER_EMAIL_KEYS
        .iter()
        .filter_map(|key| fields.get(*key))
        .map(|value| value_as_string(value).trim().to_owned())
        .find(|value| value.contains('@'))
        .or_else(|| {
            fields
                .values()
                .map(|value| value_as_string(value).trim().to_owned())
                .find(|value| value.contains('@') && value.contains('.'))
        })
}

fn template_defaults_from(fields: &Fields, route_name_field: &str) -> TemplateDefaults {
    let lookup = |key: &str| {
        fields
            .get(key)
            .and_then(value_as_number)
            .map(|number| Reference::new((number as i64).to_string()))
    };

    TemplateDefaults {
        bus: lookup("BusLookupId"),
        driver: lookup("DriverLookupId"),
        route: lookup("RouteLookupId"),
        route_name: pick_first(fields, &[route_name_field, "routeName", "RouteName", "Title"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().expect("object fixture")
    }

    #[test]
    fn driver_email_prefers_known_columns() {
        let record = fields(json!({
            "Title": "Ada",
            "Notes": "ping ops@example.com",
            "field_2": "ada@example",
        }));
        assert_eq!(driver_email(&record).as_deref(), Some("ada@example"));

        let scanned = fields(json!({ "Title": "Ada", "Contact": "ada@example.com" }));
        assert_eq!(driver_email(&scanned).as_deref(), Some("ada@example.com"));
        assert_eq!(driver_email(&fields(json!({ "Title": "Ada" }))), None);
    }

    #[test]
    fn driver_name_falls_back_to_the_id() {
        let summary = driver_summary(&ListRecord::new("9", fields(json!({ "FullName": "Grace" }))));
        assert_eq!(summary.name, "Grace");
        let anonymous = driver_summary(&ListRecord::new("9", Fields::new()));
        assert_eq!(anonymous.name, "9");
        assert_eq!(anonymous.email, None);
    }

    #[test]
    fn template_defaults_read_numeric_lookups_and_route_name() {
        let defaults = template_defaults_from(
            &fields(json!({
                "BusLookupId": 4,
                "DriverLookupId": "12",
                "RouteLookupId": "not a number",
                "RouteName": "Harbour loop",
                "Title": "Template A",
            })),
            "routeLabel",
        );
        assert_eq!(defaults.bus, Some(Reference::new("4")));
        assert_eq!(defaults.driver, Some(Reference::new("12")));
        assert_eq!(defaults.route, None);
        assert_eq!(defaults.route_name.as_deref(), Some("Harbour loop"));

        let configured = template_defaults_from(
            &fields(json!({ "routeLabel": "Custom", "Title": "Template A" })),
            "routeLabel",
        );
        assert_eq!(configured.route_name.as_deref(), Some("Custom"));
    }
}
