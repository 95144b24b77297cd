//! Turns the loaded configuration into a wired [`ShiftService`].

use crate::error::AppResult;
use integration_graph::{
    GraphConnection, GraphListStore, GraphPatternCatalog, GraphReferenceResolver, GraphTransport,
    PatternFieldNames, ReferenceLists, ResolverSettings, StopTemplateFieldNames,
    TemplateFieldNames, TripTemplateFieldNames,
};
use shiftgen_config::{ListsConfigToml, ShiftgenConfig};
use shiftgen_core::{
    Concurrency, GenerationSettings, InstanceFieldNames, ListId, Reference, ServiceSettings,
    ShiftInstanceRepository, ShiftListCache, ShiftService,
};
use std::sync::Arc;
use std::time::Duration;

pub fn graph_connection(config: &ShiftgenConfig) -> AppResult<GraphConnection> {
    let store = config.require_store_settings()?;
    Ok(GraphConnection::new(store.site_id, store.access_token).with_api_url(store.api_url))
}

pub fn instance_fields(config: &ShiftgenConfig) -> InstanceFieldNames {
    let fields = &config.instance_fields;
    InstanceFieldNames {
        workspace_id: fields.workspace_id.clone(),
        date: fields.date.clone(),
        template_id: fields.template_id.clone(),
        pattern_id: fields.pattern_id.clone(),
        driver_id: fields.driver_id.clone(),
        bus_id: fields.bus_id.clone(),
        confirmation_status: fields.confirmation_status.clone(),
        notes: fields.notes.clone(),
        generated: fields.generated.clone(),
        manual_override: fields.manual_override.clone(),
    }
}

pub fn pattern_fields(config: &ShiftgenConfig) -> PatternFieldNames {
    let fields = &config.pattern_fields;
    PatternFieldNames {
        route: fields.route.clone(),
        route_name: fields.route_name.clone(),
        shift_type: fields.shift_type.clone(),
        week_part: fields.week_part.clone(),
        day_of_week: fields.day_of_week.clone(),
        start_time: fields.start_time.clone(),
        end_time: fields.end_time.clone(),
        workspace_id: fields.workspace_id.clone(),
        template_id: fields.template_id.clone(),
    }
}

pub fn resolver_settings(config: &ShiftgenConfig, instances: ListId) -> ResolverSettings {
    let optional = |raw: &str| ListsConfigToml::optional(raw).map(ListId::new);
    let lists = &config.lists;
    let trips = &config.trip_template_fields;
    let stops = &config.stop_template_fields;

    ResolverSettings {
        instances,
        instance_fields: instance_fields(config),
        lists: ReferenceLists {
            templates: optional(&lists.templates),
            buses: optional(&lists.buses),
            drivers: optional(&lists.drivers),
            routes: optional(&lists.routes),
            trip_templates: optional(&lists.trip_templates),
            stops_templates: optional(&lists.stops_templates),
        },
        template_fields: TemplateFieldNames {
            route_name: config.template_fields.route_name.clone(),
        },
        trip_fields: TripTemplateFieldNames {
            template_id: trips.template_id.clone(),
            name: trips.name.clone(),
            time: trips.time.clone(),
            start: trips.start.clone(),
            end: trips.end.clone(),
            bus_override: trips.bus_override.clone(),
            events: trips.events.clone(),
        },
        stop_fields: StopTemplateFieldNames {
            trip_id: stops.trip_id.clone(),
            stop_name: stops.stop_name.clone(),
            time: stops.time.clone(),
            sort_order: stops.sort_order.clone(),
            event_type: stops.event_type.clone(),
            duration: stops.duration.clone(),
        },
        trip_templates_ttl: Duration::from_millis(config.cache.trip_templates_ttl_ms),
    }
}

pub fn service_settings(config: &ShiftgenConfig) -> ServiceSettings {
    ServiceSettings {
        generation: GenerationSettings {
            default_bus: config.default_bus_lookup_id().map(Reference::new),
            concurrency: Concurrency::generation(config.generation.concurrency),
        },
        shifts_ttl: Duration::from_millis(config.cache.shifts_ttl_ms),
        assign_concurrency: Concurrency::batch(config.batch.assign_concurrency),
        confirm_concurrency: Concurrency::batch(config.batch.confirm_concurrency),
    }
}

/// Wires store, resolvers, catalog and cache over `transport`.
pub fn build_service(
    config: &ShiftgenConfig,
    transport: Arc<dyn GraphTransport>,
) -> AppResult<ShiftService> {
    let connection = graph_connection(config)?;
    let store_settings = config.require_store_settings()?;
    let instances = ListId::new(store_settings.shift_instances_list);
    let patterns = ListId::new(store_settings.shift_patterns_list);

    let store = GraphListStore::new(transport, &connection);
    let resolver = Arc::new(GraphReferenceResolver::new(
        store.clone(),
        resolver_settings(config, instances.clone()),
    ));
    let catalog = Arc::new(GraphPatternCatalog::new(
        Arc::new(store.clone()),
        patterns,
        pattern_fields(config),
        resolver.clone(),
    ));
    let repository =
        ShiftInstanceRepository::new(Arc::new(store), instances, instance_fields(config));

    Ok(ShiftService::new(
        repository,
        catalog,
        resolver,
        Arc::new(ShiftListCache::new()),
        service_settings(config),
    ))
}
