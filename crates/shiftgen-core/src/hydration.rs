//! Joins raw instances with their pattern, driver, bus and trips.

use crate::catalog::{distinct_references, PatternCatalog, ReferenceResolver};
use crate::error::ShiftError;
use crate::identifiers::{ItemId, WorkspaceId};
use crate::model::{DriverSummary, HydratedShift, Reference, ShiftInstance, ShiftPattern, Trip};
use crate::repository::{InstanceQuery, ShiftInstanceRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrateOptions {
    pub include_trips: bool,
}

impl Default for HydrateOptions {
    fn default() -> Self {
        Self {
            include_trips: true,
        }
    }
}

impl HydrateOptions {
    pub fn without_trips() -> Self {
        Self {
            include_trips: false,
        }
    }
}

/// Resolved entities for one hydration pass, fetched once per entity kind.
#[derive(Debug, Default)]
pub(crate) struct Lookups {
    buses: HashMap<Reference, String>,
    drivers: HashMap<Reference, DriverSummary>,
    trips: HashMap<Reference, Vec<Trip>>,
}

impl Lookups {
    pub(crate) async fn load(
        resolver: &dyn ReferenceResolver,
        instances: &[&ShiftInstance],
        options: HydrateOptions,
    ) -> Result<Self, ShiftError> {
        let buses = distinct_references(instances.iter().map(|instance| instance.bus_id.as_ref()));
        let drivers =
            distinct_references(instances.iter().map(|instance| instance.driver_id.as_ref()));
        let templates = if options.include_trips {
            distinct_references(instances.iter().map(|instance| instance.template_id.as_ref()))
        } else {
            Default::default()
        };

        let mut lookups = Self::default();
        if !buses.is_empty() {
            lookups.buses = resolver.resolve_bus_titles(&buses).await?;
        }
        if !drivers.is_empty() {
            lookups.drivers = resolver.resolve_drivers(&drivers).await?;
        }
        if !templates.is_empty() {
            lookups.trips = resolver.trips_for_templates(&templates).await?;
        }
        Ok(lookups)
    }

    pub(crate) fn hydrate(&self, instance: ShiftInstance, pattern: &ShiftPattern) -> HydratedShift {
        let driver = instance
            .driver_id
            .as_ref()
            .and_then(|id| self.drivers.get(id));
        let default_bus = instance.bus_id.as_ref().map(|id| {
            self.buses
                .get(id)
                .cloned()
                .unwrap_or_else(|| id.as_str().to_owned())
        });
        let trips = instance
            .template_id
            .as_ref()
            .and_then(|template| self.trips.get(template))
            .cloned()
            .unwrap_or_default();

        HydratedShift {
            name: pattern.display_name(),
            time: pattern.time_label(),
            route: pattern.route.clone(),
            route_name: pattern.route_name.clone(),
            shift_type: pattern.shift_type.clone(),
            week_part: pattern.week_part.clone(),
            driver_name: driver.map(|driver| driver.name.clone()),
            driver_email: driver.and_then(|driver| driver.email.clone()),
            default_bus,
            trips,
            id: instance.id,
            workspace_id: instance.workspace_id,
            date: instance.date,
            driver_id: instance.driver_id,
            confirmation_status: instance.confirmation_status,
            notes: instance.notes,
            generated: instance.generated,
            manual_override: instance.manual_override,
            pattern_id: instance.pattern_id,
            template_id: instance.template_id,
            bus_id: instance.bus_id,
        }
    }
}

pub(crate) fn patterns_by_id(patterns: &[ShiftPattern]) -> HashMap<&str, &ShiftPattern> {
    patterns
        .iter()
        .map(|pattern| (pattern.id.as_str(), pattern))
        .collect()
}

pub(crate) fn pattern_of<'a>(
    by_id: &HashMap<&str, &'a ShiftPattern>,
    instance: &ShiftInstance,
) -> Option<&'a ShiftPattern> {
    instance
        .pattern_id
        .as_ref()
        .and_then(|pattern| by_id.get(pattern.as_str()).copied())
}

#[derive(Clone)]
pub struct HydrationEngine {
    pub(crate) repository: ShiftInstanceRepository,
    pub(crate) catalog: Arc<dyn PatternCatalog>,
    pub(crate) resolver: Arc<dyn ReferenceResolver>,
}

impl HydrationEngine {
    pub fn new(
        repository: ShiftInstanceRepository,
        catalog: Arc<dyn PatternCatalog>,
        resolver: Arc<dyn ReferenceResolver>,
    ) -> Self {
        Self {
            repository,
            catalog,
            resolver,
        }
    }

    /// Hydrated, deduplicated instances. Instances whose pattern is not in the
    /// catalog are dropped.
    pub async fn list_hydrated(
        &self,
        workspace_id: Option<&WorkspaceId>,
        month: Option<&str>,
    ) -> Result<Vec<HydratedShift>, ShiftError> {
        let instances = self
            .repository
            .list(&InstanceQuery::month(
                workspace_id.cloned(),
                month.map(str::to_owned),
            ))
            .await?;
        let patterns = self.catalog.list_patterns(workspace_id).await?;
        let by_id = patterns_by_id(&patterns);

        let (resolved, orphans): (Vec<_>, Vec<_>) = instances
            .into_iter()
            .map(|instance| (pattern_of(&by_id, &instance), instance))
            .partition(|(pattern, _)| pattern.is_some());
        if !orphans.is_empty() {
            debug!(dropped = orphans.len(), "instances without a known pattern dropped");
        }

        let members: Vec<&ShiftInstance> = resolved.iter().map(|(_, instance)| instance).collect();
        let lookups =
            Lookups::load(self.resolver.as_ref(), &members, HydrateOptions::default()).await?;

        Ok(resolved
            .into_iter()
            .filter_map(|(pattern, instance)| pattern.map(|pattern| lookups.hydrate(instance, pattern)))
            .collect())
    }

    /// `None` for a blank id, a missing or unusable record, or an instance
    /// whose pattern is unknown.
    pub async fn get_by_id(
        &self,
        id: &ItemId,
        options: HydrateOptions,
    ) -> Result<Option<HydratedShift>, ShiftError> {
        if id.as_str().trim().is_empty() {
            return Ok(None);
        }
        let Some(instance) = self.repository.get(id).await? else {
            return Ok(None);
        };

        let patterns = self
            .catalog
            .list_patterns(Some(&instance.workspace_id))
            .await?;
        let by_id = patterns_by_id(&patterns);
        let Some(pattern) = pattern_of(&by_id, &instance) else {
            debug!(id = %id, "instance pattern not found");
            return Ok(None);
        };

        let lookups = Lookups::load(self.resolver.as_ref(), &[&instance], options).await?;
        Ok(Some(lookups.hydrate(instance, pattern)))
    }
}
