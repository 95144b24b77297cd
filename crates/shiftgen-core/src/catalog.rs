use crate::error::ShiftError;
use crate::identifiers::WorkspaceId;
use crate::model::{DriverSummary, Reference, ShiftPattern, TemplateDefaults, Trip};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Read-only source of recurring shift patterns.
#[async_trait]
pub trait PatternCatalog: Send + Sync {
    /// Usable patterns only. When `workspace` is given, implementations that
    /// know pattern workspaces return only that workspace's patterns.
    async fn list_patterns(
        &self,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Vec<ShiftPattern>, ShiftError>;
}

/// Batched lookups of the entities an instance points at. Every method takes
/// the whole set of distinct ids it needs so callers issue one request per
/// entity kind, not one per instance.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn resolve_bus_titles(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, String>, ShiftError>;

    async fn resolve_drivers(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, DriverSummary>, ShiftError>;

    async fn resolve_route_titles(
        &self,
        ids: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, String>, ShiftError>;

    async fn template_defaults(&self, template: &Reference)
        -> Result<TemplateDefaults, ShiftError>;

    async fn trips_for_templates(
        &self,
        templates: &BTreeSet<Reference>,
    ) -> Result<HashMap<Reference, Vec<Trip>>, ShiftError>;
}

/// Distinct, non-blank references.
pub fn distinct_references<'a>(
    references: impl IntoIterator<Item = Option<&'a Reference>>,
) -> BTreeSet<Reference> {
    references
        .into_iter()
        .flatten()
        .filter(|reference| !reference.as_str().trim().is_empty())
        .cloned()
        .collect()
}
