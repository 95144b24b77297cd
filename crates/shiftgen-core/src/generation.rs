use crate::calendar::DateWindow;
use crate::catalog::{PatternCatalog, ReferenceResolver};
use crate::error::ShiftError;
use crate::identifiers::WorkspaceId;
use crate::model::{coverage_key, GenerationReport, Reference, ShiftPattern};
use crate::pool::{run_bounded, Concurrency};
use crate::record::Fields;
use crate::repository::{InstanceQuery, ShiftInstanceRepository};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MISSING_BUS: &str = "ShiftInstances column busId is required. Set DEFAULT_BUS_LOOKUP_ID \
     (generation.default_bus_lookup_id) or give the template a BusLookupId.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Bus written when the pattern's template has none.
    pub default_bus: Option<Reference>,
    pub concurrency: Concurrency,
}

/// Expands recurring patterns into concrete instances for one month.
#[derive(Clone)]
pub struct ShiftGenerator {
    repository: ShiftInstanceRepository,
    catalog: Arc<dyn PatternCatalog>,
    resolver: Arc<dyn ReferenceResolver>,
    settings: GenerationSettings,
}

impl ShiftGenerator {
    pub fn new(
        repository: ShiftInstanceRepository,
        catalog: Arc<dyn PatternCatalog>,
        resolver: Arc<dyn ReferenceResolver>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            repository,
            catalog,
            resolver,
            settings,
        }
    }

    /// Creates every `(date, pattern)` slot of `month` that has no instance
    /// yet. Safe to re-run: covered slots are counted as skipped.
    ///
    /// All creation payloads are built before the first write, so a missing
    /// bus fails the call without touching the store. Once writes start, the
    /// first failure stops the pool and is reported as
    /// [`ShiftError::GenerationIncomplete`].
    pub async fn generate(
        &self,
        workspace_id: &WorkspaceId,
        month: &str,
    ) -> Result<GenerationReport, ShiftError> {
        if workspace_id.as_str().trim().is_empty() {
            return Err(ShiftError::InvalidInput(
                "workspaceId is required for generation".to_owned(),
            ));
        }
        let window = DateWindow::month(month)?;

        let patterns = self.catalog.list_patterns(Some(workspace_id)).await?;
        let existing = self
            .repository
            .list(&InstanceQuery::window(workspace_id.clone(), window))
            .await?;

        let mut covered: HashSet<String> = existing
            .iter()
            .filter_map(|instance| instance.coverage_key())
            .filter(|key| !key.ends_with('|'))
            .collect();

        let mut pending: Vec<Fields> = Vec::new();
        let mut skipped = 0;

        for pattern in &patterns {
            let mut pattern_bus: Option<Reference> = None;
            for date in window.dates().filter(|date| pattern.recurs_on(*date)) {
                let key = coverage_key(date, pattern.id.as_str());
                if covered.contains(&key) {
                    skipped += 1;
                    continue;
                }

                let bus = match pattern_bus.clone() {
                    Some(bus) => bus,
                    None => {
                        let resolved = self.bus_for(pattern).await?;
                        pattern_bus = Some(resolved.clone());
                        resolved
                    }
                };

                let fields = self.repository.generated_fields(
                    workspace_id,
                    date,
                    &Reference::new(pattern.id.as_str()),
                    pattern.template_id.as_ref(),
                    &bus,
                )?;
                covered.insert(key);
                pending.push(fields);
            }
        }

        debug!(
            workspace = %workspace_id,
            month,
            patterns = patterns.len(),
            queued = pending.len(),
            skipped,
            "generation plan built"
        );

        let repository = &self.repository;
        let outcome = run_bounded(&pending, self.settings.concurrency, move |fields: &Fields| {
            let fields = fields.clone();
            async move { repository.create(fields).await.map(|_| ()) }
        })
        .await;

        let created = outcome.completed;
        if let Some(error) = outcome.first_error {
            warn!(
                workspace = %workspace_id,
                month,
                created,
                skipped,
                error = %error,
                "generation stopped after a failed write"
            );
            return Err(ShiftError::GenerationIncomplete {
                created,
                skipped,
                reason: error.to_string(),
            });
        }

        info!(workspace = %workspace_id, month, created, skipped, "shift instances generated");
        Ok(GenerationReport { created, skipped })
    }

    /// Template default bus, else the configured default.
    async fn bus_for(&self, pattern: &ShiftPattern) -> Result<Reference, ShiftError> {
        if let Some(template) = &pattern.template_id {
            let defaults = self.resolver.template_defaults(template).await?;
            if let Some(bus) = defaults.bus {
                return Ok(bus);
            }
        }

        self.settings
            .default_bus
            .clone()
            .ok_or_else(|| ShiftError::Configuration(MISSING_BUS.to_owned()))
    }
}
