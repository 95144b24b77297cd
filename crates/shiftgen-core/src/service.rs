//! Entry points used by the binary: every operation that takes an instance
//! id also accepts a `week:<anchorId>` token and fans out over the group.

use crate::cache::{CacheKey, ReadThroughCache, SHIFTS_KEY_PREFIX};
use crate::catalog::{PatternCatalog, ReferenceResolver};
use crate::confirmation::ConfirmationWorkflow;
use crate::error::ShiftError;
use crate::generation::{GenerationSettings, ShiftGenerator};
use crate::hydration::{HydrateOptions, HydrationEngine};
use crate::identifiers::{ItemId, ShiftAddress, WorkspaceId};
use crate::model::{
    ConfirmationStatus, DriverAssignment, DriverSummary, GenerationReport, HydratedShift,
    Reference,
};
use crate::notice::confirmation_subject;
use crate::pool::Concurrency;
use crate::repository::ShiftInstanceRepository;
use crate::week::{WeekGroup, WeekGroupResolver};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_SHIFTS_TTL: Duration = Duration::from_millis(15_000);

pub type ShiftListCache = ReadThroughCache<Vec<HydratedShift>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub generation: GenerationSettings,
    pub shifts_ttl: Duration,
    pub assign_concurrency: Concurrency,
    pub confirm_concurrency: Concurrency,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            generation: GenerationSettings::default(),
            shifts_ttl: DEFAULT_SHIFTS_TTL,
            assign_concurrency: Concurrency::default(),
            confirm_concurrency: Concurrency::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekMemberSummary {
    pub id: ItemId,
    pub date: NaiveDate,
    pub route: String,
    pub shift_type: String,
    pub time: String,
    pub confirmation_status: Option<String>,
}

/// A week group presented like a single shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekShiftView {
    pub kind: &'static str,
    pub id: String,
    pub token: String,
    pub workspace_id: WorkspaceId,
    pub route: String,
    pub route_name: Option<String>,
    pub shift_type: String,
    pub week_part: Option<String>,
    pub name: String,
    pub time: String,
    pub date: NaiveDate,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub driver_id: Option<Reference>,
    pub driver_name: Option<String>,
    pub driver_email: Option<String>,
    /// Status of the anchor shift, `pending` when the anchor has none.
    pub confirmation_status: String,
    pub shifts: Vec<WeekMemberSummary>,
}

impl WeekShiftView {
    pub fn new(token: String, group: &WeekGroup) -> Self {
        let anchor = &group.anchor;
        Self {
            kind: "week",
            id: token.clone(),
            token,
            workspace_id: anchor.workspace_id.clone(),
            route: anchor.route.clone(),
            route_name: anchor.route_name.clone(),
            shift_type: anchor.shift_type.clone(),
            week_part: anchor.week_part.clone(),
            name: format!("{} {}", anchor.route, anchor.shift_type),
            time: String::new(),
            date: group.week_start,
            week_start: group.week_start,
            week_end: group.week_end,
            driver_id: anchor.driver_id.clone(),
            driver_name: anchor.driver_name.clone(),
            driver_email: anchor.driver_email.clone(),
            confirmation_status: anchor
                .confirmation_status
                .clone()
                .unwrap_or_else(|| ConfirmationStatus::Pending.as_str().to_owned()),
            shifts: group
                .shifts
                .iter()
                .map(|shift| WeekMemberSummary {
                    id: shift.id.clone(),
                    date: shift.date,
                    route: shift.route.clone(),
                    shift_type: shift.shift_type.clone(),
                    time: shift.time.clone(),
                    confirmation_status: shift.confirmation_status.clone(),
                })
                .collect(),
        }
    }

    /// The view after every member was set to `status`.
    pub fn with_status(mut self, status: ConfirmationStatus) -> Self {
        self.confirmation_status = status.as_str().to_owned();
        for member in &mut self.shifts {
            member.confirmation_status = Some(status.as_str().to_owned());
        }
        self
    }

    /// The view after `driver` was assigned to every member, which also
    /// resets them to `pending`.
    pub fn with_driver(mut self, driver: &Reference, summary: Option<DriverSummary>) -> Self {
        self.driver_id = Some(driver.clone());
        self.driver_name = summary.as_ref().map(|summary| summary.name.clone());
        self.driver_email = summary.and_then(|summary| summary.email);
        self.with_status(ConfirmationStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShiftView {
    Single(Box<HydratedShift>),
    Week(Box<WeekShiftView>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOutcome {
    pub updated_ids: Vec<ItemId>,
    #[serde(flatten)]
    pub assignment: DriverAssignment,
    /// Updated week view; only set for `week:` tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<WeekShiftView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationOutcome {
    pub updated_ids: Vec<ItemId>,
    pub status: ConfirmationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<WeekShiftView>,
}

pub struct ShiftService {
    generator: ShiftGenerator,
    hydration: HydrationEngine,
    resolver: Arc<dyn ReferenceResolver>,
    weeks: WeekGroupResolver,
    confirmation: ConfirmationWorkflow,
    cache: Arc<ShiftListCache>,
    settings: ServiceSettings,
}

impl ShiftService {
    pub fn new(
        repository: ShiftInstanceRepository,
        catalog: Arc<dyn PatternCatalog>,
        resolver: Arc<dyn ReferenceResolver>,
        cache: Arc<ShiftListCache>,
        settings: ServiceSettings,
    ) -> Self {
        let hydration = HydrationEngine::new(repository.clone(), catalog.clone(), resolver.clone());
        Self {
            generator: ShiftGenerator::new(
                repository.clone(),
                catalog,
                resolver.clone(),
                settings.generation.clone(),
            ),
            resolver,
            weeks: WeekGroupResolver::new(hydration.clone()),
            confirmation: ConfirmationWorkflow::new(repository),
            hydration,
            cache,
            settings,
        }
    }

    pub async fn generate(
        &self,
        workspace_id: &WorkspaceId,
        month: &str,
    ) -> Result<GenerationReport, ShiftError> {
        let result = self.generator.generate(workspace_id, month).await;
        // A failed run may still have created rows.
        self.invalidate_shift_lists();
        result
    }

    /// Hydrated instances, served from the short-lived list cache.
    pub async fn list_shifts(
        &self,
        workspace_id: Option<&WorkspaceId>,
        month: Option<&str>,
    ) -> Result<Vec<HydratedShift>, ShiftError> {
        let key = CacheKey::shifts(workspace_id.map(WorkspaceId::as_str), month);
        let engine = self.hydration.clone();
        let workspace_id = workspace_id.cloned();
        let month = month.map(str::to_owned);

        self.cache
            .get_or_set(key, self.settings.shifts_ttl, move || async move {
                engine
                    .list_hydrated(workspace_id.as_ref(), month.as_deref())
                    .await
            })
            .await
    }

    pub async fn get_by_id(
        &self,
        raw_id: &str,
        options: HydrateOptions,
    ) -> Result<Option<ShiftView>, ShiftError> {
        match ShiftAddress::parse(raw_id) {
            None => Ok(None),
            Some(ShiftAddress::Item(id)) => Ok(self
                .hydration
                .get_by_id(&id, options)
                .await?
                .map(|shift| ShiftView::Single(Box::new(shift)))),
            Some(address @ ShiftAddress::Week(_)) => Ok(self
                .week_group(&address)
                .await?
                .map(|group| ShiftView::Week(Box::new(WeekShiftView::new(address.token(), &group))))),
        }
    }

    pub async fn resolve_week(&self, anchor_id: &ItemId) -> Result<Option<WeekGroup>, ShiftError> {
        self.weeks.resolve_week(anchor_id).await
    }

    /// `None` when the id is blank, names no hydratable shift or names an
    /// empty week group. Nothing is written in those cases.
    pub async fn assign_driver(
        &self,
        raw_id: &str,
        driver: &Reference,
    ) -> Result<Option<AssignmentOutcome>, ShiftError> {
        let outcome = match ShiftAddress::parse(raw_id) {
            None => return Ok(None),
            Some(ShiftAddress::Item(id)) => {
                if !self.is_hydratable(&id).await? {
                    return Ok(None);
                }
                let assignment = self.confirmation.assign_driver(&id, driver).await;
                self.invalidate_shift_lists();
                AssignmentOutcome {
                    updated_ids: vec![id],
                    assignment: assignment?,
                    shift: None,
                }
            }
            Some(address @ ShiftAddress::Week(_)) => {
                let Some(group) = self.week_group(&address).await? else {
                    return Ok(None);
                };
                let batch = self
                    .confirmation
                    .assign_driver_to_all(
                        &group.member_ids(),
                        driver,
                        self.settings.assign_concurrency,
                    )
                    .await;
                self.invalidate_shift_lists();
                let batch = batch?;
                let view = WeekShiftView::new(address.token(), &group)
                    .with_driver(driver, self.driver_summary(driver).await);
                AssignmentOutcome {
                    assignment: batch.summary(),
                    updated_ids: batch.updated_ids,
                    shift: Some(view),
                }
            }
        };

        info!(
            id = raw_id,
            driver = %driver,
            updated = outcome.updated_ids.len(),
            status_write_ok = outcome.assignment.status_write_ok,
            "driver assigned"
        );
        Ok(Some(outcome))
    }

    pub async fn set_confirmation_status(
        &self,
        raw_id: &str,
        status: ConfirmationStatus,
    ) -> Result<Option<ConfirmationOutcome>, ShiftError> {
        let (updated_ids, shift) = match ShiftAddress::parse(raw_id) {
            None => return Ok(None),
            Some(ShiftAddress::Item(id)) => {
                if !self.is_hydratable(&id).await? {
                    return Ok(None);
                }
                let written = self.confirmation.set_confirmation_status(&id, status).await;
                self.invalidate_shift_lists();
                written?;
                (vec![id], None)
            }
            Some(address @ ShiftAddress::Week(_)) => {
                let Some(group) = self.week_group(&address).await? else {
                    return Ok(None);
                };
                let written = self
                    .confirmation
                    .set_confirmation_status_for_all(
                        &group.member_ids(),
                        status,
                        self.settings.confirm_concurrency,
                    )
                    .await;
                self.invalidate_shift_lists();
                let view = WeekShiftView::new(address.token(), &group).with_status(status);
                (written?, Some(view))
            }
        };

        info!(id = raw_id, status = %status, updated = updated_ids.len(), "confirmation status set");
        Ok(Some(ConfirmationOutcome {
            updated_ids,
            status,
            shift,
        }))
    }

    /// Subject for the confirmation request; weeks use their anchor shift.
    pub async fn confirmation_subject(&self, raw_id: &str) -> Result<Option<String>, ShiftError> {
        let shift = match ShiftAddress::parse(raw_id) {
            None => None,
            Some(ShiftAddress::Item(id)) => {
                self.hydration
                    .get_by_id(&id, HydrateOptions::without_trips())
                    .await?
            }
            Some(address @ ShiftAddress::Week(_)) => {
                self.week_group(&address).await?.map(|group| group.anchor)
            }
        };
        Ok(shift.as_ref().map(confirmation_subject))
    }

    pub fn invalidate_shift_lists(&self) {
        self.cache.invalidate_prefix(SHIFTS_KEY_PREFIX);
    }

    /// Instances whose pattern is gone do not hydrate and are not mutated.
    async fn is_hydratable(&self, id: &ItemId) -> Result<bool, ShiftError> {
        let shift = self
            .hydration
            .get_by_id(id, HydrateOptions::without_trips())
            .await?;
        if shift.is_none() {
            debug!(id = %id, "single-item mutation skipped; shift not found");
        }
        Ok(shift.is_some())
    }

    async fn driver_summary(&self, driver: &Reference) -> Option<DriverSummary> {
        let ids = BTreeSet::from([driver.clone()]);
        match self.resolver.resolve_drivers(&ids).await {
            Ok(mut drivers) => drivers.remove(driver),
            Err(error) => {
                warn!(driver = %driver, error = %error, "driver lookup for week view failed");
                None
            }
        }
    }

    /// A week group with no members is reported as not found.
    async fn week_group(&self, address: &ShiftAddress) -> Result<Option<WeekGroup>, ShiftError> {
        let ShiftAddress::Week(anchor) = address else {
            return Ok(None);
        };
        Ok(self
            .weeks
            .resolve_week(anchor)
            .await?
            .filter(|group| !group.shifts.is_empty()))
    }
}
