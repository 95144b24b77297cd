use crate::calendar::{add_days, is_weekend, DateWindow};
use crate::error::ShiftError;
use crate::hydration::{pattern_of, patterns_by_id, HydrateOptions, HydrationEngine, Lookups};
use crate::identifiers::ItemId;
use crate::model::{HydratedShift, ShiftInstance, ShiftPattern};
use crate::repository::InstanceQuery;
use chrono::NaiveDate;
use serde::Serialize;

/// The instances that share an anchor's route, shift type and week part in
/// the anchor's Monday-to-Sunday week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekGroup {
    pub anchor: HydratedShift,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub shifts: Vec<HydratedShift>,
}

impl WeekGroup {
    pub fn member_ids(&self) -> Vec<ItemId> {
        self.shifts.iter().map(|shift| shift.id.clone()).collect()
    }
}

#[derive(Clone)]
pub struct WeekGroupResolver {
    engine: HydrationEngine,
}

impl WeekGroupResolver {
    pub fn new(engine: HydrationEngine) -> Self {
        Self { engine }
    }

    /// `None` when the anchor cannot be hydrated.
    pub async fn resolve_week(&self, anchor_id: &ItemId) -> Result<Option<WeekGroup>, ShiftError> {
        let Some(anchor) = self
            .engine
            .get_by_id(anchor_id, HydrateOptions::without_trips())
            .await?
        else {
            return Ok(None);
        };

        let window = DateWindow::week_of(anchor.date);
        let week_start = window.start;
        let week_end = add_days(week_start, 6);

        let instances = self
            .engine
            .repository
            .list(&InstanceQuery::window(anchor.workspace_id.clone(), window))
            .await?;
        let patterns = self
            .engine
            .catalog
            .list_patterns(Some(&anchor.workspace_id))
            .await?;
        let by_id = patterns_by_id(&patterns);

        let anchor_week_part = anchor
            .pattern_id
            .as_ref()
            .and_then(|pattern| by_id.get(pattern.as_str()))
            .and_then(|pattern| pattern.week_part_key());

        let members: Vec<(&ShiftPattern, ShiftInstance)> = instances
            .into_iter()
            .filter_map(|instance| pattern_of(&by_id, &instance).map(|pattern| (pattern, instance)))
            .filter(|(pattern, instance)| {
                same_group(&anchor, anchor_week_part.as_deref(), pattern, instance.date)
            })
            .collect();

        let refs: Vec<&ShiftInstance> = members.iter().map(|(_, instance)| instance).collect();
        let lookups =
            Lookups::load(self.engine.resolver.as_ref(), &refs, HydrateOptions::without_trips())
                .await?;

        let mut shifts: Vec<HydratedShift> = members
            .into_iter()
            .map(|(pattern, instance)| lookups.hydrate(instance, pattern))
            .collect();
        shifts.sort_by_key(|shift| shift.date);

        Ok(Some(WeekGroup {
            anchor,
            week_start,
            week_end,
            shifts,
        }))
    }
}

/// Same route and shift type; then matching week parts when both sides have
/// one, otherwise the same weekend-or-weekday side as the anchor date.
fn same_group(
    anchor: &HydratedShift,
    anchor_week_part: Option<&str>,
    pattern: &ShiftPattern,
    date: NaiveDate,
) -> bool {
    if pattern.route != anchor.route || pattern.shift_type != anchor.shift_type {
        return false;
    }

    match (anchor_week_part, pattern.week_part_key()) {
        (Some(anchor_part), Some(part)) => part == anchor_part,
        _ => is_weekend(date) == is_weekend(anchor.date),
    }
}
