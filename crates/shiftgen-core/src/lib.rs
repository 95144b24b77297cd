//! Recurring shift engine: expands weekly patterns into dated instances,
//! collapses duplicates, hydrates instances for display and drives the
//! assignment and confirmation workflow over a generic list store.

pub mod cache;
pub mod calendar;
pub mod catalog;
pub mod confirmation;
pub mod dedup;
pub mod error;
pub mod generation;
pub mod hydration;
pub mod identifiers;
pub mod model;
pub mod notice;
pub mod pool;
pub mod record;
pub mod repository;
pub mod service;
pub mod store;
pub mod test_support;
pub mod week;

pub use cache::{CacheKey, CacheStats, ReadThroughCache, SHIFTS_KEY_PREFIX};
pub use calendar::{
    add_days, is_weekend, iso_date, midnight_utc, parse_iso_date, week_end_sunday,
    week_range_label, week_start_monday, DateWindow,
};
pub use catalog::{distinct_references, PatternCatalog, ReferenceResolver};
pub use confirmation::{BatchAssignment, ConfirmationWorkflow};
pub use dedup::{confirmation_status_rank, dedupe_instances, duplicate_score, pick_better_duplicate};
pub use error::{RemoteStoreError, ShiftError};
pub use generation::{GenerationSettings, ShiftGenerator};
pub use hydration::{HydrateOptions, HydrationEngine};
pub use identifiers::{ItemId, ListId, ShiftAddress, WorkspaceId, WEEK_TOKEN_PREFIX};
pub use model::{
    coverage_key, ConfirmationStatus, DriverAssignment, DriverSummary, GenerationReport,
    HydratedShift, LookupValue, Reference, ShiftInstance, ShiftPattern, TemplateDefaults, Trip,
    TripEvent,
};
pub use notice::{confirmation_subject, week_part_label};
pub use pool::{run_bounded, Concurrency, PoolOutcome};
pub use record::{
    non_blank, pick_first, read_any, read_lookup, value_as_bool, value_as_number, value_as_string,
    Fields, ListRecord,
};
pub use repository::{InstanceFieldNames, InstanceQuery, ShiftInstanceRepository};
pub use service::{
    AssignmentOutcome, ConfirmationOutcome, ServiceSettings, ShiftListCache, ShiftService,
    ShiftView, WeekMemberSummary, WeekShiftView, DEFAULT_SHIFTS_TTL,
};
pub use store::{DateRangeFilter, ListQuery, ListStore};
pub use week::{WeekGroup, WeekGroupResolver};
