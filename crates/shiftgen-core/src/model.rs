use crate::error::ShiftError;
use crate::identifiers::{ItemId, WorkspaceId};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized pointer to a record in another list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference {
    pub id: String,
}

impl Reference {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Numeric form required when writing `<field>LookupId` columns.
    pub fn lookup_number(&self) -> Result<i64, ShiftError> {
        self.id.trim().parse::<i64>().map_err(|_| {
            ShiftError::InvalidInput(format!(
                "lookup id `{}` must be numeric to be written to a lookup column",
                self.id
            ))
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.id)
    }
}

/// The two shapes a lookup column can be read back in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupValue {
    Id(String),
    Display(String),
}

impl LookupValue {
    pub fn into_reference(self) -> Reference {
        match self {
            Self::Id(id) | Self::Display(id) => Reference::new(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPattern {
    pub id: ItemId,
    pub route: String,
    pub route_name: Option<String>,
    pub shift_type: String,
    pub week_part: Option<String>,
    /// Weekday ordinals, 0 = Sunday .. 6 = Saturday.
    pub weekdays: Vec<u32>,
    pub start_time: String,
    pub end_time: String,
    pub workspace_id: Option<WorkspaceId>,
    pub template_id: Option<Reference>,
}

impl ShiftPattern {
    pub fn is_usable(&self) -> bool {
        !self.route.trim().is_empty()
            && !self.shift_type.trim().is_empty()
            && !self.weekdays.is_empty()
            && !self.start_time.trim().is_empty()
            && !self.end_time.trim().is_empty()
    }

    pub fn recurs_on(&self, date: NaiveDate) -> bool {
        self.weekdays
            .contains(&date.weekday().num_days_from_sunday())
    }

    pub fn time_label(&self) -> String {
        format!("{}–{}", self.start_time, self.end_time)
    }

    pub fn display_name(&self) -> String {
        self.route_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.route.as_str()).filter(|route| !route.is_empty()))
            .unwrap_or(self.shift_type.as_str())
            .to_owned()
    }

    /// Lower-cased, trimmed week part; `None` when blank.
    pub fn week_part_key(&self) -> Option<String> {
        self.week_part
            .as_deref()
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftInstance {
    pub id: ItemId,
    pub workspace_id: WorkspaceId,
    pub date: NaiveDate,
    pub template_id: Option<Reference>,
    pub pattern_id: Option<Reference>,
    pub driver_id: Option<Reference>,
    pub bus_id: Option<Reference>,
    pub confirmation_status: Option<String>,
    pub notes: Option<String>,
    pub generated: Option<bool>,
    pub manual_override: Option<bool>,
}

impl ShiftInstance {
    pub fn new(id: impl Into<ItemId>, workspace_id: impl Into<WorkspaceId>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            date,
            template_id: None,
            pattern_id: None,
            driver_id: None,
            bus_id: None,
            confirmation_status: None,
            notes: None,
            generated: None,
            manual_override: None,
        }
    }

    /// `date|patternId`, or `None` when the instance has no pattern.
    pub fn coverage_key(&self) -> Option<String> {
        self.pattern_id
            .as_ref()
            .map(|pattern| coverage_key(self.date, pattern.as_str()))
    }
}

pub fn coverage_key(date: NaiveDate, pattern_id: &str) -> String {
    format!("{}|{pattern_id}", date.format("%Y-%m-%d"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TripEvent {
    Stop {
        time: Option<String>,
        label: String,
    },
    Break {
        duration_minutes: Option<u32>,
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub name: String,
    pub time: String,
    pub trip_item_id: Option<String>,
    pub bus_override: Option<String>,
    pub events: Vec<TripEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSummary {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDefaults {
    pub bus: Option<Reference>,
    pub driver: Option<Reference>,
    pub route: Option<Reference>,
    pub route_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedShift {
    pub id: ItemId,
    pub workspace_id: WorkspaceId,
    pub date: NaiveDate,
    pub route: String,
    pub route_name: Option<String>,
    pub shift_type: String,
    pub week_part: Option<String>,
    pub name: String,
    pub time: String,
    pub default_bus: Option<String>,
    pub driver_id: Option<Reference>,
    pub driver_name: Option<String>,
    pub driver_email: Option<String>,
    pub confirmation_status: Option<String>,
    pub notes: Option<String>,
    pub generated: Option<bool>,
    pub manual_override: Option<bool>,
    pub pattern_id: Option<Reference>,
    pub template_id: Option<Reference>,
    pub bus_id: Option<Reference>,
    pub trips: Vec<Trip>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Unassigned,
    Pending,
    Accepted,
    Declined,
}

impl ConfirmationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationStatus {
    type Err = ShiftError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(ShiftError::InvalidInput(format!(
                "unknown confirmation status `{other}`; expected unassigned, pending, accepted or declined"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub created: usize,
    pub skipped: usize,
}

/// Outcome of assigning a driver. The status write is best-effort, so a
/// failed write is reported here instead of failing the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAssignment {
    pub assigned: bool,
    pub status_write_ok: bool,
}
