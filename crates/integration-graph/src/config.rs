use std::fmt;
use std::time::Duration;

use shiftgen_core::{InstanceFieldNames, ListId};

use crate::stops::StopTemplateFieldNames;
use crate::trips::TripTemplateFieldNames;

pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_TRIP_TEMPLATES_TTL: Duration = Duration::from_millis(30_000);

/// Where the site lives and how to authenticate against it.
#[derive(Clone, PartialEq, Eq)]
pub struct GraphConnection {
    pub api_url: String,
    pub access_token: String,
    pub site_id: String,
}

impl GraphConnection {
    pub fn new(site_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_GRAPH_API_URL.to_owned(),
            access_token: access_token.into(),
            site_id: site_id.into(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl fmt::Debug for GraphConnection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GraphConnection")
            .field("api_url", &self.api_url)
            .field("access_token", &"<redacted>")
            .field("site_id", &self.site_id)
            .finish()
    }
}

/// Column names of the pattern list. Blank names are skipped and the
/// catalog falls back to the common internal names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFieldNames {
    pub route: String,
    pub route_name: String,
    pub shift_type: String,
    pub week_part: String,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub workspace_id: String,
    pub template_id: String,
}

impl Default for PatternFieldNames {
    fn default() -> Self {
        Self {
            route: "route".to_owned(),
            route_name: "routeName".to_owned(),
            shift_type: "shiftType".to_owned(),
            week_part: String::new(),
            day_of_week: "dayOfWeek".to_owned(),
            start_time: "startTime".to_owned(),
            end_time: "endTime".to_owned(),
            workspace_id: String::new(),
            template_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFieldNames {
    pub route_name: String,
}

impl Default for TemplateFieldNames {
    fn default() -> Self {
        Self {
            route_name: "routeName".to_owned(),
        }
    }
}

/// Optional reference lists. Missing bus, driver, trip-template and
/// stops-template lists are discovered from the site; missing template and
/// route lists disable those lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceLists {
    pub templates: Option<ListId>,
    pub buses: Option<ListId>,
    pub drivers: Option<ListId>,
    pub routes: Option<ListId>,
    pub trip_templates: Option<ListId>,
    pub stops_templates: Option<ListId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Instance list whose lookup columns point at the bus and driver lists.
    pub instances: ListId,
    pub instance_fields: InstanceFieldNames,
    pub lists: ReferenceLists,
    pub template_fields: TemplateFieldNames,
    pub trip_fields: TripTemplateFieldNames,
    pub stop_fields: StopTemplateFieldNames,
    /// Lifetime of cached trip-template and stops-template rows.
    pub trip_templates_ttl: Duration,
}

impl ResolverSettings {
    pub fn new(instances: ListId) -> Self {
        Self {
            instances,
            instance_fields: InstanceFieldNames::default(),
            lists: ReferenceLists::default(),
            template_fields: TemplateFieldNames::default(),
            trip_fields: TripTemplateFieldNames::default(),
            stop_fields: StopTemplateFieldNames::default(),
            trip_templates_ttl: DEFAULT_TRIP_TEMPLATES_TTL,
        }
    }
}
