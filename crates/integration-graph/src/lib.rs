//! Microsoft Graph backed list store, pattern catalog and reference
//! resolvers for SharePoint-hosted shift lists.

mod config;
mod odata;
mod patterns;
mod resolvers;
mod stops;
mod store;
mod transport;
mod trips;

pub use config::{
    GraphConnection, PatternFieldNames, ReferenceLists, ResolverSettings, TemplateFieldNames,
    DEFAULT_GRAPH_API_URL, DEFAULT_TRIP_TEMPLATES_TTL,
};
pub use odata::{filter_expression, items_url, string_literal, PAGE_SIZE};
pub use patterns::{
    filter_by_workspace, normalize_shift_type, normalize_week_part, parse_weekdays,
    GraphPatternCatalog,
};
pub use resolvers::GraphReferenceResolver;
pub use stops::{
    decode_lookup_text, normalize_column_key, normalize_stop_time, parse_duration_minutes,
    stops_for_trips, StopColumnKeys, StopTemplateFieldNames,
};
pub use store::{GraphListStore, ListColumn, SiteList};
pub use transport::{
    graph_error, parse_retry_after, GraphMethod, GraphRequest, GraphTransport,
    ReqwestGraphTransport, RetryPolicy,
};
pub use trips::{normalize_clock, normalize_time_range, read_template_id, TripRow, TripTemplateFieldNames};
