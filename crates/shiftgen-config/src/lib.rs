use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_SHIFTGEN_CONFIG: &str = "SHIFTGEN_CONFIG";

const DEFAULT_GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_CONCURRENCY: usize = 6;
const MAX_GENERATION_CONCURRENCY: usize = 20;
const MAX_BATCH_CONCURRENCY: usize = 12;
const DEFAULT_SHIFTS_TTL_MS: u64 = 15_000;
const DEFAULT_TRIP_TEMPLATES_TTL_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShiftgenConfig {
    #[serde(default)]
    pub graph: GraphConfigToml,
    #[serde(default)]
    pub lists: ListsConfigToml,
    #[serde(default)]
    pub instance_fields: InstanceFieldsToml,
    #[serde(default)]
    pub pattern_fields: PatternFieldsToml,
    #[serde(default)]
    pub template_fields: TemplateFieldsToml,
    #[serde(default)]
    pub trip_template_fields: TripTemplateFieldsToml,
    #[serde(default)]
    pub stop_template_fields: StopTemplateFieldsToml,
    #[serde(default)]
    pub generation: GenerationConfigToml,
    #[serde(default)]
    pub batch: BatchConfigToml,
    #[serde(default)]
    pub cache: CacheConfigToml,
}

/// Settings without which no list can be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub api_url: String,
    pub site_id: String,
    pub access_token: String,
    pub shift_instances_list: String,
    pub shift_patterns_list: String,
}

impl ShiftgenConfig {
    /// Fails naming the first missing of site id, instance list, pattern list
    /// and access token.
    pub fn require_store_settings(&self) -> Result<StoreSettings, ConfigError> {
        let required = [
            (self.graph.site_id.as_str(), "graph.site_id (MS_SITE_ID)"),
            (
                self.lists.shift_instances.as_str(),
                "lists.shift_instances (MS_SHIFT_INSTANCES_LIST_ID)",
            ),
            (
                self.lists.shift_patterns.as_str(),
                "lists.shift_patterns (MS_SHIFT_PATTERNS_LIST_ID)",
            ),
            (
                self.graph.access_token.as_str(),
                "graph.access_token (GRAPH_BEARER_TOKEN)",
            ),
        ];
        if let Some((_, name)) = required.iter().find(|(value, _)| value.trim().is_empty()) {
            return Err(ConfigError::configuration(format!(
                "{name} is not configured. Set it in {ENV_SHIFTGEN_CONFIG} or export the variable."
            )));
        }

        Ok(StoreSettings {
            api_url: self.graph.api_url.clone(),
            site_id: self.graph.site_id.clone(),
            access_token: self.graph.access_token.clone(),
            shift_instances_list: self.lists.shift_instances.clone(),
            shift_patterns_list: self.lists.shift_patterns.clone(),
        })
    }

    pub fn default_bus_lookup_id(&self) -> Option<&str> {
        non_blank(&self.generation.default_bus_lookup_id)
    }
}

pub fn load_from_env() -> Result<ShiftgenConfig, ConfigError> {
    let path = config_path_from_env()?;
    let mut config = load_from_path(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ShiftgenConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("shiftgen").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_SHIFTGEN_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "SHIFTGEN_CONFIG contained invalid UTF-8",
        )),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphConfigToml {
    #[serde(default = "default_graph_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub site_id: String,
}

impl Default for GraphConfigToml {
    fn default() -> Self {
        Self {
            api_url: default_graph_api_url(),
            access_token: String::new(),
            site_id: String::new(),
        }
    }
}

/// List ids. Blank optional lists are discovered from the site or disable
/// their lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListsConfigToml {
    #[serde(default)]
    pub shift_instances: String,
    #[serde(default)]
    pub shift_patterns: String,
    #[serde(default)]
    pub templates: String,
    #[serde(default)]
    pub buses: String,
    #[serde(default)]
    pub drivers: String,
    #[serde(default)]
    pub routes: String,
    #[serde(default)]
    pub trip_templates: String,
    #[serde(default)]
    pub stops_templates: String,
}

impl ListsConfigToml {
    pub fn optional(value: &str) -> Option<&str> {
        non_blank(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceFieldsToml {
    #[serde(default = "default_instance_workspace_id")]
    pub workspace_id: String,
    #[serde(default = "default_instance_date")]
    pub date: String,
    #[serde(default = "default_instance_template_id")]
    pub template_id: String,
    #[serde(default = "default_instance_pattern_id")]
    pub pattern_id: String,
    #[serde(default = "default_instance_driver_id")]
    pub driver_id: String,
    #[serde(default = "default_instance_bus_id")]
    pub bus_id: String,
    #[serde(default = "default_instance_confirmation_status")]
    pub confirmation_status: String,
    #[serde(default = "default_instance_notes")]
    pub notes: String,
    #[serde(default = "default_instance_generated")]
    pub generated: String,
    #[serde(default = "default_instance_manual_override")]
    pub manual_override: String,
}

impl Default for InstanceFieldsToml {
    fn default() -> Self {
        Self {
            workspace_id: default_instance_workspace_id(),
            date: default_instance_date(),
            template_id: default_instance_template_id(),
            pattern_id: default_instance_pattern_id(),
            driver_id: default_instance_driver_id(),
            bus_id: default_instance_bus_id(),
            confirmation_status: default_instance_confirmation_status(),
            notes: default_instance_notes(),
            generated: default_instance_generated(),
            manual_override: default_instance_manual_override(),
        }
    }
}

/// Pattern list columns. Blank entries fall back to the catalog's built-in
/// column names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternFieldsToml {
    #[serde(default = "default_pattern_route")]
    pub route: String,
    #[serde(default = "default_pattern_route_name")]
    pub route_name: String,
    #[serde(default = "default_pattern_shift_type")]
    pub shift_type: String,
    #[serde(default)]
    pub week_part: String,
    #[serde(default = "default_pattern_day_of_week")]
    pub day_of_week: String,
    #[serde(default = "default_pattern_start_time")]
    pub start_time: String,
    #[serde(default = "default_pattern_end_time")]
    pub end_time: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub template_id: String,
}

impl Default for PatternFieldsToml {
    fn default() -> Self {
        Self {
            route: default_pattern_route(),
            route_name: default_pattern_route_name(),
            shift_type: default_pattern_shift_type(),
            week_part: String::new(),
            day_of_week: default_pattern_day_of_week(),
            start_time: default_pattern_start_time(),
            end_time: default_pattern_end_time(),
            workspace_id: String::new(),
            template_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateFieldsToml {
    #[serde(default = "default_pattern_route_name")]
    pub route_name: String,
}

impl Default for TemplateFieldsToml {
    fn default() -> Self {
        Self {
            route_name: default_pattern_route_name(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripTemplateFieldsToml {
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub bus_override: String,
    #[serde(default)]
    pub events: String,
}

/// Stops-template list columns. Blank entries fall back to the common names
/// and to columns matched by display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopTemplateFieldsToml {
    #[serde(default)]
    pub trip_id: String,
    #[serde(default)]
    pub stop_name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub sort_order: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationConfigToml {
    /// Bus lookup id written when a pattern's template carries none.
    #[serde(default)]
    pub default_bus_lookup_id: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GenerationConfigToml {
    fn default() -> Self {
        Self {
            default_bus_lookup_id: String::new(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchConfigToml {
    #[serde(default = "default_concurrency")]
    pub assign_concurrency: usize,
    #[serde(default = "default_concurrency")]
    pub confirm_concurrency: usize,
}

impl Default for BatchConfigToml {
    fn default() -> Self {
        Self {
            assign_concurrency: default_concurrency(),
            confirm_concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfigToml {
    #[serde(default = "default_shifts_ttl_ms")]
    pub shifts_ttl_ms: u64,
    #[serde(default = "default_trip_templates_ttl_ms")]
    pub trip_templates_ttl_ms: u64,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            shifts_ttl_ms: default_shifts_ttl_ms(),
            trip_templates_ttl_ms: default_trip_templates_ttl_ms(),
        }
    }
}

fn default_graph_api_url() -> String {
    DEFAULT_GRAPH_API_URL.to_owned()
}

fn default_instance_workspace_id() -> String {
    "workspaceId".to_owned()
}

fn default_instance_date() -> String {
    "date".to_owned()
}

fn default_instance_template_id() -> String {
    "templateId".to_owned()
}

fn default_instance_pattern_id() -> String {
    "patternId".to_owned()
}

fn default_instance_driver_id() -> String {
    "driverId".to_owned()
}

fn default_instance_bus_id() -> String {
    "busId".to_owned()
}

fn default_instance_confirmation_status() -> String {
    "confirmationStatus".to_owned()
}

fn default_instance_notes() -> String {
    "notes".to_owned()
}

fn default_instance_generated() -> String {
    "generated".to_owned()
}

fn default_instance_manual_override() -> String {
    "manualOverride".to_owned()
}

fn default_pattern_route() -> String {
    "route".to_owned()
}

fn default_pattern_route_name() -> String {
    "routeName".to_owned()
}

fn default_pattern_shift_type() -> String {
    "shiftType".to_owned()
}

fn default_pattern_day_of_week() -> String {
    "dayOfWeek".to_owned()
}

fn default_pattern_start_time() -> String {
    "startTime".to_owned()
}

fn default_pattern_end_time() -> String {
    "endTime".to_owned()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_shifts_ttl_ms() -> u64 {
    DEFAULT_SHIFTS_TTL_MS
}

fn default_trip_templates_ttl_ms() -> u64 {
    DEFAULT_TRIP_TEMPLATES_TTL_MS
}

/// Overlays deployment environment variables on top of the file values.
/// Blank variables are ignored; unsigned variables that do not parse fail.
pub fn apply_env_overrides<F>(config: &mut ShiftgenConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| {
        lookup(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    };
    let text = |target: &mut String, name: &str| {
        if let Some(value) = read(name) {
            *target = value;
        }
    };

    text(&mut config.graph.site_id, "MS_SITE_ID");
    text(&mut config.graph.access_token, "GRAPH_BEARER_TOKEN");

    let lists = &mut config.lists;
    text(&mut lists.shift_instances, "MS_SHIFT_INSTANCES_LIST_ID");
    text(&mut lists.shift_patterns, "MS_SHIFT_PATTERNS_LIST_ID");
    text(&mut lists.templates, "MS_TEMPLATES_LIST_ID");
    text(&mut lists.buses, "MS_BUSES_LIST_ID");
    text(&mut lists.drivers, "MS_DRIVERS_LIST_ID");
    text(&mut lists.routes, "MS_ROUTES_LIST_ID");
    text(&mut lists.trip_templates, "MS_TRIP_TEMPLATES_LIST_ID");
    text(&mut lists.stops_templates, "MS_STOPS_TEMPLATE_LIST_ID");

    let instance = &mut config.instance_fields;
    text(&mut instance.workspace_id, "LIST_FIELD_WORKSPACE_ID");
    text(&mut instance.date, "LIST_FIELD_DATE");
    text(&mut instance.template_id, "LIST_FIELD_TEMPLATE_ID");
    text(&mut instance.pattern_id, "LIST_FIELD_PATTERN_ID");
    text(&mut instance.driver_id, "LIST_FIELD_DRIVER_ID");
    text(&mut instance.bus_id, "LIST_FIELD_BUS_ID");
    text(&mut instance.confirmation_status, "LIST_FIELD_CONFIRMATION_STATUS");
    text(&mut instance.notes, "LIST_FIELD_NOTES");
    text(&mut instance.generated, "LIST_FIELD_GENERATED");
    text(&mut instance.manual_override, "LIST_FIELD_MANUAL_OVERRIDE");

    let pattern = &mut config.pattern_fields;
    text(&mut pattern.route, "PATTERN_FIELD_ROUTE");
    text(&mut pattern.route_name, "PATTERN_FIELD_ROUTE_NAME");
    text(&mut pattern.shift_type, "PATTERN_FIELD_SHIFT_TYPE");
    text(&mut pattern.week_part, "PATTERN_FIELD_WEEK_PART");
    text(&mut pattern.day_of_week, "PATTERN_FIELD_DAY_OF_WEEK");
    text(&mut pattern.start_time, "PATTERN_FIELD_START_TIME");
    text(&mut pattern.end_time, "PATTERN_FIELD_END_TIME");
    text(&mut pattern.workspace_id, "PATTERN_FIELD_WORKSPACE_ID");
    text(&mut pattern.template_id, "PATTERN_FIELD_TEMPLATE_ID");

    text(
        &mut config.template_fields.route_name,
        "TEMPLATE_FIELD_ROUTE_NAME",
    );

    let trip = &mut config.trip_template_fields;
    text(&mut trip.template_id, "TRIPTEMPLATE_FIELD_TEMPLATE_ID");
    text(&mut trip.name, "TRIPTEMPLATE_FIELD_NAME");
    text(&mut trip.time, "TRIPTEMPLATE_FIELD_TIME");
    text(&mut trip.start, "TRIPTEMPLATE_FIELD_START");
    text(&mut trip.end, "TRIPTEMPLATE_FIELD_END");
    text(&mut trip.bus_override, "TRIPTEMPLATE_FIELD_BUS_OVERRIDE");
    text(&mut trip.events, "TRIPTEMPLATE_FIELD_EVENTS");

    let stop = &mut config.stop_template_fields;
    text(&mut stop.trip_id, "STOPSTEMPLATE_FIELD_TRIP_ID");
    text(&mut stop.stop_name, "STOPSTEMPLATE_FIELD_STOP_NAME");
    text(&mut stop.time, "STOPSTEMPLATE_FIELD_TIME");
    text(&mut stop.sort_order, "STOPSTEMPLATE_FIELD_SORT_ORDER");
    text(&mut stop.event_type, "STOPSTEMPLATE_FIELD_EVENT_TYPE");
    text(&mut stop.duration, "STOPSTEMPLATE_FIELD_DURATION");

    text(
        &mut config.generation.default_bus_lookup_id,
        "DEFAULT_BUS_LOOKUP_ID",
    );

    let unsigned = |name: &str| -> Result<Option<u64>, ConfigError> {
        read(name)
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| {
                    ConfigError::configuration(format!(
                        "{name} must be a non-negative integer, got '{raw}'"
                    ))
                })
            })
            .transpose()
    };

    if let Some(value) = unsigned("GENERATE_CONCURRENCY")? {
        config.generation.concurrency = saturating_usize(value);
    }
    if let Some(value) = unsigned("ASSIGN_CONCURRENCY")? {
        config.batch.assign_concurrency = saturating_usize(value);
    }
    if let Some(value) = unsigned("CONFIRM_CONCURRENCY")? {
        config.batch.confirm_concurrency = saturating_usize(value);
    }
    if let Some(value) = unsigned("CACHE_SHIFTS_TTL_MS")? {
        config.cache.shifts_ttl_ms = value;
    }
    if let Some(value) = unsigned("TRIP_TEMPLATES_CACHE_TTL_MS")? {
        config.cache.trip_templates_ttl_ms = value;
    }

    normalize_config(config);
    Ok(())
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn persist_config(path: &Path, config: &ShiftgenConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize SHIFTGEN_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write SHIFTGEN_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<ShiftgenConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for SHIFTGEN_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = ShiftgenConfig::default();
            persist_config(path, &default_config)?;

            toml::to_string_pretty(&default_config).map_err(|err| {
                ConfigError::configuration(format!(
                    "Failed to serialize default SHIFTGEN_CONFIG: {err}"
                ))
            })?
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read SHIFTGEN_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: ShiftgenConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse SHIFTGEN_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    if normalize_config(&mut config) {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn normalize_config(config: &mut ShiftgenConfig) -> bool {
    let mut changed = false;

    changed |= normalize_text(&mut config.graph.api_url, DEFAULT_GRAPH_API_URL);
    changed |= trim_in_place(&mut config.graph.access_token);
    changed |= trim_in_place(&mut config.graph.site_id);

    let lists = &mut config.lists;
    for value in [
        &mut lists.shift_instances,
        &mut lists.shift_patterns,
        &mut lists.templates,
        &mut lists.buses,
        &mut lists.drivers,
        &mut lists.routes,
        &mut lists.trip_templates,
        &mut lists.stops_templates,
    ] {
        changed |= trim_in_place(value);
    }

    let instance = &mut config.instance_fields;
    let instance_defaults = InstanceFieldsToml::default();
    for (value, fallback) in [
        (&mut instance.workspace_id, &instance_defaults.workspace_id),
        (&mut instance.date, &instance_defaults.date),
        (&mut instance.template_id, &instance_defaults.template_id),
        (&mut instance.pattern_id, &instance_defaults.pattern_id),
        (&mut instance.driver_id, &instance_defaults.driver_id),
        (&mut instance.bus_id, &instance_defaults.bus_id),
        (
            &mut instance.confirmation_status,
            &instance_defaults.confirmation_status,
        ),
        (&mut instance.notes, &instance_defaults.notes),
        (&mut instance.generated, &instance_defaults.generated),
        (
            &mut instance.manual_override,
            &instance_defaults.manual_override,
        ),
    ] {
        changed |= normalize_text(value, fallback);
    }

    let pattern = &mut config.pattern_fields;
    for value in [
        &mut pattern.route,
        &mut pattern.route_name,
        &mut pattern.shift_type,
        &mut pattern.week_part,
        &mut pattern.day_of_week,
        &mut pattern.start_time,
        &mut pattern.end_time,
        &mut pattern.workspace_id,
        &mut pattern.template_id,
    ] {
        changed |= trim_in_place(value);
    }
    changed |= trim_in_place(&mut config.template_fields.route_name);

    let trip = &mut config.trip_template_fields;
    for value in [
        &mut trip.template_id,
        &mut trip.name,
        &mut trip.time,
        &mut trip.start,
        &mut trip.end,
        &mut trip.bus_override,
        &mut trip.events,
    ] {
        changed |= trim_in_place(value);
    }

    let stop = &mut config.stop_template_fields;
    for value in [
        &mut stop.trip_id,
        &mut stop.stop_name,
        &mut stop.time,
        &mut stop.sort_order,
        &mut stop.event_type,
        &mut stop.duration,
    ] {
        changed |= trim_in_place(value);
    }

    changed |= trim_in_place(&mut config.generation.default_bus_lookup_id);
    changed |= clamp_in_place(
        &mut config.generation.concurrency,
        MAX_GENERATION_CONCURRENCY,
    );
    changed |= clamp_in_place(&mut config.batch.assign_concurrency, MAX_BATCH_CONCURRENCY);
    changed |= clamp_in_place(&mut config.batch.confirm_concurrency, MAX_BATCH_CONCURRENCY);

    if config.cache.shifts_ttl_ms == 0 {
        config.cache.shifts_ttl_ms = DEFAULT_SHIFTS_TTL_MS;
        changed = true;
    }
    if config.cache.trip_templates_ttl_ms == 0 {
        config.cache.trip_templates_ttl_ms = DEFAULT_TRIP_TEMPLATES_TTL_MS;
        changed = true;
    }

    changed
}

fn trim_in_place(value: &mut String) -> bool {
    let trimmed = value.trim();
    if trimmed.len() == value.len() {
        return false;
    }
    *value = trimmed.to_owned();
    true
}

fn normalize_text(value: &mut String, fallback: &str) -> bool {
    let trimmed = value.trim();
    let next = if trimmed.is_empty() { fallback } else { trimmed };
    if next == value.as_str() {
        return false;
    }
    *value = next.to_owned();
    true
}

fn clamp_in_place(value: &mut usize, max: usize) -> bool {
    let clamped = (*value).clamp(1, max);
    if clamped == *value {
        return false;
    }
    *value = clamped;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn with_env_vars<F>(vars: &[(&str, Option<&str>)], test: F)
    where
        F: FnOnce(),
    {
        let _guard = env_lock().lock().expect("env lock");
        let backup = vars
            .iter()
            .map(|(name, _)| ((*name).to_owned(), std::env::var(name).ok()))
            .collect::<Vec<_>>();

        for (name, value) in vars {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }

        test();

        for (name, value) in backup {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "shiftgen-config-{prefix}-{nanos}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).expect("create temp dir");
        path
    }

    fn remove_temp_path(path: &Path) {
        let _ = std::fs::remove_dir_all(path);
    }

    fn write_config_file(path: &Path, raw: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture config parent");
        }
        std::fs::write(path, raw.as_bytes()).expect("write fixture config");
    }

    fn env_map(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect::<HashMap<_, _>>();
        move |name: &str| map.get(name).cloned()
    }

    const DEPLOYMENT_VARS: [&str; 9] = [
        "MS_SITE_ID",
        "MS_SHIFT_INSTANCES_LIST_ID",
        "MS_SHIFT_PATTERNS_LIST_ID",
        "GRAPH_BEARER_TOKEN",
        "GENERATE_CONCURRENCY",
        "ASSIGN_CONCURRENCY",
        "CONFIRM_CONCURRENCY",
        "CACHE_SHIFTS_TTL_MS",
        "TRIP_TEMPLATES_CACHE_TTL_MS",
    ];

    #[test]
    fn load_from_env_creates_default_config_when_missing() {
        let home = unique_temp_dir("home-defaults");
        let expected = home.join(".config").join("shiftgen").join("config.toml");
        let home_value = home.to_str().expect("home path").to_owned();

        let mut vars = vec![
            ("HOME", Some(home_value.as_str())),
            ("USERPROFILE", None),
            (ENV_SHIFTGEN_CONFIG, None),
        ];
        vars.extend(DEPLOYMENT_VARS.iter().map(|name| (*name, None)));

        with_env_vars(&vars, || {
            let config = load_from_env().expect("load defaults");
            assert_eq!(config, ShiftgenConfig::default());
            assert_eq!(config.graph.api_url, "https://graph.microsoft.com/v1.0");
            assert_eq!(config.generation.concurrency, 6);
            assert_eq!(config.cache.shifts_ttl_ms, 15_000);
            assert_eq!(config.cache.trip_templates_ttl_ms, 30_000);
            assert!(expected.exists());
        });

        remove_temp_path(&home);
    }

    #[test]
    fn load_from_env_uses_explicit_config_path_and_env_overrides() {
        let root = unique_temp_dir("explicit-path");
        let config_path = root.join("nested").join("shiftgen.toml");
        write_config_file(
            &config_path,
            r#"
[graph]
site_id = "file-site"

[lists]
shift_instances = "instances-from-file"
"#,
        );
        let config_value = config_path.to_str().expect("config path").to_owned();

        let mut vars = vec![(ENV_SHIFTGEN_CONFIG, Some(config_value.as_str()))];
        vars.extend(DEPLOYMENT_VARS.iter().map(|name| (*name, None)));
        vars.retain(|(name, _)| *name != "MS_SITE_ID" && *name != "ASSIGN_CONCURRENCY");
        vars.push(("MS_SITE_ID", Some("env-site")));
        vars.push(("ASSIGN_CONCURRENCY", Some("40")));

        with_env_vars(&vars, || {
            let config = load_from_env().expect("load explicit config");
            assert_eq!(config.graph.site_id, "env-site");
            assert_eq!(config.lists.shift_instances, "instances-from-file");
            assert_eq!(config.batch.assign_concurrency, 12);

            let persisted = std::fs::read_to_string(&config_path).expect("read persisted");
            assert!(persisted.contains("file-site"));
            assert!(!persisted.contains("env-site"));
        });

        remove_temp_path(&root);
    }

    #[test]
    fn blank_config_env_falls_back_to_home_path() {
        let home = unique_temp_dir("blank-env");
        let home_value = home.to_str().expect("home path").to_owned();

        with_env_vars(
            &[
                ("HOME", Some(home_value.as_str())),
                ("USERPROFILE", None),
                (ENV_SHIFTGEN_CONFIG, Some("   ")),
            ],
            || {
                let path = config_path_from_env().expect("resolve path");
                assert_eq!(
                    path,
                    home.join(".config").join("shiftgen").join("config.toml")
                );
            },
        );

        remove_temp_path(&home);
    }

    #[test]
    fn load_from_path_normalizes_and_persists_out_of_range_values() {
        let root = unique_temp_dir("normalize");
        let config_path = root.join("config.toml");
        write_config_file(
            &config_path,
            r#"
[graph]
api_url = "  "
site_id = "  site-1  "

[instance_fields]
bus_id = ""

[generation]
concurrency = 0

[batch]
assign_concurrency = 99
confirm_concurrency = 3

[cache]
shifts_ttl_ms = 0
"#,
        );

        let config = load_from_path(&config_path).expect("load config");
        assert_eq!(config.graph.api_url, DEFAULT_GRAPH_API_URL);
        assert_eq!(config.graph.site_id, "site-1");
        assert_eq!(config.instance_fields.bus_id, "busId");
        assert_eq!(config.generation.concurrency, 1);
        assert_eq!(config.batch.assign_concurrency, 12);
        assert_eq!(config.batch.confirm_concurrency, 3);
        assert_eq!(config.cache.shifts_ttl_ms, 15_000);

        let reloaded: ShiftgenConfig =
            toml::from_str(&std::fs::read_to_string(&config_path).expect("read persisted"))
                .expect("parse persisted");
        assert_eq!(reloaded, config);

        remove_temp_path(&root);
    }

    #[test]
    fn load_from_path_rejects_malformed_toml() {
        let root = unique_temp_dir("malformed");
        let config_path = root.join("config.toml");
        write_config_file(&config_path, "[graph\nsite_id = 1");

        let error = load_from_path(&config_path).expect_err("malformed toml");
        assert!(error.to_string().contains("Failed to parse SHIFTGEN_CONFIG"));

        remove_temp_path(&root);
    }

    #[test]
    fn env_overrides_cover_field_names_and_lists() {
        let mut config = ShiftgenConfig::default();
        apply_env_overrides(
            &mut config,
            env_map(&[
                ("LIST_FIELD_DRIVER_ID", "Driver"),
                ("PATTERN_FIELD_WEEK_PART", "WeekType"),
                ("TEMPLATE_FIELD_ROUTE_NAME", "Title"),
                ("TRIPTEMPLATE_FIELD_EVENTS", "EventsJson"),
                ("MS_TRIP_TEMPLATES_LIST_ID", "trips"),
                ("MS_ROUTES_LIST_ID", "   "),
                ("DEFAULT_BUS_LOOKUP_ID", " 7 "),
                ("TRIP_TEMPLATES_CACHE_TTL_MS", "0"),
            ]),
        )
        .expect("apply overrides");

        assert_eq!(config.instance_fields.driver_id, "Driver");
        assert_eq!(config.pattern_fields.week_part, "WeekType");
        assert_eq!(config.template_fields.route_name, "Title");
        assert_eq!(config.trip_template_fields.events, "EventsJson");
        assert_eq!(config.lists.trip_templates, "trips");
        assert_eq!(ListsConfigToml::optional(&config.lists.routes), None);
        assert_eq!(config.default_bus_lookup_id(), Some("7"));
        assert_eq!(config.cache.trip_templates_ttl_ms, 30_000);
    }

    #[test]
    fn stops_template_settings_come_from_env_and_file() {
        let mut config = ShiftgenConfig::default();
        apply_env_overrides(
            &mut config,
            env_map(&[
                ("MS_STOPS_TEMPLATE_LIST_ID", " stops "),
                ("STOPSTEMPLATE_FIELD_TRIP_ID", "Run"),
                ("STOPSTEMPLATE_FIELD_STOP_NAME", "Where"),
                ("STOPSTEMPLATE_FIELD_TIME", "At"),
                ("STOPSTEMPLATE_FIELD_SORT_ORDER", "Seq"),
                ("STOPSTEMPLATE_FIELD_EVENT_TYPE", "Kind"),
                ("STOPSTEMPLATE_FIELD_DURATION", "  "),
            ]),
        )
        .expect("apply overrides");

        assert_eq!(config.lists.stops_templates, "stops");
        let stop = &config.stop_template_fields;
        assert_eq!(
            (
                stop.trip_id.as_str(),
                stop.stop_name.as_str(),
                stop.time.as_str(),
                stop.sort_order.as_str(),
                stop.event_type.as_str(),
            ),
            ("Run", "Where", "At", "Seq", "Kind")
        );
        assert!(stop.duration.is_empty());

        let root = unique_temp_dir("stops-template");
        let config_path = root.join("config.toml");
        write_config_file(
            &config_path,
            r#"
[lists]
stops_templates = " st "

[stop_template_fields]
duration = " BreakMinutes "
"#,
        );
        let loaded = load_from_path(&config_path).expect("load config");
        assert_eq!(loaded.lists.stops_templates, "st");
        assert_eq!(loaded.stop_template_fields.duration, "BreakMinutes");
        assert!(loaded.stop_template_fields.trip_id.is_empty());

        remove_temp_path(&root);
    }

    #[test]
    fn env_overrides_reject_unparsable_unsigned_values() {
        let mut config = ShiftgenConfig::default();
        let error = apply_env_overrides(&mut config, env_map(&[("GENERATE_CONCURRENCY", "six")]))
            .expect_err("invalid concurrency");
        assert!(error.to_string().contains("GENERATE_CONCURRENCY"));

        let error = apply_env_overrides(&mut config, env_map(&[("CACHE_SHIFTS_TTL_MS", "-1")]))
            .expect_err("negative ttl");
        assert!(error.to_string().contains("CACHE_SHIFTS_TTL_MS"));
    }

    #[test]
    fn require_store_settings_names_first_missing_value() {
        let mut config = ShiftgenConfig::default();
        let error = config.require_store_settings().expect_err("site missing");
        assert!(error.to_string().contains("MS_SITE_ID"));

        config.graph.site_id = "site".to_owned();
        config.lists.shift_instances = "instances".to_owned();
        let error = config.require_store_settings().expect_err("patterns missing");
        assert!(error.to_string().contains("MS_SHIFT_PATTERNS_LIST_ID"));

        config.lists.shift_patterns = "patterns".to_owned();
        let error = config.require_store_settings().expect_err("token missing");
        assert!(error.to_string().contains("GRAPH_BEARER_TOKEN"));

        config.graph.access_token = "token".to_owned();
        let settings = config.require_store_settings().expect("complete settings");
        assert_eq!(settings.site_id, "site");
        assert_eq!(settings.shift_patterns_list, "patterns");
    }
}
