//! Subject line for the message asking a driver to confirm a shift or week.

use crate::calendar::{week_range_label, week_start_monday};
use crate::model::HydratedShift;

/// `Work days` / `Weekend` for the known week parts, the trimmed raw text
/// otherwise, `None` when blank.
pub fn week_part_label(raw: Option<&str>) -> Option<String> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    let label = match raw.to_lowercase().as_str() {
        "weekdays" | "weekday" | "workdays" | "workday" | "work days" => "Work days".to_owned(),
        "weekend" | "weekends" => "Weekend".to_owned(),
        _ => raw.to_owned(),
    };
    Some(label)
}

/// `Please confirm: {route}{ (code)} ({time}){ week part} — week {range}`.
///
/// The route code is only shown when the route has a distinct display name.
pub fn confirmation_subject(shift: &HydratedShift) -> String {
    let route_name = shift
        .route_name
        .as_deref()
        .filter(|name| !name.is_empty());
    let route_display = route_name.unwrap_or(shift.route.as_str());
    let route_code = match route_name {
        Some(name) if name != shift.route => format!(" ({})", shift.route),
        _ => String::new(),
    };
    let week_part = week_part_label(shift.week_part.as_deref())
        .map(|label| format!(" {label}"))
        .unwrap_or_default();
    let week = week_range_label(week_start_monday(shift.date));

    format!(
        "Please confirm: {route_display}{route_code} ({}){week_part} — week {week}",
        shift.time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{ItemId, WorkspaceId};
    use chrono::NaiveDate;

    fn shift() -> HydratedShift {
        HydratedShift {
            id: ItemId::new("40"),
            workspace_id: WorkspaceId::new("south"),
            date: NaiveDate::from_ymd_opt(2026, 2, 11).expect("date"),
            route: "R12".to_owned(),
            route_name: Some("Harbour loop".to_owned()),
            shift_type: "morning".to_owned(),
            week_part: Some("weekdays".to_owned()),
            name: "Harbour loop".to_owned(),
            time: "06:00–14:00".to_owned(),
            default_bus: None,
            driver_id: None,
            driver_name: None,
            driver_email: None,
            confirmation_status: None,
            notes: None,
            generated: Some(true),
            manual_override: Some(false),
            pattern_id: None,
            template_id: None,
            bus_id: None,
            trips: Vec::new(),
        }
    }

    #[test]
    fn subject_includes_route_code_week_part_and_range() {
        assert_eq!(
            confirmation_subject(&shift()),
            "Please confirm: Harbour loop (R12) (06:00–14:00) Work days — week Feb 9 – Feb 15"
        );
    }

    #[test]
    fn subject_omits_code_and_part_when_redundant() {
        let mut shift = shift();
        shift.route_name = Some("R12".to_owned());
        shift.week_part = None;
        assert_eq!(
            confirmation_subject(&shift),
            "Please confirm: R12 (06:00–14:00) — week Feb 9 – Feb 15"
        );
    }

    #[test]
    fn unknown_week_parts_are_shown_verbatim() {
        assert_eq!(week_part_label(Some(" Weekends ")).as_deref(), Some("Weekend"));
        assert_eq!(week_part_label(Some("Night run")).as_deref(), Some("Night run"));
        assert_eq!(week_part_label(Some("  ")), None);
    }
}
