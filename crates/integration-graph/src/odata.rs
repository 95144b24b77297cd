//! OData query fragments for list item requests.

use shiftgen_core::{midnight_utc, ListQuery};
use urlencoding::encode;

/// Largest page size the list endpoints accept.
pub const PAGE_SIZE: u32 = 999;

/// Quotes a string literal, doubling embedded single quotes.
pub fn string_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// `fields/<name> eq '<value>'` clauses followed by the date window, joined
/// with `and`. `None` when the query has no filter.
pub fn filter_expression(query: &ListQuery) -> Option<String> {
    let mut clauses = query
        .equals
        .iter()
        .map(|(field, value)| format!("fields/{field} eq {}", string_literal(value)))
        .collect::<Vec<_>>();

    if let Some(range) = &query.date_range {
        clauses.push(format!(
            "fields/{field} ge {start} and fields/{field} lt {end}",
            field = range.field,
            start = string_literal(&midnight_utc(range.start)),
            end = string_literal(&midnight_utc(range.end_exclusive)),
        ));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

/// First page URL for the items of the list at `list_url`.
pub fn items_url(list_url: &str, query: &ListQuery) -> String {
    let expand = if query.select.is_empty() {
        "fields".to_owned()
    } else {
        format!("fields($select={})", encode(&query.select.join(",")))
    };

    let mut url = format!("{list_url}/items?$expand={expand}&$top={PAGE_SIZE}");
    if let Some(filter) = filter_expression(query) {
        url.push_str("&$filter=");
        url.push_str(&encode(&filter));
    }
    url
}
