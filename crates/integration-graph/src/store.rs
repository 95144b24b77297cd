use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shiftgen_core::{
    value_as_string, Fields, ItemId, ListId, ListQuery, ListRecord, ListStore, ShiftError,
};
use tracing::debug;
use urlencoding::encode;

use crate::config::GraphConnection;
use crate::odata::{items_url, PAGE_SIZE};
use crate::transport::{GraphRequest, GraphTransport};

const NEXT_LINK: &str = "@odata.nextLink";

/// A list as reported by the site's list directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteList {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SiteList {
    /// True when either the display name or the internal name contains every
    /// fragment, compared case-insensitively.
    pub fn name_contains_all(&self, fragments: &[&str]) -> bool {
        [self.display_name.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::to_lowercase)
            .any(|name| fragments.iter().all(|fragment| name.contains(fragment)))
    }
}

/// Internal and display name of one list column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListColumn {
    pub name: String,
    pub display_name: String,
}

impl ListColumn {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnDefinition {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    lookup: Option<LookupColumn>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupColumn {
    #[serde(default)]
    list_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

/// SharePoint list store reached through Microsoft Graph.
#[derive(Clone)]
pub struct GraphListStore {
    transport: Arc<dyn GraphTransport>,
    site_url: String,
}

impl fmt::Debug for GraphListStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GraphListStore")
            .field("site_url", &self.site_url)
            .finish()
    }
}

impl GraphListStore {
    pub fn new(transport: Arc<dyn GraphTransport>, connection: &GraphConnection) -> Self {
        Self {
            transport,
            site_url: format!(
                "{}/sites/{}",
                connection.api_url.trim_end_matches('/'),
                encode(connection.site_id.trim())
            ),
        }
    }

    fn list_url(&self, list: &ListId) -> String {
        format!("{}/lists/{}", self.site_url, encode(list.as_str()))
    }

    fn item_url(&self, list: &ListId, id: &ItemId) -> String {
        format!("{}/items/{}", self.list_url(list), encode(id.as_str()))
    }

    async fn get(&self, url: String) -> Result<Value, ShiftError> {
        self.transport.send(GraphRequest::get(url)).await
    }

    async fn collect_pages(&self, first_page: String) -> Result<Vec<ListRecord>, ShiftError> {
        let mut records = Vec::new();
        let mut next = Some(first_page);
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            let page = self.get(url).await?;
            pages += 1;
            if let Some(items) = page.get("value").and_then(Value::as_array) {
                records.extend(items.iter().filter_map(record_from_item));
            }
            next = page
                .get(NEXT_LINK)
                .and_then(Value::as_str)
                .filter(|link| !link.is_empty())
                .map(str::to_owned);
        }
        debug!(records = records.len(), pages, "list items fetched");
        Ok(records)
    }

    /// Every list on the site.
    pub async fn site_lists(&self) -> Result<Vec<SiteList>, ShiftError> {
        let url = format!("{}/lists?$top={PAGE_SIZE}", self.site_url);
        let collection: Collection<SiteList> = decode(self.get(url).await?, "site lists")?;
        Ok(collection.value)
    }

    /// First site list matching `predicate`.
    pub async fn find_list_id_by_name(
        &self,
        predicate: impl Fn(&SiteList) -> bool + Send,
    ) -> Result<Option<ListId>, ShiftError> {
        let lists = self.site_lists().await?;
        Ok(lists
            .iter()
            .find(|list| predicate(list))
            .map(|list| list.id.trim())
            .filter(|id| !id.is_empty())
            .map(ListId::new))
    }

    async fn column_definitions(&self, list: &ListId) -> Result<Vec<ColumnDefinition>, ShiftError> {
        let url = format!("{}/columns?$top={PAGE_SIZE}", self.list_url(list));
        let columns: Collection<ColumnDefinition> = decode(self.get(url).await?, "list columns")?;
        Ok(columns.value)
    }

    /// Columns of `list`. Missing names come back empty.
    pub async fn list_columns(&self, list: &ListId) -> Result<Vec<ListColumn>, ShiftError> {
        Ok(self
            .column_definitions(list)
            .await?
            .into_iter()
            .map(|column| {
                ListColumn::new(
                    column.name.unwrap_or_default(),
                    column.display_name.unwrap_or_default(),
                )
            })
            .collect())
    }

    /// List targeted by a lookup column of `list`. The column is matched by
    /// internal name, then display name, then `fallback_display_name`
    /// case-insensitively.
    pub async fn lookup_target_list(
        &self,
        list: &ListId,
        column: &str,
        fallback_display_name: &str,
    ) -> Result<Option<ListId>, ShiftError> {
        let columns = self.column_definitions(list).await?;
        let column = column.trim();

        let matched = columns
            .iter()
            .find(|candidate| candidate.name.as_deref() == Some(column))
            .or_else(|| {
                columns
                    .iter()
                    .find(|candidate| candidate.display_name.as_deref() == Some(column))
            })
            .or_else(|| {
                columns.iter().find(|candidate| {
                    candidate
                        .display_name
                        .as_deref()
                        .map(|name| name.eq_ignore_ascii_case(fallback_display_name))
                        .unwrap_or(false)
                })
            });

        Ok(matched
            .and_then(|column| column.lookup.as_ref())
            .and_then(|lookup| lookup.list_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ListId::new))
    }
}

#[async_trait]
impl ListStore for GraphListStore {
    async fn list_items(
        &self,
        list: &ListId,
        query: &ListQuery,
    ) -> Result<Vec<ListRecord>, ShiftError> {
        self.collect_pages(items_url(&self.list_url(list), query))
            .await
    }

    async fn get_item(&self, list: &ListId, id: &ItemId) -> Result<Option<ListRecord>, ShiftError> {
        if id.as_str().trim().is_empty() {
            return Ok(None);
        }

        let url = format!("{}?$expand=fields", self.item_url(list, id));
        match self.get(url).await {
            Ok(item) => Ok(record_from_item(&item)),
            Err(error) if error.remote_status() == Some(404) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn create_item(&self, list: &ListId, fields: Fields) -> Result<ItemId, ShiftError> {
        let url = format!("{}/items", self.list_url(list));
        let created = self
            .transport
            .send(GraphRequest::post(url, json!({ "fields": fields })))
            .await?;

        created
            .get("id")
            .map(value_as_string)
            .filter(|id| !id.trim().is_empty())
            .map(ItemId::new)
            .ok_or_else(|| {
                ShiftError::DependencyUnavailable(
                    "Microsoft Graph create response did not include an item id.".to_owned(),
                )
            })
    }

    async fn patch_fields(
        &self,
        list: &ListId,
        id: &ItemId,
        fields: Fields,
    ) -> Result<(), ShiftError> {
        let url = format!("{}/fields", self.item_url(list, id));
        self.transport
            .send(GraphRequest::patch(url, Value::Object(fields)))
            .await?;
        Ok(())
    }
}

fn record_from_item(item: &Value) -> Option<ListRecord> {
    let id = item.get("id").map(value_as_string)?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }

    let fields = item
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(ListRecord::new(id, fields))
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T, ShiftError> {
    serde_json::from_value(value).map_err(|err| {
        ShiftError::DependencyUnavailable(format!(
            "failed to decode Microsoft Graph {what} response: {err}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_without_an_id_are_dropped() {
        let item = json!({ "id": "7", "fields": { "Title": "R1" } });
        let record = record_from_item(&item).expect("record");
        assert_eq!(record.id, "7");
        assert_eq!(record.text("Title"), "R1");

        assert_eq!(record_from_item(&json!({ "id": " " })), None);
        assert_eq!(record_from_item(&json!({ "fields": {} })), None);
        let bare = record_from_item(&json!({ "id": 8 })).expect("numeric id");
        assert!(bare.fields.is_empty());
    }

    #[test]
    fn site_list_names_match_case_insensitively() {
        let list = SiteList {
            id: "abc".to_owned(),
            display_name: Some("Trip Templates".to_owned()),
            name: Some("TripsTemplates".to_owned()),
        };
        assert!(list.name_contains_all(&["trip", "template"]));
        assert!(!list.name_contains_all(&["bus"]));
        assert!(!SiteList::default().name_contains_all(&["bus"]));
    }
}
