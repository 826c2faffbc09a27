//! Notion REST adapter for [`WorkspaceStore`].

use super::{
    Filter, FilterValue, Person, PersonKind, PersonRef, PropertyKind, Schema, WorkItem,
    WorkspaceStore,
};
use crate::config::{NotionCredentials, NotionSettings, PropertyNames};
use crate::error::{Result, SyncError};
use crate::transition::Status;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Notion-backed task database.
pub struct NotionStore {
    settings: NotionSettings,
    database_id: String,
    properties: PropertyNames,
    client: Client,
    schema: OnceCell<Schema>,
}

impl std::fmt::Debug for NotionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionStore")
            .field("api_url", &self.settings.api_url)
            .field("database_id", &self.database_id)
            .finish()
    }
}

impl NotionStore {
    /// Build a client for one database.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(
        credentials: &NotionCredentials,
        settings: NotionSettings,
        properties: PropertyNames,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let token = header::HeaderValue::from_str(&format!("Bearer {}", credentials.api_key))
            .map_err(|e| SyncError::config(format!("NOTION_API_KEY is invalid: {e}")))?;
        headers.insert(header::AUTHORIZATION, token);
        let version = header::HeaderValue::from_str(&settings.version)
            .map_err(|e| SyncError::config(format!("notion.version is invalid: {e}")))?;
        headers.insert("Notion-Version", version);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::config(format!("failed to build Notion HTTP client: {e}")))?;

        Ok(Self {
            settings,
            database_id: credentials.database_id.clone(),
            properties,
            client,
            schema: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.settings.api_url.trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        format!("{base}/{suffix}")
    }

    async fn request_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Http(format!("Notion API request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Http(format!("Notion API response read failed: {e}")))?;

        if !status.is_success() {
            return Err(SyncError::Http(format!(
                "Notion API request failed with status {status}: {body}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| SyncError::Http(format!("Notion API response was malformed JSON: {e}")))
    }

    async fn fetch_schema(&self) -> Result<Schema> {
        let path = format!("databases/{}", self.database_id);
        let payload: Value = self.request_json(self.client.get(self.endpoint(&path))).await?;
        parse_schema(&payload)
    }

    async fn status_kind(&self) -> PropertyKind {
        match self.schema().await {
            Ok(schema) => schema
                .get(&self.properties.status)
                .cloned()
                .unwrap_or(PropertyKind::Status),
            Err(e) => {
                warn!(error = %e, "schema unavailable; writing status as a status property");
                PropertyKind::Status
            }
        }
    }
}

#[async_trait]
impl WorkspaceStore for NotionStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<WorkItem>> {
        let path = format!("databases/{}/query", self.database_id);
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let mut body = json!({
                "filter": filter_to_json(filter),
                "page_size": self.settings.page_size,
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let page: Value = self
                .request_json(self.client.post(self.endpoint(&path)).json(&body))
                .await?;

            items.extend(
                results(&page)
                    .iter()
                    .filter_map(|p| parse_page(p, &self.properties)),
            );

            match next_cursor(&page, &mut seen) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = items.len(), "notion query returned items");
        Ok(items)
    }

    async fn schema(&self) -> Result<Schema> {
        self.schema
            .get_or_try_init(|| self.fetch_schema())
            .await
            .cloned()
    }

    async fn update_status(&self, item_id: &str, status: &Status) -> Result<()> {
        let kind = self.status_kind().await;
        let body = json!({
            "properties": {
                self.properties.status.as_str(): {
                    kind.notion_type(): { "name": status.as_str() }
                }
            }
        });

        let path = format!("pages/{item_id}");
        self.request_json::<Value>(self.client.patch(self.endpoint(&path)).json(&body))
            .await
            .map(|_| ())
            .map_err(|e| SyncError::update(item_id, status.as_str(), e.to_string()))
    }

    async fn list_persons(&self) -> Result<Vec<Person>> {
        let mut persons = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let mut request = self
                .client
                .get(self.endpoint("users"))
                .query(&[("page_size", self.settings.page_size.to_string())]);
            if let Some(c) = &cursor {
                request = request.query(&[("start_cursor", c.as_str())]);
            }

            let page: Value = self.request_json(request).await?;
            persons.extend(results(&page).iter().filter_map(parse_user));

            match next_cursor(&page, &mut seen) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(persons)
    }
}

// ============================================================================
// Wire translation
// ============================================================================

/// Translate a [`Filter`] into Notion's filter object.
pub fn filter_to_json(filter: &Filter) -> Value {
    match filter {
        Filter::Equals {
            property,
            kind,
            value,
        } => {
            let value = match value {
                FilterValue::Number(n) => json!(n),
                FilterValue::Text(s) => json!(s),
            };
            json!({ "property": property, kind.notion_type(): { "equals": value } })
        }
        Filter::Contains {
            property,
            kind,
            value,
        } => json!({ "property": property, kind.notion_type(): { "contains": value } }),
        Filter::And(clauses) => json!({ "and": clauses.iter().map(filter_to_json).collect::<Vec<_>>() }),
        Filter::Or(clauses) => json!({ "or": clauses.iter().map(filter_to_json).collect::<Vec<_>>() }),
    }
}

fn results(page: &Value) -> &[Value] {
    page.get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Cursor for the following page. A cursor already followed ends the walk.
fn next_cursor(page: &Value, seen: &mut HashSet<String>) -> Option<String> {
    if page.get("has_more").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let next = page.get("next_cursor").and_then(Value::as_str)?;
    if !seen.insert(next.to_string()) {
        warn!(cursor = next, "notion pagination cursor repeated; stopping");
        return None;
    }
    Some(next.to_string())
}

/// Parse a `GET /databases/{id}` response into a schema.
pub fn parse_schema(database: &Value) -> Result<Schema> {
    let properties = database
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| SyncError::lookup("schema", "database response has no properties"))?;

    Ok(properties
        .iter()
        .map(|(name, prop)| {
            let kind = prop
                .get("type")
                .and_then(Value::as_str)
                .map_or(PropertyKind::Unsupported("unknown".into()), PropertyKind::from_notion_type);
            (name.clone(), kind)
        })
        .collect())
}

/// Project a Notion page onto a [`WorkItem`].
pub fn parse_page(page: &Value, names: &PropertyNames) -> Option<WorkItem> {
    let id = page.get("id").and_then(Value::as_str)?.to_string();
    let props = page.get("properties").and_then(Value::as_object);
    let prop = |name: &str| props.and_then(|p| p.get(name));

    let status = prop(names.status.as_str()).and_then(|p| {
        ["status", "select"]
            .iter()
            .find_map(|key| p.get(key))
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let assignees = prop(names.assignee.as_str())
        .and_then(|p| p.get("people"))
        .and_then(Value::as_array)
        .map(|people| {
            people
                .iter()
                .filter_map(|person| {
                    Some(PersonRef {
                        id: person.get("id").and_then(Value::as_str)?.to_string(),
                        name: person.get("name").and_then(Value::as_str).map(str::to_string),
                        email: person
                            .pointer("/person/email")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let title = prop(names.title.as_str())
        .and_then(property_text)
        .or_else(|| props.and_then(find_title))
        .unwrap_or_default();

    let branch_ref = names
        .branch_ref
        .as_deref()
        .and_then(prop)
        .and_then(property_text)
        .filter(|s| !s.is_empty());

    Some(WorkItem {
        id,
        status,
        assignees,
        title,
        branch_ref,
    })
}

/// Plain text of a title, rich text or url property.
fn property_text(prop: &Value) -> Option<String> {
    let kind = prop.get("type").and_then(Value::as_str)?;
    match kind {
        "title" | "rich_text" => prop.get(kind).and_then(Value::as_array).map(|spans| {
            spans
                .iter()
                .filter_map(|span| span.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        }),
        "url" | "email" => prop.get(kind).and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn find_title(props: &Map<String, Value>) -> Option<String> {
    props
        .values()
        .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(property_text)
}

fn parse_user(user: &Value) -> Option<Person> {
    let kind = match user.get("type").and_then(Value::as_str) {
        Some("person") => PersonKind::Person,
        Some("bot") => PersonKind::Bot,
        _ => return None,
    };
    Some(Person {
        id: user.get("id").and_then(Value::as_str)?.to_string(),
        display_name: user.get("name").and_then(Value::as_str).map(str::to_string),
        email: user
            .pointer("/person/email")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind,
    })
}
