//! Builds the app list: every app SteamSpy tracks, sorted by appid.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::clock::Sleeper;
use crate::entity::Entity;
use crate::request::{HttpClient, Transport};
use crate::sources::STEAMSPY_API_URL;
use crate::Result;

/// SteamSpy only allows one `request=all` call per minute.
pub const ALL_PAGE_PAUSE: Duration = Duration::from_secs(60);

pub struct AppListFetcher<'a, T, S> {
    client: &'a HttpClient<T, S>,
    url: String,
    page_pause: Duration,
}

impl<'a, T: Transport, S: Sleeper> AppListFetcher<'a, T, S> {
    pub fn new(client: &'a HttpClient<T, S>) -> Self {
        Self {
            client,
            url: STEAMSPY_API_URL.to_string(),
            page_pause: ALL_PAGE_PAUSE,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_page_pause(mut self, page_pause: Duration) -> Self {
        self.page_pause = page_pause;
        self
    }

    /// Fetches pages `0..pages` and merges them. A page that fails is logged and
    /// skipped; the rest of the list is still returned.
    pub async fn fetch(&self, pages: u32) -> Result<Vec<Entity>> {
        let mut apps = BTreeMap::new();

        for page in 0..pages {
            if page > 0 {
                self.client.sleeper().sleep(self.page_pause).await;
            }
            let params = [("request", "all".to_string()), ("page", page.to_string())];
            match self.client.get_json(&self.url, &params).await {
                Ok(Value::Object(entries)) => {
                    let before = apps.len();
                    for entry in entries.values() {
                        if let Some(app) = entity_from_entry(entry) {
                            apps.insert(app.id, app);
                        }
                    }
                    info!(page, added = apps.len() - before, "Finished fetching data for page");
                }
                Ok(other) => warn!(page, kind = %kind(&other), "Unexpected page shape, skipping"),
                Err(e) => warn!(page, error = %e, "Failed to fetch data for page"),
            }
        }

        info!(count = apps.len(), "App list complete");
        Ok(apps.into_values().collect())
    }
}

fn entity_from_entry(entry: &Value) -> Option<Entity> {
    let id = entry.get("appid")?.as_u64()?;
    let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
    Some(Entity::new(id, name))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
