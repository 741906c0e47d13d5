use async_trait::async_trait;
use serde_json::Value;
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::clock::{Sleeper, TokioSleeper};
use crate::entity::{minimal_record, Record};
use crate::parse::{parse_steamspy_page, SteamSpyPage};
use crate::request::{HttpClient, ReqwestTransport, Transport};
use crate::strategy::FetchRecord;
use crate::Result;

const STEAMSPY_APP_URL: &str = "https://steamspy.com/app";

/// Follower count and old userscore from the SteamSpy app page. Never fails: any
/// problem with the page leaves both fields empty.
pub struct SteamSpyHtml<T = ReqwestTransport, S = TokioSleeper> {
    client: HttpClient<T, S>,
    base_url: String,
}

impl<T: Transport, S: Sleeper> SteamSpyHtml<T, S> {
    pub fn new(client: HttpClient<T, S>) -> Self {
        Self {
            client,
            base_url: STEAMSPY_APP_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn scrape(&self, id: u64) -> Result<SteamSpyPage> {
        let url = format!("{}/{id}", self.base_url);
        let html = self.client.get_text(&url, &[]).await?;
        spawn_blocking(move || parse_steamspy_page(&html)).await?
    }
}

#[async_trait]
impl<T: Transport, S: Sleeper> FetchRecord for SteamSpyHtml<T, S> {
    async fn fetch_record(&self, id: u64, name: &str) -> Result<Record> {
        let mut record = minimal_record("appid", id, name);
        let page = self.scrape(id).await.unwrap_or_else(|e| {
            warn!(appid = id, error = %e, "Error while processing app");
            SteamSpyPage::default()
        });
        record.insert("followers".into(), page.followers.map_or(Value::Null, Value::from));
        record.insert(
            "old_userscore".into(),
            page.old_userscore.map_or(Value::Null, Value::from),
        );
        Ok(record)
    }
}
