use async_trait::async_trait;
use serde_json::Value;
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::clock::{Sleeper, TokioSleeper};
use crate::entity::{minimal_record, Record};
use crate::parse::{parse_steamcharts_page, SteamChartsPage};
use crate::request::{HttpClient, ReqwestTransport, Transport};
use crate::strategy::FetchRecord;
use crate::Result;

const STEAMCHARTS_APP_URL: &str = "https://steamcharts.com/app";

/// Player peaks from the SteamCharts app page. Like [`super::SteamSpyHtml`], page
/// problems degrade to empty fields instead of failing.
pub struct SteamCharts<T = ReqwestTransport, S = TokioSleeper> {
    client: HttpClient<T, S>,
    base_url: String,
}

impl<T: Transport, S: Sleeper> SteamCharts<T, S> {
    pub fn new(client: HttpClient<T, S>) -> Self {
        Self {
            client,
            base_url: STEAMCHARTS_APP_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn scrape(&self, id: u64) -> Result<SteamChartsPage> {
        let url = format!("{}/{id}", self.base_url);
        let html = self.client.get_text(&url, &[]).await?;
        spawn_blocking(move || parse_steamcharts_page(&html)).await?
    }
}

#[async_trait]
impl<T: Transport, S: Sleeper> FetchRecord for SteamCharts<T, S> {
    async fn fetch_record(&self, id: u64, name: &str) -> Result<Record> {
        let page = self.scrape(id).await.unwrap_or_else(|e| {
            warn!(appid = id, error = %e, "Error while processing app");
            SteamChartsPage::default()
        });
        let mut record = minimal_record("appid", id, name);
        for (column, value) in [
            ("24-hour peak", page.peak_24h),
            ("all-time peak", page.all_time_peak),
            ("all-time peak date", page.all_time_peak_date),
        ] {
            record.insert(column.into(), value.map_or(Value::Null, Value::from));
        }
        Ok(record)
    }
}
