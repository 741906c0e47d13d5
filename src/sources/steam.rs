use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::clock::{Sleeper, TokioSleeper};
use crate::entity::{minimal_record, Record};
use crate::request::{HttpClient, ReqwestTransport, Transport};
use crate::strategy::FetchRecord;
use crate::{Error, Result};

const STEAM_APPDETAILS_URL: &str = "http://store.steampowered.com/api/appdetails/";

/// Steam Store `appdetails` API. Apps the store reports as unsuccessful come back
/// as just their name and `steam_appid`.
pub struct SteamStore<T = ReqwestTransport, S = TokioSleeper> {
    client: HttpClient<T, S>,
    url: String,
}

impl<T: Transport, S: Sleeper> SteamStore<T, S> {
    pub fn new(client: HttpClient<T, S>) -> Self {
        Self {
            client,
            url: STEAM_APPDETAILS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl<T: Transport, S: Sleeper> FetchRecord for SteamStore<T, S> {
    async fn fetch_record(&self, id: u64, name: &str) -> Result<Record> {
        let json = self
            .client
            .get_json(&self.url, &[("appids", id.to_string())])
            .await?;

        let Some(app) = json.get(id.to_string()) else {
            return Err(Error::Fetch {
                id,
                reason: "response has no entry for the app".into(),
            });
        };
        if app.get("success").and_then(Value::as_bool) != Some(true) {
            debug!(appid = id, "No store data");
            return Ok(minimal_record("steam_appid", id, name));
        }
        match app.get("data") {
            Some(Value::Object(data)) => Ok(data.clone()),
            _ => Err(Error::Fetch {
                id,
                reason: "successful response without a data object".into(),
            }),
        }
    }
}
