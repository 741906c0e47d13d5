use async_trait::async_trait;
use serde_json::Value;

use crate::clock::{Sleeper, TokioSleeper};
use crate::entity::Record;
use crate::request::{HttpClient, ReqwestTransport, Transport};
use crate::strategy::FetchRecord;
use crate::{Error, Result};

pub(crate) const STEAMSPY_API_URL: &str = "https://steamspy.com/api.php";

/// SteamSpy `appdetails` API. SteamSpy answers every app id with an object, so the
/// response is used as-is.
pub struct SteamSpy<T = ReqwestTransport, S = TokioSleeper> {
    client: HttpClient<T, S>,
    url: String,
}

impl<T: Transport, S: Sleeper> SteamSpy<T, S> {
    pub fn new(client: HttpClient<T, S>) -> Self {
        Self {
            client,
            url: STEAMSPY_API_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl<T: Transport, S: Sleeper> FetchRecord for SteamSpy<T, S> {
    async fn fetch_record(&self, id: u64, _name: &str) -> Result<Record> {
        let params = [("request", "appdetails".to_string()), ("appid", id.to_string())];
        match self.client.get_json(&self.url, &params).await? {
            Value::Object(record) => Ok(record),
            other => Err(Error::Fetch {
                id,
                reason: format!("expected an object, got {other}"),
            }),
        }
    }
}
