use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;

use crate::adapters::remote::RemoteError;
use crate::domain::models::{AlarmRule, DataPoint, NewAsset};

const API_KEY_HEADER: &str = "X-API-Key";

/// Downstream asset-management platform: asset creation, existence checks and data ingestion.
pub trait AssetPlatform {
    fn create_asset(&self, asset: &NewAsset) -> Result<i32, RemoteError>;
    fn asset_exists(&self, asset_id: i32) -> Result<bool, RemoteError>;
    fn upsert_data(&self, point: &DataPoint) -> Result<(), RemoteError>;
    fn create_alarm_rule(&self, rule: &AlarmRule) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct CreatedAsset {
    id: i32,
}

#[derive(Debug, Clone)]
pub struct ElionaHttpClient {
    client: Client,
    base_url: String,
    api_token: String,
    timeout: Duration,
}

impl ElionaHttpClient {
    pub fn new(base_url: &str, api_token: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.api_token)
            .timeout(self.timeout)
    }

    fn expect_success(url: &str, status: StatusCode) -> Result<(), RemoteError> {
        if status.is_success() {
            return Ok(());
        }
        Err(RemoteError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

impl AssetPlatform for ElionaHttpClient {
    fn create_asset(&self, asset: &NewAsset) -> Result<i32, RemoteError> {
        let url = self.url("/assets");
        let response = self
            .authorized(self.client.put(&url).json(asset))
            .send()
            .map_err(|error| RemoteError::from_reqwest(&url, error))?;
        Self::expect_success(&url, response.status())?;

        let created: CreatedAsset = response
            .json()
            .map_err(|error| RemoteError::from_reqwest(&url, error))?;
        Ok(created.id)
    }

    fn asset_exists(&self, asset_id: i32) -> Result<bool, RemoteError> {
        let url = self.url(&format!("/assets/{asset_id}"));
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|error| RemoteError::from_reqwest(&url, error))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status => Self::expect_success(&url, status).map(|()| true),
        }
    }

    fn upsert_data(&self, point: &DataPoint) -> Result<(), RemoteError> {
        let url = self.url("/data");
        let response = self
            .authorized(self.client.put(&url).json(point))
            .send()
            .map_err(|error| RemoteError::from_reqwest(&url, error))?;
        Self::expect_success(&url, response.status())
    }

    fn create_alarm_rule(&self, rule: &AlarmRule) -> Result<(), RemoteError> {
        let url = self.url("/alarm-rules");
        let response = self
            .authorized(self.client.post(&url).json(rule))
            .send()
            .map_err(|error| RemoteError::from_reqwest(&url, error))?;
        Self::expect_success(&url, response.status())
    }
}
