use std::time::Duration;

use log::debug;
use serde_derive::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::device::DeviceId;

pub const DEFAULT_API_URL: &str =
    "https://global.solaxcloud.com/api/v2/dataAccess/realtimeInfo/get";
static REQUEST_TIMEOUT_DEFAULT: u64 = 30;

/// Reasons a single device fetch yields no reading.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("telemetry API answered with HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("'result' is missing in the response: {exception}")]
    MissingResult { exception: String },
    #[error("field '{key}' is not numeric: {value}")]
    Field { key: &'static str, value: String },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub token_id: String,
    /// Upper bound for one request, in seconds.
    pub timeout: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            token_id: String::new(),
            timeout: None,
        }
    }
}

impl ApiConfig {
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() && !self.token_id.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(REQUEST_TIMEOUT_DEFAULT))
    }
}

/// Where raw realtime data comes from. One call is one request, no retries.
pub trait TelemetrySource {
    fn request(&self, device: &DeviceId) -> Result<String, FetchError>;
}

/// Client for the SolaX cloud realtime endpoint.
pub struct SolaxCloud {
    agent: ureq::Agent,
    url: String,
    token_id: String,
}

impl SolaxCloud {
    pub fn new(config: &ApiConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self {
            agent,
            url: config.url.clone(),
            token_id: config.token_id.clone(),
        }
    }
}

impl TelemetrySource for SolaxCloud {
    fn request(&self, device: &DeviceId) -> Result<String, FetchError> {
        let payload = json!({ "wifiSn": device.as_str() }).to_string();
        debug!("Requesting realtime data for {device}");

        let response = self
            .agent
            .get(&self.url)
            .set("tokenId", &self.token_id)
            .set("Content-Type", "application/json")
            .send_string(&payload)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => FetchError::Status(code),
                ureq::Error::Transport(transport) => FetchError::Transport(transport.to_string()),
            })?;

        response
            .into_string()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}
