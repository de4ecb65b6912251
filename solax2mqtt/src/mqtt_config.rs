use serde_derive::Deserialize;

pub const DEFAULT_BASE_TOPIC: &str = "homeassistant";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub tls: Option<bool>,
    /// Discovery prefix Home Assistant listens on.
    pub base_topic: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            username: None,
            password: None,
            client_id: None,
            tls: None,
            base_topic: None,
        }
    }
}

impl MqttConfig {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.base_topic.as_ref().map_or(true, |t| !t.is_empty())
    }

    pub fn base_topic(&self) -> &str {
        self.base_topic.as_deref().unwrap_or(DEFAULT_BASE_TOPIC)
    }

    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.tls.unwrap_or(false) { 8883 } else { 1883 })
    }
}
