use std::{env, fs, io};

use anyhow::{bail, Context};
use log::info;
use serde_derive::Deserialize;
use solax2mqtt::device::{parse_device_list, DeviceId};
use solax2mqtt::mqtt_config::MqttConfig;
use solax2mqtt::telemetry::ApiConfig;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial_numbers: Vec<String>,
    pub api: ApiConfig,
    pub mqtt: MqttConfig,
    pub healthchecks_url: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        // parse config from TOML file if present
        let filename = "config.toml";
        let mut config = match fs::read_to_string(filename) {
            Ok(contents) => {
                Self::parse(&contents).with_context(|| format!("{filename} unparsable"))?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No {filename}, using environment only");
                Config::default()
            }
            Err(e) => return Err(e).with_context(|| format!("could not read {filename}")),
        };

        // a .env file next to the binary feeds the same variables
        if let Ok(path) = dotenvy::dotenv() {
            info!("loaded environment from {}", path.display());
        }
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn parse(contents: &str) -> anyhow::Result<Config> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_overrides<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // $SERIAL_NUMBERS, comma separated
        if let Some(serials) = var("SERIAL_NUMBERS") {
            self.serial_numbers = serials.split(',').map(str::to_string).collect();
        }
        if let Some(url) = var("API_URL") {
            self.api.url = url;
        }
        if let Some(token_id) = var("API_TOKEN_ID") {
            self.api.token_id = token_id;
        }
        if let Some(host) = var("MQTT_BROKER") {
            self.mqtt.host = host;
        }
        if let Some(port) = var("MQTT_PORT") {
            let port = port
                .parse()
                .with_context(|| format!("MQTT_PORT={port} is not a port number"))?;
            self.mqtt.port = Some(port);
        }
        // credentials are optional, empty means anonymous
        if let Some(username) = var("MQTT_USERNAME").filter(|u| !u.is_empty()) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = var("MQTT_PASSWORD").filter(|p| !p.is_empty()) {
            self.mqtt.password = Some(password);
        }
        if let Some(base_topic) = var("MQTT_BASE_TOPIC") {
            self.mqtt.base_topic = Some(base_topic);
        }
        if let Some(url) = var("HEALTHCHECKS_URL") {
            self.healthchecks_url = Some(url);
        }
        Ok(())
    }

    /// Checks everything needed to start and returns the device set.
    pub fn devices(&self) -> anyhow::Result<Vec<DeviceId>> {
        if !self.api.is_valid() {
            bail!("API url and token id (API_TOKEN_ID) must be configured");
        }
        if !self.mqtt.is_valid() {
            bail!("MQTT broker host and base topic must not be empty");
        }
        let devices =
            parse_device_list(&self.serial_numbers).context("invalid SERIAL_NUMBERS entry")?;
        if devices.is_empty() {
            bail!("no inverter serial numbers configured (SERIAL_NUMBERS)");
        }
        Ok(devices)
    }
}
