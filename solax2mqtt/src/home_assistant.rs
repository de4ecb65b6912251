use crate::cycle::FleetTotals;
use crate::device::{DeviceId, FLEET_SCOPE_TOKEN};
use crate::home_assistant_config::{DeviceConfig, SensorConfig};
use crate::metric_collector::MetricCollector;
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{MqttWrapper, QoS};
use crate::reading::{Metric, MetricKind, Reading};

use log::{debug, error, info};

/// Owner of a group of sensors: one inverter, or the fleet totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    Device(&'a DeviceId),
    Fleet,
}

impl Scope<'_> {
    pub fn unique_id(&self, key: &str) -> String {
        match self {
            Scope::Device(id) => format!("solax_{id}_{key}"),
            Scope::Fleet => format!("solax_{FLEET_SCOPE_TOKEN}_{key}"),
        }
    }

    pub fn discovery_topic(&self, base_topic: &str, key: &str) -> String {
        format!("{base_topic}/sensor/{}/config", self.unique_id(key))
    }

    pub fn state_topic(&self, base_topic: &str, key: &str) -> String {
        match self {
            Scope::Device(id) => format!("{base_topic}/sensor/solax/{id}/{key}"),
            Scope::Fleet => format!("{base_topic}/sensor/solax_{FLEET_SCOPE_TOKEN}/{key}"),
        }
    }

    fn sensor_name(&self, display_name: &str) -> String {
        match self {
            Scope::Device(_) => display_name.to_string(),
            Scope::Fleet => format!("Total {display_name}"),
        }
    }

    fn device_config(&self) -> DeviceConfig {
        match self {
            Scope::Device(id) => {
                DeviceConfig::new(format!("Solax Inverter {id}"), vec![format!("solax_{id}")])
            }
            Scope::Fleet => DeviceConfig::new(
                "Solax Totals".to_string(),
                vec![format!("solax_{FLEET_SCOPE_TOKEN}")],
            ),
        }
    }
}

/// Publishes readings as Home Assistant MQTT discovery sensors.
///
/// Every message is retained: discovery so a freshly connected Home
/// Assistant learns the sensors right away, state so the last value
/// survives reconnects.
pub struct HomeAssistant<MQTT: MqttWrapper> {
    client: MQTT,
    base_topic: String,
}

impl<MQTT: MqttWrapper> HomeAssistant<MQTT> {
    pub fn new(config: &MqttConfig) -> Self {
        let client = MQTT::new(config, "-ha");
        Self::with_client(client, config.base_topic())
    }

    pub fn with_client(client: MQTT, base_topic: &str) -> Self {
        Self {
            client,
            base_topic: base_topic.to_string(),
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    pub fn disconnect(&self) -> anyhow::Result<()> {
        info!("Disconnecting from MQTT broker");
        self.client.disconnect()
    }

    fn publish_retained(&self, topic: &str, payload: String) {
        debug!("Publishing to {topic} with payload {payload}");

        if let Err(e) = self
            .client
            .publish(topic, QoS::AtMostOnce, true, payload)
        {
            error!("Failed to publish message to {topic}: {e:?}");
        }
    }

    /// Announces one sensor. Identical arguments always produce the same
    /// topic and payload.
    pub fn publish_discovery(
        &self,
        scope: Scope<'_>,
        key: &str,
        display_name: &str,
        unit: &str,
        device_class: Option<&str>,
        state_class: Option<&str>,
    ) {
        let sensor = SensorConfig::new(
            scope.sensor_name(display_name),
            scope.state_topic(&self.base_topic, key),
            scope.unique_id(key),
            scope.device_config(),
            unit,
            device_class,
            state_class,
        );
        match serde_json::to_string(&sensor) {
            Ok(payload) => {
                self.publish_retained(&scope.discovery_topic(&self.base_topic, key), payload)
            }
            Err(e) => error!("Failed to serialize sensor config {}: {e}", sensor.unique_id),
        }
    }

    pub fn publish_state(&self, scope: Scope<'_>, key: &str, value: f64) {
        self.publish_retained(&scope.state_topic(&self.base_topic, key), value.to_string());
    }

    fn publish_metric(&self, scope: Scope<'_>, metric: Metric, value: f64) {
        let (unit, device_class, state_class) = match metric.kind() {
            MetricKind::Power => ("W", Some("power"), None),
            MetricKind::Energy => ("kWh", Some("energy"), Some("total_increasing")),
        };
        self.publish_discovery(
            scope,
            metric.key(),
            metric.display_name(),
            unit,
            device_class,
            state_class,
        );
        self.publish_state(scope, metric.key(), value);
    }
}

impl<MQTT: MqttWrapper> MetricCollector for HomeAssistant<MQTT> {
    fn publish_reading(&self, device: &DeviceId, reading: &Reading) {
        for metric in Metric::DEVICE {
            self.publish_metric(Scope::Device(device), metric, reading.value(metric));
        }
    }

    fn publish_totals(&self, totals: &FleetTotals) {
        for (metric, value) in totals.values() {
            self.publish_metric(Scope::Fleet, metric, value);
        }
    }
}
