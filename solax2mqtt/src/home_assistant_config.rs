use serde_derive::Serialize;

/// `DeviceConfig` is used to define the configuration for a Home Assistant device
/// in the MQTT discovery protocol and is used to group entities together.
///
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    identifiers: Vec<String>,
    name: String,
    manufacturer: String,
    sw_version: String, // Software version of the application that supplies the discovered MQTT item.
}

impl DeviceConfig {
    pub fn new(name: String, identifiers: Vec<String>) -> Self {
        Self {
            identifiers,
            name,
            manufacturer: "Solax".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `SensorConfig` is used to define the configuration for a Home Assistant sensor entity
/// in the MQTT discovery protocol.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/docs/mqtt/discovery/
///
/// Field order is the serialization order, which keeps republished payloads
/// byte-identical.
#[derive(Serialize, Debug, PartialEq)]
pub struct SensorConfig {
    name: String,
    state_topic: String, // The MQTT topic where the raw value is published.
    pub unique_id: String,
    device: DeviceConfig, // Groups the sensors of one inverter (or of the totals).
    unit_of_measurement: String,
    // exclude optionals if they are not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<String>, // e.g. power, energy
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<String>, // e.g. measurement, total_increasing
}

impl SensorConfig {
    pub fn new(
        name: String,
        state_topic: String,
        unique_id: String,
        device: DeviceConfig,
        unit_of_measurement: &str,
        device_class: Option<&str>,
        state_class: Option<&str>,
    ) -> Self {
        Self {
            name,
            state_topic,
            unique_id,
            device,
            unit_of_measurement: unit_of_measurement.to_string(),
            device_class: device_class.map(str::to_string),
            state_class: state_class.map(str::to_string),
        }
    }
}
