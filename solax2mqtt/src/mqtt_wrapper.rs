use crate::mqtt_config::MqttConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

pub trait MqttWrapper {
    // Decouples library code from the MQTT client implementation. The binary
    // wraps its client in a new type implementing this trait; tests use an
    // in-memory recorder.
    //
    // The wrapper is shared by all fetch threads of a cycle, so publishing
    // only needs a shared reference.

    fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;

    /// Stops bus activity. Called once on shutdown.
    fn disconnect(&self) -> anyhow::Result<()>;

    fn new(config: &MqttConfig, suffix: &str) -> Self;
}
