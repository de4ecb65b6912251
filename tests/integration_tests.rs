use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use solax2mqtt::cycle::CycleCoordinator;
use solax2mqtt::device::{parse_device_list, DeviceId};
use solax2mqtt::health::LivenessProbe;
use solax2mqtt::home_assistant::{HomeAssistant, Scope};
use solax2mqtt::inverter::NetworkState;
use solax2mqtt::mqtt_config::MqttConfig;
use solax2mqtt::mqtt_wrapper::{MqttWrapper, QoS};
use solax2mqtt::telemetry::{FetchError, TelemetrySource};

#[derive(Default)]
struct Broker {
    published: Vec<(String, Vec<u8>, bool)>,
    retained: BTreeMap<String, Vec<u8>>,
    disconnected: bool,
}

/// In-memory bus keeping every publish and the retained message per topic.
struct MqttTester {
    broker: Mutex<Broker>,
}

impl MqttTester {
    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap()
    }

    pub fn len(&self) -> usize {
        self.broker().published.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retained(&self, topic: &str) -> Option<String> {
        self.broker()
            .retained
            .get(topic)
            .map(|payload| String::from_utf8(payload.clone()).unwrap())
    }

    fn publishes_to(&self, topic: &str) -> usize {
        self.broker()
            .published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .count()
    }
}

impl MqttWrapper for MqttTester {
    fn publish<S, V>(&self, topic: S, _qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let topic = topic.into();
        let payload = payload.into();
        let mut broker = self.broker();
        if retain {
            broker.retained.insert(topic.clone(), payload.clone());
        }
        broker.published.push((topic, payload, retain));
        Ok(())
    }

    fn disconnect(&self) -> anyhow::Result<()> {
        self.broker().disconnected = true;
        Ok(())
    }

    fn new(_config: &MqttConfig, _suffix: &str) -> Self {
        Self {
            broker: Mutex::new(Broker::default()),
        }
    }
}

#[derive(Clone)]
enum Script {
    Body(String),
    Offline,
    Panic,
}

/// Telemetry source answering from a per-device script.
#[derive(Default)]
struct ScriptedSource {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn set(&self, device: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(device.to_string(), script);
    }

    fn answer(&self, device: &str, ac_power: f64, yield_today: f64) {
        self.set(
            device,
            Script::Body(format!(
                r#"{{"success":true,"exception":"Query success!","result":{{"acpower":{ac_power},"yieldtoday":{yield_today},"yieldtotal":1000,"powerdc1":10,"powerdc2":"20","uploadTime":"2024-06-01 10:05:00"}}}}"#
            )),
        );
    }

    fn requests(&self) -> Vec<String> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort();
        requests
    }
}

impl TelemetrySource for ScriptedSource {
    fn request(&self, device: &DeviceId) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(device.to_string());
        let script = self.scripts.lock().unwrap().get(device.as_str()).cloned();
        match script {
            Some(Script::Body(body)) => Ok(body),
            Some(Script::Panic) => panic!("simulated fault while fetching {device}"),
            Some(Script::Offline) | None => Err(FetchError::Transport("connection refused".into())),
        }
    }
}

#[derive(Default)]
struct RecordingProbe {
    pings: Mutex<Vec<bool>>,
}

impl RecordingProbe {
    fn pings(&self) -> Vec<bool> {
        self.pings.lock().unwrap().clone()
    }
}

impl LivenessProbe for RecordingProbe {
    fn ping(&self, success: bool) {
        self.pings.lock().unwrap().push(success);
    }
}

type Coordinator = CycleCoordinator<ScriptedSource, HomeAssistant<MqttTester>, RecordingProbe>;

fn coordinator(devices: &[&str]) -> Coordinator {
    let config = MqttConfig::default();
    CycleCoordinator::new(
        parse_device_list(devices).unwrap(),
        ScriptedSource::default(),
        HomeAssistant::<MqttTester>::new(&config),
        RecordingProbe::default(),
    )
}

fn bus(coordinator: &Coordinator) -> &MqttTester {
    coordinator.collector().client()
}

#[test]
fn publish_one_message() {
    let mqtt = MqttTester::new(
        &MqttConfig {
            host: "frob".to_owned(),
            port: Some(1234),
            client_id: Some("myclient".to_string()),
            ..MqttConfig::default()
        },
        "-test",
    );
    let result = mqtt.publish("foo", QoS::AtMostOnce, true, "Hooray".to_string());
    assert!(result.is_ok());
    assert!(!mqtt.is_empty());
    assert_eq!(mqtt.len(), 1);
    assert_eq!(mqtt.retained("foo").as_deref(), Some("Hooray"));
}

#[test]
fn every_device_yields_exactly_one_reading() {
    let mut c = coordinator(&["A", "B", "C"]);
    c.source().answer("A", 1.0, 1.0);
    c.source().set("B", Script::Offline);
    c.source().set("C", Script::Body("not json".into()));

    let report = c.run_cycle();

    assert_eq!(c.source().requests(), ["A", "B", "C"]);
    assert_eq!(report.outcome.len(), 3);
    assert!(report.outcome[&DeviceId::parse("A").unwrap()].success);
    assert!(!report.outcome[&DeviceId::parse("B").unwrap()].success);
    assert!(!report.outcome[&DeviceId::parse("C").unwrap()].success);
}

#[test]
fn totals_published_when_all_devices_succeed() {
    let mut c = coordinator(&["A", "B"]);
    c.source().answer("A", 100.0, 5.0);
    c.source().answer("B", 200.0, 7.0);

    let report = c.run_cycle();

    assert!(report.all_succeeded());
    let totals = report.totals.unwrap();
    assert_eq!(totals.ac_power, 300.0);
    assert_eq!(totals.yield_today, 12.0);
    assert_eq!(totals.yield_total, 2000.0);

    let mqtt = bus(&c);
    assert_eq!(
        mqtt.retained("homeassistant/sensor/solax_totals/acpower").as_deref(),
        Some("300")
    );
    assert_eq!(
        mqtt.retained("homeassistant/sensor/solax_totals/yieldtoday").as_deref(),
        Some("12")
    );
    assert_eq!(
        mqtt.retained("homeassistant/sensor/solax_totals/yieldtotal").as_deref(),
        Some("2000")
    );
    let discovery = mqtt
        .retained("homeassistant/sensor/solax_totals_acpower/config")
        .unwrap();
    let discovery: serde_json::Value = serde_json::from_str(&discovery).unwrap();
    assert_eq!(discovery["name"], "Total AC Power");
    assert_eq!(
        discovery["state_topic"],
        "homeassistant/sensor/solax_totals/acpower"
    );
    assert_eq!(c.probe().pings(), [true]);
    assert!(mqtt.broker().published.iter().all(|(_, _, retain)| *retain));
}

#[test]
fn one_failure_skips_totals_and_keeps_previous_ones() {
    let mut c = coordinator(&["A", "B"]);
    c.source().answer("A", 100.0, 5.0);
    c.source().answer("B", 200.0, 7.0);
    c.run_cycle();
    let fleet_topic = "homeassistant/sensor/solax_totals/acpower";
    assert_eq!(bus(&c).publishes_to(fleet_topic), 1);

    c.source().answer("A", 150.0, 6.0);
    c.source().set("B", Script::Offline);
    let report = c.run_cycle();

    assert!(!report.all_succeeded());
    assert_eq!(report.failed_devices(), [&DeviceId::parse("B").unwrap()]);
    // no aggregate publish this cycle, the retained totals are the old ones
    assert_eq!(bus(&c).publishes_to(fleet_topic), 1);
    assert_eq!(bus(&c).retained(fleet_topic).as_deref(), Some("300"));
    assert_eq!(c.last_totals().unwrap().ac_power, 300.0);
    // the healthy device is still published on its own
    assert_eq!(
        bus(&c)
            .retained("homeassistant/sensor/solax/A/acpower")
            .as_deref(),
        Some("150")
    );
    assert_eq!(c.probe().pings(), [true, false]);
}

#[test]
fn failed_device_publishes_nothing() {
    let mut c = coordinator(&["A"]);
    c.source().set("A", Script::Body(r#"{"success":false,"exception":"bad token","result":null}"#.into()));

    c.run_cycle();

    assert!(bus(&c).is_empty());
    assert_eq!(c.probe().pings(), [false]);
}

#[test]
fn non_numeric_field_fails_the_device() {
    let mut c = coordinator(&["A", "B"]);
    c.source().answer("A", 100.0, 5.0);
    c.source().set(
        "B",
        Script::Body(r#"{"result":{"acpower":"offline","yieldtoday":1}}"#.into()),
    );

    let report = c.run_cycle();

    assert!(!report.all_succeeded());
    assert!(bus(&c).retained("homeassistant/sensor/solax/B/yieldtoday").is_none());
    assert_eq!(c.probe().pings(), [false]);
}

#[test]
fn panicking_fetch_is_isolated() {
    let mut c = coordinator(&["A", "B", "C"]);
    c.source().answer("A", 1.0, 1.0);
    c.source().set("B", Script::Panic);
    c.source().answer("C", 3.0, 3.0);

    let report = c.run_cycle();

    assert_eq!(report.outcome.len(), 3);
    assert!(!report.outcome[&DeviceId::parse("B").unwrap()].success);
    assert!(report.outcome[&DeviceId::parse("A").unwrap()].success);
    assert!(report.outcome[&DeviceId::parse("C").unwrap()].success);
    assert_eq!(
        bus(&c)
            .retained("homeassistant/sensor/solax/A/acpower")
            .as_deref(),
        Some("1")
    );
    assert_eq!(
        bus(&c)
            .retained("homeassistant/sensor/solax/C/acpower")
            .as_deref(),
        Some("3")
    );
    assert!(report.totals.is_none());
    assert_eq!(c.probe().pings(), [false]);
}

#[test]
fn device_publishes_discovery_and_state() {
    let mut c = coordinator(&["SW1"]);
    c.source().answer("SW1", 1520.5, 7.25);

    c.run_cycle();

    let mqtt = bus(&c);
    for key in ["acpower", "powerdc1", "powerdc2", "yieldtoday", "yieldtotal"] {
        assert!(
            mqtt.retained(&format!("homeassistant/sensor/solax_SW1_{key}/config"))
                .is_some(),
            "missing discovery for {key}"
        );
    }
    assert_eq!(
        mqtt.retained("homeassistant/sensor/solax/SW1/acpower").as_deref(),
        Some("1520.5")
    );
    assert_eq!(
        mqtt.retained("homeassistant/sensor/solax/SW1/powerdc2").as_deref(),
        Some("20")
    );
    let config: serde_json::Value = serde_json::from_str(
        &mqtt
            .retained("homeassistant/sensor/solax_SW1_yieldtoday/config")
            .unwrap(),
    )
    .unwrap();
    assert_eq!(config["unit_of_measurement"], "kWh");
    assert_eq!(config["device_class"], "energy");
    assert_eq!(config["state_class"], "total_increasing");
    assert_eq!(config["device"]["name"], "Solax Inverter SW1");
}

#[test]
fn republishing_discovery_is_idempotent() {
    let publisher = HomeAssistant::with_client(
        MqttTester::new(&MqttConfig::default(), "-test"),
        "homeassistant",
    );
    let id = DeviceId::parse("SW1").unwrap();
    let topic = "homeassistant/sensor/solax_SW1_acpower/config";

    publisher.publish_discovery(Scope::Device(&id), "acpower", "AC Power", "W", Some("power"), None);
    let first = publisher.client().retained(topic).unwrap();
    publisher.publish_discovery(Scope::Device(&id), "acpower", "AC Power", "W", Some("power"), None);
    let second = publisher.client().retained(topic).unwrap();

    assert_eq!(first, second);
    let broker = publisher.client().broker();
    assert_eq!(broker.retained.len(), 1);
    assert_eq!(broker.published.len(), 2);
    assert_eq!(broker.published[0], broker.published[1]);
}

#[test]
fn readings_are_not_carried_between_cycles() {
    let mut c = coordinator(&["A"]);
    c.source().answer("A", 100.0, 5.0);
    let first = c.run_cycle();
    assert_eq!(first.totals.unwrap().ac_power, 100.0);

    c.source().answer("A", 40.0, 6.0);
    let second = c.run_cycle();
    assert_eq!(second.outcome.len(), 1);
    assert_eq!(second.totals.unwrap().ac_power, 40.0);
    assert_eq!(c.probe().pings(), [true, true]);
}

#[test]
fn network_state_follows_fetches() {
    let mut c = coordinator(&["A"]);
    assert_eq!(c.inverters()[0].state(), NetworkState::Unknown);
    c.source().set("A", Script::Offline);
    c.run_cycle();
    assert_eq!(c.inverters()[0].state(), NetworkState::Offline);
    c.source().answer("A", 1.0, 1.0);
    c.run_cycle();
    assert_eq!(c.inverters()[0].state(), NetworkState::Online);
}

#[test]
fn custom_base_topic() {
    let config = MqttConfig {
        base_topic: Some("ha".to_string()),
        ..MqttConfig::default()
    };
    let mut c = CycleCoordinator::new(
        parse_device_list(["A"]).unwrap(),
        ScriptedSource::default(),
        HomeAssistant::<MqttTester>::new(&config),
        RecordingProbe::default(),
    );
    c.source().answer("A", 5.0, 1.0);
    c.run_cycle();
    assert_eq!(
        c.collector().client().retained("ha/sensor/solax_totals/acpower").as_deref(),
        Some("5")
    );
}

#[test]
fn disconnect_reaches_the_bus() {
    let c = coordinator(&["A"]);
    c.collector().disconnect().unwrap();
    assert!(bus(&c).broker().disconnected);
}
