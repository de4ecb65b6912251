use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::{thread, time::Duration};

use log::{debug, info, warn};
use rumqttc::{
    tokio_rustls::{self, rustls::ClientConfig},
    Client, Connection, Event, MqttOptions, Outgoing, Packet, Transport,
};
use solax2mqtt::{
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self},
    reconnect::ReconnectPolicy,
};

static PUBLISH_ATTEMPTS: usize = 3;
static SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct RumqttcWrapper {
    client: Client,
    stopping: Arc<AtomicBool>,
    // signalled once the event loop thread has returned
    stopped: Mutex<Option<Receiver<()>>>,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn tls_transport() -> Transport {
    // Use rustls-native-certs to load root certificates from the operating system.
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("could not load platform cert: {e}");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("skipping platform cert: {e}");
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Transport::tls_with_config(client_config.into())
}

/// Polls the event loop for the whole process lifetime. rumqttc reconnects
/// on the next poll after an error; the policy spaces those polls out.
fn drive_event_loop(mut connection: Connection, stopping: Arc<AtomicBool>) {
    let mut policy = ReconnectPolicy::default();
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if policy.attempts() > 0 {
                    info!("Reconnected to MQTT broker after {} attempts", policy.attempts());
                } else {
                    info!("Connected to MQTT broker");
                }
                policy.reset();
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if stopping.load(Ordering::SeqCst) {
                    debug!("MQTT event loop stopped: {e}");
                    break;
                }
                let delay = policy.next_delay();
                warn!(
                    "Unexpected MQTT disconnection ({e}). Reconnecting in {}s",
                    delay.as_secs()
                );
                thread::sleep(delay);
            }
        }
    }
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn publish<S, V>(
        &self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        // the request queue may be momentarily full while reconnecting
        for _ in 1..PUBLISH_ATTEMPTS {
            if self
                .client
                .try_publish(topic.clone(), match_qos(qos), retain, payload.clone())
                .is_ok()
            {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        Ok(self
            .client
            .try_publish(topic, match_qos(qos), retain, payload)?)
    }

    fn disconnect(&self) -> anyhow::Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.client.disconnect()?;

        // give the event loop a moment to flush the DISCONNECT packet
        let stopped = self.stopped.lock().ok().and_then(|mut rx| rx.take());
        if let Some(rx) = stopped {
            if rx.recv_timeout(SHUTDOWN_GRACE).is_err() {
                warn!("MQTT event loop did not stop in time");
            }
        }
        Ok(())
    }

    fn new(config: &MqttConfig, suffix: &str) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| "solax-mqtt-publisher".to_string())
            + suffix;
        let mut mqttoptions = MqttOptions::new(client_id, &config.host, config.port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        if config.tls.is_some_and(|tls| tls) {
            mqttoptions.set_transport(tls_transport());
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, None) => None,
            (None, Some(_)) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        let (client, connection) = Client::new(mqttoptions, 512);
        let stopping = Arc::new(AtomicBool::new(false));

        let (stopped_tx, stopped_rx) = mpsc::channel();

        let loop_stopping = stopping.clone();
        if let Err(e) = thread::Builder::new()
            .name("mqtt-eventloop".to_string())
            .spawn(move || {
                drive_event_loop(connection, loop_stopping);
                let _ = stopped_tx.send(());
            })
        {
            warn!("could not start MQTT event loop: {e}");
        }
        Self {
            client,
            stopping,
            stopped: Mutex::new(Some(stopped_rx)),
        }
    }
}
