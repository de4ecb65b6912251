mod config;
mod logging;
mod rumqttc_wrapper;

use std::sync::mpsc;

use anyhow::Context;
use config::Config;
use log::{error, info};
use rumqttc_wrapper::RumqttcWrapper;
use solax2mqtt::cycle::CycleCoordinator;
use solax2mqtt::health::{Healthchecks, PING_TIMEOUT};
use solax2mqtt::home_assistant::HomeAssistant;
use solax2mqtt::scheduler::Scheduler;
use solax2mqtt::telemetry::SolaxCloud;

fn main() -> anyhow::Result<()> {
    logging::init_logger();
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml or environment variables");
    }

    let config = Config::load()?;
    let devices = config.devices().context("invalid configuration")?;
    info!(
        "Polling {} inverter(s): {}",
        devices.len(),
        devices
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    info!(
        "Publishing to MQTT broker {}:{} under {}",
        config.mqtt.host,
        config.mqtt.port(),
        config.mqtt.base_topic()
    );
    let home_assistant = HomeAssistant::<RumqttcWrapper>::new(&config.mqtt);

    let healthchecks = Healthchecks::new(config.healthchecks_url.clone(), PING_TIMEOUT);
    if !healthchecks.is_enabled() {
        info!("Healthchecks URL is not provided, liveness pings disabled");
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("could not install signal handler")?;

    let mut coordinator = CycleCoordinator::new(
        devices,
        SolaxCloud::new(&config.api),
        home_assistant,
        healthchecks,
    );

    Scheduler::new(shutdown_rx).run(|| {
        coordinator.run_cycle();
    });

    info!("Stopping...");
    if let Err(e) = coordinator.collector().disconnect() {
        error!("MQTT disconnect failed: {e}");
    }
    Ok(())
}
