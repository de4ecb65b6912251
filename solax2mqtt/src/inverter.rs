use crate::device::DeviceId;
use crate::metric_collector::MetricCollector;
use crate::reading::Reading;
use crate::telemetry::TelemetrySource;
use log::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkState {
    Unknown,
    Online,
    Offline,
}

/// Fetches readings for one inverter.
///
/// Only the reachability of the device is remembered between cycles, for
/// logging; readings themselves are handed back to the caller.
pub struct Inverter {
    id: DeviceId,
    state: NetworkState,
}

impl Inverter {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            state: NetworkState::Unknown,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    fn set_state(&mut self, new_state: NetworkState) {
        if self.state != new_state {
            self.state = new_state;
            info!("Inverter {} is {new_state:?}", self.id);
        }
    }

    /// Performs exactly one request and publishes the result right away when
    /// it succeeds. Never fails: errors become a failed [`Reading`].
    pub fn update_reading<S, C>(&mut self, source: &S, collector: &C) -> Reading
    where
        S: TelemetrySource + ?Sized,
        C: MetricCollector + ?Sized,
    {
        let reading = source
            .request(&self.id)
            .and_then(|body| Reading::from_body(&body));

        match reading {
            Ok(reading) => {
                self.set_state(NetworkState::Online);
                collector.publish_reading(&self.id, &reading);
                info!(
                    "Published data for {}: AC Power={}, Yield Today={}, DC Power 1={}, DC Power 2={}, Yield Total={}, Upload Time={}",
                    self.id,
                    reading.ac_power,
                    reading.yield_today,
                    reading.dc_power_1,
                    reading.dc_power_2,
                    reading.yield_total,
                    reading.upload_time.as_deref().unwrap_or("unknown"),
                );
                reading
            }
            Err(e) => {
                warn!("Serial Number: {}, Error: {e}", self.id);
                self.set_state(NetworkState::Offline);
                Reading::failed()
            }
        }
    }
}
