use std::collections::BTreeMap;
use std::thread;

use log::{error, info, warn};

use crate::device::DeviceId;
use crate::health::LivenessProbe;
use crate::inverter::Inverter;
use crate::metric_collector::MetricCollector;
use crate::reading::{Metric, Reading};
use crate::telemetry::TelemetrySource;

/// Readings of one cycle, one entry per configured device.
pub type CycleOutcome = BTreeMap<DeviceId, Reading>;

/// Sum over the whole fleet. Only ever built from a cycle in which every
/// device succeeded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FleetTotals {
    pub ac_power: f64,
    pub yield_today: f64,
    pub yield_total: f64,
}

impl FleetTotals {
    pub fn from_outcome(outcome: &CycleOutcome) -> Self {
        outcome
            .values()
            .fold(FleetTotals::default(), |mut totals, reading| {
                totals.ac_power += reading.ac_power;
                totals.yield_today += reading.yield_today;
                totals.yield_total += reading.yield_total;
                totals
            })
    }

    /// The published fleet sensors with their values. DC panel power is per
    /// device only and has no fleet counterpart.
    pub fn values(&self) -> [(Metric, f64); 3] {
        [
            (Metric::AcPower, self.ac_power),
            (Metric::YieldToday, self.yield_today),
            (Metric::YieldTotal, self.yield_total),
        ]
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Set when every device succeeded and the totals were published.
    pub totals: Option<FleetTotals>,
}

impl CycleReport {
    pub fn all_succeeded(&self) -> bool {
        self.totals.is_some()
    }

    pub fn failed_devices(&self) -> Vec<&DeviceId> {
        self.outcome
            .iter()
            .filter(|(_, reading)| !reading.success)
            .map(|(id, _)| id)
            .collect()
    }
}

/// Drives fetch-aggregate-publish cycles over a fixed set of inverters.
pub struct CycleCoordinator<S, C, H> {
    inverters: Vec<Inverter>,
    source: S,
    collector: C,
    probe: H,
    last_totals: Option<FleetTotals>,
}

impl<S, C, H> CycleCoordinator<S, C, H>
where
    S: TelemetrySource + Sync,
    C: MetricCollector + Sync,
    H: LivenessProbe,
{
    pub fn new(devices: Vec<DeviceId>, source: S, collector: C, probe: H) -> Self {
        Self {
            inverters: devices.into_iter().map(Inverter::new).collect(),
            source,
            collector,
            probe,
            last_totals: None,
        }
    }

    pub fn inverters(&self) -> &[Inverter] {
        &self.inverters
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    pub fn probe(&self) -> &H {
        &self.probe
    }

    /// Totals of the most recent fully successful cycle.
    pub fn last_totals(&self) -> Option<&FleetTotals> {
        self.last_totals.as_ref()
    }

    /// Fetches every device in parallel, waits for all of them and publishes
    /// the fleet totals only if none failed.
    pub fn run_cycle(&mut self) -> CycleReport {
        let outcome = self.fetch_all();

        let all_success = !outcome.is_empty()
            && outcome.len() == self.inverters.len()
            && outcome.values().all(|reading| reading.success);

        if !all_success {
            warn!("One or more inverters failed. Skipping totals update this cycle.");
            self.probe.ping(false);
            return CycleReport {
                outcome,
                totals: None,
            };
        }

        info!("All inverters fetched successfully. Updating totals...");
        let totals = FleetTotals::from_outcome(&outcome);
        self.collector.publish_totals(&totals);
        info!(
            "Published totals: AC Power={}, Yield Today={}, Yield Total={}",
            totals.ac_power, totals.yield_today, totals.yield_total
        );
        self.probe.ping(true);
        self.last_totals = Some(totals.clone());

        CycleReport {
            outcome,
            totals: Some(totals),
        }
    }

    // one scoped thread per device; each returns its own reading and the
    // outcome is assembled only after every thread has been joined
    fn fetch_all(&mut self) -> CycleOutcome {
        let source = &self.source;
        let collector = &self.collector;

        thread::scope(|scope| {
            let handles: Vec<_> = self
                .inverters
                .iter_mut()
                .map(|inverter| {
                    let id = inverter.id().clone();
                    let handle = thread::Builder::new()
                        .name(format!("fetch-{id}"))
                        .spawn_scoped(scope, move || inverter.update_reading(source, collector));
                    (id, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| {
                    let reading = match handle {
                        Ok(handle) => handle.join().unwrap_or_else(|_| {
                            error!("Fetch for {id} panicked, counting it as failed");
                            Reading::failed()
                        }),
                        Err(e) => {
                            error!("Could not start fetch for {id}: {e}");
                            Reading::failed()
                        }
                    };
                    (id, reading)
                })
                .collect()
        })
    }
}
