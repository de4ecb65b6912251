use crate::{cycle::FleetTotals, device::DeviceId, reading::Reading};

/// Sink for everything a cycle produces. Implementations are shared across
/// the fetch threads of a cycle, hence `&self`.
pub trait MetricCollector {
    fn publish_reading(&self, device: &DeviceId, reading: &Reading);

    fn publish_totals(&self, totals: &FleetTotals);
}
