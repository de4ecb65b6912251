use serde_derive::Deserialize;
use serde_json::{Map, Value};

use crate::telemetry::FetchError;

/// The values a SolaX inverter reports that get republished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    AcPower,
    DcPower1,
    DcPower2,
    YieldToday,
    YieldTotal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Power,
    Energy,
}

impl Metric {
    /// Sensors published for every inverter.
    pub const DEVICE: [Metric; 5] = [
        Metric::AcPower,
        Metric::DcPower1,
        Metric::DcPower2,
        Metric::YieldToday,
        Metric::YieldTotal,
    ];

    /// Key in the API result object, reused as the metric part of topics.
    pub fn key(self) -> &'static str {
        match self {
            Metric::AcPower => "acpower",
            Metric::DcPower1 => "powerdc1",
            Metric::DcPower2 => "powerdc2",
            Metric::YieldToday => "yieldtoday",
            Metric::YieldTotal => "yieldtotal",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Metric::AcPower => "AC Power",
            Metric::DcPower1 => "Panel 1 DC Power",
            Metric::DcPower2 => "Panel 2 DC Power",
            Metric::YieldToday => "Yield Today",
            Metric::YieldTotal => "Yield Total",
        }
    }

    pub fn kind(self) -> MetricKind {
        match self {
            Metric::AcPower | Metric::DcPower1 | Metric::DcPower2 => MetricKind::Power,
            Metric::YieldToday | Metric::YieldTotal => MetricKind::Energy,
        }
    }
}

/// Outcome of one fetch attempt for one inverter.
///
/// A failed attempt is a `Reading` too, with `success` unset and every value
/// at zero, so that each device contributes exactly one entry per cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reading {
    pub success: bool,
    pub ac_power: f64,
    pub yield_today: f64,
    pub yield_total: f64,
    pub dc_power_1: f64,
    pub dc_power_2: f64,
    /// `uploadTime` as reported by the cloud, informational only.
    pub upload_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RealtimeResponse {
    // free text in practice, but only ever logged
    #[serde(default)]
    exception: Option<Value>,
    result: Option<Map<String, Value>>,
}

impl Reading {
    pub fn failed() -> Self {
        Self::default()
    }

    /// Parses the body of a `realtimeInfo/get` response.
    pub fn from_body(body: &str) -> Result<Self, FetchError> {
        let response: RealtimeResponse =
            serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let Some(result) = response.result else {
            return Err(FetchError::MissingResult {
                exception: match response.exception {
                    Some(Value::String(text)) => text,
                    Some(Value::Null) | None => "no exception given".to_string(),
                    Some(other) => other.to_string(),
                },
            });
        };

        Ok(Self {
            success: true,
            ac_power: coerce(&result, Metric::AcPower)?,
            yield_today: coerce(&result, Metric::YieldToday)?,
            yield_total: coerce(&result, Metric::YieldTotal)?,
            dc_power_1: coerce(&result, Metric::DcPower1)?,
            dc_power_2: coerce(&result, Metric::DcPower2)?,
            upload_time: result
                .get("uploadTime")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AcPower => self.ac_power,
            Metric::DcPower1 => self.dc_power_1,
            Metric::DcPower2 => self.dc_power_2,
            Metric::YieldToday => self.yield_today,
            Metric::YieldTotal => self.yield_total,
        }
    }
}

// absent keys count as zero, anything present must be numeric
fn coerce(result: &Map<String, Value>, metric: Metric) -> Result<f64, FetchError> {
    let key = metric.key();
    let Some(raw) = result.get(key) else {
        return Ok(0.0);
    };
    let value = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| FetchError::Field {
            key,
            value: raw.to_string(),
        })
}
