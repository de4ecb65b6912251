use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

/// Scope token used in topics and unique ids of the fleet totals. A device
/// carrying this serial would share topics with the aggregate sensors.
pub const FLEET_SCOPE_TOKEN: &str = "totals";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device id is empty")]
    Empty,
    #[error("device id {0:?} contains whitespace or MQTT wildcard characters")]
    InvalidCharacter(String),
    #[error("device id {0:?} is reserved for the fleet totals")]
    Reserved(String),
    #[error("device id {0:?} is listed more than once")]
    Duplicate(String),
}

/// Serial number of one inverter as registered with the SolaX cloud.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(raw: &str) -> Result<Self, DeviceIdError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(DeviceIdError::Empty);
        }
        if id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '+' | '#'))
        {
            return Err(DeviceIdError::InvalidCharacter(id.to_string()));
        }
        if id == FLEET_SCOPE_TOKEN {
            return Err(DeviceIdError::Reserved(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a list of serial numbers, skipping blank entries.
pub fn parse_device_list<I, S>(raw: I) -> Result<Vec<DeviceId>, DeviceIdError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut devices = Vec::new();
    for entry in raw {
        let entry = entry.as_ref();
        if entry.trim().is_empty() {
            continue;
        }
        let id = DeviceId::parse(entry)?;
        if !seen.insert(id.clone()) {
            return Err(DeviceIdError::Duplicate(id.0));
        }
        devices.push(id);
    }
    Ok(devices)
}
