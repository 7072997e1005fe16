use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    DEFAULT_MESSAGE_CHARACTERISTIC, DEFAULT_RPM_CHARACTERISTIC, DEFAULT_SERVICE, SCAN_TIMEOUT, TARGET_NAME,
};
use crate::error::ConfigError;

/// How characteristic payloads are represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadEncoding {
    /// ASCII text, base64 encoded
    Base64,
    /// ASCII text as raw bytes
    Plain,
}

impl std::fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            PayloadEncoding::Base64 => "base64",
            PayloadEncoding::Plain => "plain",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub service_uuid: String,
    #[serde(default)]
    pub message_characteristic_uuid: String,
    #[serde(default)]
    pub rpm_characteristic_uuid: String,
    #[serde(default = "default_payload_encoding")]
    pub payload_encoding: PayloadEncoding,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

fn default_payload_encoding() -> PayloadEncoding {
    PayloadEncoding::Base64
}

fn default_scan_timeout_ms() -> u64 {
    SCAN_TIMEOUT
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingField { field });
    }

    Uuid::parse_str(value).map_err(|source| ConfigError::InvalidUuid { field, source })
}

impl Config {
    /// Checks every field and converts the config into the identifiers the session controller
    /// works with. Any blank or malformed field is an error.
    pub fn validate(&self) -> Result<DeviceProfile, ConfigError> {
        let target_name = self.target_name.trim();
        if target_name.is_empty() {
            return Err(ConfigError::MissingField { field: "targetName" });
        }

        if self.scan_timeout_ms == 0 {
            return Err(ConfigError::InvalidScanTimeout);
        }

        Ok(DeviceProfile {
            target_name: target_name.to_string(),
            service: parse_uuid("serviceUuid", &self.service_uuid)?,
            message_characteristic: parse_uuid("messageCharacteristicUuid", &self.message_characteristic_uuid)?,
            rpm_characteristic: parse_uuid("rpmCharacteristicUuid", &self.rpm_characteristic_uuid)?,
            encoding: self.payload_encoding,
            scan_timeout: Duration::from_millis(self.scan_timeout_ms),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target_name: TARGET_NAME.to_string(),
            service_uuid: DEFAULT_SERVICE.to_string(),
            message_characteristic_uuid: DEFAULT_MESSAGE_CHARACTERISTIC.to_string(),
            rpm_characteristic_uuid: DEFAULT_RPM_CHARACTERISTIC.to_string(),
            payload_encoding: default_payload_encoding(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

/// Validated identifiers of the fan controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub target_name: String,
    pub service: Uuid,
    pub message_characteristic: Uuid,
    pub rpm_characteristic: Uuid,
    pub encoding: PayloadEncoding,
    pub scan_timeout: Duration,
}

#[cfg(test)]
impl Default for DeviceProfile {
    fn default() -> Self {
        Config::default().validate().expect("Default config must be valid")
    }
}
