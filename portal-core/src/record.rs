/// Persisted device configuration record, stored as one NVS blob.
///
/// The record is read once at boot, mutated in memory and persisted
/// explicitly; the NVS blob commit is atomic at record granularity, so
/// a partially written record is never observable.
use serde::{Deserialize, Serialize};

/// Sentinel marking an initialized record. Anything else means the
/// blob is absent or corrupt and defaults must be installed.
pub const FLASH_STATUS_INITIALIZED: u16 = 0x5555;

/// Bumped whenever a field is added or changes meaning.
pub const SCHEMA_VERSION: u16 = 1;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_HOSTNAME_LEN: usize = 32;

/// State of the staged Wi-Fi credential commit protocol.
///
/// Exactly one state holds at any time. `TestingNew` and `RollingBack`
/// records always carry a valid (possibly empty) old credential pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiCommitState {
    /// Current credentials are assumed good.
    Stable,
    /// A credential change is awaiting a successful join.
    TestingNew,
    /// The old credentials were restored after a failed test; the next
    /// boot validates them and settles back to `Stable` either way.
    RollingBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub flash_status: u16,
    #[serde(default = "schema_version")]
    pub schema: u16,

    pub wifi_state: WifiCommitState,
    /// Empty SSID means "no configured network" (access-point fallback).
    pub wifi_ssid: String,
    pub wifi_password: String,
    /// Last-known-good credentials, used only for rollback.
    pub old_wifi_ssid: String,
    pub old_wifi_password: String,

    // Device settings carried along unchanged by the update engine.
    pub hostname: String,
    pub http_login: String,
    pub http_password: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_login: String,
    pub mqtt_password: String,
    pub sensitivity: u8,
}

fn schema_version() -> u16 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    SsidTooLong,
    PasswordTooLong,
    HostnameTooLong,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::SsidTooLong => write!(f, "SSID exceeds {} bytes", MAX_SSID_LEN),
            RecordError::PasswordTooLong => {
                write!(f, "password exceeds {} bytes", MAX_PASSWORD_LEN)
            }
            RecordError::HostnameTooLong => {
                write!(f, "hostname exceeds {} bytes", MAX_HOSTNAME_LEN)
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl DeviceRecord {
    /// Factory defaults. The hostname is derived from the STA MAC so
    /// every device gets a unique access-point SSID out of the box.
    pub fn defaults(mac_str: &str) -> Self {
        Self {
            flash_status: FLASH_STATUS_INITIALIZED,
            schema: SCHEMA_VERSION,
            wifi_state: WifiCommitState::Stable,
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            old_wifi_ssid: String::new(),
            old_wifi_password: String::new(),
            hostname: mac_str.to_string(),
            http_login: "admin".to_string(),
            http_password: "admin".to_string(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_login: String::new(),
            mqtt_password: String::new(),
            sensitivity: 0xFF,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.flash_status == FLASH_STATUS_INITIALIZED
    }

    pub fn has_wifi_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }

    pub fn check_credentials(ssid: &str, password: &str) -> Result<(), RecordError> {
        if ssid.len() > MAX_SSID_LEN {
            return Err(RecordError::SsidTooLong);
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(RecordError::PasswordTooLong);
        }
        Ok(())
    }

    pub fn set_hostname(&mut self, hostname: &str) -> Result<(), RecordError> {
        if hostname.len() > MAX_HOSTNAME_LEN {
            return Err(RecordError::HostnameTooLong);
        }
        self.hostname = hostname.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_initialized_and_stable() {
        let record = DeviceRecord::defaults("A1B2C3D4E5F6");
        assert!(record.is_initialized());
        assert_eq!(record.wifi_state, WifiCommitState::Stable);
        assert!(!record.has_wifi_credentials());
        assert_eq!(record.hostname, "A1B2C3D4E5F6");
        assert_eq!(record.http_login, "admin");
    }

    #[test]
    fn credential_length_bounds() {
        assert!(DeviceRecord::check_credentials("a".repeat(32).as_str(), "").is_ok());
        assert_eq!(
            DeviceRecord::check_credentials("a".repeat(33).as_str(), ""),
            Err(RecordError::SsidTooLong)
        );
        assert_eq!(
            DeviceRecord::check_credentials("net", "p".repeat(65).as_str()),
            Err(RecordError::PasswordTooLong)
        );
    }

    #[test]
    fn schema_field_defaults_when_missing() {
        // A record persisted before the schema field existed must still load.
        let mut value = serde_json::to_value(DeviceRecord::defaults("AA")).unwrap();
        value.as_object_mut().unwrap().remove("schema");
        let record: DeviceRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.schema, SCHEMA_VERSION);
    }

    #[test]
    fn corrupt_sentinel_reads_as_uninitialized() {
        let mut record = DeviceRecord::defaults("AA");
        record.flash_status = 0x1234;
        assert!(!record.is_initialized());
    }
}
