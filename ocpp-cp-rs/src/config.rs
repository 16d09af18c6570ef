//! Engine configuration
//!
//! Identity reported in BootNotification, CSMS endpoint, and the timing
//! knobs for reconnect and call timeouts.

use std::time::Duration;

/// Configuration for one charge point engine instance
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// CSMS WebSocket URL (without the charge point id path segment)
    pub csms_url: String,

    /// Charge point identity (appended to the URL path)
    pub station_id: String,

    /// Vendor name for BootNotification
    pub vendor: String,

    /// Model name for BootNotification
    pub model: String,

    /// Serial number (optional)
    pub serial_number: Option<String>,

    /// Firmware version (optional)
    pub firmware_version: Option<String>,

    /// Number of physical connectors
    pub connector_count: u32,

    /// Initial reconnect delay
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay (exponential backoff cap)
    pub max_reconnect_delay: Duration,

    /// Boot retry period until the CSMS accepts registration
    pub boot_retry_delay: Duration,

    /// Default timeout for CALLs issued by internal tasks
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            csms_url: "ws://localhost:8180/steve/websocket/CentralSystemService".to_string(),
            station_id: "EK3-001".to_string(),
            vendor: "Elektrokombinacija".to_string(),
            model: "EK3-CP".to_string(),
            serial_number: None,
            firmware_version: Some("0.1.0".to_string()),
            connector_count: 1,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
            boot_retry_delay: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create config with the endpoint parameters
    pub fn new(station_id: impl Into<String>, csms_url: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            csms_url: csms_url.into(),
            ..Default::default()
        }
    }

    /// Set vendor info
    pub fn with_vendor(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self.model = model.into();
        self
    }

    /// Set serial number
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Set firmware version
    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    /// Set connector count
    pub fn with_connector_count(mut self, count: u32) -> Self {
        self.connector_count = count;
        self
    }

    /// Set default call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Full WebSocket URL including the charge point id
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.csms_url.trim_end_matches('/'),
            self.station_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("CS001", "ws://localhost:8180/ocpp")
            .with_vendor("EK", "EK3")
            .with_serial("SN001")
            .with_connector_count(2);

        assert_eq!(config.station_id, "CS001");
        assert_eq!(config.vendor, "EK");
        assert_eq!(config.connector_count, 2);
    }

    #[test]
    fn test_endpoint_url() {
        let config = ClientConfig::new("CS001", "ws://localhost:8180/ocpp/");
        assert_eq!(config.endpoint_url(), "ws://localhost:8180/ocpp/CS001");
    }
}
