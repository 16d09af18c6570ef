//! OCPP 1.6J PDU types
//!
//! Request/response payload structs for the implemented action set, plus the
//! shared enumerations (statuses, measurands, units). Field names follow the
//! 1.6J JSON schemas (camelCase, dotted measurand names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// BootNotification registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

/// idTagInfo authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

/// Accepted/Rejected ack for remote start/stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStartStopStatus {
    Accepted,
    Rejected,
}

/// UnlockConnector result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockStatus {
    Unlocked,
    UnlockFailed,
    NotSupported,
}

/// ChangeConfiguration result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigurationStatus {
    Accepted,
    Rejected,
    RebootRequired,
    NotSupported,
}

/// ChangeAvailability result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Accepted,
    Rejected,
    Scheduled,
}

/// ChangeAvailability requested mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityType {
    Inoperative,
    Operative,
}

/// Reset kind requested by the CSMS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    Hard,
    Soft,
}

/// Measurand types for meter values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurand {
    #[serde(rename = "Current.Import")]
    CurrentImport,
    #[serde(rename = "Current.Export")]
    CurrentExport,
    #[serde(rename = "Current.Offered")]
    CurrentOffered,
    #[serde(rename = "Energy.Active.Import.Register")]
    EnergyActiveImportRegister,
    #[serde(rename = "Energy.Active.Export.Register")]
    EnergyActiveExportRegister,
    #[serde(rename = "Power.Active.Import")]
    PowerActiveImport,
    #[serde(rename = "Power.Active.Export")]
    PowerActiveExport,
    #[serde(rename = "Power.Offered")]
    PowerOffered,
    #[serde(rename = "Frequency")]
    Frequency,
    #[serde(rename = "Temperature")]
    Temperature,
    #[serde(rename = "SoC")]
    SoC,
    #[serde(rename = "Voltage")]
    Voltage,
}

impl Measurand {
    /// Wire name as used in SampledValue and in the
    /// MeterValuesSampledData configuration key.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Measurand::CurrentImport => "Current.Import",
            Measurand::CurrentExport => "Current.Export",
            Measurand::CurrentOffered => "Current.Offered",
            Measurand::EnergyActiveImportRegister => "Energy.Active.Import.Register",
            Measurand::EnergyActiveExportRegister => "Energy.Active.Export.Register",
            Measurand::PowerActiveImport => "Power.Active.Import",
            Measurand::PowerActiveExport => "Power.Active.Export",
            Measurand::PowerOffered => "Power.Offered",
            Measurand::Frequency => "Frequency",
            Measurand::Temperature => "Temperature",
            Measurand::SoC => "SoC",
            Measurand::Voltage => "Voltage",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "Current.Import" => Some(Measurand::CurrentImport),
            "Current.Export" => Some(Measurand::CurrentExport),
            "Current.Offered" => Some(Measurand::CurrentOffered),
            "Energy.Active.Import.Register" => Some(Measurand::EnergyActiveImportRegister),
            "Energy.Active.Export.Register" => Some(Measurand::EnergyActiveExportRegister),
            "Power.Active.Import" => Some(Measurand::PowerActiveImport),
            "Power.Active.Export" => Some(Measurand::PowerActiveExport),
            "Power.Offered" => Some(Measurand::PowerOffered),
            "Frequency" => Some(Measurand::Frequency),
            "Temperature" => Some(Measurand::Temperature),
            "SoC" => Some(Measurand::SoC),
            "Voltage" => Some(Measurand::Voltage),
            _ => None,
        }
    }

    /// Unit symbol reported alongside readings of this measurand.
    pub fn unit(&self) -> UnitOfMeasure {
        match self {
            Measurand::CurrentImport | Measurand::CurrentExport | Measurand::CurrentOffered => {
                UnitOfMeasure::A
            }
            Measurand::EnergyActiveImportRegister | Measurand::EnergyActiveExportRegister => {
                UnitOfMeasure::Wh
            }
            Measurand::PowerActiveImport
            | Measurand::PowerActiveExport
            | Measurand::PowerOffered => UnitOfMeasure::W,
            Measurand::Frequency => UnitOfMeasure::Hertz,
            Measurand::Temperature => UnitOfMeasure::Celsius,
            Measurand::SoC => UnitOfMeasure::Percent,
            Measurand::Voltage => UnitOfMeasure::V,
        }
    }
}

/// Unit of measure for sampled values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOfMeasure {
    Wh,
    #[serde(rename = "kWh")]
    KWh,
    W,
    #[serde(rename = "kW")]
    KW,
    A,
    V,
    Celsius,
    Percent,
    #[serde(rename = "Hertz")]
    Hertz,
}

/// Reading context for sampled values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingContext {
    #[serde(rename = "Sample.Periodic")]
    SamplePeriodic,
    #[serde(rename = "Sample.Clock")]
    SampleClock,
    #[serde(rename = "Transaction.Begin")]
    TransactionBegin,
    #[serde(rename = "Transaction.End")]
    TransactionEnd,
    Trigger,
}

// ============================================================================
// Complex Types
// ============================================================================

/// Authorization outcome attached to Authorize / StartTransaction /
/// StopTransaction responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: AuthorizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
}

/// One measured value; readings are passed through as pre-formatted strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ReadingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurand: Option<Measurand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitOfMeasure>,
}

/// Timestamped group of sampled values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

/// Key/value pair in a GetConfiguration response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// ============================================================================
// Charge point initiated PDUs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub status: RegistrationStatus,
    pub current_time: DateTime<Utc>,
    /// Heartbeat interval in seconds (retry interval while not Accepted)
    pub interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub id_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub id_tag_info: IdTagInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    pub connector_id: i32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionResponse {
    pub transaction_id: i32,
    pub id_tag_info: IdTagInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionRequest {
    pub transaction_id: i32,
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRequest {
    pub connector_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterValuesResponse {}

// ============================================================================
// CSMS initiated PDUs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigurationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigurationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_key: Option<Vec<KeyValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_key: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeConfigurationRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeConfigurationResponse {
    pub status: ConfigurationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    pub id_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionResponse {
    pub status: RemoteStartStopStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionRequest {
    pub transaction_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionResponse {
    pub status: RemoteStartStopStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorRequest {
    pub connector_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorResponse {
    pub status: UnlockStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub kind: ResetType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityRequest {
    pub connector_id: i32,
    #[serde(rename = "type")]
    pub kind: AvailabilityType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_request_wire_names() {
        let req = AuthorizeRequest {
            id_tag: "ABC123".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"idTag":"ABC123"}"#);
    }

    #[test]
    fn test_boot_notification_round_trip() {
        let req = BootNotificationRequest {
            charge_point_vendor: "Elektrokombinacija".into(),
            charge_point_model: "EK3-CP".into(),
            charge_point_serial_number: Some("EK3-001".into()),
            firmware_version: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("chargePointVendor"));
        assert!(!json.contains("firmwareVersion"));

        let parsed: BootNotificationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.charge_point_model, "EK3-CP");
    }

    #[test]
    fn test_boot_response_parsing() {
        let json = r#"{"status":"Accepted","currentTime":"2024-01-01T00:00:00Z","interval":300}"#;
        let resp: BootNotificationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, RegistrationStatus::Accepted);
        assert_eq!(resp.interval, 300);
    }

    #[test]
    fn test_measurand_names() {
        for m in [
            Measurand::CurrentImport,
            Measurand::EnergyActiveImportRegister,
            Measurand::SoC,
            Measurand::Voltage,
        ] {
            assert_eq!(Measurand::from_wire_name(m.wire_name()), Some(m));
        }
        assert_eq!(Measurand::from_wire_name("Bogus"), None);

        let json = serde_json::to_string(&Measurand::EnergyActiveImportRegister).unwrap();
        assert_eq!(json, r#""Energy.Active.Import.Register""#);
    }

    #[test]
    fn test_sampled_value_units() {
        let sv = SampledValue {
            value: "230.1".into(),
            context: Some(ReadingContext::SamplePeriodic),
            measurand: Some(Measurand::Voltage),
            unit: Some(Measurand::Voltage.unit()),
        };
        let json = serde_json::to_string(&sv).unwrap();
        assert!(json.contains(r#""unit":"V""#));
        assert!(json.contains(r#""context":"Sample.Periodic""#));
    }

    #[test]
    fn test_id_tag_info_optional_fields() {
        let json = r#"{"status":"Blocked"}"#;
        let info: IdTagInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.status, AuthorizationStatus::Blocked);
        assert!(info.expiry_date.is_none());
        assert!(info.parent_id_tag.is_none());
    }
}
