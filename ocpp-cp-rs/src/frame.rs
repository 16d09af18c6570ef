//! OCPP 1.6J JSON-RPC message framing
//!
//! OCPP uses a WAMP-style array envelope over WebSocket text frames:
//! - CALL: [2, uniqueId, action, payload]
//! - CALLRESULT: [3, uniqueId, payload]
//! - CALLERROR: [4, uniqueId, errorCode, errorDescription, errorDetails]

use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorCode, OcppError};

/// OCPP message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

/// OCPP 1.6 action names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // CP -> CSMS
    BootNotification,
    Authorize,
    StartTransaction,
    StopTransaction,
    Heartbeat,
    MeterValues,

    // CSMS -> CP
    ClearCache,
    RemoteStartTransaction,
    RemoteStopTransaction,
    GetConfiguration,
    ChangeConfiguration,
    ChangeAvailability,
    UnlockConnector,
    Reset,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Action {
    type Err = OcppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BootNotification" => Ok(Action::BootNotification),
            "Authorize" => Ok(Action::Authorize),
            "StartTransaction" => Ok(Action::StartTransaction),
            "StopTransaction" => Ok(Action::StopTransaction),
            "Heartbeat" => Ok(Action::Heartbeat),
            "MeterValues" => Ok(Action::MeterValues),
            "ClearCache" => Ok(Action::ClearCache),
            "RemoteStartTransaction" => Ok(Action::RemoteStartTransaction),
            "RemoteStopTransaction" => Ok(Action::RemoteStopTransaction),
            "GetConfiguration" => Ok(Action::GetConfiguration),
            "ChangeConfiguration" => Ok(Action::ChangeConfiguration),
            "ChangeAvailability" => Ok(Action::ChangeAvailability),
            "UnlockConnector" => Ok(Action::UnlockConnector),
            "Reset" => Ok(Action::Reset),
            _ => Err(OcppError::UnknownAction(s.to_string())),
        }
    }
}

/// OCPP CALL message (request)
#[derive(Debug, Clone)]
pub struct Call {
    pub unique_id: String,
    pub action: Action,
    pub payload: Value,
}

impl Call {
    /// Create a CALL with a caller-supplied correlation id. Correlation ids
    /// are allocated by the RPC engine, not here.
    pub fn new(unique_id: String, action: Action, payload: impl Serialize) -> Result<Self, OcppError> {
        Ok(Self {
            unique_id,
            action,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to wire format: [2, uniqueId, action, payload]
    pub fn to_text(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            &self.unique_id,
            self.action.to_string(),
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// OCPP CALLRESULT message (success response)
#[derive(Debug, Clone)]
pub struct CallResult {
    pub unique_id: String,
    pub payload: Value,
}

impl CallResult {
    pub fn new(unique_id: String, payload: impl Serialize) -> Result<Self, OcppError> {
        Ok(Self {
            unique_id,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to wire format: [3, uniqueId, payload]
    pub fn to_text(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            &self.unique_id,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// OCPP CALLERROR message (error response)
#[derive(Debug, Clone)]
pub struct CallError {
    pub unique_id: String,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub error_details: Value,
}

impl CallError {
    pub fn new(
        unique_id: String,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            unique_id,
            error_code,
            error_description: error_description.into(),
            error_details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Serialize to wire format: [4, uniqueId, errorCode, errorDescription, errorDetails]
    pub fn to_text(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::CallError as i32,
            &self.unique_id,
            format!("{:?}", self.error_code),
            &self.error_description,
            &self.error_details
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// Parsed OCPP message (any frame kind)
#[derive(Debug, Clone)]
pub enum OcppMessage {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl OcppMessage {
    /// Parse an inbound frame. A frame that does not parse is an error on
    /// that frame only; the connection stays up.
    pub fn parse(text: &str) -> Result<Self, OcppError> {
        let array: Vec<Value> = serde_json::from_str(text)?;

        if array.is_empty() {
            return Err(OcppError::InvalidFormat);
        }

        let msg_type = array[0].as_i64().ok_or(OcppError::InvalidFormat)?;

        match msg_type {
            2 => {
                if array.len() != 4 {
                    return Err(OcppError::InvalidFormat);
                }

                let unique_id = array[1]
                    .as_str()
                    .ok_or(OcppError::InvalidFormat)?
                    .to_string();

                let action: Action = array[2]
                    .as_str()
                    .ok_or(OcppError::InvalidFormat)?
                    .parse()?;

                Ok(OcppMessage::Call(Call {
                    unique_id,
                    action,
                    payload: array[3].clone(),
                }))
            }
            3 => {
                if array.len() != 3 {
                    return Err(OcppError::InvalidFormat);
                }

                let unique_id = array[1]
                    .as_str()
                    .ok_or(OcppError::InvalidFormat)?
                    .to_string();

                Ok(OcppMessage::CallResult(CallResult {
                    unique_id,
                    payload: array[2].clone(),
                }))
            }
            4 => {
                if array.len() != 5 {
                    return Err(OcppError::InvalidFormat);
                }

                let unique_id = array[1]
                    .as_str()
                    .ok_or(OcppError::InvalidFormat)?
                    .to_string();

                let error_code_str = array[2].as_str().ok_or(OcppError::InvalidFormat)?;
                let error_code: ErrorCode =
                    serde_json::from_value(Value::String(error_code_str.to_string()))
                        .unwrap_or(ErrorCode::GenericError);

                let error_description = array[3].as_str().unwrap_or("").to_string();

                Ok(OcppMessage::CallError(CallError {
                    unique_id,
                    error_code,
                    error_description,
                    error_details: array[4].clone(),
                }))
            }
            other => Err(OcppError::UnknownMessageType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_serialization() {
        let call = Call::new("42".into(), Action::Heartbeat, serde_json::json!({})).unwrap();
        let text = call.to_text().unwrap();

        assert!(text.starts_with("[2,"));
        assert!(text.contains("\"42\""));
        assert!(text.contains("\"Heartbeat\""));
    }

    #[test]
    fn test_call_parsing() {
        let json = r#"[2, "5", "RemoteStopTransaction", {"transactionId": 7}]"#;
        let msg = OcppMessage::parse(json).unwrap();

        match msg {
            OcppMessage::Call(call) => {
                assert_eq!(call.unique_id, "5");
                assert_eq!(call.action, Action::RemoteStopTransaction);
                assert_eq!(call.payload["transactionId"], 7);
            }
            _ => panic!("Expected Call"),
        }
    }

    #[test]
    fn test_call_result_round_trip() {
        let result = CallResult::new(
            "17".into(),
            serde_json::json!({"status": "Accepted"}),
        )
        .unwrap();
        let text = result.to_text().unwrap();
        assert_eq!(text, r#"[3,"17",{"status":"Accepted"}]"#);

        match OcppMessage::parse(&text).unwrap() {
            OcppMessage::CallResult(r) => {
                assert_eq!(r.unique_id, "17");
                assert_eq!(r.payload["status"], "Accepted");
            }
            _ => panic!("Expected CallResult"),
        }
    }

    #[test]
    fn test_call_error_parsing() {
        let json = r#"[4, "9", "NotImplemented", "Action not supported", {}]"#;
        let msg = OcppMessage::parse(json).unwrap();

        match msg {
            OcppMessage::CallError(error) => {
                assert_eq!(error.unique_id, "9");
                assert_eq!(error.error_code, ErrorCode::NotImplemented);
                assert_eq!(error.error_description, "Action not supported");
            }
            _ => panic!("Expected CallError"),
        }
    }

    #[test]
    fn test_unknown_message_type() {
        let json = r#"[7, "1", {}]"#;
        assert!(matches!(
            OcppMessage::parse(json),
            Err(OcppError::UnknownMessageType(7))
        ));
    }

    #[test]
    fn test_unknown_action() {
        let json = r#"[2, "1", "FluxCapacitor", {}]"#;
        assert!(matches!(
            OcppMessage::parse(json),
            Err(OcppError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_malformed_frame_is_local_error() {
        assert!(OcppMessage::parse("not json at all").is_err());
        assert!(OcppMessage::parse("[]").is_err());
        assert!(OcppMessage::parse(r#"[2, "1", "Heartbeat"]"#).is_err());
    }

    #[test]
    fn test_action_table_round_trip() {
        let actions = [
            Action::BootNotification,
            Action::Authorize,
            Action::StartTransaction,
            Action::StopTransaction,
            Action::Heartbeat,
            Action::MeterValues,
            Action::ClearCache,
            Action::RemoteStartTransaction,
            Action::RemoteStopTransaction,
            Action::GetConfiguration,
            Action::ChangeConfiguration,
            Action::ChangeAvailability,
            Action::UnlockConnector,
            Action::Reset,
        ];
        for a in actions {
            let name = a.to_string();
            assert_eq!(name.parse::<Action>().unwrap(), a);
        }
    }
}
