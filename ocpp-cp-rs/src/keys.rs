//! Typed configuration-key store
//!
//! Fixed table of OCPP 1.6 core-profile keys with per-key type tags and
//! read-only flags. Values are only mutated through [`KeyStore::set`]
//! (internal, unconditional) and [`KeyStore::update`] (wire path, enforces
//! read-only and type validation). Pure data, no I/O.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::OcppError;
use crate::types::KeyValue;

/// OCPP 1.6 core profile configuration keys, in wire-enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    AllowOfflineTxForUnknownId,
    AuthorizationCacheEnabled,
    AuthorizeRemoteTxRequests,
    ClockAlignedDataInterval,
    ConnectionTimeOut,
    ConnectorPhaseRotation,
    GetConfigurationMaxKeys,
    HeartbeatInterval,
    LocalAuthorizeOffline,
    LocalPreAuthorize,
    MeterValuesAlignedData,
    MeterValuesSampledData,
    MeterValueSampleInterval,
    NumberOfConnectors,
    ResetRetries,
    StopTransactionOnEVSideDisconnect,
    StopTransactionOnInvalidId,
    StopTxnAlignedData,
    StopTxnSampledData,
    SupportedFeatureProfiles,
    TransactionMessageAttempts,
    TransactionMessageRetryInterval,
    UnlockConnectorOnEVSideDisconnect,
    WebSocketPingInterval,
}

/// Value type tag for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Bool,
    Int,
    /// Comma-separated list
    Csl,
    Text,
}

/// Current typed value of a key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyVal {
    Bool(bool),
    Int(i32),
    Text(String),
}

impl KeyVal {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KeyVal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            KeyVal::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Canonical wire representation
    pub fn to_wire(&self) -> String {
        match self {
            KeyVal::Bool(b) => b.to_string(),
            KeyVal::Int(i) => i.to_string(),
            KeyVal::Text(s) => s.clone(),
        }
    }
}

impl ConfigKey {
    /// All keys, in the order GetConfiguration enumerates them.
    pub const ALL: [ConfigKey; 24] = [
        ConfigKey::AllowOfflineTxForUnknownId,
        ConfigKey::AuthorizationCacheEnabled,
        ConfigKey::AuthorizeRemoteTxRequests,
        ConfigKey::ClockAlignedDataInterval,
        ConfigKey::ConnectionTimeOut,
        ConfigKey::ConnectorPhaseRotation,
        ConfigKey::GetConfigurationMaxKeys,
        ConfigKey::HeartbeatInterval,
        ConfigKey::LocalAuthorizeOffline,
        ConfigKey::LocalPreAuthorize,
        ConfigKey::MeterValuesAlignedData,
        ConfigKey::MeterValuesSampledData,
        ConfigKey::MeterValueSampleInterval,
        ConfigKey::NumberOfConnectors,
        ConfigKey::ResetRetries,
        ConfigKey::StopTransactionOnEVSideDisconnect,
        ConfigKey::StopTransactionOnInvalidId,
        ConfigKey::StopTxnAlignedData,
        ConfigKey::StopTxnSampledData,
        ConfigKey::SupportedFeatureProfiles,
        ConfigKey::TransactionMessageAttempts,
        ConfigKey::TransactionMessageRetryInterval,
        ConfigKey::UnlockConnectorOnEVSideDisconnect,
        ConfigKey::WebSocketPingInterval,
    ];

    /// Wire name as sent in GetConfiguration/ChangeConfiguration.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::AllowOfflineTxForUnknownId => "AllowOfflineTxForUnknownId",
            ConfigKey::AuthorizationCacheEnabled => "AuthorizationCacheEnabled",
            ConfigKey::AuthorizeRemoteTxRequests => "AuthorizeRemoteTxRequests",
            ConfigKey::ClockAlignedDataInterval => "ClockAlignedDataInterval",
            ConfigKey::ConnectionTimeOut => "ConnectionTimeOut",
            ConfigKey::ConnectorPhaseRotation => "ConnectorPhaseRotation",
            ConfigKey::GetConfigurationMaxKeys => "GetConfigurationMaxKeys",
            ConfigKey::HeartbeatInterval => "HeartbeatInterval",
            ConfigKey::LocalAuthorizeOffline => "LocalAuthorizeOffline",
            ConfigKey::LocalPreAuthorize => "LocalPreAuthorize",
            ConfigKey::MeterValuesAlignedData => "MeterValuesAlignedData",
            ConfigKey::MeterValuesSampledData => "MeterValuesSampledData",
            ConfigKey::MeterValueSampleInterval => "MeterValueSampleInterval",
            ConfigKey::NumberOfConnectors => "NumberOfConnectors",
            ConfigKey::ResetRetries => "ResetRetries",
            ConfigKey::StopTransactionOnEVSideDisconnect => "StopTransactionOnEVSideDisconnect",
            ConfigKey::StopTransactionOnInvalidId => "StopTransactionOnInvalidId",
            ConfigKey::StopTxnAlignedData => "StopTxnAlignedData",
            ConfigKey::StopTxnSampledData => "StopTxnSampledData",
            ConfigKey::SupportedFeatureProfiles => "SupportedFeatureProfiles",
            ConfigKey::TransactionMessageAttempts => "TransactionMessageAttempts",
            ConfigKey::TransactionMessageRetryInterval => "TransactionMessageRetryInterval",
            ConfigKey::UnlockConnectorOnEVSideDisconnect => "UnlockConnectorOnEVSideDisconnect",
            ConfigKey::WebSocketPingInterval => "WebSocketPingInterval",
        }
    }

    pub fn from_name(name: &str) -> Option<ConfigKey> {
        ConfigKey::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            ConfigKey::AllowOfflineTxForUnknownId
            | ConfigKey::AuthorizationCacheEnabled
            | ConfigKey::AuthorizeRemoteTxRequests
            | ConfigKey::LocalAuthorizeOffline
            | ConfigKey::LocalPreAuthorize
            | ConfigKey::StopTransactionOnEVSideDisconnect
            | ConfigKey::StopTransactionOnInvalidId
            | ConfigKey::UnlockConnectorOnEVSideDisconnect => KeyType::Bool,

            ConfigKey::ClockAlignedDataInterval
            | ConfigKey::ConnectionTimeOut
            | ConfigKey::GetConfigurationMaxKeys
            | ConfigKey::HeartbeatInterval
            | ConfigKey::MeterValueSampleInterval
            | ConfigKey::NumberOfConnectors
            | ConfigKey::ResetRetries
            | ConfigKey::TransactionMessageAttempts
            | ConfigKey::TransactionMessageRetryInterval
            | ConfigKey::WebSocketPingInterval => KeyType::Int,

            ConfigKey::ConnectorPhaseRotation
            | ConfigKey::MeterValuesAlignedData
            | ConfigKey::MeterValuesSampledData
            | ConfigKey::StopTxnAlignedData
            | ConfigKey::StopTxnSampledData
            | ConfigKey::SupportedFeatureProfiles => KeyType::Csl,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ConfigKey::AuthorizeRemoteTxRequests
                | ConfigKey::GetConfigurationMaxKeys
                | ConfigKey::NumberOfConnectors
                | ConfigKey::SupportedFeatureProfiles
        )
    }

    fn default_value(&self) -> KeyVal {
        match self {
            ConfigKey::AllowOfflineTxForUnknownId => KeyVal::Bool(false),
            ConfigKey::AuthorizationCacheEnabled => KeyVal::Bool(false),
            ConfigKey::AuthorizeRemoteTxRequests => KeyVal::Bool(false),
            ConfigKey::ClockAlignedDataInterval => KeyVal::Int(0),
            ConfigKey::ConnectionTimeOut => KeyVal::Int(60),
            ConfigKey::ConnectorPhaseRotation => KeyVal::Text("NotApplicable".into()),
            ConfigKey::GetConfigurationMaxKeys => {
                KeyVal::Int(ConfigKey::ALL.len() as i32)
            }
            ConfigKey::HeartbeatInterval => KeyVal::Int(300),
            ConfigKey::LocalAuthorizeOffline => KeyVal::Bool(false),
            ConfigKey::LocalPreAuthorize => KeyVal::Bool(false),
            ConfigKey::MeterValuesAlignedData => KeyVal::Text(String::new()),
            ConfigKey::MeterValuesSampledData => {
                KeyVal::Text("Energy.Active.Import.Register".into())
            }
            ConfigKey::MeterValueSampleInterval => KeyVal::Int(30),
            ConfigKey::NumberOfConnectors => KeyVal::Int(1),
            ConfigKey::ResetRetries => KeyVal::Int(1),
            ConfigKey::StopTransactionOnEVSideDisconnect => KeyVal::Bool(true),
            ConfigKey::StopTransactionOnInvalidId => KeyVal::Bool(true),
            ConfigKey::StopTxnAlignedData => KeyVal::Text(String::new()),
            ConfigKey::StopTxnSampledData => {
                KeyVal::Text("Energy.Active.Import.Register".into())
            }
            ConfigKey::SupportedFeatureProfiles => {
                KeyVal::Text("Core,RemoteTrigger".into())
            }
            ConfigKey::TransactionMessageAttempts => KeyVal::Int(3),
            ConfigKey::TransactionMessageRetryInterval => KeyVal::Int(60),
            ConfigKey::UnlockConnectorOnEVSideDisconnect => KeyVal::Bool(true),
            ConfigKey::WebSocketPingInterval => KeyVal::Int(30),
        }
    }
}

/// Thread-safe key/value store with the full key table populated.
pub struct KeyStore {
    values: RwLock<HashMap<ConfigKey, KeyVal>>,
}

impl KeyStore {
    pub fn new() -> Self {
        let values = ConfigKey::ALL
            .iter()
            .map(|k| (*k, k.default_value()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: ConfigKey) -> KeyVal {
        // Every key is seeded at construction; the clone is cheap
        self.values
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.default_value())
    }

    pub fn get_bool(&self, key: ConfigKey) -> bool {
        self.get(key).as_bool().unwrap_or(false)
    }

    pub fn get_int(&self, key: ConfigKey) -> i32 {
        self.get(key).as_int().unwrap_or(0)
    }

    /// Unconditional write, internal use only. The value must already match
    /// the key's type.
    pub fn set(&self, key: ConfigKey, value: KeyVal) {
        self.values.write().insert(key, value);
    }

    /// Wire-path write: enforces read-only keys and parses the string
    /// against the key's type tag.
    pub fn update(&self, key: ConfigKey, value: &str) -> Result<(), OcppError> {
        if key.is_read_only() {
            return Err(OcppError::ReadOnlyKey(key.name()));
        }

        let parsed = match key.key_type() {
            KeyType::Bool => match value {
                "true" | "True" => KeyVal::Bool(true),
                "false" | "False" => KeyVal::Bool(false),
                _ => {
                    return Err(OcppError::InvalidKeyValue {
                        key: key.name(),
                        value: value.to_string(),
                    })
                }
            },
            KeyType::Int => {
                let n: i32 = value.parse().map_err(|_| OcppError::InvalidKeyValue {
                    key: key.name(),
                    value: value.to_string(),
                })?;
                if n < 0 {
                    return Err(OcppError::InvalidKeyValue {
                        key: key.name(),
                        value: value.to_string(),
                    });
                }
                KeyVal::Int(n)
            }
            KeyType::Csl | KeyType::Text => KeyVal::Text(value.to_string()),
        };

        self.values.write().insert(key, parsed);
        Ok(())
    }

    /// Snapshot of one key in GetConfiguration response form.
    pub fn key_value(&self, key: ConfigKey) -> KeyValue {
        KeyValue {
            key: key.name().to_string(),
            readonly: key.is_read_only(),
            value: Some(self.get(key).to_wire()),
        }
    }

    /// All keys in table order, for GetConfiguration with no key list.
    pub fn all_key_values(&self) -> Vec<KeyValue> {
        ConfigKey::ALL.iter().map(|k| self.key_value(*k)).collect()
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_keys() {
        let store = KeyStore::new();
        let all = store.all_key_values();
        assert_eq!(all.len(), ConfigKey::ALL.len());
        assert_eq!(all[0].key, "AllowOfflineTxForUnknownId");
        assert!(all.iter().all(|kv| kv.value.is_some()));
    }

    #[test]
    fn test_name_round_trip() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::from_name(key.name()), Some(key));
        }
        assert_eq!(ConfigKey::from_name("NoSuchKey"), None);
    }

    #[test]
    fn test_update_bool_key() {
        let store = KeyStore::new();
        store
            .update(ConfigKey::LocalAuthorizeOffline, "true")
            .unwrap();
        assert!(store.get_bool(ConfigKey::LocalAuthorizeOffline));

        let err = store.update(ConfigKey::LocalAuthorizeOffline, "maybe");
        assert!(matches!(err, Err(OcppError::InvalidKeyValue { .. })));
    }

    #[test]
    fn test_update_int_key_rejects_garbage() {
        let store = KeyStore::new();
        store
            .update(ConfigKey::MeterValueSampleInterval, "120")
            .unwrap();
        assert_eq!(store.get_int(ConfigKey::MeterValueSampleInterval), 120);

        assert!(store
            .update(ConfigKey::MeterValueSampleInterval, "-5")
            .is_err());
        assert!(store
            .update(ConfigKey::MeterValueSampleInterval, "soon")
            .is_err());
    }

    #[test]
    fn test_read_only_enforced() {
        let store = KeyStore::new();
        let err = store.update(ConfigKey::NumberOfConnectors, "4");
        assert!(matches!(err, Err(OcppError::ReadOnlyKey(_))));
        // Internal setter bypasses the check
        store.set(ConfigKey::NumberOfConnectors, KeyVal::Int(4));
        assert_eq!(store.get_int(ConfigKey::NumberOfConnectors), 4);
    }

    #[test]
    fn test_csl_key_pass_through() {
        let store = KeyStore::new();
        store
            .update(
                ConfigKey::MeterValuesSampledData,
                "Voltage,Current.Import",
            )
            .unwrap();
        assert_eq!(
            store.get(ConfigKey::MeterValuesSampledData).to_wire(),
            "Voltage,Current.Import"
        );
    }
}
