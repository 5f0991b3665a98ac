//! The TRAILS configuration envelope and its delivery sources.
//!
//! A process is bootstrapped by a small immutable record — the envelope —
//! delivered as base64-encoded UTF-8 JSON, conventionally through the
//! `TRAILS_INFO` environment variable. The envelope supplies the client's
//! identity (`appId`, optional `parentId`), the relay endpoint, and policy
//! fields. It is decoded once at startup and never mutated.
//!
//! Wire keys are lowerCamelCase (`appId`, `serverEp`, ...); internal field
//! names differ but round-trip losslessly through that exact JSON shape.
//!
//! Rather than hiding an environment lookup inside the client, delivery is an
//! explicit [`ConfigSource`] injected at construction — the environment, a
//! named variable, or an already-built [`TrailsConfig`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::error::TrailsError;

/// The environment variable conventionally carrying the encoded envelope.
pub const TRAILS_INFO_VAR: &str = "TRAILS_INFO";

/// Decoded TRAILS configuration envelope.
///
/// Immutable after construction; produced once at process start and consumed
/// by the connection manager for registration. `app_id` is assigned once per
/// process instance and never mutated. `parent_id` links to the originating
/// process; ownership is unidirectional (the parent may outlive or terminate
/// before the child).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrailsConfig {
    /// Envelope schema version. Wire key is `v`.
    #[serde(rename = "v", default = "default_version")]
    pub version: i32,

    /// Unique identifier of this process instance.
    pub app_id: Uuid,

    /// Identifier of the originating process, if any.
    #[serde(default)]
    pub parent_id: Option<Uuid>,

    /// Human-readable application name, shown by the relay.
    #[validate(length(max = 255, message = "app name must not exceed 255 characters"))]
    pub app_name: String,

    /// Relay endpoint as configured; normalized before dialing
    /// (see [`crate::endpoint::normalize_ws_url`]).
    #[validate(length(min = 1, message = "server endpoint must not be empty"))]
    pub server_ep: String,

    /// Relay's public key, when the operator pins one.
    #[serde(default)]
    pub server_pub_key: Option<String>,

    /// Security level negotiated with the relay.
    #[serde(default = "default_sec_level")]
    pub sec_level: String,

    /// When this process was scheduled, in epoch milliseconds.
    #[serde(default)]
    pub scheduled_at: Option<i64>,

    /// Seconds the relay allows between scheduling and first registration.
    #[serde(default = "default_start_deadline")]
    pub start_deadline: Option<i64>,

    /// Who caused this process to exist.
    #[serde(default)]
    pub originator: Option<Originator>,

    /// Role references granted to this process.
    #[serde(default)]
    pub role_refs: Vec<String>,

    /// Free-form tags attached by the scheduler.
    #[serde(default)]
    pub tags: Option<JsonValue>,
}

fn default_version() -> i32 {
    1
}

fn default_sec_level() -> String {
    "open".into()
}

fn default_start_deadline() -> Option<i64> {
    Some(300)
}

/// Identity of the principal that originated the process tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Originator {
    pub sub: Option<String>,
    pub groups: Option<Vec<String>>,
}

impl TrailsConfig {
    /// Decodes a base64 envelope string and validates the result.
    pub fn decode(encoded: &str) -> Result<Self, TrailsError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| TrailsError::Envelope(format!("base64: {e}")))?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| TrailsError::Envelope(format!("json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Encodes this envelope as a base64 string suitable for `TRAILS_INFO`.
    pub fn encode(&self) -> Result<String, TrailsError> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }

    /// Derives the envelope for a subordinate process.
    ///
    /// The child gets a fresh identifier, `parent_id` pointing at this
    /// config's identity, a fresh `scheduled_at`, and inherits the endpoint,
    /// security level, deadline, originator, and role references. Tags are
    /// not inherited.
    pub fn child(&self, name: &str) -> TrailsConfig {
        TrailsConfig {
            version: self.version,
            app_id: Uuid::new_v4(),
            parent_id: Some(self.app_id),
            app_name: name.into(),
            server_ep: self.server_ep.clone(),
            server_pub_key: self.server_pub_key.clone(),
            sec_level: self.sec_level.clone(),
            scheduled_at: Some(chrono::Utc::now().timestamp_millis()),
            start_deadline: self.start_deadline,
            originator: self.originator.clone(),
            role_refs: self.role_refs.clone(),
            tags: None,
        }
    }
}

/// Where the client reads its envelope from.
///
/// Injected at construction instead of a hidden process-global lookup, so
/// alternative delivery mechanisms stay testable.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// The conventional `TRAILS_INFO` environment variable.
    Env,
    /// A differently-named environment variable.
    Var(String),
    /// An envelope built or received by other means.
    Explicit(TrailsConfig),
}

impl ConfigSource {
    /// Loads and validates the envelope.
    ///
    /// `Ok(None)` means the source is simply absent (no variable set); an
    /// error means the source exists but is malformed. The facade treats
    /// both as "run as a no-op client" — they differ only in log level.
    pub fn load(&self) -> Result<Option<TrailsConfig>, TrailsError> {
        match self {
            ConfigSource::Env => Self::from_var(TRAILS_INFO_VAR),
            ConfigSource::Var(name) => Self::from_var(name),
            ConfigSource::Explicit(config) => {
                config.validate()?;
                Ok(Some(config.clone()))
            }
        }
    }

    fn from_var(name: &str) -> Result<Option<TrailsConfig>, TrailsError> {
        match std::env::var(name) {
            Ok(raw) if !raw.trim().is_empty() => TrailsConfig::decode(&raw).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> TrailsConfig {
        TrailsConfig {
            version: 1,
            app_id: Uuid::new_v4(),
            parent_id: Some(Uuid::new_v4()),
            app_name: "worker-7".into(),
            server_ep: "https://trails.svc:8443".into(),
            server_pub_key: Some("ed25519:AAAA".into()),
            sec_level: "strict".into(),
            scheduled_at: Some(1_740_000_000_000),
            start_deadline: Some(120),
            originator: Some(Originator {
                sub: Some("alice@example.com".into()),
                groups: Some(vec!["ops".into(), "ml".into()]),
            }),
            role_refs: vec!["reader".into(), "writer".into()],
            tags: Some(serde_json::json!({"tier": "gold"})),
        }
    }

    fn minimal_config() -> TrailsConfig {
        TrailsConfig {
            version: 1,
            app_id: Uuid::new_v4(),
            parent_id: None,
            app_name: "solo".into(),
            server_ep: "ws://localhost:8443/ws".into(),
            server_pub_key: None,
            sec_level: "open".into(),
            scheduled_at: None,
            start_deadline: None,
            originator: None,
            role_refs: vec![],
            tags: None,
        }
    }

    #[test]
    fn test_round_trip_full_envelope() {
        let config = full_config();
        let decoded = TrailsConfig::decode(&config.encode().unwrap()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_round_trip_minimal_envelope() {
        let config = minimal_config();
        let decoded = TrailsConfig::decode(&config.encode().unwrap()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let value = serde_json::to_value(full_config()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "v",
            "appId",
            "parentId",
            "appName",
            "serverEp",
            "serverPubKey",
            "secLevel",
            "scheduledAt",
            "startDeadline",
            "originator",
            "roleRefs",
            "tags",
        ] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
        assert_eq!(obj.len(), 12);
    }

    #[test]
    fn test_absent_start_deadline_defaults() {
        let json = format!(
            r#"{{"appId":"{}","appName":"a","serverEp":"ws://h:1/ws"}}"#,
            Uuid::new_v4()
        );
        let encoded = BASE64.encode(json.as_bytes());
        let config = TrailsConfig::decode(&encoded).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.sec_level, "open");
        assert_eq!(config.start_deadline, Some(300));
        assert!(config.role_refs.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(TrailsConfig::decode("%%%not-base64%%%").is_err());
        let not_json = BASE64.encode(b"hello there");
        assert!(TrailsConfig::decode(&not_json).is_err());
    }

    #[test]
    fn test_decode_rejects_empty_endpoint() {
        let json = format!(r#"{{"appId":"{}","appName":"a","serverEp":""}}"#, Uuid::new_v4());
        let encoded = BASE64.encode(json.as_bytes());
        assert!(matches!(
            TrailsConfig::decode(&encoded),
            Err(TrailsError::Validation(_))
        ));
    }

    #[test]
    fn test_child_inherits_and_refreshes() {
        let parent = full_config();
        let child = parent.child("child-task");

        assert_eq!(child.parent_id, Some(parent.app_id));
        assert_ne!(child.app_id, parent.app_id);
        assert_eq!(child.app_name, "child-task");
        assert_eq!(child.server_ep, parent.server_ep);
        assert_eq!(child.sec_level, parent.sec_level);
        assert_eq!(child.role_refs, parent.role_refs);
        assert_eq!(child.start_deadline, parent.start_deadline);
        assert_eq!(child.originator, parent.originator);
        assert!(child.scheduled_at.is_some());
        assert_eq!(child.tags, None);
    }

    #[test]
    fn test_source_absent_var_is_none() {
        let source = ConfigSource::Var("TRAILS_TEST_UNSET_VAR".into());
        assert!(source.load().unwrap().is_none());
    }

    #[test]
    fn test_source_malformed_var_is_error() {
        std::env::set_var("TRAILS_TEST_MALFORMED_VAR", "definitely not an envelope");
        let source = ConfigSource::Var("TRAILS_TEST_MALFORMED_VAR".into());
        assert!(source.load().is_err());
        std::env::remove_var("TRAILS_TEST_MALFORMED_VAR");
    }

    #[test]
    fn test_source_explicit() {
        let config = minimal_config();
        let source = ConfigSource::Explicit(config.clone());
        assert_eq!(source.load().unwrap(), Some(config));
    }

    #[test]
    fn test_source_round_trip_through_var() {
        let config = full_config();
        std::env::set_var("TRAILS_TEST_RT_VAR", config.encode().unwrap());
        let source = ConfigSource::Var("TRAILS_TEST_RT_VAR".into());
        assert_eq!(source.load().unwrap(), Some(config));
        std::env::remove_var("TRAILS_TEST_RT_VAR");
    }
}
