use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::auth::BearerSession;
use crate::error::{BootstrapError, Result};
use crate::openbao::{ApiError, OpenBaoClient};

pub const TLS_ENABLED_FIELD: &str = "tls_enabled";

/// Literal some writers store instead of leaving a field unset.
const NULL_LITERAL: &str = "null";

/// Typed default for an optional field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDefault {
    Text(String),
    Flag(bool),
}

/// Which fields a bundle must carry and what absent optional fields become.
#[derive(Debug, Clone)]
pub struct SecretSchema {
    required: Vec<String>,
    optional: BTreeMap<String, FieldDefault>,
}

impl SecretSchema {
    /// Schema with the given required fields and `tls_enabled` defaulting to false.
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut optional = BTreeMap::new();
        optional.insert(TLS_ENABLED_FIELD.to_string(), FieldDefault::Flag(false));
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional,
        }
    }

    #[must_use]
    pub fn with_default(mut self, field: &str, default: FieldDefault) -> Self {
        self.optional.insert(field.to_string(), default);
        self
    }

    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }
}

/// Credentials and settings for one service identity.
#[derive(Clone)]
pub struct SecretBundle {
    identity: String,
    values: BTreeMap<String, String>,
    version: Option<u64>,
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("identity", &self.identity)
            .field("fields", &self.values.keys().collect::<Vec<_>>())
            .field("version", &self.version)
            .finish()
    }
}

impl SecretBundle {
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Field names and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Whether the bundle asks for TLS. Validated at extraction time.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.get(TLS_ENABLED_FIELD)
            .and_then(parse_flag)
            .unwrap_or(false)
    }
}

/// Parses the boolean spellings accepted in secret bundles.
#[must_use]
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads and validates the bundle for `identity` in one authenticated request.
///
/// # Errors
/// Returns [`BootstrapError::SecretUnavailable`] if the read fails and
/// [`BootstrapError::InvalidSecret`] if any field violates `schema`.
pub async fn fetch(
    client: &OpenBaoClient,
    session: &BearerSession,
    mount: &str,
    identity: &str,
    schema: &SecretSchema,
) -> Result<SecretBundle> {
    let response = client
        .read_kv(session, mount, identity)
        .await
        .map_err(|err| {
            BootstrapError::secret_unavailable(identity, describe_read_error(&err))
        })?;
    let version = response
        .data
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.version);
    let raw = response
        .data
        .data
        .ok_or_else(|| BootstrapError::secret_unavailable(identity, "entry has no data"))?;
    let bundle = extract(identity, raw, version, schema)?;
    info!(
        "Fetched secret bundle {identity} (version={:?}, fields={})",
        bundle.version,
        bundle.values.len()
    );
    Ok(bundle)
}

fn describe_read_error(err: &ApiError) -> String {
    match err.status() {
        Some(StatusCode::NOT_FOUND) => format!("no entry found ({err})"),
        Some(StatusCode::FORBIDDEN) => format!("token lacks read access or has expired ({err})"),
        _ => err.to_string(),
    }
}

/// Normalizes raw KV data against `schema`. Partial bundles are never returned.
///
/// # Errors
/// Returns [`BootstrapError::InvalidSecret`] naming the first offending field.
pub fn extract(
    identity: &str,
    raw: BTreeMap<String, serde_json::Value>,
    version: Option<u64>,
    schema: &SecretSchema,
) -> Result<SecretBundle> {
    let mut values: BTreeMap<String, String> = raw
        .into_iter()
        .filter_map(|(key, value)| normalize(value).map(|value| (key, value)))
        .collect();

    for field in &schema.required {
        if !values.contains_key(field) {
            return Err(BootstrapError::invalid_secret(
                identity,
                field,
                "required field is absent, empty or null",
            ));
        }
    }

    for (field, default) in &schema.optional {
        match (values.get(field), default) {
            (Some(value), FieldDefault::Flag(_)) => {
                if parse_flag(value).is_none() {
                    return Err(BootstrapError::invalid_secret(
                        identity,
                        field,
                        format!("expected a boolean, got {value:?}"),
                    ));
                }
            }
            (Some(_), FieldDefault::Text(_)) => {}
            (None, FieldDefault::Flag(flag)) => {
                debug!("{identity}.{field} absent; defaulting to {flag}");
                values.insert(field.clone(), flag.to_string());
            }
            (None, FieldDefault::Text(text)) => {
                debug!("{identity}.{field} absent; using default");
                values.insert(field.clone(), text.clone());
            }
        }
    }

    Ok(SecretBundle {
        identity: identity.to_string(),
        values,
        version,
    })
}

fn normalize(value: serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(text) => text,
        serde_json::Value::Bool(flag) => flag.to_string(),
        serde_json::Value::Number(number) => number.to_string(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == NULL_LITERAL {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> BTreeMap<String, serde_json::Value> {
        serde_json::from_value(value).expect("object")
    }

    fn schema() -> SecretSchema {
        SecretSchema::new(["user", "password"])
    }

    #[test]
    fn test_extract_defaults_absent_tls_flag() {
        let bundle = extract(
            "postgres",
            raw(json!({ "user": "dev", "password": "pw" })),
            Some(3),
            &schema(),
        )
        .expect("bundle");

        assert!(!bundle.tls_enabled());
        assert_eq!(bundle.get(TLS_ENABLED_FIELD), Some("false"));
        assert_eq!(bundle.version(), Some(3));
    }

    #[test]
    fn test_extract_treats_null_literal_as_absent() {
        let bundle = extract(
            "postgres",
            raw(json!({ "user": "dev", "password": "pw", "tls_enabled": "null" })),
            None,
            &schema(),
        )
        .expect("bundle");
        assert!(!bundle.tls_enabled());
    }

    #[test]
    fn test_extract_stringifies_scalars() {
        let bundle = extract(
            "redis-1",
            raw(json!({ "user": "dev", "password": 1234, "tls_enabled": true })),
            None,
            &schema(),
        )
        .expect("bundle");
        assert_eq!(bundle.get("password"), Some("1234"));
        assert!(bundle.tls_enabled());
    }

    #[test]
    fn test_extract_rejects_required_field_variants() {
        for password in [json!(null), json!(""), json!("null"), json!("  ")] {
            let err = extract(
                "mysql",
                raw(json!({ "user": "dev", "password": password })),
                None,
                &schema(),
            )
            .unwrap_err();
            match err {
                BootstrapError::InvalidSecret {
                    identity, field, ..
                } => {
                    assert_eq!(identity, "mysql");
                    assert_eq!(field, "password");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        let err = extract("mysql", raw(json!({ "user": "dev" })), None, &schema()).unwrap_err();
        assert!(err.to_string().contains("mysql.password"));
    }

    #[test]
    fn test_extract_rejects_unparseable_flag() {
        let err = extract(
            "rabbitmq",
            raw(json!({ "user": "dev", "password": "pw", "tls_enabled": "maybe" })),
            None,
            &schema(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("tls_enabled"));
    }

    #[test]
    fn test_extract_applies_text_default() {
        let schema = schema().with_default("vhost", FieldDefault::Text("/".to_string()));
        let bundle = extract(
            "rabbitmq",
            raw(json!({ "user": "dev", "password": "pw" })),
            None,
            &schema,
        )
        .expect("bundle");
        assert_eq!(bundle.get("vhost"), Some("/"));
    }

    #[test]
    fn test_bundle_debug_hides_values() {
        let bundle = extract(
            "postgres",
            raw(json!({ "user": "dev", "password": "hunter2" })),
            None,
            &schema(),
        )
        .expect("bundle");
        assert!(!format!("{bundle:?}").contains("hunter2"));
    }

    #[test]
    fn test_parse_flag_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("enabled"), None);
    }
}
