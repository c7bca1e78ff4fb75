//! Target automation config version, as stored in the cluster Secret.

use serde_json::Value;
use tracing::debug;

use probe_core::HeadlessIdentity;
use probe_kube::{Secret, SecretReader};

use crate::error::{HeadlessError, HeadlessResult};

/// Fetch the Secret named by `identity` and extract its `version`.
pub async fn read_target_version<S>(secrets: &S, identity: &HeadlessIdentity) -> HeadlessResult<i64>
where
    S: SecretReader + ?Sized,
{
    let secret = secrets
        .read_secret(&identity.namespace, &identity.secret_name)
        .await?;
    let version = parse_target_version(&secret, &identity.secret_key)?;
    debug!(
        secret = %identity.secret_name,
        key = %identity.secret_key,
        version,
        "read automation config version"
    );
    Ok(version)
}

/// `version` of the automation config stored under `key` in `secret`.
pub fn parse_target_version(secret: &Secret, key: &str) -> HeadlessResult<i64> {
    let raw = secret
        .data
        .get(key)
        .ok_or_else(|| HeadlessError::MissingDataKey {
            secret: secret.metadata.name.clone(),
            key: key.to_string(),
        })?;
    let config: Value = serde_json::from_slice(raw)?;
    let version = config.get("version").ok_or(HeadlessError::MissingVersion)?;
    coerce_version(version)
}

/// Integers, integral floats and numeric strings all count; the operator
/// has written each of them at some point.
fn coerce_version(value: &Value) -> HeadlessResult<i64> {
    let invalid = || HeadlessError::InvalidVersion(value.to_string());
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(invalid()),
            }
        }
        Value::String(s) => s.trim().parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
