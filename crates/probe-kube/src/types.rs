//! The slices of Kubernetes objects the probe reads and writes.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.as_ref()?.get(key).map(String::as_str)
    }
}

/// A Secret. `data` values are decoded from base64 on read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, with = "base64_values")]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// A Pod. Only metadata is typed; everything else is kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl Pod {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            rest: serde_json::Map::new(),
        }
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Zero annotations, whether the map is absent or empty.
    pub fn has_no_annotations(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .is_none_or(BTreeMap::is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// One RFC 6902 JSON-patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }
}

/// Escape one JSON-pointer reference token (RFC 6901): `~` → `~0`, `/` → `~1`.
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

mod base64_values {
    use super::*;

    pub fn serialize<S>(data: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<&String, String> =
            data.iter().map(|(k, v)| (k, STANDARD.encode(v))).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<BTreeMap<String, String>>::deserialize(deserializer)?;
        encoded
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(v.as_bytes())
                    .map(|bytes| (k.clone(), bytes))
                    .map_err(|e| serde::de::Error::custom(format!("secret key {k}: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_slash_and_tilde() {
        assert_eq!(
            escape_pointer_token("agent.mongodb.com/version"),
            "agent.mongodb.com~1version"
        );
        assert_eq!(escape_pointer_token("a~b/c"), "a~0b~1c");
    }

    #[test]
    fn secret_data_is_base64_decoded() {
        let secret: Secret = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "appdb-config", "namespace": "test"},
            "data": {"cluster-config.json": "eyJ2ZXJzaW9uIjogMTF9"},
            "type": "Opaque"
        }))
        .unwrap();
        assert_eq!(secret.metadata.name, "appdb-config");
        assert_eq!(
            secret.data.get("cluster-config.json").unwrap(),
            br#"{"version": 11}"#
        );
    }

    #[test]
    fn secret_without_data() {
        let secret: Secret =
            serde_json::from_value(json!({"metadata": {"name": "s"}, "data": null})).unwrap();
        assert!(secret.data.is_empty());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = serde_json::from_value::<Secret>(json!({"data": {"k": "!!!"}})).unwrap_err();
        assert!(err.to_string().contains("secret key k"));
    }

    #[test]
    fn pod_keeps_unknown_fields() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "appdb-0", "namespace": "test", "resourceVersion": "42"},
            "spec": {"containers": []},
            "status": {"phase": "Running"}
        }))
        .unwrap();
        assert!(pod.has_no_annotations());
        assert_eq!(pod.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(pod.rest["status"]["phase"], "Running");
    }

    #[test]
    fn empty_annotation_map_counts_as_none() {
        let pod: Pod =
            serde_json::from_value(json!({"metadata": {"name": "p", "annotations": {}}})).unwrap();
        assert!(pod.has_no_annotations());
        assert!(!Pod::new("ns", "p").with_annotation("a", "b").has_no_annotations());
    }

    #[test]
    fn patch_operation_wire_format() {
        let op = PatchOperation::add("/metadata/annotations", json!({}));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "add", "path": "/metadata/annotations", "value": {}})
        );
    }
}
