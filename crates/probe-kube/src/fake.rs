//! In-memory [`SecretReader`] and [`PodPatcher`] for tests.
//!
//! `FakePodPatcher` applies patches the way the API server does: an "add"
//! whose parent does not exist is rejected instead of creating it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::api::{KubeFuture, PodPatcher, SecretReader};
use crate::error::{KubeError, KubeResult};
use crate::types::{PatchOp, PatchOperation, Pod, Secret};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
pub struct FakeSecretReader {
    secrets: HashMap<Key, Secret>,
    reads: Mutex<u32>,
}

impl FakeSecretReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        let k = key(&secret.metadata.namespace, &secret.metadata.name);
        self.secrets.insert(k, secret);
        self
    }

    /// Secret holding `{"version": <version>}` under `data_key`; enough of an
    /// automation config for the version check.
    pub fn with_automation_config(
        self,
        namespace: &str,
        name: &str,
        data_key: &str,
        version: i64,
    ) -> Self {
        let body = format!(r#"{{"version": {version}}}"#);
        self.with_secret(Secret::new(namespace, name).with_data(data_key, body))
    }

    pub fn reads(&self) -> u32 {
        *self.reads.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SecretReader for FakeSecretReader {
    fn read_secret<'a>(&'a self, namespace: &'a str, name: &'a str) -> KubeFuture<'a, Secret> {
        Box::pin(async move {
            *self.reads.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            self.secrets
                .get(&key(namespace, name))
                .cloned()
                .ok_or_else(|| KubeError::NotFound(format!("secret {namespace}/{name}")))
        })
    }
}

#[derive(Debug, Default)]
pub struct FakePodPatcher {
    pods: Mutex<HashMap<Key, Pod>>,
    patches: Mutex<Vec<Vec<PatchOperation>>>,
    patch_error: Option<(u16, String)>,
}

impl FakePodPatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        let k = key(&pod.metadata.namespace, &pod.metadata.name);
        self.pods
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(k, pod);
        self
    }

    /// Make every patch fail with an API error.
    pub fn failing_patches(mut self, status: u16, message: &str) -> Self {
        self.patch_error = Some((status, message.to_string()));
        self
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key(namespace, name))
            .cloned()
    }

    /// Every patch received, in order, including rejected ones.
    pub fn patches(&self) -> Vec<Vec<PatchOperation>> {
        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn patch(&self, namespace: &str, name: &str, ops: &[PatchOperation]) -> KubeResult<Pod> {
        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ops.to_vec());

        if let Some((status, message)) = &self.patch_error {
            return Err(KubeError::Api {
                status: *status,
                reason: "InternalError".to_string(),
                message: message.clone(),
            });
        }

        let mut pods = self.pods.lock().unwrap_or_else(|e| e.into_inner());
        let pod = pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| KubeError::NotFound(format!("pod {namespace}/{name}")))?;

        // All-or-nothing, like the API server.
        let mut doc = serde_json::to_value(&*pod)?;
        apply_patch(&mut doc, ops)?;
        *pod = serde_json::from_value(doc)?;
        Ok(pod.clone())
    }
}

impl PodPatcher for FakePodPatcher {
    fn get_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> KubeFuture<'a, Pod> {
        Box::pin(async move {
            self.pod(namespace, name)
                .ok_or_else(|| KubeError::NotFound(format!("pod {namespace}/{name}")))
        })
    }

    fn patch_pod<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a [PatchOperation],
    ) -> KubeFuture<'a, Pod> {
        Box::pin(async move { self.patch(namespace, name, patch) })
    }
}

/// Apply RFC 6902 operations to `doc` (objects only; arrays are not needed
/// for Pod metadata).
pub fn apply_patch(doc: &mut Value, ops: &[PatchOperation]) -> KubeResult<()> {
    for op in ops {
        let tokens = parse_pointer(&op.path)?;
        let Some((last, parents)) = tokens.split_last() else {
            return Err(KubeError::Patch("cannot patch the document root".to_string()));
        };

        let mut target = &mut *doc;
        for token in parents {
            target = target
                .get_mut(token.as_str())
                .ok_or_else(|| KubeError::Patch(format!("{}: missing parent {token}", op.path)))?;
        }
        let object = target
            .as_object_mut()
            .ok_or_else(|| KubeError::Patch(format!("{}: parent is not an object", op.path)))?;

        match op.op {
            PatchOp::Add => {
                let value = op.value.clone().unwrap_or(Value::Null);
                object.insert(last.clone(), value);
            }
            PatchOp::Replace => {
                if !object.contains_key(last) {
                    return Err(KubeError::Patch(format!("{}: no such key", op.path)));
                }
                object.insert(last.clone(), op.value.clone().unwrap_or(Value::Null));
            }
            PatchOp::Remove => {
                object
                    .remove(last)
                    .ok_or_else(|| KubeError::Patch(format!("{}: no such key", op.path)))?;
            }
        }
    }
    Ok(())
}

fn parse_pointer(path: &str) -> KubeResult<Vec<String>> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| KubeError::Patch(format!("{path}: pointer must start with '/'")))?;
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}
