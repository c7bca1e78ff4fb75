//! Publishing a value as a Pod annotation with JSON-patch "add".

use serde_json::Value;
use tracing::debug;

use crate::api::PodPatcher;
use crate::error::KubeResult;
use crate::types::{PatchOperation, Pod, escape_pointer_token};

/// Annotation read by the operator to learn which automation config
/// version the agent in this Pod has reached.
pub const AGENT_VERSION_ANNOTATION: &str = "agent.mongodb.com/version";

const ANNOTATIONS_PATH: &str = "/metadata/annotations";

/// Operations setting `key` to `value` on `pod`.
///
/// "add" under a missing parent is rejected by the API server, so a Pod
/// without annotations gets an extra operation creating the empty map first.
pub fn annotation_patch(pod: &Pod, key: &str, value: &str) -> Vec<PatchOperation> {
    let mut ops = Vec::with_capacity(2);
    if pod.has_no_annotations() {
        ops.push(PatchOperation::add(
            ANNOTATIONS_PATH,
            Value::Object(serde_json::Map::new()),
        ));
    }
    ops.push(PatchOperation::add(
        format!("{ANNOTATIONS_PATH}/{}", escape_pointer_token(key)),
        Value::String(value.to_string()),
    ));
    ops
}

/// Patches the annotations of one named Pod.
pub struct AnnotationPatcher<'a, P: ?Sized> {
    pods: &'a P,
    namespace: &'a str,
    pod_name: &'a str,
}

impl<'a, P: PodPatcher + ?Sized> AnnotationPatcher<'a, P> {
    pub fn new(pods: &'a P, namespace: &'a str, pod_name: &'a str) -> Self {
        Self {
            pods,
            namespace,
            pod_name,
        }
    }

    /// Apply `ops` in a single request and return the updated Pod.
    pub async fn apply(&self, ops: &[PatchOperation]) -> KubeResult<Pod> {
        self.pods.patch_pod(self.namespace, self.pod_name, ops).await
    }

    /// Set annotation `key` to `value`, last write wins.
    pub async fn set(&self, key: &str, value: &str) -> KubeResult<Pod> {
        let pod = self.pods.get_pod(self.namespace, self.pod_name).await?;
        let ops = annotation_patch(&pod, key, value);
        let updated = self.apply(&ops).await?;
        debug!(
            pod = self.pod_name,
            namespace = self.namespace,
            %key,
            %value,
            ops = ops.len(),
            "updated pod annotation"
        );
        Ok(updated)
    }
}
