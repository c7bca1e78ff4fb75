//! Capability traits for the cluster calls the probe makes.
//!
//! [`crate::InClusterClient`] implements both against the API server;
//! [`crate::fake`] provides in-memory versions.

use std::future::Future;
use std::pin::Pin;

use crate::error::KubeResult;
use crate::types::{PatchOperation, Pod, Secret};

/// Boxed future returned by the capability traits.
pub type KubeFuture<'a, T> = Pin<Box<dyn Future<Output = KubeResult<T>> + Send + 'a>>;

/// Reads a Secret by namespace and name.
pub trait SecretReader: Send + Sync {
    fn read_secret<'a>(&'a self, namespace: &'a str, name: &'a str) -> KubeFuture<'a, Secret>;
}

/// Reads and JSON-patches a single Pod.
pub trait PodPatcher: Send + Sync {
    fn get_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> KubeFuture<'a, Pod>;

    /// Apply `patch` in one request. The API server applies it atomically.
    fn patch_pod<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a [PatchOperation],
    ) -> KubeFuture<'a, Pod>;
}
