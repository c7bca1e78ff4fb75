//! probe-kube — the probe's two touch points with the Kubernetes API.
//!
//! # Components
//!
//! - **`api`** — [`SecretReader`] and [`PodPatcher`] capability traits
//! - **`annotation`** — JSON-patch "add" of a Pod annotation
//! - **`client`** — in-cluster HTTPS client (hyper + rustls)
//! - **`fake`** — in-memory implementations for tests
//!
//! Nothing here retries. A failed call is returned verbatim and the next
//! probe tick tries again.

pub mod annotation;
pub mod api;
pub mod client;
pub mod error;
pub mod fake;
pub mod tls;
pub mod types;

pub use annotation::{AGENT_VERSION_ANNOTATION, AnnotationPatcher, annotation_patch};
pub use api::{KubeFuture, PodPatcher, SecretReader};
pub use client::InClusterClient;
pub use error::{KubeError, KubeResult};
pub use types::{ObjectMeta, PatchOp, PatchOperation, Pod, Secret, escape_pointer_token};
