//! TLS client configuration for the API server.
//!
//! The API server certificate is signed by the cluster CA mounted into
//! every Pod with its service account, not by a public root.

use std::sync::Arc;

use rustls::RootCertStore;

use crate::error::{KubeError, KubeResult};

/// Build a client config trusting only the certificates in `ca_pem`.
pub fn client_config(ca_pem: &[u8]) -> KubeResult<Arc<rustls::ClientConfig>> {
    let mut roots = RootCertStore::empty();
    let mut reader = ca_pem;
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| KubeError::Tls(format!("invalid CA bundle: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| KubeError::Tls(format!("invalid CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(KubeError::Tls("no certificates in CA bundle".to_string()));
    }

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| KubeError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_ca_pem() -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec!["kubernetes.default.svc".to_string()])
            .unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn accepts_cluster_ca() {
        assert!(client_config(cluster_ca_pem().as_bytes()).is_ok());
    }

    #[test]
    fn accepts_concatenated_bundle() {
        let bundle = format!("{}{}", cluster_ca_pem(), cluster_ca_pem());
        assert!(client_config(bundle.as_bytes()).is_ok());
    }

    #[test]
    fn rejects_empty_bundle() {
        let err = client_config(b"not a certificate").unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }
}
