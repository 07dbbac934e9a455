//! TLS configuration for the base transport.
//!
//! Native root certificates are loaded once per process. The insecure mode
//! installs a verifier that accepts any server certificate while still checking
//! handshake signatures against the presented key.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::{Arc, OnceLock};

/// Always stores Ok; empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    let certs = result.certs;
    if certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = certs.len(), "loaded native root certificates");
    }
    certs
}

/// Cached native root certificates (may be empty).
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// The globally installed crypto provider, or a fresh aws-lc-rs provider.
///
/// Never installs a process-wide default.
#[must_use]
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build a rustls `ClientConfig` trusting the cached native root certificates.
///
/// # Errors
///
/// Fails when the OS store is empty or none of its certificates parse.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(
            added = added,
            ignored = ignored,
            "some native root certificates could not be parsed"
        );
    }
    if added == 0 {
        return Err(format!(
            "no valid native root CA certificates parsed (found {}, all {} failed to parse)",
            certs.len(),
            ignored
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

/// Build a rustls `ClientConfig` that skips certificate chain and hostname
/// verification.
///
/// # Errors
///
/// Returns the rustls error if the provider supports no safe protocol version.
pub fn insecure_client_config() -> Result<rustls::ClientConfig, rustls::Error> {
    let provider = get_crypto_provider();
    let verifier = Arc::new(AcceptAnyServerCert {
        provider: Arc::clone(&provider),
    });

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(config)
}

/// Accepts every certificate chain and server name.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    /// `LOAD_COUNT` is shared across tests, so this checks "at most one load".
    #[test]
    fn test_native_roots_cached() {
        let initial_count = LOAD_COUNT.load(Ordering::SeqCst);

        let first = native_root_certs();
        let second = native_root_certs();

        let final_count = LOAD_COUNT.load(Ordering::SeqCst);
        assert!(final_count <= initial_count + 1);
        assert!(std::ptr::eq(first, second), "should return same slice");
    }

    #[test]
    fn test_insecure_client_config_builds() {
        let config = insecure_client_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_accept_any_verifier_accepts_unknown_host() {
        let verifier = AcceptAnyServerCert {
            provider: get_crypto_provider(),
        };
        let cert = CertificateDer::from(vec![0u8; 8]);
        let name = ServerName::try_from("nowhere.invalid").unwrap();

        let result = verifier.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());
        assert!(result.is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
