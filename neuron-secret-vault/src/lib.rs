#![deny(missing_docs)]
//! Stub secret resolver for HashiCorp Vault KV.
//!
//! This crate provides the correct trait impl shape for a Vault secret resolver.
//! The actual Vault SDK integration is not implemented — all resolve calls return
//! `SecretError::BackendError`.

use async_trait::async_trait;
use layer0::secret::SecretSource;
use neuron_auth::AuthProvider;
use neuron_secret::{SecretError, SecretLease, SecretResolver};
use std::sync::Arc;

/// Stub resolver for HashiCorp Vault KV.
pub struct VaultResolver {
    _addr: String,
    _auth: Arc<dyn AuthProvider>,
}

impl VaultResolver {
    /// Create a new Vault resolver (stub).
    pub fn new(addr: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            _addr: addr.into(),
            _auth: auth,
        }
    }
}

#[async_trait]
impl SecretResolver for VaultResolver {
    async fn resolve(&self, source: &SecretSource) -> Result<SecretLease, SecretError> {
        match source {
            SecretSource::Vault { mount, path } => Err(SecretError::BackendError(format!(
                "VaultResolver is a stub — would resolve {mount}/{path}"
            ))),
            _ => Err(SecretError::NoResolver("vault".into())),
        }
    }
}
