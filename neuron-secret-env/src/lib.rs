#![deny(missing_docs)]
//! Secret resolver that reads from process environment variables.
//!
//! Uses `SecretSource::Custom { provider: "env", config: { "var_name": "..." } }`.

use async_trait::async_trait;
use layer0::secret::SecretSource;
use neuron_secret::{SecretError, SecretLease, SecretResolver, SecretValue};

/// Resolves secrets from process environment variables.
///
/// Uses `SecretSource::Custom { provider: "env", config: { "var_name": "..." } }`.
///
/// Config schema:
/// ```json
/// { "type": "custom", "provider": "env", "config": { "var_name": "ANTHROPIC_API_KEY" } }
/// ```
///
/// Required config field: `var_name` (string) — the environment variable name to read.
pub struct EnvResolver;

#[async_trait]
impl SecretResolver for EnvResolver {
    async fn resolve(&self, source: &SecretSource) -> Result<SecretLease, SecretError> {
        match source {
            SecretSource::Custom { provider, config } if provider == "env" => {
                let var_name =
                    config
                        .get("var_name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            SecretError::NotFound("env source requires config.var_name".into())
                        })?;
                match std::env::var(var_name) {
                    Ok(val) => Ok(SecretLease::permanent(SecretValue::new(val.into_bytes()))),
                    Err(_) => Err(SecretError::NotFound(format!("env var {var_name} not set"))),
                }
            }
            _ => Err(SecretError::NoResolver("env".into())),
        }
    }
}
