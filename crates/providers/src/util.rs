//! Shared utility functions for provider adapters.

use kory_domain::config::llm::ProviderConfig;
use kory_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the credential for a configured provider.
///
/// Precedence: `api_key`, then `auth_token`, then the environment variable
/// `KORY_{NAME}_API_KEY` (name uppercased, hyphens turned to underscores).
pub fn resolve_api_key(name: &str, cfg: &ProviderConfig) -> Result<String> {
    if let Some(ref key) = cfg.api_key {
        return Ok(key.clone());
    }
    if let Some(ref token) = cfg.auth_token {
        return Ok(token.clone());
    }
    let env_var = format!("KORY_{}_API_KEY", name.to_uppercase().replace('-', "_"));
    std::env::var(&env_var).map_err(|_| {
        Error::Auth(format!(
            "no credentials for provider '{}': set api_key, auth_token, or ${}",
            name, env_var
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_prefers_direct_key() {
        let cfg = ProviderConfig {
            api_key: Some("sk-direct".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key("anthropic", &cfg).unwrap(), "sk-direct");
    }

    #[test]
    fn resolve_api_key_falls_back_to_auth_token() {
        let cfg = ProviderConfig {
            auth_token: Some("tok-1".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key("anthropic", &cfg).unwrap(), "tok-1");
    }

    #[test]
    fn resolve_api_key_falls_back_to_env_var() {
        std::env::set_var("KORY_MYPROV_API_KEY", "env-secret");
        let cfg = ProviderConfig::default();
        assert_eq!(resolve_api_key("myprov", &cfg).unwrap(), "env-secret");
        std::env::remove_var("KORY_MYPROV_API_KEY");
    }

    #[test]
    fn resolve_api_key_errors_when_nothing_configured() {
        let cfg = ProviderConfig::default();
        assert!(resolve_api_key("nope-provider-xyz", &cfg).is_err());
    }
}
