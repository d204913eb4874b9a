//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (`auth.token_secret_env`). The
//! daemon calls [`resolve_secrets`] once at startup and passes the result
//! into constructors; `std::env::var` is not scattered elsewhere.
//!
//! Error messages mention the variable NAME, never its value, and `Debug`
//! output redacts every secret.

use anyhow::{bail, Result};

use crate::settings::GophermartConfig;

/// Minimum accepted length for the token signing secret.
pub const MIN_TOKEN_SECRET_LEN: usize = 16;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// HMAC key for bearer tokens.
    pub token_secret: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("token_secret", &"<REDACTED>")
            .finish()
    }
}

/// Resolve all secrets named by `cfg` from the process environment.
pub fn resolve_secrets(cfg: &GophermartConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, |name| std::env::var(name).ok())
}

/// [`resolve_secrets`] with an injectable lookup (tests).
pub fn resolve_secrets_with<F>(cfg: &GophermartConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let var = cfg.auth.token_secret_env.trim();
    if var.is_empty() {
        bail!("SECRETS_MISSING: auth.token_secret_env is empty");
    }
    let token_secret = match lookup(var) {
        Some(v) if !v.trim().is_empty() => v,
        _ => bail!(
            "SECRETS_MISSING: required env var '{}' (token signing secret) is not set or empty",
            var
        ),
    };
    if token_secret.len() < MIN_TOKEN_SECRET_LEN {
        bail!(
            "SECRETS_WEAK: env var '{}' must hold at least {} bytes",
            var,
            MIN_TOKEN_SECRET_LEN
        );
    }
    Ok(ResolvedSecrets { token_secret })
}
