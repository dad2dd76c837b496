//! Where the bearer token comes from.
//!
//! Callers depend on [`SessionProvider`], never on how the token is stored.
//! Signing in is handled elsewhere; this only reads the persisted token and
//! drops it once the backend says it is no longer valid.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ApiConfig;

pub trait SessionProvider: Send + Sync {
    fn token(&self) -> Option<String>;

    /// Called once per 401 response.
    fn on_unauthorized(&self);
}

/// A token handed over explicitly (flag or environment).
pub struct StaticSession {
    token: Option<String>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        Self { token: token.filter(|t| !t.trim().is_empty()) }
    }
}

impl SessionProvider for StaticSession {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn on_unauthorized(&self) {
        log::warn!("The configured token was rejected by the server");
    }
}

/// A token persisted in an `auth_token` file.
pub struct TokenFileSession {
    path: PathBuf,
}

impl TokenFileSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionProvider for TokenFileSession {
    fn token(&self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn on_unauthorized(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::warn!("Session expired; removed stale token at {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Failed to remove stale token {:?}: {}", self.path, e),
        }
    }
}

/// Explicit token first, then the configured token file, then the per-user default.
pub fn session_from_config(config: &ApiConfig) -> Arc<dyn SessionProvider> {
    if let Some(token) = config.token.clone() {
        return Arc::new(StaticSession::new(Some(token)));
    }
    let path = config
        .token_file
        .clone()
        .unwrap_or_else(|| crate::expand_home(crate::USER_TOKEN_FILE));
    Arc::new(TokenFileSession::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_file_read_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth_token");
        std::fs::write(&path, "abc123\n").unwrap();

        let session = TokenFileSession::new(&path);
        assert_eq!(session.token().as_deref(), Some("abc123"));

        session.on_unauthorized();
        assert!(!path.exists());
        assert_eq!(session.token(), None);
        // Second call is a no-op
        session.on_unauthorized();
    }

    #[test]
    fn test_blank_static_token_is_none() {
        assert_eq!(StaticSession::new(Some("  ".into())).token(), None);
        assert_eq!(StaticSession::new(Some("t".into())).token().as_deref(), Some("t"));
    }

    #[test]
    fn test_explicit_token_wins() {
        let config = ApiConfig {
            token: Some("flag-token".into()),
            token_file: Some("/nonexistent/auth_token".into()),
            ..ApiConfig::default()
        };
        assert_eq!(session_from_config(&config).token().as_deref(), Some("flag-token"));
    }
}
