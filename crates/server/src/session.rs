//! In-memory session tokens for the single-operator control plane.

use std::collections::HashSet;
use std::sync::RwLock;

use uuid::Uuid;

pub const SESSION_COOKIE: &str = "trawler_session";

/// Issued session tokens. Sessions do not survive a restart, which is fine
/// for a single operator behind a login form.
#[derive(Default)]
pub struct SessionStore {
    tokens: RwLock<HashSet<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new session token.
    pub fn create(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.write().unwrap().insert(token.clone());
        token
    }

    pub fn validate(&self, token: &str) -> bool {
        self.tokens.read().unwrap().contains(token)
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

/// Extract the session token from a Cookie header value.
pub fn session_token(cookie_header: &str) -> Option<&str> {
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_validate_revoke() {
        let store = SessionStore::new();
        let token = store.create();
        assert!(store.validate(&token));

        store.revoke(&token);
        assert!(!store.validate(&token));
        assert!(!store.validate("unknown"));
    }

    #[test]
    fn test_session_token_extraction() {
        assert_eq!(
            session_token("trawler_session=abc123"),
            Some("abc123")
        );
        assert_eq!(
            session_token("other=x; trawler_session=abc123; theme=dark"),
            Some("abc123")
        );
        assert_eq!(session_token("other=x"), None);
        assert_eq!(session_token(""), None);
    }
}
