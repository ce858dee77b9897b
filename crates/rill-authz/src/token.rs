use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use serde_json::Value;

/// The envelope the broker threads through one authenticated session.
///
/// Created during authentication and held by the broker for as long as the
/// session lives; the `Arc<TokenPayload>` handle is the session identity.
/// The payload slot lets the host pin per-session computed data (for example
/// the last grants document seen for the session) without keeping a separate
/// session table.
pub struct TokenPayload {
    raw: String,
    principal_name: String,
    lifetime_ms: i64,
    claims: Option<Value>,
    payload: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl TokenPayload {
    pub fn new(
        raw: impl Into<String>,
        principal_name: impl Into<String>,
        lifetime_ms: i64,
    ) -> Self {
        Self {
            raw: raw.into(),
            principal_name: principal_name.into(),
            lifetime_ms,
            claims: None,
            payload: RwLock::new(None),
        }
    }

    pub fn with_claims(
        raw: impl Into<String>,
        principal_name: impl Into<String>,
        lifetime_ms: i64,
        claims: Value,
    ) -> Self {
        Self {
            claims: Some(claims),
            ..Self::new(raw, principal_name, lifetime_ms)
        }
    }

    /// The raw token string, opaque to the core.
    pub fn value(&self) -> &str {
        &self.raw
    }

    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    /// Absolute expiry instant in epoch milliseconds.
    pub fn lifetime_ms(&self) -> i64 {
        self.lifetime_ms
    }

    /// Parsed JWT claims, when the validator provided them.
    pub fn claims(&self) -> Option<&Value> {
        self.claims.as_ref()
    }

    pub fn payload(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.payload.read().expect("payload lock").clone()
    }

    pub fn set_payload(&self, payload: Arc<dyn Any + Send + Sync>) {
        *self.payload.write().expect("payload lock") = Some(payload);
    }
}

impl fmt::Debug for TokenPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPayload")
            .field("token", &mask(&self.raw))
            .field("principal_name", &self.principal_name)
            .field("lifetime_ms", &self.lifetime_ms)
            .finish_non_exhaustive()
    }
}

/// Mask a token for logging, keeping the first and last four characters.
pub fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "**".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}**{tail}")
}

/// Source of the access token the host uses to authenticate to the grants
/// endpoint.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> anyhow::Result<String>;
}

/// Returns a single token passed at creation time.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> anyhow::Result<String> {
        Ok(self.token.clone())
    }
}

/// Reads the token from a file on each call, picking up rotations.
#[derive(Debug)]
pub struct FileBasedTokenProvider {
    path: PathBuf,
}

impl FileBasedTokenProvider {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            anyhow::bail!("'{}' does not point to a file", path.display());
        }
        Ok(Self { path })
    }
}

impl TokenProvider for FileBasedTokenProvider {
    fn token(&self) -> anyhow::Result<String> {
        let token = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read token from '{}'", self.path.display()))?;
        Ok(token.trim_end_matches(['\r', '\n']).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_payload_accessors() {
        let claims = json!({"sub": "alice", "iss": "https://sso/"});
        let token = TokenPayload::with_claims("raw-token-abc123", "alice", 1_700_000_000_000, claims);
        assert_eq!(token.value(), "raw-token-abc123");
        assert_eq!(token.principal_name(), "alice");
        assert_eq!(token.lifetime_ms(), 1_700_000_000_000);
        assert_eq!(token.claims().and_then(|c| c["sub"].as_str()), Some("alice"));
    }

    #[test]
    fn payload_slot_holds_typed_data() {
        let token = TokenPayload::new("raw", "alice", 0);
        assert!(token.payload().is_none());

        token.set_payload(Arc::new("cached".to_string()));
        let payload = token.payload().expect("payload");
        let text = payload.downcast_ref::<String>().expect("downcast");
        assert_eq!(text, "cached");

        // The slot is single-writer; a later write replaces the value.
        token.set_payload(Arc::new(42u64));
        let payload = token.payload().expect("payload");
        assert_eq!(payload.downcast_ref::<u64>(), Some(&42));
    }

    #[test]
    fn session_identity_is_the_handle() {
        let a = Arc::new(TokenPayload::new("same-token", "alice", 0));
        let b = Arc::new(TokenPayload::new("same-token", "alice", 0));
        assert!(Arc::ptr_eq(&a, &a.clone()));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn mask_hides_the_middle() {
        assert_eq!(mask("BEARER-TOKEN-9823eh982u"), "BEAR**982u");
        assert_eq!(mask("short"), "**");
        assert_eq!(mask(""), "**");
    }

    #[test]
    fn debug_output_masks_the_token() {
        let token = TokenPayload::new("BEARER-TOKEN-9823eh982u", "alice", 0);
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("9823eh"));
        assert!(rendered.contains("BEAR**982u"));
    }

    #[test]
    fn static_token_provider_returns_the_token() {
        let provider = StaticTokenProvider::new("t1");
        assert_eq!(provider.token().expect("token"), "t1");
    }

    #[test]
    fn file_token_provider_reads_and_trims() {
        let path = std::env::temp_dir().join("rill-authz-token-test");
        std::fs::write(&path, "file-token\n").expect("write");
        let provider = FileBasedTokenProvider::new(&path).expect("provider");
        assert_eq!(provider.token().expect("token"), "file-token");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn file_token_provider_rejects_missing_file() {
        let err = FileBasedTokenProvider::new("/definitely/not/here").expect_err("missing");
        assert!(err.to_string().contains("does not point to a file"));
    }
}
