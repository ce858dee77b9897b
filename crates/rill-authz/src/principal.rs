use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::token::TokenPayload;

/// Principal type assigned to authenticated users.
pub const USER_TYPE: &str = "User";

/// Principal name assigned to unauthenticated connections.
pub const ANONYMOUS_NAME: &str = "ANONYMOUS";

/// SASL mechanism name for OAuth bearer authentication.
pub const OAUTHBEARER_MECHANISM: &str = "OAUTHBEARER";

/// The identity the broker uses for authorization decisions.
///
/// Equality and hashing cover only `(principal_type, name)`: a principal
/// carrying its session token is interchangeable with a plain one of the same
/// name for map-key and set-member purposes.
#[derive(Debug, Clone)]
pub struct Principal {
    principal_type: String,
    name: String,
    token: Option<Arc<TokenPayload>>,
}

impl Principal {
    pub fn new(principal_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            principal_type: principal_type.into(),
            name: name.into(),
            token: None,
        }
    }

    pub fn with_token(
        principal_type: impl Into<String>,
        name: impl Into<String>,
        token: Arc<TokenPayload>,
    ) -> Self {
        Self {
            token: Some(token),
            ..Self::new(principal_type, name)
        }
    }

    pub fn principal_type(&self) -> &str {
        &self.principal_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session token captured at authentication, when this principal was
    /// built from an OAuth session.
    pub fn token(&self) -> Option<&Arc<TokenPayload>> {
        self.token.as_ref()
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.principal_type == other.principal_type && self.name == other.name
    }
}

impl Eq for Principal {}

impl Hash for Principal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.principal_type.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.principal_type, self.name)
    }
}

/// Authentication outcome the broker hands to the principal factory.
#[derive(Debug, Clone)]
pub enum AuthenticationContext {
    Sasl {
        mechanism: String,
        authorization_id: String,
        token: Option<Arc<TokenPayload>>,
    },
    Tls {
        peer_principal: String,
    },
    Anonymous,
}

/// Builds the broker principal for an authenticated connection.
///
/// Supplied by the host; the default implementation covers the common
/// mechanisms and attaches the session token for OAuth sessions so the
/// authorizer can reach the grants cache.
pub trait PrincipalFactory: Send + Sync {
    fn build(&self, context: &AuthenticationContext) -> Principal;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPrincipalFactory;

impl PrincipalFactory for DefaultPrincipalFactory {
    fn build(&self, context: &AuthenticationContext) -> Principal {
        match context {
            AuthenticationContext::Sasl {
                mechanism,
                authorization_id,
                token: Some(token),
            } if mechanism == OAUTHBEARER_MECHANISM => {
                Principal::with_token(USER_TYPE, authorization_id, token.clone())
            }
            AuthenticationContext::Sasl {
                authorization_id, ..
            } => Principal::new(USER_TYPE, authorization_id),
            AuthenticationContext::Tls { peer_principal } => {
                Principal::new(USER_TYPE, peer_principal)
            }
            AuthenticationContext::Anonymous => Principal::new(USER_TYPE, ANONYMOUS_NAME),
        }
    }
}
