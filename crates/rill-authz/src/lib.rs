//! Authorization core for the rill broker: OAuth bearer sessions, a
//! per-principal grants cache, and resource matching for policy rules.
//!
//! # How it fits
//! Authentication validates a bearer token and wraps it in a
//! [`TokenPayload`]; the [`PrincipalFactory`] attaches it to the session
//! [`Principal`]. On each authorization check the authorizer asks the
//! [`GrantsCache`] for the principal's grants document and matches the
//! granted resources against the request with [`ResourceSpec`]. The cache
//! keeps upstream traffic small: one in-flight fetch per principal, periodic
//! background refresh for active sessions, and garbage collection of entries
//! whose sessions are gone.
//!
//! # Key invariants
//! - An entry's `expires_at` never decreases; a newer token replaces the
//!   stored one, ties keep the current token.
//! - At most one upstream fetch is in flight per principal at any time.
//! - Absent or failed grants always deny: a 403 from the authorization
//!   server is stored as the empty deny-all grants document, and fetch
//!   failures surface as errors the authorizer treats as deny.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use rill_authz::{
//!     AuthzContext, GrantsCache, GrantsCacheConfig, HttpGrantsProvider, Sessions, TokenPayload,
//! };
//!
//! # async fn authorize() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = Arc::new(Sessions::new());
//! let provider = Arc::new(HttpGrantsProvider::new(
//!     "https://sso.example.com/realms/broker/protocol/openid-connect/token",
//!     "rill-broker",
//! ));
//! let cache = GrantsCache::new(
//!     GrantsCacheConfig::default(),
//!     provider,
//!     AuthzContext::new(sessions),
//! )?;
//!
//! let token = TokenPayload::new("raw-token", "alice", 1_700_000_000_000);
//! let info = cache.info_for(&token);
//! let grants = match info.grants() {
//!     Some(grants) => grants,
//!     None => cache.fetch_or_wait("alice", &info).await?,
//! };
//! # let _ = grants;
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod errors;
mod grants;
mod http;
mod principal;
mod resource;
mod sessions;
mod singleflight;
mod token;

pub use clock::{Clock, SystemClock};
pub use config::GrantsCacheConfig;
pub use errors::{ConfigError, FetchError, GrantsError, ResourceSpecError};
pub use grants::{GrantsCache, GrantsInfo};
pub use http::{GrantsProvider, HttpGrantsProvider};
pub use principal::{
    ANONYMOUS_NAME, AuthenticationContext, DefaultPrincipalFactory, OAUTHBEARER_MECHANISM,
    Principal, PrincipalFactory, USER_TYPE,
};
pub use resource::{ResourceSpec, ResourceType};
pub use sessions::{AuthzContext, SessionRegistry, Sessions};
pub use singleflight::{Completion, Flight, SingleFlight, Waiter};
pub use token::{FileBasedTokenProvider, StaticTokenProvider, TokenPayload, TokenProvider, mask};
