//! Per-attempt HTTP client construction.
//!
//! The SSO service ties an in-progress transaction to session cookies, and
//! delivers the authorization code only via a redirect `Location` header.
//! The flow therefore needs a client with a dedicated cookie jar and with
//! redirect following disabled. reqwest clients are immutable once built, so
//! each login attempt owns a private client for its lifetime; callers keep
//! using their own clients (with whatever redirect policy they want) for
//! ordinary API traffic.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::redirect;
use reqwest::Client;

use crate::error::AuthFlowError;

/// User agent expected by the provider's mobile-app-oriented endpoint.
pub const DEFAULT_USER_AGENT: &str = "hackney/1.17.0";

/// Bound on connection establishment, TLS handshake included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on a stalled response; no single read may block longer than this.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client for one login attempt.
///
/// The returned client carries a fresh cookie jar (never shared across
/// attempts), fixed timeouts, the given user agent on every request, and
/// redirect following disabled so 3xx responses are returned intact.
pub fn build_client(user_agent: &str) -> Result<Client, AuthFlowError> {
    let jar = Arc::new(Jar::default());
    Client::builder()
        .user_agent(user_agent)
        .cookie_provider(jar)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|err| AuthFlowError::ClientBuild(err.to_string()))
}
