//! PKCE verifier/challenge and anti-CSRF state generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthFlowError;

/// Raw byte length of the anti-CSRF state (12 base64url chars).
const STATE_LEN: usize = 9;

/// Raw byte length of the PKCE verifier. Encodes to 116 chars, inside the
/// 43–128 range RFC 7636 requires.
const VERIFIER_LEN: usize = 87;

/// Generate an anti-CSRF state value: base64url of 9 random bytes.
///
/// Panics if the OS entropy source fails. Proceeding with weaker randomness
/// would silently undermine the CSRF protection, so an unreadable entropy
/// source aborts the process.
pub fn new_state() -> String {
    let mut buf = [0u8; STATE_LEN];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// A PKCE verifier/challenge pair, generated once per login attempt.
///
/// The `verifier` stays with the caller for the later token exchange; the
/// `challenge` is embedded in the authorization URL.
///
/// # Example
/// ```
/// use valet::pkce::Pkce;
///
/// let pkce = Pkce::generate()?;
/// assert!(pkce.verifier.len() >= 43 && pkce.verifier.len() <= 128);
/// # Ok::<(), valet::AuthFlowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// Generate a fresh verifier and its S256 challenge.
    ///
    /// The challenge is base64url(SHA-256(verifier)), hashing the encoded
    /// verifier string as RFC 7636 specifies.
    pub fn generate() -> Result<Self, AuthFlowError> {
        let mut buf = [0u8; VERIFIER_LEN];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|err| AuthFlowError::Entropy(err.to_string()))?;
        let verifier = URL_SAFE_NO_PAD.encode(buf);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Ok(Self { verifier, challenge })
    }
}

/// Default authorization endpoint of the vehicle SSO service.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://auth.tesla.com/oauth2/v3/authorize";

const DEFAULT_CLIENT_ID: &str = "ownerapi";
const DEFAULT_REDIRECT_URI: &str = "https://auth.tesla.com/void/callback";
const DEFAULT_SCOPES: &str = "openid email offline_access";

/// Builder for the authorization URL the login flow drives.
///
/// Composes the OAuth2 query string from the client configuration plus the
/// per-attempt `state` and PKCE `challenge`.
///
/// # Example
/// ```
/// use valet::pkce::{new_state, AuthorizeUrl, Pkce};
///
/// let pkce = Pkce::generate()?;
/// let url = AuthorizeUrl::default().build(&new_state(), &pkce.challenge);
/// assert!(url.contains("code_challenge_method=S256"));
/// # Ok::<(), valet::AuthFlowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizeUrl {
    base: String,
    client_id: String,
    redirect_uri: String,
    scopes: String,
}

impl Default for AuthorizeUrl {
    fn default() -> Self {
        Self {
            base: DEFAULT_AUTHORIZE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
        }
    }
}

impl AuthorizeUrl {
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = scopes.into();
        self
    }

    /// Build the full authorization URL for one login attempt.
    pub fn build(&self, state: &str, challenge: &str) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.scopes.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ];
        build_url_with_params(&self.base, &params)
    }
}

fn build_url_with_params(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    url.push('?');
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            url.push('&');
        }
        url.push_str(&urlencoded(key));
        url.push('=');
        url.push_str(&urlencoded(value));
    }
    url
}

fn urlencoded(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::HashSet;

    use reqwest::Url;

    use super::*;

    #[test]
    fn state_is_twelve_base64url_chars() {
        let state = new_state();
        assert_eq!(state.len(), 12);
        let decoded = URL_SAFE_NO_PAD.decode(&state).expect("valid base64url");
        assert_eq!(decoded.len(), STATE_LEN);
    }

    #[test]
    fn state_does_not_collide_across_many_samples() {
        let samples: HashSet<String> = (0..10_000).map(|_| new_state()).collect();
        assert_eq!(samples.len(), 10_000);
    }

    #[test]
    fn verifier_decodes_to_exactly_87_bytes() {
        let pkce = Pkce::generate().expect("generate");
        let decoded = URL_SAFE_NO_PAD.decode(&pkce.verifier).expect("valid base64url");
        assert_eq!(decoded.len(), VERIFIER_LEN);
        assert!(pkce.verifier.len() >= 43 && pkce.verifier.len() <= 128);
    }

    #[test]
    fn challenge_is_sha256_of_verifier() {
        let pkce = Pkce::generate().expect("generate");
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn pairs_are_unique_per_attempt() {
        let a = Pkce::generate().expect("generate a");
        let b = Pkce::generate().expect("generate b");
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
    }

    #[test]
    fn authorize_url_carries_all_oauth_params() {
        let url = AuthorizeUrl::default()
            .with_base("https://sso.example/authorize")
            .build("my-state", "my-challenge");

        let parsed = Url::parse(&url).expect("valid URL");
        let params: HashMap<_, _> = parsed.query_pairs().collect();
        assert_eq!(params.get("response_type").map(|v| v.as_ref()), Some("code"));
        assert_eq!(params.get("state").map(|v| v.as_ref()), Some("my-state"));
        assert_eq!(params.get("code_challenge").map(|v| v.as_ref()), Some("my-challenge"));
        assert_eq!(
            params.get("code_challenge_method").map(|v| v.as_ref()),
            Some("S256")
        );
        assert_eq!(params.get("client_id").map(|v| v.as_ref()), Some("ownerapi"));
        assert!(params.contains_key("redirect_uri"));
        assert!(params.contains_key("scope"));
    }

    #[test]
    fn authorize_url_percent_encodes_values() {
        let url = AuthorizeUrl::default()
            .with_base("https://sso.example/authorize")
            .with_scopes("openid email offline_access")
            .build("s", "c");
        assert!(url.contains("scope=openid%20email%20offline_access"));
    }
}
