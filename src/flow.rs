//! The end-to-end login flow: credential submission, MFA challenge,
//! transaction commit, and authorization-code extraction.

use std::future::Future;
use std::sync::Arc;

use reqwest::header::LOCATION;
use reqwest::{Client, Response, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AuthFlowError, FlowStep};
use crate::form::{self, FormValues};
use crate::mfa::{self, SelectDevice};
use crate::session;

/// Default per-transaction factors endpoint.
pub const DEFAULT_FACTORS_URL: &str = "https://auth.tesla.com/oauth2/v3/authorize/mfa/factors";

/// Default passcode verification endpoint.
pub const DEFAULT_VERIFY_URL: &str = "https://auth.tesla.com/oauth2/v3/authorize/mfa/verify";

/// Outcome of the initial credential submission.
///
/// The provider answers 302 when the account has no MFA enrolled (the code
/// is already in the redirect) and 200 when a challenge must be driven.
/// Every other status is outside the protocol.
enum LoginOutcome {
    Authorized { code: String },
    MfaRequired { transaction_id: String },
}

/// Drives one interactive SSO login against the authorization endpoint.
///
/// Holds only configuration; each [`perform_login`](Self::perform_login)
/// call builds its own HTTP client with a fresh cookie jar, so independent
/// attempts never share session state and may run concurrently.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use valet::mfa::{Device, SelectError};
/// use valet::pkce::{new_state, AuthorizeUrl, Pkce};
/// use valet::LoginFlow;
///
/// # async fn example() -> Result<(), valet::AuthFlowError> {
/// let pkce = Pkce::generate()?;
/// let auth_url = AuthorizeUrl::default().build(&new_state(), &pkce.challenge);
///
/// let select = |devices: &[Device]| -> Result<(Device, String), SelectError> {
///     Ok((devices[0].clone(), "123456".to_string()))
/// };
/// let flow = LoginFlow::new(auth_url, Arc::new(select));
///
/// let cancel = CancellationToken::new();
/// let code = flow
///     .perform_login(&cancel, "user@example.com", "hunter2")
///     .await?;
/// // hand `code` (and pkce.verifier) to the token exchange
/// # Ok(())
/// # }
/// ```
pub struct LoginFlow {
    auth_url: String,
    factors_url: String,
    verify_url: String,
    user_agent: String,
    selector: Arc<dyn SelectDevice>,
}

impl LoginFlow {
    /// Create a flow against the given (fully parameterized) authorization
    /// URL, with the given device-selection callback.
    pub fn new(auth_url: impl Into<String>, selector: Arc<dyn SelectDevice>) -> Self {
        Self {
            auth_url: auth_url.into(),
            factors_url: DEFAULT_FACTORS_URL.to_string(),
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            user_agent: session::DEFAULT_USER_AGENT.to_string(),
            selector,
        }
    }

    pub fn with_factors_url(mut self, url: impl Into<String>) -> Self {
        self.factors_url = url.into();
        self
    }

    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Run the whole login flow and return the authorization code.
    ///
    /// Strictly sequential: credentials first, then (if the provider asks)
    /// device listing, selection, passcode verification, and commit. Every
    /// network call and the selection callback race `cancel`; cancellation
    /// aborts with [`AuthFlowError::Cancelled`] and no further requests are
    /// issued.
    pub async fn perform_login(
        &self,
        cancel: &CancellationToken,
        username: &str,
        password: &str,
    ) -> Result<String, AuthFlowError> {
        let client = session::build_client(&self.user_agent)?;

        debug!(url = %self.auth_url, "submitting credentials");
        let (res, values) = with_cancel(
            cancel,
            form::submit_credentials(&client, &self.auth_url, username, password),
        )
        .await?;

        let transaction_id = match classify_login(&res, &values)? {
            LoginOutcome::Authorized { code } => {
                debug!("authorization code issued without MFA challenge");
                return Ok(code);
            }
            LoginOutcome::MfaRequired { transaction_id } => transaction_id,
        };

        debug!(transaction_id = %transaction_id, "MFA challenge required");
        let devices = with_cancel(
            cancel,
            mfa::list_devices(&client, &self.factors_url, &transaction_id),
        )
        .await?;

        if devices.is_empty() {
            return Err(AuthFlowError::NoDevices);
        }

        let (device, passcode) = with_cancel(cancel, async {
            self.selector
                .select(&devices)
                .await
                .map_err(|err| AuthFlowError::SelectionCancelled(err.to_string()))
        })
        .await?;

        debug!(factor_id = %device.id, "verifying passcode");
        with_cancel(
            cancel,
            mfa::verify(
                &client,
                &self.verify_url,
                &transaction_id,
                &device.id,
                &passcode,
            ),
        )
        .await?;

        with_cancel(cancel, commit(&client, &self.auth_url, &transaction_id)).await
    }
}

/// Finalize the authenticated transaction and extract the code from the
/// resulting redirect. The commit carries the transaction id and nothing
/// else; the session cookie does the rest.
async fn commit(
    client: &Client,
    auth_url: &str,
    transaction_id: &str,
) -> Result<String, AuthFlowError> {
    debug!(transaction_id = %transaction_id, "committing transaction");
    let res = client
        .post(auth_url)
        .form(&[("transaction_id", transaction_id)])
        .send()
        .await
        .map_err(|err| AuthFlowError::transport(FlowStep::Commit, err))?;

    if res.status() != StatusCode::FOUND {
        return Err(AuthFlowError::UnexpectedStatus {
            step: FlowStep::Commit,
            status: res.status(),
        });
    }
    code_from_redirect(&res, FlowStep::Commit)
}

fn classify_login(res: &Response, values: &FormValues) -> Result<LoginOutcome, AuthFlowError> {
    match res.status() {
        StatusCode::FOUND => Ok(LoginOutcome::Authorized {
            code: code_from_redirect(res, FlowStep::Login)?,
        }),
        StatusCode::OK => {
            let transaction_id = values.transaction_id().ok_or_else(|| {
                AuthFlowError::decode(FlowStep::Login, "login form had no transaction_id field")
            })?;
            Ok(LoginOutcome::MfaRequired {
                transaction_id: transaction_id.to_string(),
            })
        }
        status => Err(AuthFlowError::UnexpectedStatus {
            step: FlowStep::Login,
            status,
        }),
    }
}

fn code_from_redirect(res: &Response, step: FlowStep) -> Result<String, AuthFlowError> {
    let location = res
        .headers()
        .get(LOCATION)
        .ok_or_else(|| AuthFlowError::invalid_redirect(step, "missing Location header"))?
        .to_str()
        .map_err(|err| AuthFlowError::invalid_redirect(step, err))?;
    code_from_location(res.url(), location, step)
}

/// Resolve `location` the way a browser would (it may be relative to the
/// request URL) and pull the `code` query parameter out of the target.
fn code_from_location(
    request_url: &Url,
    location: &str,
    step: FlowStep,
) -> Result<String, AuthFlowError> {
    let target = request_url
        .join(location)
        .map_err(|err| AuthFlowError::invalid_redirect(step, err))?;
    target
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .ok_or(AuthFlowError::MissingAuthCode { step })
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, AuthFlowError>>,
) -> Result<T, AuthFlowError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthFlowError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://sso.example/oauth2/v3/authorize").expect("valid URL")
    }

    #[test]
    fn code_is_extracted_from_absolute_location() {
        let code = code_from_location(
            &base_url(),
            "https://x/callback?code=XYZ123&state=s",
            FlowStep::Commit,
        )
        .expect("code");
        assert_eq!(code, "XYZ123");
    }

    #[test]
    fn relative_location_resolves_against_request_url() {
        let code =
            code_from_location(&base_url(), "/void/callback?code=OK1", FlowStep::Commit)
                .expect("code");
        assert_eq!(code, "OK1");
    }

    #[test]
    fn location_without_code_is_an_error() {
        let err = code_from_location(
            &base_url(),
            "https://x/callback?state=only",
            FlowStep::Commit,
        )
        .expect_err("should fail");
        assert!(matches!(
            err,
            AuthFlowError::MissingAuthCode {
                step: FlowStep::Commit
            }
        ));
    }

    #[test]
    fn unparsable_location_is_an_error() {
        let err = code_from_location(&base_url(), "https://[not-a-url", FlowStep::Login)
            .expect_err("should fail");
        assert!(matches!(err, AuthFlowError::InvalidRedirect { .. }));
    }

    #[tokio::test]
    async fn with_cancel_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = with_cancel(&cancel, async { Ok(1) }).await;
        assert!(matches!(result, Err(AuthFlowError::Cancelled)));
    }

    #[tokio::test]
    async fn with_cancel_passes_results_through() {
        let cancel = CancellationToken::new();
        let result = with_cancel(&cancel, async { Ok::<_, AuthFlowError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
