use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// The protocol step an error was produced by.
///
/// Every HTTP-facing failure carries the step that issued the request, so
/// callers can tell "failed while listing devices" from "failed while
/// committing" without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Login,
    ListDevices,
    Verify,
    Commit,
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "login",
            Self::ListDevices => "list devices",
            Self::Verify => "verify",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Errors produced by the login flow.
///
/// Nothing here is retried internally; retry policy, if any, belongs to the
/// caller and applies to the whole [`perform_login`](crate::flow::LoginFlow::perform_login)
/// call.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("{step}: transport error: {source}")]
    Transport {
        step: FlowStep,
        #[source]
        source: reqwest::Error,
    },

    #[error("{step}: unexpected status code {status}")]
    UnexpectedStatus { step: FlowStep, status: StatusCode },

    #[error("{step}: decode error: {message}")]
    Decode { step: FlowStep, message: String },

    #[error("no MFA devices enrolled for this account")]
    NoDevices,

    #[error("passcode not approved")]
    NotApproved,

    #[error("device selection cancelled: {0}")]
    SelectionCancelled(String),

    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("{step}: redirect location missing or unparsable: {message}")]
    InvalidRedirect { step: FlowStep, message: String },

    #[error("{step}: redirect carried no authorization code")]
    MissingAuthCode { step: FlowStep },

    #[error("login flow cancelled")]
    Cancelled,

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl AuthFlowError {
    pub(crate) fn transport(step: FlowStep, source: reqwest::Error) -> Self {
        Self::Transport { step, source }
    }

    pub(crate) fn decode(step: FlowStep, err: impl fmt::Display) -> Self {
        Self::Decode {
            step,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_redirect(step: FlowStep, err: impl fmt::Display) -> Self {
        Self::InvalidRedirect {
            step,
            message: err.to_string(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AuthFlowError>;
