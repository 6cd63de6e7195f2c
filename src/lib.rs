//! Valet — automated interactive SSO login for vehicle APIs.
//!
//! Drives a browser-like login against an OAuth2 authorization endpoint
//! that guards codes behind a web MFA challenge: fetches the HTML login
//! form, carries its anti-forgery fields and session cookies through the
//! whole exchange, branches on whether MFA is required, runs the
//! device-selection/passcode protocol, and intercepts the final redirect
//! to pull the authorization code out of its `Location` header.
//!
//! The crate ends where the authorization code begins: token exchange,
//! token storage, and the vehicle API itself are the caller's business.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use valet::mfa::{Device, SelectError};
//! use valet::pkce::{new_state, AuthorizeUrl, Pkce};
//! use valet::LoginFlow;
//!
//! # async fn example() -> Result<(), valet::AuthFlowError> {
//! let pkce = Pkce::generate()?;
//! let auth_url = AuthorizeUrl::default().build(&new_state(), &pkce.challenge);
//!
//! let select = |devices: &[Device]| -> Result<(Device, String), SelectError> {
//!     Ok((devices[0].clone(), "123456".to_string()))
//! };
//!
//! let code = LoginFlow::new(auth_url, Arc::new(select))
//!     .perform_login(&CancellationToken::new(), "user@example.com", "hunter2")
//!     .await?;
//! // exchange `code` with pkce.verifier for tokens (out of scope here)
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod flow;
pub mod form;
pub mod mfa;
pub mod pkce;
pub mod session;

pub use error::{AuthFlowError, FlowStep};
pub use flow::LoginFlow;
pub use form::FormValues;
pub use mfa::{Device, SelectDevice, SelectError};
pub use pkce::{new_state, AuthorizeUrl, Pkce};
