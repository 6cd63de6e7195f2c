//! Login form fetch, hidden-field scrape, and credential submission.

use std::collections::HashMap;

use reqwest::{Client, Response, StatusCode};
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::error::{AuthFlowError, FlowStep};

/// Form fields submitted to the authorization endpoint.
///
/// Holds the server-generated hidden inputs (anti-CSRF tokens, flow
/// metadata) merged with the user's credentials. Repeated names follow
/// standard form serialization: last one wins.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FormValues {
    values: HashMap<String, String>,
}

impl FormValues {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The provider-assigned id correlating all steps of this attempt.
    pub fn transaction_id(&self) -> Option<&str> {
        self.get("transaction_id")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fetch the authorization page, merge its hidden fields with the
/// credentials, and POST the result back to the same URL.
///
/// Returns the raw response (200 means an MFA challenge follows, 302 means
/// the code is already in the redirect) together with the submitted values,
/// from which the caller reads the `transaction_id`.
pub async fn submit_credentials(
    client: &Client,
    auth_url: &str,
    username: &str,
    password: &str,
) -> Result<(Response, FormValues), AuthFlowError> {
    let res = client
        .get(auth_url)
        .send()
        .await
        .map_err(|err| AuthFlowError::transport(FlowStep::Login, err))?;

    if res.status() != StatusCode::OK {
        return Err(AuthFlowError::UnexpectedStatus {
            step: FlowStep::Login,
            status: res.status(),
        });
    }

    let body = res
        .text()
        .await
        .map_err(|err| AuthFlowError::transport(FlowStep::Login, err))?;

    let values = login_form_values(&body, username, password);
    debug!(fields = values.len(), "submitting login form");

    let res = client
        .post(auth_url)
        .form(&values)
        .send()
        .await
        .map_err(|err| AuthFlowError::transport(FlowStep::Login, err))?;

    Ok((res, values))
}

/// Scrape every hidden input from the login page and merge in the
/// credentials. `identity` and `credential` are always present, whatever
/// the server emitted; a page with no hidden fields still produces a
/// submittable form (the provider rejects it with a status the caller
/// surfaces).
fn login_form_values(html: &str, username: &str, password: &str) -> FormValues {
    let mut values = hidden_fields(html);
    values.set("identity", username);
    values.set("credential", password);
    values
}

fn hidden_fields(html: &str) -> FormValues {
    let selector = Selector::parse("input[type=hidden]").expect("static selector");
    let document = Html::parse_document(html);

    let mut values = FormValues::default();
    for input in document.select(&selector) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        let Some(value) = input.value().attr("value") else {
            continue;
        };
        values.set(name, value);
    }
    values
}
