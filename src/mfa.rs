//! MFA factor listing, passcode verification, and the device-selection seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{AuthFlowError, FlowStep};

/// One enrolled MFA factor, as reported by the provider.
///
/// The set of devices is fetched once per transaction and handed to the
/// selection callback unmodified.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub dispatch_required: bool,
    pub id: String,
    pub name: String,
    pub factor_type: String,
    pub factor_provider: String,
    pub security_level: i64,
    pub activated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Error returned by a [`SelectDevice`] implementation to abort the flow.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SelectError(String);

impl SelectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Capability supplied by the caller: given a non-empty device list, pick
/// one device and produce its passcode, or fail to abort the flow.
///
/// Interactive callers typically prompt the user here; the flow imposes no
/// bound on how long that takes, beyond the cancellation token passed to
/// [`perform_login`](crate::flow::LoginFlow::perform_login).
#[async_trait]
pub trait SelectDevice: Send + Sync {
    async fn select(&self, devices: &[Device]) -> Result<(Device, String), SelectError>;
}

/// Non-interactive selectors can be plain closures.
#[async_trait]
impl<F> SelectDevice for F
where
    F: Fn(&[Device]) -> Result<(Device, String), SelectError> + Send + Sync,
{
    async fn select(&self, devices: &[Device]) -> Result<(Device, String), SelectError> {
        self(devices)
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    data: Vec<Device>,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    transaction_id: &'a str,
    factor_id: &'a str,
    passcode: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyEnvelope {
    data: VerifyOutcome,
}

#[derive(Debug, Deserialize)]
struct VerifyOutcome {
    approved: bool,
}

/// Fetch the factors enrolled for an in-progress transaction.
///
/// An empty list is not an error at this layer; the orchestrator treats a
/// zero-device login as unrecoverable.
pub async fn list_devices(
    client: &Client,
    factors_url: &str,
    transaction_id: &str,
) -> Result<Vec<Device>, AuthFlowError> {
    let res = client
        .get(factors_url)
        .query(&[("transaction_id", transaction_id)])
        .send()
        .await
        .map_err(|err| AuthFlowError::transport(FlowStep::ListDevices, err))?;

    if res.status() != StatusCode::OK {
        return Err(AuthFlowError::UnexpectedStatus {
            step: FlowStep::ListDevices,
            status: res.status(),
        });
    }

    let payload: DeviceList = res
        .json()
        .await
        .map_err(|err| AuthFlowError::decode(FlowStep::ListDevices, err))?;

    debug!(devices = payload.data.len(), "fetched enrolled factors");
    Ok(payload.data)
}

/// Submit a passcode for the chosen factor and read the synchronous
/// approval result. A wrong passcode surfaces immediately as
/// [`AuthFlowError::NotApproved`]; re-prompting is the caller's business.
pub async fn verify(
    client: &Client,
    verify_url: &str,
    transaction_id: &str,
    factor_id: &str,
    passcode: &str,
) -> Result<(), AuthFlowError> {
    let res = client
        .post(verify_url)
        .json(&VerifyRequest {
            transaction_id,
            factor_id,
            passcode,
        })
        .send()
        .await
        .map_err(|err| AuthFlowError::transport(FlowStep::Verify, err))?;

    let payload: VerifyEnvelope = res
        .json()
        .await
        .map_err(|err| AuthFlowError::decode(FlowStep::Verify, err))?;

    if !payload.data.approved {
        return Err(AuthFlowError::NotApproved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_deserializes_from_provider_wire_format() {
        let json = r#"{
            "dispatchRequired": false,
            "id": "f-1",
            "name": "Pixel",
            "factorType": "token:software",
            "factorProvider": "GOOGLE",
            "securityLevel": 1,
            "activatedAt": "2021-03-01T12:00:00Z",
            "updatedAt": "2021-04-01T08:30:00Z"
        }"#;

        let device: Device = serde_json::from_str(json).expect("decode device");
        assert_eq!(device.id, "f-1");
        assert_eq!(device.name, "Pixel");
        assert_eq!(device.factor_type, "token:software");
        assert_eq!(device.factor_provider, "GOOGLE");
        assert_eq!(device.security_level, 1);
        assert!(!device.dispatch_required);
        assert_eq!(device.activated_at.timestamp(), 1_614_600_000);
    }

    #[test]
    fn device_list_envelope_decodes() {
        let json = r#"{"data": []}"#;
        let list: DeviceList = serde_json::from_str(json).expect("decode envelope");
        assert!(list.data.is_empty());
    }

    #[test]
    fn verify_envelope_decodes_approval() {
        let approved: VerifyEnvelope =
            serde_json::from_str(r#"{"data":{"approved":true}}"#).expect("decode");
        assert!(approved.data.approved);

        let denied: VerifyEnvelope =
            serde_json::from_str(r#"{"data":{"approved":false}}"#).expect("decode");
        assert!(!denied.data.approved);
    }

    #[test]
    fn verify_request_serializes_expected_fields() {
        let body = serde_json::to_value(VerifyRequest {
            transaction_id: "tx-1",
            factor_id: "f-1",
            passcode: "123456",
        })
        .expect("serialize");

        assert_eq!(
            body,
            serde_json::json!({
                "transaction_id": "tx-1",
                "factor_id": "f-1",
                "passcode": "123456"
            })
        );
    }
}
