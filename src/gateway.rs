//! Client for the Midtrans payment gateway.
//!
//! Every venue collects tips on its own merchant account, so each call
//! carries the venue's credentials instead of a global api key.

use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::crypto::{decrypt_secret, sha512_hex};
use crate::env;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{GatewayEnvironment, MerchantCredentials, TipStatus};

/// Decrypted merchant credentials, only kept for the duration of a request.
#[derive(Clone)]
pub struct GatewayCredentials {
    pub server_key: String,
    pub environment: GatewayEnvironment,
}

impl GatewayCredentials {
    pub fn from_merchant(credentials: &MerchantCredentials) -> ServiceResult<Self> {
        Ok(Self {
            server_key: decrypt_secret(&credentials.server_key_encrypted)?,
            environment: credentials.environment,
        })
    }

    fn authorization(&self) -> String {
        let token = general_purpose::STANDARD.encode(format!("{}:", self.server_key));
        format!("Basic {token}")
    }

    fn app_url(&self) -> &str {
        match self.environment {
            GatewayEnvironment::Sandbox => env::MIDTRANS_SANDBOX_APP_URL.as_str(),
            GatewayEnvironment::Production => env::MIDTRANS_PRODUCTION_APP_URL.as_str(),
        }
    }

    fn api_url(&self) -> &str {
        match self.environment {
            GatewayEnvironment::Sandbox => env::MIDTRANS_SANDBOX_API_URL.as_str(),
            GatewayEnvironment::Production => env::MIDTRANS_PRODUCTION_API_URL.as_str(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ItemDetails {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Callbacks {
    pub finish: String,
    pub error: String,
    pub pending: String,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct SnapRequest {
    pub transaction_details: TransactionDetails,
    pub item_details: Vec<ItemDetails>,
    pub callbacks: Callbacks,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct SnapResponse {
    pub token: String,
    pub redirect_url: String,
}

/// Subset of the gateway's transaction status response.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct TransactionStatus {
    pub transaction_status: String,
    pub payment_type: Option<String>,
}

/// Asynchronous payment notification as posted by the gateway.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct Notification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    pub payment_type: Option<String>,
}

impl Notification {
    /// Signature is `sha512(order_id + status_code + gross_amount + server_key)`.
    pub fn verify_signature(&self, server_key: &str) -> bool {
        let expected = sha512_hex(&format!(
            "{}{}{}{}",
            self.order_id, self.status_code, self.gross_amount, server_key
        ));
        expected.eq_ignore_ascii_case(&self.signature_key)
    }
}

/// Map the gateway's status vocabulary onto tip status.
///
/// `None` means the tip status stays unchanged.
pub fn map_transaction_status(transaction_status: &str) -> Option<TipStatus> {
    match transaction_status {
        "capture" | "settlement" => Some(TipStatus::Paid),
        "deny" | "cancel" | "expire" | "failure" => Some(TipStatus::Failed),
        _ => None,
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted payment page for the given order.
    async fn create_transaction(
        &self,
        credentials: &GatewayCredentials,
        request: &SnapRequest,
    ) -> ServiceResult<SnapResponse>;

    async fn transaction_status(
        &self,
        credentials: &GatewayCredentials,
        order_id: &str,
    ) -> ServiceResult<TransactionStatus>;
}

#[derive(Clone, Default)]
pub struct MidtransGateway {
    client: reqwest::Client,
}

impl MidtransGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_transaction(
        &self,
        credentials: &GatewayCredentials,
        request: &SnapRequest,
    ) -> ServiceResult<SnapResponse> {
        let url = format!("{}/snap/v1/transactions", credentials.app_url());

        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, credentials.authorization())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Snap transaction for order {} failed with {}: {}",
                request.transaction_details.order_id, status, body
            );
            return Err(ServiceError::InternalServerError(format!(
                "Snap transaction failed with status {status}"
            )));
        }

        let snap = response.json::<SnapResponse>().await?;
        info!(
            "Opened snap transaction for order {}",
            request.transaction_details.order_id
        );
        Ok(snap)
    }

    async fn transaction_status(
        &self,
        credentials: &GatewayCredentials,
        order_id: &str,
    ) -> ServiceResult<TransactionStatus> {
        let url = format!("{}/v2/{}/status", credentials.api_url(), order_id);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, credentials.authorization())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<TransactionStatus>().await?)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// In memory gateway that records requests and answers with fixed values.
    #[derive(Default)]
    pub struct StaticGateway {
        pub fail: bool,
        pub status: Option<String>,
        pub requests: Mutex<Vec<SnapRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for StaticGateway {
        async fn create_transaction(
            &self,
            _credentials: &GatewayCredentials,
            request: &SnapRequest,
        ) -> ServiceResult<SnapResponse> {
            if self.fail {
                return Err(ServiceError::InternalServerError(
                    "Snap transaction failed with status 500".to_string(),
                ));
            }

            self.requests.lock().unwrap().push(request.clone());
            Ok(SnapResponse {
                token: format!("token-{}", request.transaction_details.order_id),
                redirect_url: format!(
                    "https://app.sandbox.midtrans.com/snap/v2/vtweb/{}",
                    request.transaction_details.order_id
                ),
            })
        }

        async fn transaction_status(
            &self,
            _credentials: &GatewayCredentials,
            _order_id: &str,
        ) -> ServiceResult<TransactionStatus> {
            Ok(TransactionStatus {
                transaction_status: self.status.clone().unwrap_or_else(|| "pending".to_owned()),
                payment_type: Some("qris".to_owned()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_transaction_status("capture"), Some(TipStatus::Paid));
        assert_eq!(map_transaction_status("settlement"), Some(TipStatus::Paid));
        assert_eq!(map_transaction_status("deny"), Some(TipStatus::Failed));
        assert_eq!(map_transaction_status("cancel"), Some(TipStatus::Failed));
        assert_eq!(map_transaction_status("expire"), Some(TipStatus::Failed));
        assert_eq!(map_transaction_status("pending"), None);
        assert_eq!(map_transaction_status("refund"), None);
    }

    #[test]
    fn test_notification_signature() {
        let server_key = "SB-Mid-server-test";
        let mut notification = Notification {
            order_id: "TIP-1-100".to_owned(),
            status_code: "200".to_owned(),
            gross_amount: "50000.00".to_owned(),
            signature_key: String::new(),
            transaction_status: "settlement".to_owned(),
            payment_type: None,
        };
        notification.signature_key = sha512_hex(&format!("TIP-1-100200{}{}", "50000.00", server_key));

        assert!(notification.verify_signature(server_key));
        assert!(!notification.verify_signature("SB-Mid-server-other"));

        notification.gross_amount = "1.00".to_owned();
        assert!(!notification.verify_signature(server_key));
    }
}
