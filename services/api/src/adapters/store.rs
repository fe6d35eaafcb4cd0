//! services/api/src/adapters/store.rs
//!
//! Receipt verification against the App Store `verifyReceipt` endpoint.
//! It implements the `StoreVerifier` port from the `core` crate.

use async_trait::async_trait;
use bubble_words_core::domain::{ProductId, PurchaseReceipt, VerifiedTransaction};
use bubble_words_core::ports::{PortError, PurchaseError, StoreVerifier};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
const SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// A sandbox receipt was sent to the production endpoint.
const STATUS_SANDBOX_RECEIPT: i64 = 21007;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
struct VerifyReceiptRequest<'a> {
    #[serde(rename = "receipt-data")]
    receipt_data: &'a str,
    password: &'a str,
    #[serde(rename = "exclude-old-transactions")]
    exclude_old_transactions: bool,
}

#[derive(Debug, Deserialize)]
struct VerifyReceiptResponse {
    status: i64,
    receipt: Option<AppReceipt>,
    #[serde(default)]
    latest_receipt_info: Vec<InAppTransaction>,
}

#[derive(Debug, Deserialize)]
struct AppReceipt {
    bundle_id: String,
    #[serde(default)]
    in_app: Vec<InAppTransaction>,
}

#[derive(Debug, Deserialize)]
struct InAppTransaction {
    product_id: String,
    transaction_id: String,
    original_transaction_id: String,
    cancellation_date_ms: Option<String>,
}

/// Decides what a decoded store response says about one transaction.
fn verdict(
    response: VerifyReceiptResponse,
    bundle_id: &str,
    transaction_id: &str,
) -> Result<VerifiedTransaction, PurchaseError> {
    match response.status {
        0 => {}
        21004 => return Err(PurchaseError::NotConfigured),
        21005 | 21100..=21199 => {
            return Err(PurchaseError::Port(PortError::Unavailable(format!(
                "the App Store answered with status {}",
                response.status
            ))))
        }
        status => {
            debug!("Receipt rejected with status {}", status);
            return Err(PurchaseError::FailedVerification);
        }
    }

    let receipt = response.receipt.ok_or(PurchaseError::FailedVerification)?;
    if receipt.bundle_id != bundle_id {
        warn!("Receipt belongs to another app: {}", receipt.bundle_id);
        return Err(PurchaseError::FailedVerification);
    }

    let transaction = response
        .latest_receipt_info
        .into_iter()
        .chain(receipt.in_app)
        .find(|t| t.transaction_id == transaction_id || t.original_transaction_id == transaction_id)
        // Deferred purchases only show up in the receipt once they are approved.
        .ok_or(PurchaseError::Pending)?;

    if transaction.cancellation_date_ms.is_some() {
        return Err(PurchaseError::UserCancelled);
    }

    Ok(VerifiedTransaction {
        product_id: ProductId::new(transaction.product_id),
        original_transaction_id: transaction.original_transaction_id,
    })
}

//=========================================================================================
// The Adapters
//=========================================================================================

/// An adapter that implements `StoreVerifier` with `reqwest`.
#[derive(Clone)]
pub struct AppStoreVerifier {
    client: Client,
    shared_secret: String,
    bundle_id: String,
}

impl AppStoreVerifier {
    pub fn new(client: Client, shared_secret: String, bundle_id: String) -> Self {
        Self {
            client,
            shared_secret,
            bundle_id,
        }
    }

    async fn post(
        &self,
        url: &str,
        receipt: &PurchaseReceipt,
    ) -> Result<VerifyReceiptResponse, PortError> {
        let body = VerifyReceiptRequest {
            receipt_data: &receipt.receipt_data,
            password: &self.shared_secret,
            exclude_old_transactions: true,
        };
        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[async_trait]
impl StoreVerifier for AppStoreVerifier {
    async fn verify(&self, receipt: &PurchaseReceipt) -> Result<VerifiedTransaction, PurchaseError> {
        let mut response = self.post(PRODUCTION_URL, receipt).await?;
        if response.status == STATUS_SANDBOX_RECEIPT {
            debug!("Retrying receipt verification against the sandbox");
            response = self.post(SANDBOX_URL, receipt).await?;
        }
        verdict(response, &self.bundle_id, &receipt.transaction_id)
    }
}

/// Used when no store credentials are configured: every purchase is refused.
pub struct DisabledStoreVerifier;

#[async_trait]
impl StoreVerifier for DisabledStoreVerifier {
    async fn verify(&self, _receipt: &PurchaseReceipt) -> Result<VerifiedTransaction, PurchaseError> {
        Err(PurchaseError::NotConfigured)
    }
}
