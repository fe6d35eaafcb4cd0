//! crates/bubble_words_core/src/purchases.rs
//!
//! The purchase ledger: nothing is granted until the store has confirmed the
//! transaction, and a confirmed transaction unlocks exactly one account.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Product, ProductId, PurchaseReceipt};
use crate::ports::{PortResult, PurchaseError, PurchaseLedger, StoreVerifier, TransactionStore};

pub struct VerifiedPurchases {
    verifier: Arc<dyn StoreVerifier>,
    transactions: Arc<dyn TransactionStore>,
}

impl VerifiedPurchases {
    pub fn new(verifier: Arc<dyn StoreVerifier>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            verifier,
            transactions,
        }
    }
}

#[async_trait]
impl PurchaseLedger for VerifiedPurchases {
    async fn current_entitlements(&self, user_id: Uuid) -> PortResult<HashSet<ProductId>> {
        self.transactions.products_of(user_id).await
    }

    async fn purchase(
        &self,
        user_id: Uuid,
        product: &ProductId,
        receipt: &PurchaseReceipt,
    ) -> Result<(), PurchaseError> {
        if Product::from_id(product).is_none() {
            return Err(PurchaseError::NotConfigured);
        }
        if receipt.transaction_id.trim().is_empty() || receipt.receipt_data.trim().is_empty() {
            return Err(PurchaseError::FailedVerification);
        }

        let transaction = self.verifier.verify(receipt).await?;
        if transaction.product_id != *product {
            warn!(
                "Receipt for transaction {} is for {}, not {}",
                receipt.transaction_id, transaction.product_id, product
            );
            return Err(PurchaseError::FailedVerification);
        }

        let owner = self
            .transactions
            .claim_transaction(user_id, &transaction)
            .await?;
        if owner != user_id {
            warn!(
                "User {} submitted transaction {} which belongs to another account",
                user_id, transaction.original_transaction_id
            );
            return Err(PurchaseError::FailedVerification);
        }

        info!(
            "Recorded transaction {} ({}) for user {}",
            transaction.original_transaction_id, product, user_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VerifiedTransaction;
    use crate::memory::MemoryStore;

    /// Treats the receipt data as the product id the store confirmed.
    struct ReceiptIsProduct;

    #[async_trait]
    impl StoreVerifier for ReceiptIsProduct {
        async fn verify(
            &self,
            receipt: &PurchaseReceipt,
        ) -> Result<VerifiedTransaction, PurchaseError> {
            match receipt.receipt_data.as_str() {
                "pending" => Err(PurchaseError::Pending),
                "forged" => Err(PurchaseError::FailedVerification),
                product => Ok(VerifiedTransaction {
                    product_id: ProductId::new(product),
                    original_transaction_id: receipt.transaction_id.clone(),
                }),
            }
        }
    }

    fn ledger() -> (VerifiedPurchases, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (VerifiedPurchases::new(Arc::new(ReceiptIsProduct), store.clone()), store)
    }

    fn receipt(transaction_id: &str, receipt_data: &str) -> PurchaseReceipt {
        PurchaseReceipt {
            transaction_id: transaction_id.to_string(),
            receipt_data: receipt_data.to_string(),
        }
    }

    #[tokio::test]
    async fn confirmed_transactions_grant_the_product() {
        let (ledger, _) = ledger();
        let user = Uuid::new_v4();
        let lifetime = Product::Lifetime.id();

        ledger
            .purchase(user, &lifetime, &receipt("t1", lifetime.as_str()))
            .await
            .unwrap();
        // Restoring the same purchase is harmless.
        ledger
            .purchase(user, &lifetime, &receipt("t1", lifetime.as_str()))
            .await
            .unwrap();

        let owned = ledger.current_entitlements(user).await.unwrap();
        assert_eq!(owned, HashSet::from([lifetime]));
    }

    #[tokio::test]
    async fn requests_without_a_receipt_are_refused() {
        let (ledger, _) = ledger();
        let user = Uuid::new_v4();

        let result = ledger
            .purchase(user, &Product::Lifetime.id(), &receipt("", ""))
            .await;

        assert!(matches!(result, Err(PurchaseError::FailedVerification)));
        assert!(ledger.current_entitlements(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failures_are_passed_through() {
        let (ledger, _) = ledger();
        let user = Uuid::new_v4();
        let yearly = Product::Yearly.id();

        assert!(matches!(
            ledger.purchase(user, &yearly, &receipt("t1", "pending")).await,
            Err(PurchaseError::Pending)
        ));
        assert!(matches!(
            ledger.purchase(user, &yearly, &receipt("t1", "forged")).await,
            Err(PurchaseError::FailedVerification)
        ));
        assert!(ledger.current_entitlements(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_cheaper_receipt_cannot_unlock_a_dearer_product() {
        let (ledger, _) = ledger();
        let user = Uuid::new_v4();
        let monthly_receipt = receipt("t1", Product::Monthly.id().as_str());

        let result = ledger
            .purchase(user, &Product::Lifetime.id(), &monthly_receipt)
            .await;

        assert!(matches!(result, Err(PurchaseError::FailedVerification)));
        assert!(ledger.current_entitlements(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_transaction_unlocks_only_the_first_account() {
        let (ledger, _) = ledger();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let lifetime = Product::Lifetime.id();
        let shared = receipt("t1", lifetime.as_str());

        ledger.purchase(alice, &lifetime, &shared).await.unwrap();
        let replay = ledger.purchase(bob, &lifetime, &shared).await;

        assert!(matches!(replay, Err(PurchaseError::FailedVerification)));
        assert!(ledger.current_entitlements(bob).await.unwrap().is_empty());
        assert_eq!(ledger.current_entitlements(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_products_cannot_be_bought() {
        let (ledger, _) = ledger();
        let result = ledger
            .purchase(Uuid::new_v4(), &ProductId::new("bogus"), &receipt("t1", "bogus"))
            .await;
        assert!(matches!(result, Err(PurchaseError::NotConfigured)));
    }
}
