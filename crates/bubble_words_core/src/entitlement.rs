//! crates/bubble_words_core/src/entitlement.rs
//!
//! Membership resolution for the logged-in player.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ContentType, MembershipLevel, Product, ProductId, PurchaseReceipt};
use crate::ports::{PortResult, PurchaseError, PurchaseLedger};

/// Caches what the current user has bought and answers access questions.
///
/// Nothing is cached while logged out; logging in re-reads the ledger, which
/// stays the source of truth.
pub struct EntitlementGate {
    ledger: Arc<dyn PurchaseLedger>,
    user_id: Option<Uuid>,
    purchased: HashSet<ProductId>,
}

impl EntitlementGate {
    pub fn new(ledger: Arc<dyn PurchaseLedger>) -> Self {
        Self {
            ledger,
            user_id: None,
            purchased: HashSet::new(),
        }
    }

    /// Builds a gate already logged in as `user_id`.
    pub async fn for_user(ledger: Arc<dyn PurchaseLedger>, user_id: Uuid) -> PortResult<Self> {
        let mut gate = Self::new(ledger);
        gate.log_in(user_id).await?;
        Ok(gate)
    }

    pub async fn log_in(&mut self, user_id: Uuid) -> PortResult<()> {
        let entitlements = self.ledger.current_entitlements(user_id).await?;
        self.user_id = Some(user_id);
        self.purchased = entitlements
            .into_iter()
            .filter(|id| {
                let known = Product::from_id(id).is_some();
                if !known {
                    warn!("Ignoring unknown product id {}", id);
                }
                known
            })
            .collect();
        info!(
            "Loaded {} entitlements for user {}",
            self.purchased.len(),
            user_id
        );
        Ok(())
    }

    /// Forgets the cached entitlements. The purchase ledger is left untouched.
    pub fn log_out(&mut self) {
        self.user_id = None;
        self.purchased.clear();
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn purchased_products(&self) -> &HashSet<ProductId> {
        &self.purchased
    }

    pub fn membership_level(&self) -> MembershipLevel {
        if !self.is_logged_in() {
            return MembershipLevel::Free;
        }
        self.purchased
            .iter()
            .filter_map(Product::from_id)
            .map(Product::membership)
            .max()
            .unwrap_or(MembershipLevel::Free)
    }

    pub fn can_access(&self, content: ContentType) -> bool {
        match content {
            ContentType::BasicWords | ContentType::DailyPhrase => true,
            ContentType::AdvancedFeatures => self.membership_level().has_access(),
        }
    }

    /// Records a store purchase of `product` for the logged-in user and caches it
    /// once the ledger has accepted the receipt.
    pub async fn purchase(
        &mut self,
        product: Product,
        receipt: &PurchaseReceipt,
    ) -> Result<(), PurchaseError> {
        let user_id = self.user_id.ok_or(PurchaseError::NotLoggedIn)?;
        let id = product.id();
        self.ledger.purchase(user_id, &id, receipt).await?;
        info!("User {} purchased {}", user_id, id);
        self.purchased.insert(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VerifiedTransaction;
    use crate::memory::MemoryStore;
    use crate::ports::{StoreVerifier, TransactionStore};
    use crate::purchases::VerifiedPurchases;
    use async_trait::async_trait;

    /// Confirms every receipt whose data names a product.
    struct ApprovingStore;

    #[async_trait]
    impl StoreVerifier for ApprovingStore {
        async fn verify(
            &self,
            receipt: &PurchaseReceipt,
        ) -> Result<VerifiedTransaction, PurchaseError> {
            Ok(VerifiedTransaction {
                product_id: ProductId::new(receipt.receipt_data.clone()),
                original_transaction_id: receipt.transaction_id.clone(),
            })
        }
    }

    fn receipt_for(product: Product) -> PurchaseReceipt {
        PurchaseReceipt {
            transaction_id: Uuid::new_v4().to_string(),
            receipt_data: product.id().to_string(),
        }
    }

    async fn gate_with(products: &[Product]) -> (EntitlementGate, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        for product in products {
            let transaction = VerifiedTransaction {
                product_id: product.id(),
                original_transaction_id: Uuid::new_v4().to_string(),
            };
            store.claim_transaction(user, &transaction).await.unwrap();
        }
        let ledger = Arc::new(VerifiedPurchases::new(Arc::new(ApprovingStore), store.clone()));
        let gate = EntitlementGate::for_user(ledger, user).await.unwrap();
        (gate, store, user)
    }

    #[tokio::test]
    async fn lifetime_wins_over_subscriptions() {
        let (gate, _, _) = gate_with(&[Product::Monthly, Product::Lifetime, Product::Yearly]).await;
        assert_eq!(gate.membership_level(), MembershipLevel::Lifetime);
    }

    #[tokio::test]
    async fn highest_subscription_is_used() {
        let (gate, _, _) = gate_with(&[Product::Monthly, Product::Yearly]).await;
        assert_eq!(gate.membership_level(), MembershipLevel::Yearly);
    }

    #[tokio::test]
    async fn free_users_only_reach_basic_content() {
        let (gate, _, _) = gate_with(&[]).await;
        assert_eq!(gate.membership_level(), MembershipLevel::Free);
        assert!(gate.can_access(ContentType::BasicWords));
        assert!(gate.can_access(ContentType::DailyPhrase));
        assert!(!gate.can_access(ContentType::AdvancedFeatures));
    }

    #[tokio::test]
    async fn logging_out_drops_access_but_not_purchases() {
        let (mut gate, _, user) = gate_with(&[Product::Monthly]).await;
        assert!(gate.can_access(ContentType::AdvancedFeatures));

        gate.log_out();
        assert_eq!(gate.membership_level(), MembershipLevel::Free);
        assert!(!gate.can_access(ContentType::AdvancedFeatures));
        assert!(gate.purchased_products().is_empty());

        gate.log_in(user).await.unwrap();
        assert_eq!(gate.membership_level(), MembershipLevel::Monthly);
    }

    #[tokio::test]
    async fn purchasing_requires_login() {
        let store = Arc::new(MemoryStore::new());
        let mut gate = EntitlementGate::new(Arc::new(VerifiedPurchases::new(
            Arc::new(ApprovingStore),
            store,
        )));
        let err = gate
            .purchase(Product::Yearly, &receipt_for(Product::Yearly))
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::NotLoggedIn));
    }

    #[tokio::test]
    async fn purchases_are_cached_and_recorded() {
        let (mut gate, store, user) = gate_with(&[]).await;
        gate.purchase(Product::Yearly, &receipt_for(Product::Yearly))
            .await
            .unwrap();
        assert_eq!(gate.membership_level(), MembershipLevel::Yearly);
        assert!(store
            .products_of(user)
            .await
            .unwrap()
            .contains(&Product::Yearly.id()));
    }

    #[tokio::test]
    async fn a_refused_purchase_leaves_the_membership_alone() {
        let (mut gate, _, _) = gate_with(&[]).await;
        let mismatched = receipt_for(Product::Monthly);

        let err = gate.purchase(Product::Lifetime, &mismatched).await.unwrap_err();

        assert!(matches!(err, PurchaseError::FailedVerification));
        assert_eq!(gate.membership_level(), MembershipLevel::Free);
    }
}
