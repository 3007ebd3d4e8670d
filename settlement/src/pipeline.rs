//! Settlement pipeline: payment notifications in, ledger credits out
//!
//! Each payment channel maps a provider notification to a single idempotent
//! ledger credit. The provider's payment identifier becomes the transaction
//! reference key, so redelivered webhooks collapse onto the transaction
//! recorded for the first delivery and the balance moves exactly once.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use credit_ledger::{CreditLedger, Transaction, TxnKind, UserId};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::verify;

/// UPI webhook notification body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpiNotification {
    /// Provider order identifier, unique per payment
    pub order_id: String,

    /// Telegram user the payment belongs to
    pub user_id: i64,

    /// Paid amount in whole rupees
    pub amount_inr: u64,

    /// Hex-encoded HMAC-SHA256 over `order_id|user_id|amount_inr`
    pub signature: String,
}

impl UpiNotification {
    /// Parse a raw webhook body
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| Error::MalformedNotification(e.to_string()))
    }
}

/// Maps verified payments onto ledger credits
pub struct SettlementPipeline {
    ledger: CreditLedger,
    config: Config,
}

impl std::fmt::Debug for SettlementPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SettlementPipeline {
    /// Create a pipeline settling into `ledger`
    pub fn new(ledger: CreditLedger, config: Config) -> Self {
        Self { ledger, config }
    }

    /// Settle a Telegram Stars payment
    ///
    /// Telegram has already verified the payment by the time the bot sees a
    /// successful-payment update, so no signature check happens here. An
    /// amount outside the price table is refused outright rather than
    /// settled proportionally.
    pub async fn handle_stars_payment(
        &self,
        payment_id: &str,
        user_id: i64,
        stars_amount: u64,
    ) -> Result<Transaction> {
        let credits = self.config.stars_credits(stars_amount).ok_or_else(|| {
            warn!(payment_id, stars_amount, "Stars amount matches no price tier");
            Error::InvalidPaymentAmount(format!(
                "{} Stars matches no price tier",
                stars_amount
            ))
        })?;

        let txn = self
            .ledger
            .credit(UserId::new(user_id), credits, TxnKind::PurchaseStars, payment_id)
            .await?;

        info!(
            payment_id,
            user_id,
            stars_amount,
            credits,
            txn_id = %txn.txn_id,
            "Settled Stars payment"
        );

        Ok(txn)
    }

    /// Settle a UPI webhook notification
    ///
    /// The signature is verified before the ledger is touched; a rejected
    /// notification leaves no trace in the ledger.
    pub async fn handle_upi_payment(&self, notification: &UpiNotification) -> Result<Transaction> {
        verify::verify_signature(
            &self.config.upi_webhook_secret,
            &notification.order_id,
            notification.user_id,
            notification.amount_inr,
            &notification.signature,
        )?;

        let credits = self
            .config
            .upi_credits(notification.amount_inr)
            .ok_or_else(|| {
                warn!(
                    order_id = %notification.order_id,
                    amount_inr = notification.amount_inr,
                    "UPI amount matches no price tier"
                );
                Error::InvalidPaymentAmount(format!(
                    "Rs.{} matches no price tier",
                    notification.amount_inr
                ))
            })?;

        let txn = self
            .ledger
            .credit(
                UserId::new(notification.user_id),
                credits,
                TxnKind::PurchaseUpi,
                notification.order_id.clone(),
            )
            .await?;

        info!(
            order_id = %notification.order_id,
            user_id = notification.user_id,
            amount_inr = notification.amount_inr,
            credits,
            txn_id = %txn.txn_id,
            "Settled UPI payment"
        );

        Ok(txn)
    }

    /// Active price tables and webhook secret
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;

    async fn test_pipeline(secret: &str) -> (SettlementPipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger_config = credit_ledger::Config::default();
        ledger_config.data_dir = dir.path().to_path_buf();
        let ledger = CreditLedger::open(ledger_config).await.unwrap();
        ledger.create_account(UserId::new(42)).await.unwrap();

        let mut config = Config::default();
        config.upi_webhook_secret = secret.to_string();

        (SettlementPipeline::new(ledger, config), dir)
    }

    fn sign(secret: &str, order_id: &str, user_id: i64, amount_inr: u64) -> String {
        let mut mac =
            hmac::Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(verify::canonical_payload(order_id, user_id, amount_inr).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn test_stars_payment_credits_tier_amount() {
        let (pipeline, _dir) = test_pipeline("s").await;

        let txn = pipeline
            .handle_stars_payment("pay-1", 42, 100)
            .await
            .unwrap();
        assert_eq!(txn.delta, 70);

        // signup bonus 1 + purchase 70
        let balance = pipeline.ledger.get_balance(UserId::new(42)).await.unwrap();
        assert_eq!(balance, 71);
    }

    #[tokio::test]
    async fn test_stars_off_table_amount_rejected() {
        let (pipeline, _dir) = test_pipeline("s").await;

        let err = pipeline
            .handle_stars_payment("pay-1", 42, 250)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPaymentAmount(_)));

        let balance = pipeline.ledger.get_balance(UserId::new(42)).await.unwrap();
        assert_eq!(balance, 1);
    }

    #[test]
    fn test_malformed_notification_body_rejected() {
        let err = UpiNotification::from_json("{\"order_id\": 12}").unwrap_err();
        assert!(matches!(err, Error::MalformedNotification(_)));
    }

    #[tokio::test]
    async fn test_upi_payment_verified_and_credited() {
        let (pipeline, _dir) = test_pipeline("topsecret").await;

        let notification = UpiNotification {
            order_id: "ord-1".to_string(),
            user_id: 42,
            amount_inr: 59,
            signature: sign("topsecret", "ord-1", 42, 59),
        };

        let txn = pipeline.handle_upi_payment(&notification).await.unwrap();
        assert_eq!(txn.delta, 23);
    }

    #[tokio::test]
    async fn test_upi_bad_signature_leaves_ledger_untouched() {
        let (pipeline, _dir) = test_pipeline("topsecret").await;

        let notification = UpiNotification {
            order_id: "ord-1".to_string(),
            user_id: 42,
            amount_inr: 59,
            signature: sign("wrongsecret", "ord-1", 42, 59),
        };

        let err = pipeline.handle_upi_payment(&notification).await.unwrap_err();
        assert!(matches!(err, Error::Signature));

        let balance = pipeline.ledger.get_balance(UserId::new(42)).await.unwrap();
        assert_eq!(balance, 1);
        let txns = pipeline
            .ledger
            .list_transactions(UserId::new(42), None)
            .await
            .unwrap();
        assert_eq!(txns.len(), 1);
    }
}
