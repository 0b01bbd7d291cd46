use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::stores::{IdentityStore, TransactionStore};
use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::models::{
    mpesa_transactions::{Finalization, MpesaTransaction, PaymentPurpose, StkCallback, TransactionStatus},
    user::{AccountType, PremiumGrant},
};
use crate::services::mpesa_service::{PaymentGateway, PushAccepted, QueryOutcome};

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub phone_number: String,
    pub amount: f64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum CallbackOutcome {
    /// This callback settled the transaction.
    Applied(MpesaTransaction),
    /// A poll (or an earlier callback) got there first; nothing changed.
    AlreadyFinal(MpesaTransaction),
    UnknownTransaction,
}

/// Owns the pending → completed/failed state machine for STK pushes.
///
/// Callbacks and client polls both finalize through [`TransactionStore::finalize_if_pending`],
/// so whichever lands second is a no-op and entitlements are granted at most once.
pub struct PaymentService {
    transactions: Arc<dyn TransactionStore>,
    identity: Arc<dyn IdentityStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(stores: &Stores, gateway: Arc<dyn PaymentGateway>) -> Self {
        PaymentService {
            transactions: stores.transactions.clone(),
            identity: stores.identity.clone(),
            gateway,
        }
    }

    /// Sends the push and records a pending transaction. Nothing is stored
    /// unless the provider accepted the request.
    pub async fn initiate(
        &self,
        user_id: ObjectId,
        request: InitiatePayment,
    ) -> Result<(MpesaTransaction, PushAccepted)> {
        if request.phone_number.trim().is_empty() {
            return Err(AppError::invalid_data("Phone number and amount are required"));
        }
        let amount = whole_amount(request.amount)?;

        let accepted = self.gateway.initiate_stk_push(&request.phone_number, amount).await?;

        let transaction = MpesaTransaction::pending(
            accepted.merchant_request_id.clone(),
            accepted.checkout_request_id.clone(),
            request.amount,
            accepted.phone_number.clone(),
            user_id,
            request.metadata,
        );
        let transaction = self.transactions.insert(transaction).await.map_err(|e| {
            error!(
                checkout_request_id = %accepted.checkout_request_id,
                error = %e,
                "STK push accepted but transaction could not be stored"
            );
            e
        })?;

        info!(
            checkout_request_id = %transaction.checkout_request_id,
            amount = transaction.amount,
            "pending transaction recorded"
        );
        Ok((transaction, accepted))
    }

    pub async fn handle_callback(&self, callback: StkCallback) -> Result<CallbackOutcome> {
        let checkout_request_id = callback.checkout_request_id.clone();

        if self.transactions.find_by_checkout_id(&checkout_request_id).await?.is_none() {
            warn!(checkout_request_id = %checkout_request_id, "callback for unknown transaction");
            return Ok(CallbackOutcome::UnknownTransaction);
        }

        let receipt = callback.receipt_number();
        let outcome = Finalization::from_result(callback.result_code, callback.result_desc, receipt);

        match self.finalize(&checkout_request_id, outcome).await? {
            Some(transaction) => Ok(CallbackOutcome::Applied(transaction)),
            None => {
                info!(checkout_request_id = %checkout_request_id, "callback for already-final transaction ignored");
                let current = self.load(&checkout_request_id).await?;
                Ok(CallbackOutcome::AlreadyFinal(current))
            }
        }
    }

    /// Current state of a push. Terminal records are returned as stored; pending
    /// ones are checked with the provider, and stay pending if it cannot say.
    pub async fn status(&self, checkout_request_id: &str) -> Result<MpesaTransaction> {
        let transaction = self.load(checkout_request_id).await?;
        if transaction.status.is_terminal() {
            return Ok(transaction);
        }

        match self.gateway.query_stk_status(checkout_request_id).await {
            Ok(QueryOutcome::Resolved { result_code, result_desc }) => {
                let outcome = Finalization::from_result(result_code, result_desc, None);
                match self.finalize(checkout_request_id, outcome).await? {
                    Some(finalized) => Ok(finalized),
                    None => self.load(checkout_request_id).await,
                }
            }
            Ok(QueryOutcome::Pending { reason }) => {
                info!(checkout_request_id = %checkout_request_id, reason = %reason, "payment still pending");
                Ok(transaction)
            }
            Err(e) => {
                warn!(checkout_request_id = %checkout_request_id, error = %e, "M-Pesa status query failed");
                Ok(transaction)
            }
        }
    }

    /// Re-runs entitlement activation for a completed purchase, e.g. after a
    /// transient identity-store failure. Safe to call repeatedly.
    pub async fn retry_entitlement(
        &self,
        checkout_request_id: &str,
        caller: &ObjectId,
    ) -> Result<MpesaTransaction> {
        let transaction = self.load(checkout_request_id).await?;
        if transaction.user_id.as_ref() != Some(caller) {
            return Err(AppError::forbidden("Transaction belongs to another user"));
        }
        if transaction.status != TransactionStatus::Completed {
            return Err(AppError::invalid_data(format!(
                "Transaction is {}, not completed",
                transaction.status.as_str()
            )));
        }
        if transaction.purpose().is_none() {
            return Err(AppError::invalid_data("Transaction does not carry an entitlement"));
        }

        self.activate_entitlement(&transaction).await?;
        self.load(checkout_request_id).await
    }

    async fn load(&self, checkout_request_id: &str) -> Result<MpesaTransaction> {
        self.transactions
            .find_by_checkout_id(checkout_request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction"))
    }

    /// Writes the terminal state if nobody else has. Returns `None` when the
    /// record had already left `pending`.
    async fn finalize(
        &self,
        checkout_request_id: &str,
        outcome: Finalization,
    ) -> Result<Option<MpesaTransaction>> {
        let Some(mut transaction) = self
            .transactions
            .finalize_if_pending(checkout_request_id, &outcome)
            .await?
        else {
            return Ok(None);
        };

        match transaction.status {
            TransactionStatus::Completed => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    receipt = ?transaction.mpesa_receipt_number,
                    "payment completed"
                );
                // Payment success stands even if the entitlement cannot be granted now.
                match self.activate_entitlement(&transaction).await {
                    Ok(true) => {
                        if let Some(updated) = self.transactions.find_by_checkout_id(checkout_request_id).await? {
                            transaction = updated;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => error!(
                        checkout_request_id = %checkout_request_id,
                        error = %e,
                        "premium activation failed; retry out of band"
                    ),
                }
            }
            _ => info!(
                checkout_request_id = %checkout_request_id,
                code = ?transaction.result_code,
                description = ?transaction.result_desc,
                "payment failed"
            ),
        }
        Ok(Some(transaction))
    }

    /// Grants premium for premium-upgrade purchases. Keyed by the checkout
    /// request id, so a grant is applied to the user at most once.
    async fn activate_entitlement(&self, transaction: &MpesaTransaction) -> Result<bool> {
        let Some(PaymentPurpose::PremiumUpgrade { plan_name, is_annual }) = transaction.purpose() else {
            return Ok(false);
        };
        let Some(user_id) = transaction.user_id else {
            warn!(
                checkout_request_id = %transaction.checkout_request_id,
                "premium purchase without a user; nothing to activate"
            );
            return Ok(false);
        };

        let user = self
            .identity
            .find_user(&user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        let now = Utc::now();
        let grant = PremiumGrant::starting_at(now, plan_name, is_annual, &transaction.checkout_request_id);
        let applied = self.identity.apply_premium(&user_id, &grant).await?;

        if user.account_type == AccountType::Seller && !self.identity.verify_shop_of(&user_id).await? {
            warn!(user_id = %user_id.to_hex(), "seller has no shop to verify");
        }

        self.transactions
            .mark_entitlement_applied(&transaction.checkout_request_id, now)
            .await?;

        if applied {
            info!(
                checkout_request_id = %transaction.checkout_request_id,
                user = %user.email,
                plan = %grant.plan_name,
                until = %grant.premium_until,
                "premium activated"
            );
        }
        Ok(applied)
    }
}

fn whole_amount(amount: f64) -> Result<u64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::invalid_data("Amount must be greater than 0"));
    }
    if amount.fract() != 0.0 {
        return Err(AppError::invalid_data("Amount must be a whole number"));
    }
    Ok(amount as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_must_be_positive_whole_numbers() {
        assert_eq!(whole_amount(150.0).unwrap(), 150);
        assert!(whole_amount(0.0).is_err());
        assert!(whole_amount(-5.0).is_err());
        assert!(whole_amount(10.5).is_err());
        assert!(whole_amount(f64::NAN).is_err());
    }
}
