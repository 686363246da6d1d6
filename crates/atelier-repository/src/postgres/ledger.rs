//! Postgres credit ledger.

use crate::{
    traits::{Ledger, LedgerError},
    DatabasePoolInterface,
};
use atelier_core::{AtelierError, UserId};
use async_trait::async_trait;
use shaku::Component;
use std::sync::Arc;
use tracing::debug;

/// Ledger over `credit_accounts`. Debits are a single guarded update so the
/// balance never goes negative.
#[derive(Component, Clone)]
#[shaku(interface = Ledger)]
pub struct PgLedger {
    #[shaku(inject)]
    pool: Arc<dyn DatabasePoolInterface>,
}

impl PgLedger {
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }

    /// Opens an account, or tops up an existing one.
    pub async fn deposit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO credit_accounts (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET balance = credit_accounts.balance + EXCLUDED.balance, updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(user_id.into_inner())
        .bind(amount)
        .fetch_one(self.pool.inner())
        .await
        .map_err(AtelierError::from)?;

        Ok(balance)
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM credit_accounts WHERE user_id = $1")
                .bind(user_id.into_inner())
                .fetch_optional(self.pool.inner())
                .await
                .map_err(AtelierError::from)?;

        balance.ok_or(LedgerError::AccountNotFound(user_id))
    }

    async fn debit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount == 0 {
            return self.balance(user_id).await;
        }

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE credit_accounts
            SET balance = balance - $2, updated_at = NOW()
            WHERE user_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(user_id.into_inner())
        .bind(amount)
        .fetch_optional(self.pool.inner())
        .await
        .map_err(AtelierError::from)?;

        match balance {
            Some(balance) => {
                debug!(user_id = %user_id, amount, balance, "Debited credits");
                Ok(balance)
            }
            None => {
                let available = self.balance(user_id).await?;
                Err(LedgerError::InsufficientCredits {
                    required: amount,
                    available,
                })
            }
        }
    }

    async fn refund(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE credit_accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING balance
            "#,
        )
        .bind(user_id.into_inner())
        .bind(amount)
        .fetch_optional(self.pool.inner())
        .await
        .map_err(AtelierError::from)?;

        balance.ok_or(LedgerError::AccountNotFound(user_id))
    }
}
