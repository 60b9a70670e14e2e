//! Wallet and ledger-entry operations for the repository.

use crate::domain::{
    AdId, Money, OwnerType, PaymentId, TimeMs, TxnId, TxnKind, UserId, Wallet, WalletId,
    WalletTransaction,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::{decode_err, decode_money, Repository};

fn wallet_from_row(row: &SqliteRow) -> Result<Wallet, sqlx::Error> {
    let id: String = row.get("id");
    let owner_id: String = row.get("owner_id");
    let owner_type: String = row.get("owner_type");
    let balance: String = row.get("balance");
    let total_earned: String = row.get("total_earned");
    let total_spent: String = row.get("total_spent");
    let total_refunded: String = row.get("total_refunded");

    Ok(Wallet {
        id: WalletId::parse(&id).map_err(|e| decode_err("id", Box::new(e)))?,
        owner_id: UserId::parse(&owner_id).map_err(|e| decode_err("owner_id", Box::new(e)))?,
        owner_type: OwnerType::from_str(&owner_type).map_err(|e| decode_err("owner_type", e))?,
        balance: decode_money(&balance, "balance")?,
        total_earned: decode_money(&total_earned, "total_earned")?,
        total_spent: decode_money(&total_spent, "total_spent")?,
        total_refunded: decode_money(&total_refunded, "total_refunded")?,
    })
}

fn txn_from_row(row: &SqliteRow) -> Result<WalletTransaction, sqlx::Error> {
    let id: String = row.get("id");
    let wallet_id: String = row.get("wallet_id");
    let payment_id: Option<String> = row.get("payment_id");
    let ad_id: Option<String> = row.get("ad_id");
    let amount: String = row.get("amount");
    let kind: String = row.get("kind");
    let related: Option<String> = row.get("related_transaction_id");
    let created_at_ms: i64 = row.get("created_at_ms");

    Ok(WalletTransaction {
        id: TxnId::parse(&id).map_err(|e| decode_err("id", Box::new(e)))?,
        wallet_id: WalletId::parse(&wallet_id).map_err(|e| decode_err("wallet_id", Box::new(e)))?,
        payment_id: payment_id
            .map(|s| PaymentId::parse(&s))
            .transpose()
            .map_err(|e| decode_err("payment_id", Box::new(e)))?,
        ad_id: ad_id
            .map(|s| AdId::parse(&s))
            .transpose()
            .map_err(|e| decode_err("ad_id", Box::new(e)))?,
        amount: decode_money(&amount, "amount")?,
        kind: TxnKind::from_str(&kind).map_err(|e| decode_err("kind", e))?,
        related_transaction_id: related
            .map(|s| TxnId::parse(&s))
            .transpose()
            .map_err(|e| decode_err("related_transaction_id", Box::new(e)))?,
        created_at: TimeMs::new(created_at_ms),
    })
}

impl Repository {
    /// Fetch the wallet for an owner, creating a zero-balance one if absent.
    ///
    /// The `(owner_id, owner_type)` unique constraint makes concurrent
    /// first-touch creation collapse to one row.
    pub async fn get_or_create_wallet(
        &self,
        conn: &mut SqliteConnection,
        owner_id: UserId,
        owner_type: OwnerType,
    ) -> Result<Wallet, sqlx::Error> {
        let fresh = Wallet::new(owner_id, owner_type);
        sqlx::query(
            r#"
            INSERT INTO wallets (id, owner_id, owner_type, balance, total_earned, total_spent, total_refunded)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, owner_type) DO NOTHING
            "#,
        )
        .bind(fresh.id.to_string())
        .bind(fresh.owner_id.to_string())
        .bind(fresh.owner_type.as_str())
        .bind(fresh.balance.to_canonical_string())
        .bind(fresh.total_earned.to_canonical_string())
        .bind(fresh.total_spent.to_canonical_string())
        .bind(fresh.total_refunded.to_canonical_string())
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query("SELECT * FROM wallets WHERE owner_id = ? AND owner_type = ?")
            .bind(owner_id.to_string())
            .bind(owner_type.as_str())
            .fetch_one(&mut *conn)
            .await?;

        wallet_from_row(&row)
    }

    /// Fetch a wallet by owner without creating it.
    pub async fn wallet_by_owner(
        &self,
        owner_id: UserId,
        owner_type: OwnerType,
    ) -> Result<Option<Wallet>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM wallets WHERE owner_id = ? AND owner_type = ?")
            .bind(owner_id.to_string())
            .bind(owner_type.as_str())
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(wallet_from_row).transpose()
    }

    /// Persist a wallet's balance and totals after a ledger operation.
    pub async fn update_wallet_balances(
        &self,
        conn: &mut SqliteConnection,
        wallet: &Wallet,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = ?, total_earned = ?, total_spent = ?, total_refunded = ?
            WHERE id = ?
            "#,
        )
        .bind(wallet.balance.to_canonical_string())
        .bind(wallet.total_earned.to_canonical_string())
        .bind(wallet.total_spent.to_canonical_string())
        .bind(wallet.total_refunded.to_canonical_string())
        .bind(wallet.id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Append one immutable ledger entry.
    pub async fn insert_wallet_transaction(
        &self,
        conn: &mut SqliteConnection,
        txn: &WalletTransaction,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, wallet_id, payment_id, ad_id, amount, kind,
                related_transaction_id, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(txn.id.to_string())
        .bind(txn.wallet_id.to_string())
        .bind(txn.payment_id.map(|id| id.to_string()))
        .bind(txn.ad_id.map(|id| id.to_string()))
        .bind(txn.amount.to_canonical_string())
        .bind(txn.kind.as_str())
        .bind(txn.related_transaction_id.map(|id| id.to_string()))
        .bind(txn.created_at.as_i64())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Cross-reference the two legs of a refund transfer.
    ///
    /// This is pairing metadata set while both legs are written in the same
    /// transaction, not a mutation of a settled entry.
    pub async fn set_related_transaction(
        &self,
        conn: &mut SqliteConnection,
        txn_id: TxnId,
        related: TxnId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE wallet_transactions SET related_transaction_id = ? WHERE id = ?")
            .bind(related.to_string())
            .bind(txn_id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// All ledger entries for a wallet, oldest first.
    pub async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM wallet_transactions
            WHERE wallet_id = ?
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(txn_from_row).collect()
    }

    /// Signed sum of a wallet's ledger entries, for consistency auditing.
    pub async fn ledger_sum(&self, wallet_id: WalletId) -> Result<Money, sqlx::Error> {
        let txns = self.wallet_transactions(wallet_id).await?;
        Ok(txns
            .iter()
            .fold(Money::zero(), |acc, txn| acc + txn.amount))
    }
}
