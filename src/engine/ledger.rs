//! Wallet ledger operations.
//!
//! Every balance change happens here: adjust the running balance and the
//! matching lifetime total, and append exactly one immutable ledger entry,
//! all on the caller's transaction. Entries are never mutated or deleted;
//! corrections are new paired entries.

use crate::db::Repository;
use crate::domain::{
    AdId, Money, PaymentId, TimeMs, TxnId, TxnKind, Wallet, WalletTransaction,
};
use crate::error::SettlementError;
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

/// Attribution metadata for a ledger entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub payment_id: Option<PaymentId>,
    pub ad_id: Option<AdId>,
    pub at: TimeMs,
}

/// Credit `amount` into `wallet`.
///
/// `kind` must be a credit kind: `Credit` bumps `total_earned`,
/// `RefundCredit` bumps `total_refunded`.
pub async fn credit(
    repo: &Repository,
    conn: &mut SqliteConnection,
    mut wallet: Wallet,
    amount: Money,
    kind: TxnKind,
    meta: EntryMeta,
) -> Result<(Wallet, WalletTransaction), SettlementError> {
    if !amount.is_positive() {
        return Err(SettlementError::Validation(format!(
            "credit amount must be positive, got {}",
            amount
        )));
    }
    match kind {
        TxnKind::Credit => wallet.total_earned = wallet.total_earned + amount,
        TxnKind::RefundCredit => wallet.total_refunded = wallet.total_refunded + amount,
        other => {
            return Err(SettlementError::Internal(format!(
                "{} is not a credit kind",
                other
            )))
        }
    }
    wallet.balance = wallet.balance + amount;

    let txn = WalletTransaction {
        id: TxnId::generate(),
        wallet_id: wallet.id,
        payment_id: meta.payment_id,
        ad_id: meta.ad_id,
        amount,
        kind,
        related_transaction_id: None,
        created_at: meta.at,
    };

    repo.update_wallet_balances(conn, &wallet).await?;
    repo.insert_wallet_transaction(conn, &txn).await?;

    debug!(wallet = %wallet.id, amount = %amount, kind = %kind, "wallet credited");
    Ok((wallet, txn))
}

/// Debit `amount` out of `wallet`.
///
/// Fails with `InsufficientBalance` if the balance would go negative; the
/// debit is refused, never clamped. `Debit` bumps `total_spent`,
/// `RefundDebit` bumps `total_refunded` (refund value paid back out).
pub async fn debit(
    repo: &Repository,
    conn: &mut SqliteConnection,
    mut wallet: Wallet,
    amount: Money,
    kind: TxnKind,
    meta: EntryMeta,
) -> Result<(Wallet, WalletTransaction), SettlementError> {
    if !amount.is_positive() {
        return Err(SettlementError::Validation(format!(
            "debit amount must be positive, got {}",
            amount
        )));
    }
    if wallet.balance < amount {
        return Err(SettlementError::InsufficientBalance {
            wallet: wallet.id,
            balance: wallet.balance,
            required: amount,
        });
    }

    match kind {
        TxnKind::Debit => wallet.total_spent = wallet.total_spent + amount,
        TxnKind::RefundDebit => wallet.total_refunded = wallet.total_refunded + amount,
        other => {
            return Err(SettlementError::Internal(format!(
                "{} is not a debit kind",
                other
            )))
        }
    }
    wallet.balance = wallet.balance - amount;

    let txn = WalletTransaction {
        id: TxnId::generate(),
        wallet_id: wallet.id,
        payment_id: meta.payment_id,
        ad_id: meta.ad_id,
        amount: -amount,
        kind,
        related_transaction_id: None,
        created_at: meta.at,
    };

    repo.update_wallet_balances(conn, &wallet).await?;
    repo.insert_wallet_transaction(conn, &txn).await?;

    debug!(wallet = %wallet.id, amount = %amount, kind = %kind, "wallet debited");
    Ok((wallet, txn))
}

/// Atomic wallet-to-wallet refund transfer.
///
/// Debits `from` and credits `to` by the same amount, writing one
/// `refund_debit` and one `refund_credit` entry cross-referenced via
/// `related_transaction_id`. The debit's `InsufficientBalance` aborts the
/// whole operation before anything is written to the `to` side.
pub async fn transfer_refund(
    repo: &Repository,
    conn: &mut SqliteConnection,
    from: Wallet,
    to: Wallet,
    amount: Money,
    meta: EntryMeta,
) -> Result<(Wallet, Wallet), SettlementError> {
    let (from, debit_txn) = debit(repo, conn, from, amount, TxnKind::RefundDebit, meta).await?;
    let (to, credit_txn) = credit(repo, conn, to, amount, TxnKind::RefundCredit, meta).await?;

    repo.set_related_transaction(conn, debit_txn.id, credit_txn.id)
        .await?;
    repo.set_related_transaction(conn, credit_txn.id, debit_txn.id)
        .await?;

    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{OwnerType, UserId};
    use tempfile::TempDir;

    fn m(s: &str) -> Money {
        Money::from_str_canonical(s).unwrap()
    }

    fn meta() -> EntryMeta {
        EntryMeta {
            payment_id: None,
            ad_id: None,
            at: TimeMs::now(),
        }
    }

    async fn wallet_fixture() -> (TempDir, Repository, UserId, Wallet) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.db").to_string_lossy().to_string();
        let pool = init_db(&path).await.unwrap();
        let repo = Repository::new(pool);
        let owner = UserId::generate();
        let mut conn = repo.pool().acquire().await.unwrap();
        let wallet = repo
            .get_or_create_wallet(&mut conn, owner, OwnerType::Advertiser)
            .await
            .unwrap();
        (temp, repo, owner, wallet)
    }

    #[tokio::test]
    async fn test_credit_rejects_debit_kind() {
        let (_temp, repo, _owner, wallet) = wallet_fixture().await;
        let mut conn = repo.pool().acquire().await.unwrap();
        let err = credit(&repo, &mut conn, wallet, m("10"), TxnKind::Debit, meta())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Internal(_)));
    }

    #[tokio::test]
    async fn test_debit_rejects_credit_kind() {
        let (_temp, repo, owner, wallet) = wallet_fixture().await;
        let mut conn = repo.pool().acquire().await.unwrap();
        let (wallet, _) = credit(&repo, &mut conn, wallet, m("10"), TxnKind::Credit, meta())
            .await
            .unwrap();
        let err = debit(&repo, &mut conn, wallet, m("5"), TxnKind::RefundCredit, meta())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Internal(_)));
        drop(conn);

        // The mismatched kind left no trace on the wallet.
        let fresh = repo
            .wallet_by_owner(owner, OwnerType::Advertiser)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.balance, m("10"));
    }
}
