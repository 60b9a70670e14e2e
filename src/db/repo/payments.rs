//! Payment and refund-source operations for the repository.

use crate::domain::{
    AdId, Money, Payment, PaymentId, PaymentStatus, PlacementId, Reference, TimeMs, UserId,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::{decode_err, decode_money, Repository};

fn payment_from_row(row: &SqliteRow) -> Result<Payment, sqlx::Error> {
    let id: String = row.get("id");
    let reference: String = row.get("reference");
    let base_reference: String = row.get("base_reference");
    let advertiser_id: String = row.get("advertiser_id");
    let ad_id: String = row.get("ad_id");
    let placement_id: String = row.get("placement_id");
    let amount: String = row.get("amount");
    let wallet_applied: String = row.get("wallet_applied");
    let refund_applied: String = row.get("refund_applied");
    let amount_paid: String = row.get("amount_paid");
    let status: String = row.get("status");
    let is_reassignment: i64 = row.get("is_reassignment");
    let refund_used: i64 = row.get("refund_used");
    let refund_consumed: String = row.get("refund_consumed");
    let refund_used_for: Option<String> = row.get("refund_used_for_payment");
    let created_at_ms: i64 = row.get("created_at_ms");
    let paid_at_ms: Option<i64> = row.get("paid_at_ms");
    let refunded_at_ms: Option<i64> = row.get("refunded_at_ms");

    Ok(Payment {
        id: PaymentId::parse(&id).map_err(|e| decode_err("id", Box::new(e)))?,
        reference: Reference::new(reference),
        base_reference: Reference::new(base_reference),
        advertiser_id: UserId::parse(&advertiser_id)
            .map_err(|e| decode_err("advertiser_id", Box::new(e)))?,
        ad_id: AdId::parse(&ad_id).map_err(|e| decode_err("ad_id", Box::new(e)))?,
        placement_id: PlacementId::parse(&placement_id)
            .map_err(|e| decode_err("placement_id", Box::new(e)))?,
        amount: decode_money(&amount, "amount")?,
        wallet_applied: decode_money(&wallet_applied, "wallet_applied")?,
        refund_applied: decode_money(&refund_applied, "refund_applied")?,
        amount_paid: decode_money(&amount_paid, "amount_paid")?,
        status: PaymentStatus::from_str(&status).map_err(|e| decode_err("status", e))?,
        is_reassignment: is_reassignment != 0,
        refund_used: refund_used != 0,
        refund_consumed: decode_money(&refund_consumed, "refund_consumed")?,
        refund_used_for_payment: refund_used_for
            .map(|s| PaymentId::parse(&s))
            .transpose()
            .map_err(|e| decode_err("refund_used_for_payment", Box::new(e)))?,
        created_at: TimeMs::new(created_at_ms),
        paid_at: paid_at_ms.map(TimeMs::new),
        refunded_at: refunded_at_ms.map(TimeMs::new),
    })
}

impl Repository {
    /// Insert a freshly initiated payment.
    pub async fn insert_payment(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, reference, base_reference, advertiser_id, ad_id, placement_id,
                amount, wallet_applied, refund_applied, amount_paid, status,
                is_reassignment, refund_used, refund_consumed, refund_used_for_payment,
                created_at_ms, paid_at_ms, refunded_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(payment.reference.as_str())
        .bind(payment.base_reference.as_str())
        .bind(payment.advertiser_id.to_string())
        .bind(payment.ad_id.to_string())
        .bind(payment.placement_id.to_string())
        .bind(payment.amount.to_canonical_string())
        .bind(payment.wallet_applied.to_canonical_string())
        .bind(payment.refund_applied.to_canonical_string())
        .bind(payment.amount_paid.to_canonical_string())
        .bind(payment.status.as_str())
        .bind(payment.is_reassignment as i64)
        .bind(payment.refund_used as i64)
        .bind(payment.refund_consumed.to_canonical_string())
        .bind(payment.refund_used_for_payment.map(|id| id.to_string()))
        .bind(payment.created_at.as_i64())
        .bind(payment.paid_at.map(|t| t.as_i64()))
        .bind(payment.refunded_at.map(|t| t.as_i64()))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Fetch a payment by id within a transaction.
    pub async fn get_payment(
        &self,
        conn: &mut SqliteConnection,
        id: PaymentId,
    ) -> Result<Option<Payment>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    /// Fetch a payment by id from the pool.
    pub async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    /// All sibling payments of one checkout, oldest first.
    ///
    /// Served by the `base_reference` index; the verification path loads the
    /// whole group through this.
    pub async fn payments_by_base_reference(
        &self,
        conn: &mut SqliteConnection,
        base_reference: &Reference,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM payments
            WHERE base_reference = ?
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .bind(base_reference.as_str())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    /// Mark a payment's terminal verification status.
    pub async fn mark_payment_verified(
        &self,
        conn: &mut SqliteConnection,
        id: PaymentId,
        status: PaymentStatus,
        paid_at: Option<TimeMs>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE payments SET status = ?, paid_at_ms = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(paid_at.map(|t| t.as_i64()))
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Move a successful payment into a refund state.
    pub async fn mark_payment_refunded(
        &self,
        conn: &mut SqliteConnection,
        id: PaymentId,
        status: PaymentStatus,
        refunded_at: TimeMs,
        refund_used: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE payments SET status = ?, refunded_at_ms = ?, refund_used = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(refunded_at.as_i64())
        .bind(refund_used as i64)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Refund sources for an advertiser: refunded payments with credit left,
    /// oldest refund first (FIFO).
    pub async fn refund_sources(
        &self,
        conn: &mut SqliteConnection,
        advertiser_id: UserId,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM payments
            WHERE advertiser_id = ?
              AND status IN ('refunded', 'internally_refunded')
              AND refund_used = 0
            ORDER BY refunded_at_ms ASC, id ASC
            "#,
        )
        .bind(advertiser_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    /// Record consumption of refund credit from one source payment.
    pub async fn record_refund_consumption(
        &self,
        conn: &mut SqliteConnection,
        source_id: PaymentId,
        consumed_total: Money,
        fully_used: bool,
        used_for: PaymentId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE payments
            SET refund_consumed = ?, refund_used = ?, refund_used_for_payment = ?
            WHERE id = ?
            "#,
        )
        .bind(consumed_total.to_canonical_string())
        .bind(fully_used as i64)
        .bind(used_for.to_string())
        .bind(source_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Record one `(consuming payment, source, amount)` attribution row.
    pub async fn insert_refund_allocation(
        &self,
        conn: &mut SqliteConnection,
        payment_id: PaymentId,
        source_payment_id: PaymentId,
        amount: Money,
        at: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO refund_allocations (payment_id, source_payment_id, amount, created_at_ms)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(payment_id.to_string())
        .bind(source_payment_id.to_string())
        .bind(amount.to_canonical_string())
        .bind(at.as_i64())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
