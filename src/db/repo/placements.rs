//! Ad, category, slot, and placement operations for the repository.

use crate::domain::{
    Ad, AdId, Category, CategoryId, PaymentId, PaymentStatus, Placement, PlacementId,
    PlacementStatus, TimeMs, UserId, WebsiteId,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::{decode_err, decode_money, Repository};

fn ad_from_row(row: &SqliteRow) -> Result<Ad, sqlx::Error> {
    let id: String = row.get("id");
    let advertiser_id: String = row.get("advertiser_id");
    let confirmed: i64 = row.get("confirmed");
    let available: i64 = row.get("available_for_reassignment");

    Ok(Ad {
        id: AdId::parse(&id).map_err(|e| decode_err("id", Box::new(e)))?,
        advertiser_id: UserId::parse(&advertiser_id)
            .map_err(|e| decode_err("advertiser_id", Box::new(e)))?,
        confirmed: confirmed != 0,
        available_for_reassignment: available != 0,
    })
}

fn category_from_row(row: &SqliteRow) -> Result<Category, sqlx::Error> {
    let id: String = row.get("id");
    let website_id: String = row.get("website_id");
    let owner_id: String = row.get("owner_id");
    let price: String = row.get("price");
    let capacity: i64 = row.get("capacity");

    Ok(Category {
        id: CategoryId::parse(&id).map_err(|e| decode_err("id", Box::new(e)))?,
        website_id: WebsiteId::parse(&website_id)
            .map_err(|e| decode_err("website_id", Box::new(e)))?,
        owner_id: UserId::parse(&owner_id).map_err(|e| decode_err("owner_id", Box::new(e)))?,
        price: decode_money(&price, "price")?,
        capacity,
    })
}

fn placement_from_row(row: &SqliteRow) -> Result<Placement, sqlx::Error> {
    let id: String = row.get("id");
    let ad_id: String = row.get("ad_id");
    let website_id: String = row.get("website_id");
    let category_id: String = row.get("category_id");
    let status: String = row.get("status");
    let approved: i64 = row.get("approved");
    let is_rejected: i64 = row.get("is_rejected");
    let rejection_deadline_ms: Option<i64> = row.get("rejection_deadline_ms");
    let is_rejectable: i64 = row.get("is_rejectable");
    let payment_id: Option<String> = row.get("payment_id");
    let rejected_by: Option<String> = row.get("rejected_by");
    let rejected_at_ms: Option<i64> = row.get("rejected_at_ms");
    let rejection_reason: Option<String> = row.get("rejection_reason");

    Ok(Placement {
        id: PlacementId::parse(&id).map_err(|e| decode_err("id", Box::new(e)))?,
        ad_id: AdId::parse(&ad_id).map_err(|e| decode_err("ad_id", Box::new(e)))?,
        website_id: WebsiteId::parse(&website_id)
            .map_err(|e| decode_err("website_id", Box::new(e)))?,
        category_id: CategoryId::parse(&category_id)
            .map_err(|e| decode_err("category_id", Box::new(e)))?,
        status: PlacementStatus::from_str(&status).map_err(|e| decode_err("status", e))?,
        approved: approved != 0,
        is_rejected: is_rejected != 0,
        rejection_deadline: rejection_deadline_ms.map(TimeMs::new),
        is_rejectable: is_rejectable != 0,
        payment_id: payment_id
            .map(|s| PaymentId::parse(&s))
            .transpose()
            .map_err(|e| decode_err("payment_id", Box::new(e)))?,
        rejected_by: rejected_by
            .map(|s| UserId::parse(&s))
            .transpose()
            .map_err(|e| decode_err("rejected_by", Box::new(e)))?,
        rejected_at: rejected_at_ms.map(TimeMs::new),
        rejection_reason,
    })
}

impl Repository {
    // =========================================================================
    // Ad operations
    // =========================================================================

    /// Insert an ad.
    pub async fn insert_ad(
        &self,
        conn: &mut SqliteConnection,
        ad: &Ad,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ads (id, advertiser_id, confirmed, available_for_reassignment)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(ad.id.to_string())
        .bind(ad.advertiser_id.to_string())
        .bind(ad.confirmed as i64)
        .bind(ad.available_for_reassignment as i64)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Fetch an ad by id within a transaction.
    pub async fn get_ad(
        &self,
        conn: &mut SqliteConnection,
        id: AdId,
    ) -> Result<Option<Ad>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM ads WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(ad_from_row).transpose()
    }

    /// Fetch an ad by id from the pool.
    pub async fn find_ad(&self, id: AdId) -> Result<Option<Ad>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM ads WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(ad_from_row).transpose()
    }

    /// Persist an ad's confirmation/reassignment flags.
    pub async fn update_ad_flags(
        &self,
        conn: &mut SqliteConnection,
        ad: &Ad,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE ads SET confirmed = ?, available_for_reassignment = ? WHERE id = ?")
            .bind(ad.confirmed as i64)
            .bind(ad.available_for_reassignment as i64)
            .bind(ad.id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Category reference data
    // =========================================================================

    /// Insert a category (normally done by the external CRUD layer).
    pub async fn insert_category(
        &self,
        conn: &mut SqliteConnection,
        category: &Category,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, website_id, owner_id, price, capacity)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(category.id.to_string())
        .bind(category.website_id.to_string())
        .bind(category.owner_id.to_string())
        .bind(category.price.to_canonical_string())
        .bind(category.capacity)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Re-read a category inside the caller's transaction (fresh pricing).
    pub async fn get_category(
        &self,
        conn: &mut SqliteConnection,
        id: CategoryId,
    ) -> Result<Option<Category>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(category_from_row).transpose()
    }

    /// Number of ads currently occupying a category's slots.
    pub async fn slot_count(
        &self,
        conn: &mut SqliteConnection,
        category_id: CategoryId,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM category_slots WHERE category_id = ?")
            .bind(category_id.to_string())
            .fetch_one(&mut *conn)
            .await?;

        Ok(row.get::<i64, _>("n"))
    }

    /// Occupy one slot. Idempotent per `(category, ad)`.
    pub async fn occupy_slot(
        &self,
        conn: &mut SqliteConnection,
        category_id: CategoryId,
        ad_id: AdId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO category_slots (category_id, ad_id)
            VALUES (?, ?)
            ON CONFLICT(category_id, ad_id) DO NOTHING
            "#,
        )
        .bind(category_id.to_string())
        .bind(ad_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Free the slot an ad held in a category.
    pub async fn release_slot(
        &self,
        conn: &mut SqliteConnection,
        category_id: CategoryId,
        ad_id: AdId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM category_slots WHERE category_id = ? AND ad_id = ?")
            .bind(category_id.to_string())
            .bind(ad_id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Whether an ad holds a slot in a category.
    pub async fn slot_held(
        &self,
        category_id: CategoryId,
        ad_id: AdId,
    ) -> Result<bool, sqlx::Error> {
        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM category_slots WHERE category_id = ? AND ad_id = ?")
                .bind(category_id.to_string())
                .bind(ad_id.to_string())
                .fetch_one(self.pool())
                .await?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    // =========================================================================
    // Placement operations
    // =========================================================================

    /// Insert a placement.
    pub async fn insert_placement(
        &self,
        conn: &mut SqliteConnection,
        placement: &Placement,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO placements (
                id, ad_id, website_id, category_id, status, approved, is_rejected,
                rejection_deadline_ms, is_rejectable, payment_id,
                rejected_by, rejected_at_ms, rejection_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(placement.id.to_string())
        .bind(placement.ad_id.to_string())
        .bind(placement.website_id.to_string())
        .bind(placement.category_id.to_string())
        .bind(placement.status.as_str())
        .bind(placement.approved as i64)
        .bind(placement.is_rejected as i64)
        .bind(placement.rejection_deadline.map(|t| t.as_i64()))
        .bind(placement.is_rejectable as i64)
        .bind(placement.payment_id.map(|id| id.to_string()))
        .bind(placement.rejected_by.map(|id| id.to_string()))
        .bind(placement.rejected_at.map(|t| t.as_i64()))
        .bind(placement.rejection_reason.as_deref())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Persist a placement's full state after a transition.
    pub async fn update_placement(
        &self,
        conn: &mut SqliteConnection,
        placement: &Placement,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE placements
            SET status = ?, approved = ?, is_rejected = ?, rejection_deadline_ms = ?,
                is_rejectable = ?, payment_id = ?, rejected_by = ?, rejected_at_ms = ?,
                rejection_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(placement.status.as_str())
        .bind(placement.approved as i64)
        .bind(placement.is_rejected as i64)
        .bind(placement.rejection_deadline.map(|t| t.as_i64()))
        .bind(placement.is_rejectable as i64)
        .bind(placement.payment_id.map(|id| id.to_string()))
        .bind(placement.rejected_by.map(|id| id.to_string()))
        .bind(placement.rejected_at.map(|t| t.as_i64()))
        .bind(placement.rejection_reason.as_deref())
        .bind(placement.id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Fetch a placement by id within a transaction.
    pub async fn get_placement(
        &self,
        conn: &mut SqliteConnection,
        id: PlacementId,
    ) -> Result<Option<Placement>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM placements WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(placement_from_row).transpose()
    }

    /// Fetch a placement by id from the pool.
    pub async fn find_placement(
        &self,
        id: PlacementId,
    ) -> Result<Option<Placement>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM placements WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(placement_from_row).transpose()
    }

    /// A live placement for the `(ad, website, category)` triple. Rejected
    /// placements and placements stranded by a failed payment do not count;
    /// the ad may be placed there again.
    pub async fn placement_by_selection(
        &self,
        conn: &mut SqliteConnection,
        ad_id: AdId,
        website_id: WebsiteId,
        category_id: CategoryId,
    ) -> Result<Option<Placement>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT pl.* FROM placements pl
             LEFT JOIN payments pay ON pay.id = pl.payment_id
             WHERE pl.ad_id = ? AND pl.website_id = ? AND pl.category_id = ?
               AND pl.status != ?
               AND (pay.status IS NULL OR pay.status != ?)",
        )
        .bind(ad_id.to_string())
        .bind(website_id.to_string())
        .bind(category_id.to_string())
        .bind(PlacementStatus::Rejected.as_str())
        .bind(PaymentStatus::Failed.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(placement_from_row).transpose()
    }

    /// Count an ad's placements in a given status, optionally excluding one.
    pub async fn count_placements_in_status(
        &self,
        conn: &mut SqliteConnection,
        ad_id: AdId,
        status: PlacementStatus,
        excluding: Option<PlacementId>,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM placements
            WHERE ad_id = ? AND status = ? AND (? IS NULL OR id != ?)
            "#,
        )
        .bind(ad_id.to_string())
        .bind(status.as_str())
        .bind(excluding.map(|id| id.to_string()))
        .bind(excluding.map(|id| id.to_string()))
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.get::<i64, _>("n"))
    }

    /// Active, still-rejectable placements whose deadline (plus grace) has
    /// passed. Served by the deadline index; used by the sweeper.
    pub async fn expired_rejectable_placements(
        &self,
        conn: &mut SqliteConnection,
        cutoff_grace_ms: i64,
        now: TimeMs,
        limit: i64,
    ) -> Result<Vec<Placement>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM placements
            WHERE status = 'active'
              AND is_rejectable = 1
              AND rejection_deadline_ms IS NOT NULL
              AND rejection_deadline_ms + ? < ?
            ORDER BY rejection_deadline_ms ASC
            LIMIT ?
            "#,
        )
        .bind(cutoff_grace_ms)
        .bind(now.as_i64())
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(placement_from_row).collect()
    }

    /// Revoke rejectability for a swept placement.
    pub async fn clear_rejectable(
        &self,
        conn: &mut SqliteConnection,
        id: PlacementId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE placements SET is_rejectable = 0 WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
