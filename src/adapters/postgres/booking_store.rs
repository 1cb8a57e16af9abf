use crate::domain::{Booking, BookingId, BookingLogEntry, CivilDate, ResourceId, UserId};
use crate::ports::{
    BookingStore as BookingStoreTrait, DuplicateProbe, StatusChange, StoreError, StoreResult,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::audit_log::append_in_tx;
use super::rows::{BOOKING_COLUMNS, map_row_to_booking, store_error};

/// 申請者ごとの冪等キーの一意インデックス
const IDEMPOTENCY_KEY_CONSTRAINT: &str = "uq_bookings_idempotency_key";

/// BookingStoreのPostgreSQL実装
///
/// 予約の挿入・状態変更は、対応するログの追記と同じトランザクションでコミットする。
/// 挿入時はリソースIDのアドバイザリロックを取り、トランザクション内で重複を再確認する。
/// 複数のサーバープロセスが同じデータベースを使っても二重予約にならない。
pub struct BookingStore {
    pool: PgPool,
}

impl BookingStore {
    /// PostgreSQLコネクションプールから新しいBookingStoreを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_bookings(
        &self,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> StoreResult<Vec<Booking>> {
        let rows = query.fetch_all(&self.pool).await.map_err(store_error)?;
        rows.iter().map(map_row_to_booking).collect()
    }
}

#[async_trait]
impl BookingStoreTrait for BookingStore {
    async fn insert(&self, booking: Booking, entry: BookingLogEntry) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // 同じリソースへの挿入をトランザクション終了まで直列化
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(booking.resource_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        // 半開区間 [start, end) の重なり
        let taken = sqlx::query(
            r#"
            SELECT id
            FROM bookings
            WHERE resource_id = $1
              AND booking_date = $2
              AND status IN ('pending', 'confirmed')
              AND start_minute < $4
              AND start_minute + duration_hours * 60 > $3
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(booking.resource_id.as_str())
        .bind(booking.date)
        .bind(booking.window().start() as i32)
        .bind(booking.window().end() as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        if let Some(row) = taken {
            let existing: uuid::Uuid = row.try_get("id").map_err(store_error)?;
            return Err(StoreError::SlotTaken(BookingId::from_uuid(existing)));
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id,
                resource_id,
                resource_kind,
                resource_name,
                resource_category,
                resource_location,
                requester_id,
                booking_date,
                start_minute,
                duration_hours,
                status,
                total_cost,
                idempotency_key,
                created_at,
                status_changed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id.value())
        .bind(booking.resource_id.as_str())
        .bind(booking.resource_kind.as_str())
        .bind(&booking.resource_label.name)
        .bind(&booking.resource_label.category)
        .bind(booking.resource_label.location.as_deref())
        .bind(booking.requester_id.as_str())
        .bind(booking.date)
        .bind(booking.start_time.minutes_since_midnight() as i16)
        .bind(i16::from(booking.duration_hours.value()))
        .bind(booking.status.as_str())
        .bind(booking.total_cost)
        .bind(booking.idempotency_key.as_deref())
        .bind(booking.created_at)
        .bind(booking.status_changed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db)
                if db.constraint() == Some(IDEMPOTENCY_KEY_CONSTRAINT) =>
            {
                StoreError::IdempotencyKeyTaken(
                    booking.idempotency_key.clone().unwrap_or_default(),
                )
            }
            _ => store_error(e),
        })?;

        // ログが書けなければトランザクションごと破棄（drop時にロールバック）
        append_in_tx(&mut tx, &entry).await?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn apply_transition(
        &self,
        change: StatusChange,
        entry: BookingLogEntry,
    ) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $3, status_changed_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        );
        let updated = sqlx::query(&sql)
            .bind(change.booking_id.value())
            .bind(change.expected.as_str())
            .bind(change.new.as_str())
            .bind(change.changed_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

        let Some(row) = updated else {
            // 更新できなかった理由を調べる
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
                    .bind(change.booking_id.value())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_error)?;
            return match current {
                None => Err(StoreError::BookingNotFound(change.booking_id)),
                Some(actual) => Err(StoreError::StatusMismatch {
                    expected: change.expected,
                    actual: actual
                        .parse()
                        .map_err(|e: String| StoreError::Corrupted(format!("status: {e}")))?,
                }),
            };
        };
        let booking = map_row_to_booking(&row)?;

        append_in_tx(&mut tx, &entry).await?;

        tx.commit().await.map_err(store_error)?;
        Ok(booking)
    }

    async fn get(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(booking_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(map_row_to_booking).transpose()
    }

    async fn find_by_resource(
        &self,
        resource_id: &ResourceId,
        from: CivilDate,
        to: CivilDate,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE resource_id = $1 AND booking_date BETWEEN $2 AND $3
            ORDER BY booking_date ASC, start_minute ASC
            "#
        );
        self.fetch_bookings(
            sqlx::query(&sql)
                .bind(resource_id.as_str())
                .bind(from)
                .bind(to),
        )
        .await
    }

    async fn find_active_by_resource(
        &self,
        resource_id: &ResourceId,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE resource_id = $1 AND status IN ('pending', 'confirmed')
            ORDER BY booking_date ASC, start_minute ASC, created_at ASC
            "#
        );
        self.fetch_bookings(sqlx::query(&sql).bind(resource_id.as_str()))
            .await
    }

    async fn find_by_requester(&self, requester_id: &UserId) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE requester_id = $1
            ORDER BY booking_date DESC, start_minute DESC, created_at DESC
            "#
        );
        self.fetch_bookings(sqlx::query(&sql).bind(requester_id.as_str()))
            .await
    }

    async fn list_all(&self) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            ORDER BY booking_date DESC, start_minute DESC, created_at DESC
            "#
        );
        self.fetch_bookings(sqlx::query(&sql)).await
    }

    async fn find_duplicate(&self, probe: &DuplicateProbe) -> StoreResult<Option<Booking>> {
        let row = match &probe.idempotency_key {
            Some(key) => {
                let sql = format!(
                    r#"
                    SELECT {BOOKING_COLUMNS}
                    FROM bookings
                    WHERE requester_id = $1 AND idempotency_key = $2
                    "#
                );
                sqlx::query(&sql)
                    .bind(probe.requester_id.as_str())
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT {BOOKING_COLUMNS}
                    FROM bookings
                    WHERE requester_id = $1
                      AND resource_id = $2
                      AND booking_date = $3
                      AND start_minute = $4
                      AND duration_hours = $5
                      AND status = 'pending'
                      AND created_at >= $6
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#
                );
                sqlx::query(&sql)
                    .bind(probe.requester_id.as_str())
                    .bind(probe.resource_id.as_str())
                    .bind(probe.date)
                    .bind(probe.start_time.minutes_since_midnight() as i16)
                    .bind(i16::from(probe.duration_hours.value()))
                    .bind(probe.created_since)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(store_error)?;

        row.as_ref().map(map_row_to_booking).transpose()
    }
}
