//! Persisted registry of recurring jobs
//!
//! The scheduler keeps one row per job name. `next_run_at` drives firing and
//! `lease_until` keeps two processes sharing the database from running the
//! same firing. All timestamps are stored fixed-width so they compare as text.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::config::MAX_SYNC_INTERVAL_MINUTES;
use crate::db::sqlite_helpers::{
    datetime_to_str, decode_datetime, decode_datetime_opt, now_iso8601,
};
use crate::error::SyncResult;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJobRecord {
    pub name: String,
    pub interval_minutes: i64,
    pub misfire_grace_seconds: i64,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub lease_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJobRecord {
    /// Stored interval, clamped to between one minute and one year
    pub fn interval(&self) -> Duration {
        let minutes = self.interval_minutes.clamp(1, MAX_SYNC_INTERVAL_MINUTES);
        Duration::try_minutes(minutes).unwrap_or_else(|| Duration::minutes(1))
    }

    pub fn misfire_grace(&self) -> Duration {
        Duration::seconds(self.misfire_grace_seconds)
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ScheduledJobRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let next_run_at: String = row.try_get("next_run_at")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self {
            name: row.try_get("name")?,
            interval_minutes: row.try_get("interval_minutes")?,
            misfire_grace_seconds: row.try_get("misfire_grace_seconds")?,
            next_run_at: decode_datetime(&next_run_at)?,
            last_run_at: decode_datetime_opt(row.try_get("last_run_at")?)?,
            lease_until: decode_datetime_opt(row.try_get("lease_until")?)?,
            created_at: decode_datetime(&created_at)?,
        })
    }
}

pub struct ScheduledJobRepository {
    pool: SqlitePool,
}

impl ScheduledJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a job unless the name already exists. Returns whether a row
    /// was inserted; an existing registration keeps its persisted interval.
    pub async fn register(
        &self,
        name: &str,
        interval_minutes: i64,
        misfire_grace_seconds: i64,
        first_run_at: DateTime<Utc>,
    ) -> SyncResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (name, interval_minutes, misfire_grace_seconds,
                                        next_run_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(interval_minutes)
        .bind(misfire_grace_seconds)
        .bind(datetime_to_str(first_run_at))
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted > 0)
    }

    pub async fn list(&self) -> SyncResult<Vec<ScheduledJobRecord>> {
        let records =
            sqlx::query_as::<_, ScheduledJobRecord>("SELECT * FROM scheduled_jobs ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(records)
    }

    pub async fn get(&self, name: &str) -> SyncResult<Option<ScheduledJobRecord>> {
        let record =
            sqlx::query_as::<_, ScheduledJobRecord>("SELECT * FROM scheduled_jobs WHERE name = ?1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Claim the firing observed at `observed_next_run_at`.
    ///
    /// Succeeds only if nobody advanced the job since it was read and no
    /// unexpired lease is held. On success the next run is moved to
    /// `next_run_at` and the lease is held until `lease_until`.
    pub async fn try_claim(
        &self,
        name: &str,
        observed_next_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> SyncResult<bool> {
        let claimed = sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET next_run_at = ?1, lease_until = ?2
            WHERE name = ?3
                AND next_run_at = ?4
                AND (lease_until IS NULL OR lease_until <= ?5)
            "#,
        )
        .bind(datetime_to_str(next_run_at))
        .bind(datetime_to_str(lease_until))
        .bind(name)
        .bind(datetime_to_str(observed_next_run_at))
        .bind(datetime_to_str(now))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(claimed > 0)
    }

    /// Drop the lease, recording `ran_at` when the firing actually ran
    pub async fn release(&self, name: &str, ran_at: Option<DateTime<Utc>>) -> SyncResult<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET lease_until = NULL, last_run_at = COALESCE(?1, last_run_at)
            WHERE name = ?2
            "#,
        )
        .bind(ran_at.map(datetime_to_str))
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    #[tokio::test]
    async fn register_is_idempotent_and_keeps_interval() {
        let (db, _dir) = test_db().await;
        let jobs = db.scheduled_jobs();
        let now = Utc::now();

        assert!(jobs.register("database_update_job", 15, 20, now).await.unwrap());
        assert!(!jobs.register("database_update_job", 60, 20, now).await.unwrap());

        let all = jobs.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].interval_minutes, 15);
    }

    #[tokio::test]
    async fn out_of_range_stored_interval_is_clamped() {
        let (db, _dir) = test_db().await;
        let jobs = db.scheduled_jobs();
        jobs.register("job", i64::MAX, 20, Utc::now()).await.unwrap();

        let record = jobs.get("job").await.unwrap().unwrap();
        assert_eq!(record.interval(), Duration::minutes(MAX_SYNC_INTERVAL_MINUTES));
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let (db, _dir) = test_db().await;
        let jobs = db.scheduled_jobs();
        let now = Utc::now();
        jobs.register("job", 15, 20, now).await.unwrap();
        let observed = jobs.get("job").await.unwrap().unwrap().next_run_at;
        let next = now + Duration::minutes(15);
        let lease = now + Duration::minutes(5);

        assert!(jobs.try_claim("job", observed, next, now, lease).await.unwrap());
        // A second claimer holding the stale observation loses
        assert!(!jobs.try_claim("job", observed, next, now, lease).await.unwrap());
        // Even with the fresh observation, the lease blocks
        assert!(!jobs.try_claim("job", next, next, now, lease).await.unwrap());

        jobs.release("job", Some(now)).await.unwrap();
        let record = jobs.get("job").await.unwrap().unwrap();
        assert_eq!(record.lease_until, None);
        assert!(record.last_run_at.is_some());
        assert_eq!(datetime_to_str(record.next_run_at), datetime_to_str(next));
    }
}
