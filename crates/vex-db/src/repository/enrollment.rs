//! # Enrollment Repository
//!
//! Keeps the last identity envelope seen for each enrollment. Device-channel
//! enrollments are keyed by UDID, user-channel enrollments by their
//! EnrollmentID (see [`Enrollment::storage_key`]).

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vex_core::Enrollment;

/// Repository for enrollment envelopes.
#[derive(Debug, Clone)]
pub struct EnrollmentRepository {
    pool: SqlitePool,
}

impl EnrollmentRepository {
    /// Creates a new EnrollmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EnrollmentRepository { pool }
    }

    /// Inserts or replaces the envelope stored under its storage key.
    pub async fn save(&self, enrollment: &Enrollment) -> DbResult<()> {
        let key = enrollment.storage_key();

        debug!(enrollment_key = %key, udid = %enrollment.udid, "Saving enrollment");

        sqlx::query(
            r#"
            INSERT INTO enrollments (
                enrollment_key, udid, enrollment_user_id, user_id,
                user_short_name, user_long_name, enrollment_id, topic, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(enrollment_key) DO UPDATE SET
                udid = excluded.udid,
                enrollment_user_id = excluded.enrollment_user_id,
                user_id = excluded.user_id,
                user_short_name = excluded.user_short_name,
                user_long_name = excluded.user_long_name,
                enrollment_id = excluded.enrollment_id,
                topic = excluded.topic,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&enrollment.udid)
        .bind(&enrollment.enrollment_user_id)
        .bind(&enrollment.user_id)
        .bind(&enrollment.user_short_name)
        .bind(&enrollment.user_long_name)
        .bind(&enrollment.enrollment_id)
        .bind(&enrollment.topic)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the envelope stored under `key`.
    pub async fn get_by_key(&self, key: &str) -> DbResult<Option<Enrollment>> {
        let row = sqlx::query(
            r#"
            SELECT udid, enrollment_user_id, user_id, user_short_name,
                   user_long_name, enrollment_id, topic
            FROM enrollments
            WHERE enrollment_key = ?1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Enrollment {
            udid: row.try_get("udid")?,
            enrollment_user_id: row.try_get("enrollment_user_id")?,
            user_id: row.try_get("user_id")?,
            user_short_name: row.try_get("user_short_name")?,
            user_long_name: row.try_get("user_long_name")?,
            enrollment_id: row.try_get("enrollment_id")?,
            topic: row.try_get("topic")?,
        }))
    }
}
