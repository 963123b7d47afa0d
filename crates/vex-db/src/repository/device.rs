//! # Device Repository
//!
//! Device registry storage: one row per UDID.
//!
//! ## Write Pattern
//! ```text
//! Authenticate       ──► save(Device::new + descriptors)   push fields cleared
//! TokenUpdate        ──► get → set token/magic/unlock → save
//! SetBootstrapToken  ──► get → set bootstrap_token → save
//! ```
//! Saves are full-record upserts; `created_at` survives re-authentication.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use vex_core::Device;

const DEVICE_COLUMNS: &str = r#"
    udid, build_version, name, imei, meid, model, model_name, os_version,
    product_name, serial_number, push_magic, token, unlock_token,
    bootstrap_token, created_at, updated_at
"#;

/// Repository for device records.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceRepository { pool }
    }

    /// Gets a device by UDID.
    pub async fn get_by_udid(&self, udid: &str) -> DbResult<Option<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE udid = ?1");

        let device = sqlx::query_as::<_, Device>(&sql)
            .bind(udid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(device)
    }

    /// Inserts or fully replaces a device record.
    ///
    /// `updated_at` is stamped with the current time. `created_at` is only
    /// written on first insert.
    pub async fn save(&self, device: &Device) -> DbResult<()> {
        let now = Utc::now();

        debug!(udid = %device.udid, "Saving device");

        sqlx::query(
            r#"
            INSERT INTO devices (
                udid, build_version, name, imei, meid, model, model_name,
                os_version, product_name, serial_number, push_magic, token,
                unlock_token, bootstrap_token, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16
            )
            ON CONFLICT(udid) DO UPDATE SET
                build_version = excluded.build_version,
                name = excluded.name,
                imei = excluded.imei,
                meid = excluded.meid,
                model = excluded.model,
                model_name = excluded.model_name,
                os_version = excluded.os_version,
                product_name = excluded.product_name,
                serial_number = excluded.serial_number,
                push_magic = excluded.push_magic,
                token = excluded.token,
                unlock_token = excluded.unlock_token,
                bootstrap_token = excluded.bootstrap_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&device.udid)
        .bind(&device.build_version)
        .bind(&device.name)
        .bind(&device.imei)
        .bind(&device.meid)
        .bind(&device.model)
        .bind(&device.model_name)
        .bind(&device.os_version)
        .bind(&device.product_name)
        .bind(&device.serial_number)
        .bind(&device.push_magic)
        .bind(&device.token)
        .bind(&device.unlock_token)
        .bind(&device.bootstrap_token)
        .bind(device.created_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists every device, ordered by UDID.
    pub async fn list(&self) -> DbResult<Vec<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY udid");

        let devices = sqlx::query_as::<_, Device>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(devices)
    }

    /// Counts registered devices.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use vex_core::Device;

    async fn repo() -> super::DeviceRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().devices()
    }

    #[tokio::test]
    async fn test_missing_device_is_none() {
        let repo = repo().await;
        assert!(repo.get_by_udid("UDID-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let repo = repo().await;

        let mut device = Device::new("UDID-1");
        device.model = Some("iPhone".to_string());
        device.serial_number = Some("C02XYZ".to_string());
        device.token = Some(vec![1, 2, 3]);
        device.push_magic = Some("magic".to_string());
        repo.save(&device).await.unwrap();

        let loaded = repo.get_by_udid("UDID-1").await.unwrap().unwrap();
        assert_eq!(loaded.model.as_deref(), Some("iPhone"));
        assert_eq!(loaded.serial_number.as_deref(), Some("C02XYZ"));
        assert_eq!(loaded.token, Some(vec![1, 2, 3]));
        assert_eq!(loaded.push_magic.as_deref(), Some("magic"));
        assert!(loaded.unlock_token.is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_record() {
        let repo = repo().await;

        let mut device = Device::new("UDID-1");
        device.token = Some(vec![9]);
        device.push_magic = Some("magic".to_string());
        repo.save(&device).await.unwrap();

        let first = repo.get_by_udid("UDID-1").await.unwrap().unwrap();

        // A fresh record for the same UDID clears push credentials.
        let mut reset = Device::new("UDID-1");
        reset.model = Some("iPad".to_string());
        repo.save(&reset).await.unwrap();

        let loaded = repo.get_by_udid("UDID-1").await.unwrap().unwrap();
        assert_eq!(loaded.model.as_deref(), Some("iPad"));
        assert!(loaded.token.is_none());
        assert!(loaded.push_magic.is_none());
        assert_eq!(loaded.created_at, first.created_at);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_udid() {
        let repo = repo().await;

        for udid in ["UDID-3", "UDID-1", "UDID-2"] {
            repo.save(&Device::new(udid)).await.unwrap();
        }

        let udids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.udid)
            .collect();
        assert_eq!(udids, vec!["UDID-1", "UDID-2", "UDID-3"]);
    }
}
