//! # Command Repository
//!
//! Per-device command queue backed by three tables.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  commands           command_queue                command_results        │
//! │  ───────────        ─────────────────────        ───────────────────    │
//! │  cmd-1 → body       #1 (UDID-1, cmd-1)            (UDID-2, cmd-1) → raw  │
//! │  cmd-2 → body       #2 (UDID-1, cmd-2)                                   │
//! │                     #3 (UDID-10, cmd-1)                                  │
//! │                                                                         │
//! │  enqueue:  one body per command, one queue row per (device, command)   │
//! │  next:     first queue row for the device, joined to its body          │
//! │  result:   delete queue row + write result, one transaction            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queue rows are matched on the exact `device_udid` column, so `UDID-1`
//! never sees the entries of `UDID-10`.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use vex_core::validation::{validate_command_batch, validate_command_uuid, validate_udid};
use vex_core::{
    Command, CommandResult, CommandStatus, DuplicatePolicy, QueueEntry, QueueOrder, ResultOutcome,
};

/// Repository for commands, queue entries and results.
#[derive(Debug, Clone)]
pub struct CommandRepository {
    pool: SqlitePool,
    queue_order: QueueOrder,
    duplicate_policy: DuplicatePolicy,
}

impl CommandRepository {
    /// Creates a new CommandRepository with explicit queue policies.
    pub fn new(pool: SqlitePool, queue_order: QueueOrder, duplicate_policy: DuplicatePolicy) -> Self {
        CommandRepository {
            pool,
            queue_order,
            duplicate_policy,
        }
    }

    fn order_by(&self) -> &'static str {
        match self.queue_order {
            // TEXT compares with BINARY collation: byte order of the UUID.
            QueueOrder::CommandId => "q.command_uuid ASC",
            QueueOrder::Enqueued => "q.id ASC",
        }
    }

    /// Stores every command body and queues every command for every device.
    ///
    /// ## Atomicity
    /// ```text
    /// BEGIN
    ///   for each command:
    ///     INSERT commands           (Reject: collision → DuplicateCommand)
    ///     for each device:
    ///       INSERT command_queue    (already queued → left in place)
    /// COMMIT                        (any error → nothing applied)
    /// ```
    pub async fn enqueue(&self, commands: &[Command], device_udids: &[String]) -> DbResult<()> {
        validate_command_batch(commands)?;
        for udid in device_udids {
            validate_udid(udid)?;
        }

        if commands.is_empty() {
            debug!("Empty command batch, nothing to enqueue");
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for command in commands {
            let insert = match self.duplicate_policy {
                DuplicatePolicy::Reject => {
                    r#"
                    INSERT INTO commands (command_uuid, request_type, payload, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    "#
                }
                DuplicatePolicy::Overwrite => {
                    r#"
                    INSERT INTO commands (command_uuid, request_type, payload, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(command_uuid) DO UPDATE SET
                        request_type = excluded.request_type,
                        payload = excluded.payload
                    "#
                }
            };

            sqlx::query(insert)
                .bind(&command.uuid)
                .bind(&command.request_type)
                .bind(&command.payload)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|err| match err {
                    sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                        warn!(command_uuid = %command.uuid, "Rejecting duplicate command");
                        DbError::DuplicateCommand {
                            command_uuid: command.uuid.clone(),
                        }
                    }
                    other => DbError::from(other),
                })?;

            for udid in device_udids {
                sqlx::query(
                    r#"
                    INSERT INTO command_queue (device_udid, command_uuid, enqueued_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(device_udid, command_uuid) DO NOTHING
                    "#,
                )
                .bind(udid)
                .bind(&command.uuid)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            commands = commands.len(),
            devices = device_udids.len(),
            "Commands enqueued"
        );

        Ok(())
    }

    /// Returns the next pending command for a device without removing it.
    ///
    /// ## Errors
    /// `InconsistentState` when the first queue entry references a command
    /// whose body is gone.
    pub async fn next_for_device(&self, udid: &str) -> DbResult<Option<Command>> {
        let sql = format!(
            r#"
            SELECT q.command_uuid AS command_uuid,
                   c.request_type AS request_type,
                   c.payload AS payload
            FROM command_queue q
            LEFT JOIN commands c ON c.command_uuid = q.command_uuid
            WHERE q.device_udid = ?1
            ORDER BY {}
            LIMIT 1
            "#,
            self.order_by()
        );

        let Some(row) = sqlx::query(&sql)
            .bind(udid)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let uuid: String = row.try_get("command_uuid")?;
        let request_type: Option<String> = row.try_get("request_type")?;
        let payload: Option<Vec<u8>> = row.try_get("payload")?;

        match (request_type, payload) {
            (Some(request_type), Some(payload)) => Ok(Some(Command {
                uuid,
                request_type,
                payload,
            })),
            _ => {
                warn!(udid = %udid, command_uuid = %uuid, "Queue entry without command body");
                Err(DbError::InconsistentState(format!(
                    "couldn't find enqueued command {uuid} for device {udid}"
                )))
            }
        }
    }

    /// Records a device's report and clears the matching queue entry.
    ///
    /// Both writes happen in one transaction. When no queue entry matched,
    /// the result is still kept unless one is already stored, and the
    /// outcome is [`ResultOutcome::Unsolicited`].
    pub async fn save_result(
        &self,
        udid: &str,
        command_uuid: &str,
        status: CommandStatus,
        raw: &[u8],
    ) -> DbResult<ResultOutcome> {
        validate_udid(udid)?;
        validate_command_uuid(command_uuid)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM command_queue WHERE device_udid = ?1 AND command_uuid = ?2",
        )
        .bind(udid)
        .bind(command_uuid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let (outcome, insert) = if removed > 0 {
            (
                ResultOutcome::Resolved,
                r#"
                INSERT INTO command_results (device_udid, command_uuid, status, result, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(device_udid, command_uuid) DO UPDATE SET
                    status = excluded.status,
                    result = excluded.result,
                    recorded_at = excluded.recorded_at
                "#,
            )
        } else {
            (
                ResultOutcome::Unsolicited,
                r#"
                INSERT INTO command_results (device_udid, command_uuid, status, result, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(device_udid, command_uuid) DO NOTHING
                "#,
            )
        };

        sqlx::query(insert)
            .bind(udid)
            .bind(command_uuid)
            .bind(status.as_str())
            .bind(raw)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        if outcome == ResultOutcome::Unsolicited {
            warn!(
                udid = %udid,
                command_uuid = %command_uuid,
                "Result for a command that was not outstanding"
            );
        } else {
            debug!(udid = %udid, command_uuid = %command_uuid, status = %status, "Command resolved");
        }

        Ok(outcome)
    }

    /// Gets the stored result for (device, command).
    pub async fn get_result(&self, udid: &str, command_uuid: &str) -> DbResult<Option<CommandResult>> {
        let row = sqlx::query(
            r#"
            SELECT device_udid, command_uuid, status, result, recorded_at
            FROM command_results
            WHERE device_udid = ?1 AND command_uuid = ?2
            "#,
        )
        .bind(udid)
        .bind(command_uuid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        let status = status
            .parse::<CommandStatus>()
            .map_err(|e| DbError::InconsistentState(e.to_string()))?;
        let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

        Ok(Some(CommandResult {
            device_udid: row.try_get("device_udid")?,
            command_uuid: row.try_get("command_uuid")?,
            status,
            raw: row.try_get("result")?,
            recorded_at,
        }))
    }

    /// Gets a stored command body by UUID.
    pub async fn get_command(&self, command_uuid: &str) -> DbResult<Option<Command>> {
        let command = sqlx::query_as::<_, Command>(
            r#"
            SELECT command_uuid AS uuid, request_type, payload
            FROM commands
            WHERE command_uuid = ?1
            "#,
        )
        .bind(command_uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(command)
    }

    /// Lists the pending entries for a device in delivery order.
    pub async fn pending_for_device(&self, udid: &str) -> DbResult<Vec<QueueEntry>> {
        let sql = format!(
            r#"
            SELECT q.id, q.device_udid, q.command_uuid, q.enqueued_at
            FROM command_queue q
            WHERE q.device_udid = ?1
            ORDER BY {}
            "#,
            self.order_by()
        );

        let entries = sqlx::query_as::<_, QueueEntry>(&sql)
            .bind(udid)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Counts pending entries for a device.
    pub async fn count_pending(&self, udid: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM command_queue WHERE device_udid = ?1")
                .bind(udid)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
