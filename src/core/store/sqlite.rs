// src/core/store/sqlite.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{check_transition, ScanStore, StoreError, StoreResult};
use crate::core::models::{PortRecord, Scan, ScanId, ScanResults, ScanStatus, VulnerabilityRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS scans (
        id BLOB PRIMARY KEY,
        target TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS subdomains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id BLOB NOT NULL REFERENCES scans(id),
        hostname TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS urls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id BLOB NOT NULL REFERENCES scans(id),
        url TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id BLOB NOT NULL REFERENCES scans(id),
        ip TEXT NOT NULL,
        port INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vulnerabilities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id BLOB NOT NULL REFERENCES scans(id),
        template_id TEXT NOT NULL,
        severity TEXT NOT NULL,
        matched_url TEXT NOT NULL,
        description TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_scans_started_at ON scans (started_at)",
];

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed store. Every append runs in its own transaction.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url`, e.g. `sqlite://scans.db`.
    pub async fn open(url: &str) -> StoreResult<Self> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(url, "Opened SQLite scan store.");
        Self::with_pool(pool).await
    }

    /// A private in-memory database, held by a single long-lived connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!("SQLite schema ready.");
        Ok(Self { pool })
    }

    /// Write transactions take the write lock up front. A deferred
    /// transaction that reads first and upgrades later fails with
    /// `SQLITE_BUSY` without waiting when another writer holds the lock.
    async fn begin_write(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn begin_append(&self, scan_id: ScanId) -> StoreResult<Transaction<'static, Sqlite>> {
        let mut tx = self.begin_write().await?;
        if read_status(&mut tx, scan_id).await?.is_none() {
            return Err(StoreError::ScanNotFound(scan_id));
        }
        Ok(tx)
    }
}

async fn read_status(tx: &mut Transaction<'static, Sqlite>, id: ScanId) -> StoreResult<Option<ScanStatus>> {
    let row = sqlx::query("SELECT status FROM scans WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let status: String = row.try_get("status")?;
    ScanStatus::from_str(&status)
        .map(Some)
        .map_err(|_| StoreError::Corrupt(format!("unknown scan status {status:?}")))
}

/// Error for a guarded status update that matched no row, judged by what the
/// row holds now.
fn lost_update(id: ScanId, requested: ScanStatus, now: Option<ScanStatus>) -> StoreError {
    match now {
        Some(status) if status.is_terminal() => StoreError::AlreadyTerminal { id, status, requested },
        Some(_) => StoreError::Conflict(id),
        None => StoreError::ScanNotFound(id),
    }
}

fn scan_from_row(row: &SqliteRow) -> StoreResult<Scan> {
    let status: String = row.try_get("status")?;
    let status = ScanStatus::from_str(&status)
        .map_err(|_| StoreError::Corrupt(format!("unknown scan status {status:?}")))?;
    Ok(Scan {
        id: row.try_get("id")?,
        target: row.try_get("target")?,
        status,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl ScanStore for SqliteStore {
    async fn create_scan(&self, id: ScanId, target: &str, started_at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("INSERT INTO scans (id, target, status, started_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(target)
            .bind(ScanStatus::InProgress.as_ref())
            .bind(started_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::DuplicateScan(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_scan_status(
        &self,
        id: ScanId,
        status: ScanStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let current = read_status(&mut tx, id).await?.ok_or(StoreError::ScanNotFound(id))?;
        check_transition(id, current, status)?;

        // The status guard keeps a concurrent writer from clobbering a terminal row.
        let updated = sqlx::query("UPDATE scans SET status = ?, finished_at = ? WHERE id = ? AND status = ?")
            .bind(status.as_ref())
            .bind(finished_at)
            .bind(id)
            .bind(current.as_ref())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            let now = read_status(&mut tx, id).await?;
            return Err(lost_update(id, status, now));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_subdomains(&self, scan_id: ScanId, hostnames: &[String]) -> StoreResult<()> {
        let mut tx = self.begin_append(scan_id).await?;
        for hostname in hostnames {
            sqlx::query("INSERT INTO subdomains (scan_id, hostname) VALUES (?, ?)")
                .bind(scan_id)
                .bind(hostname)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_urls(&self, scan_id: ScanId, urls: &[String]) -> StoreResult<()> {
        let mut tx = self.begin_append(scan_id).await?;
        for url in urls {
            sqlx::query("INSERT INTO urls (scan_id, url) VALUES (?, ?)")
                .bind(scan_id)
                .bind(url)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_ports(&self, scan_id: ScanId, records: &[PortRecord]) -> StoreResult<()> {
        let mut tx = self.begin_append(scan_id).await?;
        for record in records {
            sqlx::query("INSERT INTO ports (scan_id, ip, port) VALUES (?, ?, ?)")
                .bind(scan_id)
                .bind(&record.ip)
                .bind(i64::from(record.port))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_vulnerabilities(&self, scan_id: ScanId, records: &[VulnerabilityRecord]) -> StoreResult<()> {
        let mut tx = self.begin_append(scan_id).await?;
        for record in records {
            sqlx::query(
                "INSERT INTO vulnerabilities (scan_id, template_id, severity, matched_url, description)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(scan_id)
            .bind(&record.template_id)
            .bind(&record.severity)
            .bind(&record.matched_url)
            .bind(&record.description)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>> {
        let row = sqlx::query("SELECT * FROM scans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(scan_from_row).transpose()
    }

    async fn get_results(&self, id: ScanId) -> StoreResult<Option<ScanResults>> {
        if self.get_scan(id).await?.is_none() {
            return Ok(None);
        }

        let subdomains = sqlx::query("SELECT hostname FROM subdomains WHERE scan_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get("hostname"))
            .collect::<Result<Vec<String>, _>>()?;

        let urls = sqlx::query("SELECT url FROM urls WHERE scan_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get("url"))
            .collect::<Result<Vec<String>, _>>()?;

        let mut ports = Vec::new();
        for row in sqlx::query("SELECT ip, port FROM ports WHERE scan_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
        {
            let port: i64 = row.try_get("port")?;
            let port = u16::try_from(port).map_err(|_| StoreError::Corrupt(format!("port {port} out of range")))?;
            ports.push(PortRecord { ip: row.try_get("ip")?, port });
        }

        let mut vulnerabilities = Vec::new();
        for row in sqlx::query(
            "SELECT template_id, severity, matched_url, description FROM vulnerabilities
             WHERE scan_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        {
            vulnerabilities.push(VulnerabilityRecord {
                template_id: row.try_get("template_id")?,
                severity: row.try_get("severity")?,
                matched_url: row.try_get("matched_url")?,
                description: row.try_get("description")?,
            });
        }

        Ok(Some(ScanResults { subdomains, urls, ports, vulnerabilities }))
    }

    async fn list_scans(&self) -> StoreResult<Vec<Scan>> {
        sqlx::query("SELECT * FROM scans ORDER BY started_at DESC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(scan_from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn create_and_read_back() {
        contract::create_and_read_back(&store().await).await;
    }

    #[tokio::test]
    async fn rejects_duplicate_scan() {
        contract::rejects_duplicate_scan(&store().await).await;
    }

    #[tokio::test]
    async fn appends_accumulate_in_order() {
        contract::appends_accumulate_in_order(&store().await).await;
    }

    #[tokio::test]
    async fn rejects_appends_for_unknown_scan() {
        contract::rejects_appends_for_unknown_scan(&store().await).await;
    }

    #[tokio::test]
    async fn terminal_state_is_immutable() {
        contract::terminal_state_is_immutable(&store().await).await;
    }

    #[tokio::test]
    async fn status_update_for_unknown_scan_fails() {
        contract::status_update_for_unknown_scan_fails(&store().await).await;
    }

    #[tokio::test]
    async fn lists_newest_first() {
        contract::lists_newest_first(&store().await).await;
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("scans.db").display());
        let id = uuid::Uuid::new_v4();

        {
            let store = SqliteStore::open(&url).await.unwrap();
            store.create_scan(id, "example.com", Utc::now()).await.unwrap();
            store.append_urls(id, &["https://example.com/".into()]).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteStore::open(&url).await.unwrap();
        let results = reopened.get_results(id).await.unwrap().unwrap();
        assert_eq!(results.urls, vec!["https://example.com/"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_a_file_database_do_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("scans.db").display());
        let store = SqliteStore::open(&url).await.unwrap();

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let store = store.clone();
                tokio::spawn(async move {
                    for round in 0..50 {
                        let id = uuid::Uuid::new_v4();
                        store.create_scan(id, "example.com", Utc::now()).await?;
                        store.append_subdomains(id, &[format!("w{writer}-{round}.example.com")]).await?;
                        store.append_urls(id, &["https://example.com/".into()]).await?;
                        store.update_scan_status(id, ScanStatus::Completed, Some(Utc::now())).await?;
                    }
                    Ok::<_, StoreError>(())
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let scans = store.list_scans().await.unwrap();
        assert_eq!(scans.len(), 200);
        assert!(scans.iter().all(|s| s.status == ScanStatus::Completed));
    }

    #[test]
    fn lost_update_reports_the_status_the_row_has_now() {
        let id = uuid::Uuid::new_v4();
        assert!(matches!(
            lost_update(id, ScanStatus::Completed, Some(ScanStatus::Failed)),
            StoreError::AlreadyTerminal { status: ScanStatus::Failed, requested: ScanStatus::Completed, .. }
        ));
        assert!(matches!(
            lost_update(id, ScanStatus::Completed, Some(ScanStatus::InProgress)),
            StoreError::Conflict(conflicted) if conflicted == id
        ));
        assert!(matches!(lost_update(id, ScanStatus::Failed, None), StoreError::ScanNotFound(_)));
    }
}
