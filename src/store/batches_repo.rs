// Batches repository
// CRUD and aggregate queries for the local clock queue

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::models::{GeoPoint, PendingClockRecord, SiteRef, SyncBatch, SyncStatus};
use super::StoreManager;

const BATCH_COLUMNS: &str = "id, tenant_id, supervisor_id, supervisor_name, record_type, date, \
     site_id, site_name, worker_count, photo_local_path, photo_url, \
     latitude, longitude, accuracy, sync_status, sync_error, sync_attempts, \
     created_at, synced_at";

const RECORD_COLUMNS: &str = "id, batch_id, tenant_id, employee_id, employee_name, department, \
     date, clock_in, clock_out, record_type, supervisor_id, supervisor_name, \
     photo_local_path, photo_url, latitude, longitude, accuracy, site_id, site_name, \
     sync_status, sync_error, sync_attempts, created_at, synced_at";

impl StoreManager {
    /// Insert a batch row. Fails loudly; callers run this inside the
    /// submission transaction.
    pub fn insert_batch(&self, batch: &SyncBatch) -> Result<()> {
        self.with_connection(|conn| insert_batch_impl(conn, batch))
    }

    /// Insert a single clock record row.
    pub fn insert_clock_record(&self, record: &PendingClockRecord) -> Result<()> {
        self.with_connection(|conn| insert_clock_record_impl(conn, record))
    }

    /// Insert a batch and all of its records in one transaction, so a failure
    /// midway never leaves a batch whose worker_count disagrees with its rows.
    pub fn insert_batch_with_records(
        &self,
        batch: &SyncBatch,
        records: &[PendingClockRecord],
    ) -> Result<()> {
        self.with_transaction(|tx| {
            insert_batch_impl(tx, batch)?;
            for record in records {
                insert_clock_record_impl(tx, record)?;
            }
            Ok(())
        })
    }

    /// Get a batch by id
    pub fn get_batch(&self, batch_id: &str) -> Result<Option<SyncBatch>> {
        self.with_connection(|conn| get_batch_impl(conn, batch_id))
    }

    /// Batches still waiting to sync (pending or errored), newest first.
    pub fn get_pending_batches(&self) -> Result<Vec<SyncBatch>> {
        self.with_connection(get_pending_batches_impl)
    }

    /// Most recent batches regardless of status, for activity feeds.
    pub fn get_recent_batches(&self, limit: i32) -> Result<Vec<SyncBatch>> {
        self.with_connection(|conn| get_recent_batches_impl(conn, limit))
    }

    /// All records belonging to a batch.
    pub fn get_batch_records(&self, batch_id: &str) -> Result<Vec<PendingClockRecord>> {
        self.with_connection(|conn| get_batch_records_impl(conn, batch_id))
    }

    /// Count of batches not yet attempted, for badges.
    pub fn get_pending_count(&self) -> Result<i64> {
        self.with_connection(|conn| count_by_status_impl(conn, SyncStatus::Pending))
    }

    /// Count of batches whose last attempt failed.
    pub fn get_error_count(&self) -> Result<i64> {
        self.with_connection(|conn| count_by_status_impl(conn, SyncStatus::Error))
    }

    /// Clock-in records for the day whose employee has no matching clock-out
    /// record for the same tenant/day. Used to prompt supervisors about open
    /// shifts.
    pub fn get_today_clock_ins_without_clock_out(
        &self,
        tenant_id: &str,
        date: &str,
    ) -> Result<Vec<PendingClockRecord>> {
        self.with_connection(|conn| open_clock_ins_impl(conn, tenant_id, date))
    }

    /// Move a batch and all of its records to a new sync status.
    ///
    /// The attempt counter increments when the batch enters `uploading`
    /// (start of an attempt); `synced_at` is stamped only on the transition
    /// to `synced`. Batch and records always change together.
    pub fn update_sync_status(
        &self,
        batch_id: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.with_transaction(|tx| update_sync_status_impl(tx, batch_id, status, error))
    }

    /// Propagate a freshly obtained remote photo URL to the batch and all of
    /// its records, so a retry after a failed write never re-uploads.
    pub fn update_photo_url(&self, batch_id: &str, url: &str) -> Result<()> {
        self.with_transaction(|tx| update_photo_url_impl(tx, batch_id, url))
    }

    /// Delete a batch and its records (records first, then the batch row).
    pub fn delete_batch(&self, batch_id: &str) -> Result<()> {
        self.with_transaction(|tx| delete_batch_impl(tx, batch_id))
    }
}

fn insert_batch_impl(conn: &Connection, batch: &SyncBatch) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sync_batches (
            id, tenant_id, supervisor_id, supervisor_name, record_type, date,
            site_id, site_name, worker_count, photo_local_path, photo_url,
            latitude, longitude, accuracy, sync_status, sync_error, sync_attempts,
            created_at, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
        params![
            batch.id,
            batch.tenant_id,
            batch.supervisor_id,
            batch.supervisor_name,
            batch.record_type,
            batch.date,
            batch.site.as_ref().map(|s| s.id.clone()),
            batch.site.as_ref().map(|s| s.name.clone()),
            batch.worker_count,
            batch.photo_local_path,
            batch.photo_url,
            batch.geolocation.map(|g| g.latitude),
            batch.geolocation.map(|g| g.longitude),
            batch.geolocation.and_then(|g| g.accuracy),
            batch.sync_status,
            batch.sync_error,
            batch.sync_attempts,
            batch.created_at,
            batch.synced_at,
        ],
    )
    .context("Failed to insert batch")?;

    Ok(())
}

fn insert_clock_record_impl(conn: &Connection, record: &PendingClockRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO pending_clock_records (
            id, batch_id, tenant_id, employee_id, employee_name, department,
            date, clock_in, clock_out, record_type, supervisor_id, supervisor_name,
            photo_local_path, photo_url, latitude, longitude, accuracy, site_id, site_name,
            sync_status, sync_error, sync_attempts, created_at, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                  ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
        "#,
        params![
            record.id,
            record.batch_id,
            record.tenant_id,
            record.employee_id,
            record.employee_name,
            record.department,
            record.date,
            record.clock_in,
            record.clock_out,
            record.record_type,
            record.supervisor_id,
            record.supervisor_name,
            record.photo_local_path,
            record.photo_url,
            record.geolocation.map(|g| g.latitude),
            record.geolocation.map(|g| g.longitude),
            record.geolocation.and_then(|g| g.accuracy),
            record.site.as_ref().map(|s| s.id.clone()),
            record.site.as_ref().map(|s| s.name.clone()),
            record.sync_status,
            record.sync_error,
            record.sync_attempts,
            record.created_at,
            record.synced_at,
        ],
    )
    .context("Failed to insert clock record")?;

    Ok(())
}

fn map_batch_row(row: &Row<'_>) -> rusqlite::Result<SyncBatch> {
    let site_id: Option<String> = row.get(6)?;
    let site_name: Option<String> = row.get(7)?;
    let latitude: Option<f64> = row.get(11)?;
    let longitude: Option<f64> = row.get(12)?;
    let accuracy: Option<f64> = row.get(13)?;

    Ok(SyncBatch {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        supervisor_id: row.get(2)?,
        supervisor_name: row.get(3)?,
        record_type: row.get(4)?,
        date: row.get(5)?,
        site: zip_site(site_id, site_name),
        worker_count: row.get(8)?,
        photo_local_path: row.get(9)?,
        photo_url: row.get(10)?,
        geolocation: zip_geo(latitude, longitude, accuracy),
        sync_status: row.get(14)?,
        sync_error: row.get(15)?,
        sync_attempts: row.get(16)?,
        created_at: row.get(17)?,
        synced_at: row.get(18)?,
    })
}

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<PendingClockRecord> {
    let latitude: Option<f64> = row.get(14)?;
    let longitude: Option<f64> = row.get(15)?;
    let accuracy: Option<f64> = row.get(16)?;
    let site_id: Option<String> = row.get(17)?;
    let site_name: Option<String> = row.get(18)?;

    Ok(PendingClockRecord {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        tenant_id: row.get(2)?,
        employee_id: row.get(3)?,
        employee_name: row.get(4)?,
        department: row.get(5)?,
        date: row.get(6)?,
        clock_in: row.get(7)?,
        clock_out: row.get(8)?,
        record_type: row.get(9)?,
        supervisor_id: row.get(10)?,
        supervisor_name: row.get(11)?,
        photo_local_path: row.get(12)?,
        photo_url: row.get(13)?,
        geolocation: zip_geo(latitude, longitude, accuracy),
        site: zip_site(site_id, site_name),
        sync_status: row.get(19)?,
        sync_error: row.get(20)?,
        sync_attempts: row.get(21)?,
        created_at: row.get(22)?,
        synced_at: row.get(23)?,
    })
}

fn zip_site(id: Option<String>, name: Option<String>) -> Option<SiteRef> {
    match (id, name) {
        (Some(id), Some(name)) => Some(SiteRef { id, name }),
        _ => None,
    }
}

fn zip_geo(latitude: Option<f64>, longitude: Option<f64>, accuracy: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
            accuracy,
        }),
        _ => None,
    }
}

fn get_batch_impl(conn: &Connection, batch_id: &str) -> Result<Option<SyncBatch>> {
    let query = format!("SELECT {} FROM sync_batches WHERE id = ?", BATCH_COLUMNS);
    let mut stmt = conn
        .prepare(&query)
        .context("Failed to prepare get_batch query")?;

    let result = stmt.query_row(params![batch_id], map_batch_row);

    match result {
        Ok(batch) => Ok(Some(batch)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get batch"),
    }
}

fn get_pending_batches_impl(conn: &Connection) -> Result<Vec<SyncBatch>> {
    let query = format!(
        "SELECT {} FROM sync_batches WHERE sync_status IN ('pending', 'error') \
         ORDER BY created_at DESC",
        BATCH_COLUMNS
    );
    let mut stmt = conn
        .prepare(&query)
        .context("Failed to prepare get_pending_batches query")?;

    let batches = stmt
        .query_map([], map_batch_row)
        .context("Failed to query pending batches")?;

    batches
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect pending batches")
}

fn get_recent_batches_impl(conn: &Connection, limit: i32) -> Result<Vec<SyncBatch>> {
    let query = format!(
        "SELECT {} FROM sync_batches ORDER BY created_at DESC LIMIT ?",
        BATCH_COLUMNS
    );
    let mut stmt = conn
        .prepare(&query)
        .context("Failed to prepare get_recent_batches query")?;

    let batches = stmt
        .query_map(params![limit], map_batch_row)
        .context("Failed to query recent batches")?;

    batches
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect recent batches")
}

fn get_batch_records_impl(conn: &Connection, batch_id: &str) -> Result<Vec<PendingClockRecord>> {
    let query = format!(
        "SELECT {} FROM pending_clock_records WHERE batch_id = ? ORDER BY employee_name",
        RECORD_COLUMNS
    );
    let mut stmt = conn
        .prepare(&query)
        .context("Failed to prepare get_batch_records query")?;

    let records = stmt
        .query_map(params![batch_id], map_record_row)
        .context("Failed to query batch records")?;

    records
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect batch records")
}

fn count_by_status_impl(conn: &Connection, status: SyncStatus) -> Result<i64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sync_batches WHERE sync_status = ?",
            params![status],
            |row| row.get(0),
        )
        .context("Failed to count batches by status")?;

    Ok(count)
}

fn open_clock_ins_impl(
    conn: &Connection,
    tenant_id: &str,
    date: &str,
) -> Result<Vec<PendingClockRecord>> {
    let query = format!(
        r#"
        SELECT {} FROM pending_clock_records r
        WHERE r.tenant_id = ?1 AND r.date = ?2 AND r.record_type = 'clock_in'
          AND NOT EXISTS (
              SELECT 1 FROM pending_clock_records o
              WHERE o.tenant_id = r.tenant_id
                AND o.date = r.date
                AND o.employee_id = r.employee_id
                AND o.record_type = 'clock_out'
          )
        ORDER BY r.employee_name
        "#,
        RECORD_COLUMNS
    );
    let mut stmt = conn
        .prepare(&query)
        .context("Failed to prepare open clock-ins query")?;

    let records = stmt
        .query_map(params![tenant_id, date], map_record_row)
        .context("Failed to query open clock-ins")?;

    records
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect open clock-ins")
}

fn update_sync_status_impl(
    conn: &Connection,
    batch_id: &str,
    status: SyncStatus,
    error: Option<&str>,
) -> Result<()> {
    let synced_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        r#"
        UPDATE sync_batches
        SET sync_status = ?2,
            sync_error = ?3,
            sync_attempts = sync_attempts + (CASE WHEN ?2 = 'uploading' THEN 1 ELSE 0 END),
            synced_at = CASE WHEN ?2 = 'synced' THEN ?4 ELSE synced_at END
        WHERE id = ?1
        "#,
        params![batch_id, status, error, synced_at],
    )
    .context("Failed to update batch sync status")?;

    conn.execute(
        r#"
        UPDATE pending_clock_records
        SET sync_status = ?2,
            sync_error = ?3,
            sync_attempts = sync_attempts + (CASE WHEN ?2 = 'uploading' THEN 1 ELSE 0 END),
            synced_at = CASE WHEN ?2 = 'synced' THEN ?4 ELSE synced_at END
        WHERE batch_id = ?1
        "#,
        params![batch_id, status, error, synced_at],
    )
    .context("Failed to update record sync status")?;

    Ok(())
}

fn update_photo_url_impl(conn: &Connection, batch_id: &str, url: &str) -> Result<()> {
    conn.execute(
        "UPDATE sync_batches SET photo_url = ?2 WHERE id = ?1",
        params![batch_id, url],
    )
    .context("Failed to update batch photo url")?;

    conn.execute(
        "UPDATE pending_clock_records SET photo_url = ?2 WHERE batch_id = ?1",
        params![batch_id, url],
    )
    .context("Failed to update record photo urls")?;

    Ok(())
}

fn delete_batch_impl(conn: &Connection, batch_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM pending_clock_records WHERE batch_id = ?",
        params![batch_id],
    )
    .context("Failed to delete batch records")?;

    conn.execute("DELETE FROM sync_batches WHERE id = ?", params![batch_id])
        .context("Failed to delete batch")?;

    Ok(())
}
