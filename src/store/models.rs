// Store models - batches and pending clock records

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// What kind of clock event a batch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    ClockIn,
    ClockOut,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::ClockIn => "clock_in",
            RecordType::ClockOut => "clock_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clock_in" => Some(RecordType::ClockIn),
            "clock_out" => Some(RecordType::ClockOut),
            _ => None,
        }
    }
}

impl ToSql for RecordType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecordType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        RecordType::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

/// Local sync lifecycle of a batch and its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Uploading,
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Uploading => "uploading",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "uploading" => Some(SyncStatus::Uploading),
            "synced" => Some(SyncStatus::Synced),
            "error" => Some(SyncStatus::Error),
            _ => None,
        }
    }
}

impl ToSql for SyncStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SyncStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        SyncStatus::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

/// Device location captured at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

/// Work site the batch was submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    pub id: String,
    pub name: String,
}

/// A supervisor-initiated bulk clock action covering N workers, sharing one
/// photo/location/site context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    pub id: String,
    pub tenant_id: String,
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub record_type: RecordType,
    /// Calendar day, "YYYY-MM-DD".
    pub date: String,
    pub site: Option<SiteRef>,
    pub worker_count: i32,
    pub photo_local_path: Option<String>,
    pub photo_url: Option<String>,
    pub geolocation: Option<GeoPoint>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub sync_attempts: i32,
    pub created_at: String,
    pub synced_at: Option<String>,
}

impl SyncBatch {
    pub fn new(
        tenant_id: String,
        supervisor_id: String,
        supervisor_name: String,
        record_type: RecordType,
        date: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            supervisor_id,
            supervisor_name,
            record_type,
            date,
            site: None,
            worker_count: 0,
            photo_local_path: None,
            photo_url: None,
            geolocation: None,
            sync_status: SyncStatus::Pending,
            sync_error: None,
            sync_attempts: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
            synced_at: None,
        }
    }
}

/// One worker's clock event within a batch. Owned by its parent batch,
/// never created independently. Exactly one of clock_in/clock_out is set,
/// matching record_type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingClockRecord {
    pub id: String,
    pub batch_id: String,
    pub tenant_id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub department: Option<String>,
    pub date: String,
    pub clock_in: Option<String>,
    pub clock_out: Option<String>,
    pub record_type: RecordType,
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub photo_local_path: Option<String>,
    pub photo_url: Option<String>,
    pub geolocation: Option<GeoPoint>,
    pub site: Option<SiteRef>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub sync_attempts: i32,
    pub created_at: String,
    pub synced_at: Option<String>,
}

impl PendingClockRecord {
    /// Build a record for a batch, placing the clock value on the side that
    /// matches the batch's record type.
    pub fn for_batch(
        batch: &SyncBatch,
        employee_id: String,
        employee_name: String,
        department: Option<String>,
        clock_value: String,
    ) -> Self {
        let (clock_in, clock_out) = match batch.record_type {
            RecordType::ClockIn => (Some(clock_value), None),
            RecordType::ClockOut => (None, Some(clock_value)),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.id.clone(),
            tenant_id: batch.tenant_id.clone(),
            employee_id,
            employee_name,
            department,
            date: batch.date.clone(),
            clock_in,
            clock_out,
            record_type: batch.record_type,
            supervisor_id: batch.supervisor_id.clone(),
            supervisor_name: batch.supervisor_name.clone(),
            photo_local_path: batch.photo_local_path.clone(),
            photo_url: batch.photo_url.clone(),
            geolocation: batch.geolocation,
            site: batch.site.clone(),
            sync_status: SyncStatus::Pending,
            sync_error: None,
            sync_attempts: 0,
            created_at: batch.created_at.clone(),
            synced_at: None,
        }
    }

    /// The clock value this record carries, regardless of side.
    pub fn clock_value(&self) -> Option<&str> {
        match self.record_type {
            RecordType::ClockIn => self.clock_in.as_deref(),
            RecordType::ClockOut => self.clock_out.as_deref(),
        }
    }
}
