// Remote collaborators
// Narrow, typed interfaces to the document store and blob store. Raw wire
// documents never cross this boundary; the adapters validate at the edge.

pub mod firestore;
pub mod storage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RemoteError;
use crate::store::GeoPoint;

/// Attendance status derived from clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    HalfDay,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::HalfDay => "half_day",
            AttendanceStatus::Absent => "absent",
        }
    }
}

/// A new remote attendance row, created by a clock-in batch.
/// Clock-out stays empty until a matching clock-out batch closes the shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceDoc {
    pub tenant_id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub department: Option<String>,
    pub date: String,
    pub clock_in: String,
    pub clock_out: String,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub late_minutes: i64,
    pub status: AttendanceStatus,
    pub source: String,
    pub batch_id: String,
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub photo_url: Option<String>,
    pub geolocation: Option<GeoPoint>,
    pub site_id: Option<String>,
    pub site_name: Option<String>,
    pub created_at: String,
}

/// In-place update closing an open attendance row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceUpdate {
    pub clock_out: String,
    pub total_hours: f64,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub late_minutes: i64,
    pub status: AttendanceStatus,
    pub clock_out_photo_url: Option<String>,
    pub clock_out_geolocation: Option<GeoPoint>,
    pub updated_at: String,
}

/// The slice of an existing remote row the clock-out path needs.
#[derive(Debug, Clone)]
pub struct RemoteAttendance {
    pub doc_id: String,
    pub batch_id: String,
    pub clock_in: String,
}

/// Remote document store holding attendance rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create all rows of a clock-in batch in one atomic multi-document
    /// write: every worker's row appears, or none do.
    async fn create_attendance_batch(&self, docs: &[AttendanceDoc]) -> Result<(), RemoteError>;

    /// Locate the supervisor-sourced attendance row for an employee/day,
    /// excluding rows written by `exclude_batch_id`. Returns the first match.
    async fn find_open_clock_in(
        &self,
        tenant_id: &str,
        employee_id: &str,
        date: &str,
        exclude_batch_id: &str,
    ) -> Result<Option<RemoteAttendance>, RemoteError>;

    /// Update one located row in place.
    async fn update_attendance(
        &self,
        doc_id: &str,
        update: &AttendanceUpdate,
    ) -> Result<(), RemoteError>;
}

/// Remote blob store for batch photos.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under the given object key; returns a stable
    /// public URL on success.
    async fn upload(&self, local_path: &Path, object_key: &str) -> Result<String, RemoteError>;
}
