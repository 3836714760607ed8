// Firestore REST adapter
// Implements the document store seam over the Firestore v1 API: an atomic
// commit for clock-in batches, runQuery to locate open rows, and PATCH with
// an update mask for clock-out closes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AttendanceDoc, AttendanceUpdate, DocumentStore, RemoteAttendance};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com/v1";
const ATTENDANCE_COLLECTION: &str = "attendance";

pub struct FirestoreClient {
    http: Client,
    config: RemoteConfig,
}

impl FirestoreClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.config.project_id
        )
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = req
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected(format!("{}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn create_attendance_batch(&self, docs: &[AttendanceDoc]) -> Result<(), RemoteError> {
        let root = self.documents_root();
        let writes: Vec<Write> = docs
            .iter()
            .map(|doc| {
                let id = uuid::Uuid::new_v4().to_string();
                Write {
                    update: WireDocument {
                        name: Some(format!("{}/{}/{}", root, ATTENDANCE_COLLECTION, id)),
                        fields: attendance_fields(doc),
                    },
                    current_document: Some(Precondition { exists: false }),
                }
            })
            .collect();

        let url = format!("{}/{}:commit", FIRESTORE_HOST, root);
        let req = self.apply_auth(self.http.post(&url).json(&CommitRequest { writes }));
        self.send(req).await?;

        log::debug!("Committed {} attendance rows", docs.len());
        Ok(())
    }

    async fn find_open_clock_in(
        &self,
        tenant_id: &str,
        employee_id: &str,
        date: &str,
        exclude_batch_id: &str,
    ) -> Result<Option<RemoteAttendance>, RemoteError> {
        let root = self.documents_root();
        let url = format!("{}/{}:runQuery", FIRESTORE_HOST, root);

        let query = RunQueryRequest {
            structured_query: StructuredQuery {
                from: vec![CollectionSelector {
                    collection_id: ATTENDANCE_COLLECTION.to_string(),
                }],
                r#where: Filter::composite(vec![
                    Filter::equals("tenantId", Value::string(tenant_id)),
                    Filter::equals("employeeId", Value::string(employee_id)),
                    Filter::equals("date", Value::string(date)),
                    Filter::equals("source", Value::string("supervisor")),
                ]),
            },
        };

        let req = self.apply_auth(self.http.post(&url).json(&query));
        let response = self.send(req).await?;

        let results: Vec<QueryResult> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidDocument(e.to_string()))?;

        // The batch-id exclusion runs client side; Firestore inequality
        // filters would force a composite index for no gain at this volume.
        for result in results {
            let Some(document) = result.document else {
                continue;
            };
            let attendance = parse_attendance(&document)?;
            if attendance.batch_id != exclude_batch_id {
                return Ok(Some(attendance));
            }
        }

        Ok(None)
    }

    async fn update_attendance(
        &self,
        doc_id: &str,
        update: &AttendanceUpdate,
    ) -> Result<(), RemoteError> {
        let fields = update_fields(update);
        let mask: Vec<(&str, String)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.clone()))
            .collect();

        // doc_id is the full resource name returned by the query
        let url = format!("{}/{}", FIRESTORE_HOST, doc_id);
        let req = self.apply_auth(
            self.http
                .patch(&url)
                .query(&mask)
                .json(&WireDocument { name: None, fields }),
        );
        self.send(req).await?;

        Ok(())
    }
}

// Wire types -----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Value {
    StringValue(String),
    DoubleValue(f64),
    IntegerValue(String),
    NullValue(Option<()>),
}

impl Value {
    fn string(s: impl Into<String>) -> Self {
        Value::StringValue(s.into())
    }

    fn double(v: f64) -> Self {
        Value::DoubleValue(v)
    }

    fn integer(v: i64) -> Self {
        Value::IntegerValue(v.to_string())
    }

    fn opt_string(s: &Option<String>) -> Self {
        match s {
            Some(s) => Value::StringValue(s.clone()),
            None => Value::NullValue(None),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringValue(s) => Some(s),
            _ => None,
        }
    }
}

type Fields = BTreeMap<String, Value>;

#[derive(Debug, Serialize, Deserialize)]
struct WireDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    fields: Fields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Precondition {
    exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    update: WireDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_document: Option<Precondition>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest {
    structured_query: StructuredQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StructuredQuery {
    from: Vec<CollectionSelector>,
    r#where: Filter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector {
    collection_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Filter {
    CompositeFilter {
        op: String,
        filters: Vec<Filter>,
    },
    FieldFilter {
        field: FieldReference,
        op: String,
        value: Value,
    },
}

impl Filter {
    fn composite(filters: Vec<Filter>) -> Self {
        Filter::CompositeFilter {
            op: "AND".to_string(),
            filters,
        }
    }

    fn equals(field_path: &str, value: Value) -> Self {
        Filter::FieldFilter {
            field: FieldReference {
                field_path: field_path.to_string(),
            },
            op: "EQUAL".to_string(),
            value,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference {
    field_path: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    document: Option<WireDocument>,
}

// Typed record <-> wire fields ------------------------------------------------

fn attendance_fields(doc: &AttendanceDoc) -> Fields {
    let mut fields = Fields::new();
    fields.insert("tenantId".into(), Value::string(&doc.tenant_id));
    fields.insert("employeeId".into(), Value::string(&doc.employee_id));
    fields.insert("employeeName".into(), Value::string(&doc.employee_name));
    fields.insert("department".into(), Value::opt_string(&doc.department));
    fields.insert("date".into(), Value::string(&doc.date));
    fields.insert("clockIn".into(), Value::string(&doc.clock_in));
    fields.insert("clockOut".into(), Value::string(&doc.clock_out));
    fields.insert("regularHours".into(), Value::double(doc.regular_hours));
    fields.insert("overtimeHours".into(), Value::double(doc.overtime_hours));
    fields.insert("lateMinutes".into(), Value::integer(doc.late_minutes));
    fields.insert("status".into(), Value::string(doc.status.as_str()));
    fields.insert("source".into(), Value::string(&doc.source));
    fields.insert("batchId".into(), Value::string(&doc.batch_id));
    fields.insert("supervisorId".into(), Value::string(&doc.supervisor_id));
    fields.insert("supervisorName".into(), Value::string(&doc.supervisor_name));
    fields.insert("photoUrl".into(), Value::opt_string(&doc.photo_url));
    fields.insert("siteId".into(), Value::opt_string(&doc.site_id));
    fields.insert("siteName".into(), Value::opt_string(&doc.site_name));
    fields.insert("createdAt".into(), Value::string(&doc.created_at));
    if let Some(geo) = doc.geolocation {
        fields.insert("latitude".into(), Value::double(geo.latitude));
        fields.insert("longitude".into(), Value::double(geo.longitude));
        if let Some(accuracy) = geo.accuracy {
            fields.insert("accuracy".into(), Value::double(accuracy));
        }
    }
    fields
}

fn update_fields(update: &AttendanceUpdate) -> Fields {
    let mut fields = Fields::new();
    fields.insert("clockOut".into(), Value::string(&update.clock_out));
    fields.insert("totalHours".into(), Value::double(update.total_hours));
    fields.insert("regularHours".into(), Value::double(update.regular_hours));
    fields.insert("overtimeHours".into(), Value::double(update.overtime_hours));
    fields.insert("lateMinutes".into(), Value::integer(update.late_minutes));
    fields.insert("status".into(), Value::string(update.status.as_str()));
    fields.insert("updatedAt".into(), Value::string(&update.updated_at));
    if let Some(url) = &update.clock_out_photo_url {
        fields.insert("clockOutPhotoUrl".into(), Value::string(url));
    }
    if let Some(geo) = update.clock_out_geolocation {
        fields.insert("clockOutLatitude".into(), Value::double(geo.latitude));
        fields.insert("clockOutLongitude".into(), Value::double(geo.longitude));
    }
    fields
}

fn parse_attendance(document: &WireDocument) -> Result<RemoteAttendance, RemoteError> {
    let name = document
        .name
        .clone()
        .ok_or_else(|| RemoteError::InvalidDocument("document without a name".to_string()))?;

    let get = |key: &str| -> Result<String, RemoteError> {
        document
            .fields
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RemoteError::InvalidDocument(format!("missing field {}", key)))
    };

    Ok(RemoteAttendance {
        doc_id: name,
        batch_id: get("batchId")?,
        clock_in: get("clockIn")?,
    })
}
