use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum ReportStatus {
    InProgress,
    Completed,
    Rejected,
}

/// Location details of a reported fault
///
/// Matches the wire format submitted by the client app: `type` is the
/// location mode ("exact" or "approximate"), address fields and
/// coordinates are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "type")]
    pub mode: String,
    pub city: String,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Report model
#[derive(Debug, Clone, FromRow)]
pub struct Report {
    pub id: String,
    pub fault_type: String,
    pub description: Option<String>,
    pub location_mode: String,
    pub city: String,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub media_blob_id: Option<String>,
    pub media_mime_type: Option<String>,
    pub created_by: Option<String>,
    pub creator_id: String,
    pub status: ReportStatus,
    pub municipality_response: Option<String>,
    pub created_at: String,
}

/// Report response with the location nested back into one object
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: String,
    pub fault_type: String,
    pub fault_description: Option<String>,
    pub location: Location,
    pub media_blob_id: Option<String>,
    pub media_mime_type: Option<String>,
    pub created_by: Option<String>,
    pub creator_id: String,
    pub status: ReportStatus,
    pub municipality_response: Option<String>,
    pub created_at: String,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            id: report.id,
            fault_type: report.fault_type,
            fault_description: report.description,
            location: Location {
                mode: report.location_mode,
                city: report.city,
                street: report.street,
                house_number: report.house_number,
                latitude: report.latitude,
                longitude: report.longitude,
            },
            media_blob_id: report.media_blob_id,
            media_mime_type: report.media_mime_type,
            created_by: report.created_by,
            creator_id: report.creator_id,
            status: report.status,
            municipality_response: report.municipality_response,
            created_at: report.created_at,
        }
    }
}

/// Response for a successful report submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportResponse {
    pub report_id: String,
    pub media_blob_id: Option<String>,
    pub media_mime_type: Option<String>,
}

/// Update request for status and/or municipality response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    pub status: Option<ReportStatus>,
    pub municipality_response: Option<String>,
}

/// Update request for a report's location
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub city: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Report list query parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub creator_id: Option<String>,
}

/// Employee report query parameters
#[derive(Debug, Deserialize)]
pub struct EmployeeReportQuery {
    pub city: Option<String>,
    pub status: Option<String>,
}

/// Map pin for the all-reports overview
#[derive(Debug, Serialize)]
pub struct MapPin {
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    pub status: ReportStatus,
}
