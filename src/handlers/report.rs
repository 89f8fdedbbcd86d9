use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::BytesMut;
use serde::Deserialize;

use crate::error::{ApiResponse, AppError, Result};
use crate::handlers::ensure_uuid;
use crate::models::{
    EmployeeReportQuery, MapPin, ReportQuery, ReportResponse, SubmitReportResponse,
    UpdateLocationRequest, UpdateReportRequest,
};
use crate::services::report::{MediaUpload, NewReport};
use crate::services::ReportService;
use crate::AppState;

/// Submit a new fault report with an optional media file
/// POST /api/reports
pub async fn submit_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<SubmitReportResponse>>)> {
    let mut fault_type: Option<String> = None;
    let mut fault_description: Option<String> = None;
    let mut location_details: Option<String> = None;
    let mut created_by: Option<String> = None;
    let mut creator_id: Option<String> = None;
    let mut media: Option<MediaUpload> = None;

    // Process multipart fields
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to process multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "mediaFile" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read file chunk: {}", e))
                })? {
                    data.extend_from_slice(&chunk);
                }

                media = Some(MediaUpload {
                    filename,
                    content_type,
                    data: data.freeze(),
                });
            }
            "faultType" => fault_type = Some(field_text(field).await?),
            "faultDescription" => {
                let text = field_text(field).await?;
                if !text.is_empty() {
                    fault_description = Some(text);
                }
            }
            "locationDetails" => location_details = Some(field_text(field).await?),
            "createdBy" => {
                let text = field_text(field).await?;
                if !text.is_empty() {
                    created_by = Some(text);
                }
            }
            "creatorId" => creator_id = Some(field_text(field).await?),
            _ => {}
        }
    }

    let req = NewReport {
        fault_type: fault_type
            .ok_or_else(|| AppError::Validation("Missing fault type.".to_string()))?,
        fault_description,
        location_details: location_details
            .ok_or_else(|| AppError::Validation("Invalid location details format.".to_string()))?,
        created_by,
        creator_id: creator_id
            .ok_or_else(|| AppError::Validation("Missing creator id.".to_string()))?,
    };

    let response = ReportService::submit_report(&state.db, &state.blobs, req, media).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read form field: {}", e)))
}

/// Get a specific report
/// GET /api/reports/:id
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ReportResponse>>> {
    ensure_uuid(&id, "Invalid Report ID format.")?;
    let report = ReportService::get_report(&state.db, &id).await?;
    Ok(Json(ApiResponse::success(ReportResponse::from(report))))
}

/// List reports, optionally filtered by creator
/// GET /api/reports?creatorId=xxx
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<Vec<ReportResponse>>>> {
    let reports = ReportService::list_reports(&state.db, query.creator_id.as_deref()).await?;
    Ok(Json(ApiResponse::success(reports)))
}

/// Map pins for all reports with coordinates
/// GET /api/all-reports-locations
pub async fn report_locations(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<MapPin>>>> {
    let locations = ReportService::report_locations(&state.db).await?;
    Ok(Json(ApiResponse::success(locations)))
}

/// List reports relevant to a municipal employee
/// GET /api/employee-reports?city=xxx&status=xxx
pub async fn employee_reports(
    State(state): State<AppState>,
    Query(query): Query<EmployeeReportQuery>,
) -> Result<Json<ApiResponse<Vec<ReportResponse>>>> {
    let city = query
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing employee city.".to_string()))?;

    let reports =
        ReportService::employee_reports(&state.db, city, query.status.as_deref()).await?;
    Ok(Json(ApiResponse::success(reports)))
}

/// Update a report's status and/or municipality response
/// PUT /api/reports/:id
pub async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateReportRequest>,
) -> Result<Json<ApiResponse<ReportResponse>>> {
    ensure_uuid(&id, "Invalid Report ID format.")?;
    let report = ReportService::update_report(&state.db, &id, req).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Update a report's location
/// PUT /api/reports/:id/location
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLocationRequest>,
) -> Result<Json<ApiResponse<ReportResponse>>> {
    ensure_uuid(&id, "Invalid Report ID format.")?;
    let report = ReportService::update_location(&state.db, &id, req).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReportQuery {
    pub user_id: Option<String>,
}

/// Delete a report and its media attachment
/// DELETE /api/reports/:id?userId=xxx
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteReportQuery>,
) -> Result<Json<ApiResponse<()>>> {
    ensure_uuid(&id, "Invalid Report ID format.")?;
    let user_id = query
        .user_id
        .as_deref()
        .ok_or_else(|| AppError::Validation("Missing user id.".to_string()))?;
    ensure_uuid(user_id, "Invalid user ID format.")?;

    ReportService::delete_report(&state.db, &state.blobs, &id, user_id).await?;
    Ok(Json(ApiResponse::<()>::success_message(
        "Report deleted successfully.",
    )))
}
