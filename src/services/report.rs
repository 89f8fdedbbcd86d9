use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    Location, MapPin, Report, ReportResponse, ReportStatus, SubmitReportResponse,
    UpdateLocationRequest, UpdateReportRequest,
};
use crate::storage::{BlobId, BlobStore};

/// Incoming report fields, as received from the submission form
#[derive(Debug)]
pub struct NewReport {
    pub fault_type: String,
    pub fault_description: Option<String>,
    /// Raw JSON string of the location payload
    pub location_details: String,
    pub created_by: Option<String>,
    pub creator_id: String,
}

/// An uploaded media file, buffered in memory
pub struct MediaUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Report service
pub struct ReportService;

impl ReportService {
    /// Submit a new report, storing its media attachment first.
    ///
    /// The blob store and the report table are two systems with no shared
    /// transaction: the blob is committed first, and if the report insert
    /// then fails the blob is deleted again. That rollback is best-effort;
    /// if it fails too, the orphaned blob is logged and the persist error
    /// still surfaces.
    pub async fn submit_report(
        db: &Database,
        blobs: &BlobStore,
        req: NewReport,
        media: Option<MediaUpload>,
    ) -> Result<SubmitReportResponse> {
        let location: Location = serde_json::from_str(&req.location_details)
            .map_err(|_| AppError::Validation("Invalid location details format.".to_string()))?;
        if location.city.trim().is_empty() {
            return Err(AppError::Validation(
                "Location details must include a city.".to_string(),
            ));
        }
        if req.fault_type.trim().is_empty() {
            return Err(AppError::Validation("Missing fault type.".to_string()));
        }
        if Uuid::parse_str(&req.creator_id).is_err() {
            return Err(AppError::MalformedId("Invalid user ID format.".to_string()));
        }

        let mut media_ref: Option<(BlobId, String)> = None;
        if let Some(upload) = media {
            let mut writer = blobs.open_write(&upload.filename, &upload.content_type);
            if let Err(e) = writer.write(&upload.data).await {
                writer.abort().await;
                return Err(e);
            }
            let blob_id = writer.finish().await?;
            tracing::debug!("Media file stored with id {}", blob_id);
            media_ref = Some((blob_id, upload.content_type));
        }

        let report_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let insert = sqlx::query(
            r#"
            INSERT INTO reports (
                id, fault_type, description, location_mode, city, street, house_number,
                latitude, longitude, media_blob_id, media_mime_type, created_by,
                creator_id, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report_id)
        .bind(&req.fault_type)
        .bind(&req.fault_description)
        .bind(&location.mode)
        .bind(&location.city)
        .bind(&location.street)
        .bind(&location.house_number)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(media_ref.as_ref().map(|(id, _)| id.to_string()))
        .bind(media_ref.as_ref().map(|(_, mime)| mime.clone()))
        .bind(&req.created_by)
        .bind(&req.creator_id)
        .bind(ReportStatus::InProgress)
        .bind(&now)
        .execute(db.pool())
        .await;

        if let Err(e) = insert {
            tracing::error!("Error saving report: {}", e);
            if let Some((blob_id, _)) = &media_ref {
                match blobs.delete(*blob_id).await {
                    Ok(()) => {
                        tracing::debug!("Rolled back blob {} after failed report save", blob_id)
                    }
                    Err(AppError::NotFound(_)) => {}
                    Err(del_err) => tracing::warn!(
                        "Orphaned blob {} left behind after failed report save: {}",
                        blob_id,
                        del_err
                    ),
                }
            }
            return Err(AppError::Persist("Failed to save report.".to_string()));
        }

        Ok(SubmitReportResponse {
            report_id,
            media_blob_id: media_ref.as_ref().map(|(id, _)| id.to_string()),
            media_mime_type: media_ref.map(|(_, mime)| mime),
        })
    }

    /// Get a report by ID
    pub async fn get_report(db: &Database, report_id: &str) -> Result<Report> {
        let report: Report = sqlx::query_as("SELECT * FROM reports WHERE id = ?")
            .bind(report_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found.".to_string()))?;

        Ok(report)
    }

    /// List reports, newest first, optionally filtered by creator
    pub async fn list_reports(
        db: &Database,
        creator_id: Option<&str>,
    ) -> Result<Vec<ReportResponse>> {
        let reports: Vec<Report> = if let Some(creator) = creator_id {
            sqlx::query_as(
                "SELECT * FROM reports WHERE creator_id = ? ORDER BY created_at DESC",
            )
            .bind(creator)
            .fetch_all(db.pool())
            .await?
        } else {
            sqlx::query_as("SELECT * FROM reports ORDER BY created_at DESC")
                .fetch_all(db.pool())
                .await?
        };

        Ok(reports.into_iter().map(ReportResponse::from).collect())
    }

    /// List reports for a municipal employee's city, optionally by status
    pub async fn employee_reports(
        db: &Database,
        city: &str,
        status: Option<&str>,
    ) -> Result<Vec<ReportResponse>> {
        let status_filter = status.filter(|s| *s != "all");

        let reports: Vec<Report> = if let Some(status) = status_filter {
            sqlx::query_as(
                "SELECT * FROM reports WHERE city = ? AND status = ? ORDER BY created_at DESC",
            )
            .bind(city)
            .bind(status)
            .fetch_all(db.pool())
            .await?
        } else {
            sqlx::query_as("SELECT * FROM reports WHERE city = ? ORDER BY created_at DESC")
                .bind(city)
                .fetch_all(db.pool())
                .await?
        };

        Ok(reports.into_iter().map(ReportResponse::from).collect())
    }

    /// Map pins for every report that carries coordinates
    pub async fn report_locations(db: &Database) -> Result<Vec<MapPin>> {
        let rows: Vec<(f64, f64, String, ReportStatus)> = sqlx::query_as(
            r#"
            SELECT latitude, longitude, fault_type, status FROM reports
            WHERE latitude IS NOT NULL AND longitude IS NOT NULL
            "#,
        )
        .fetch_all(db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(lat, lng, title, status)| MapPin {
                lat,
                lng,
                title,
                status,
            })
            .collect())
    }

    /// Update a report's status and/or municipality response
    pub async fn update_report(
        db: &Database,
        report_id: &str,
        req: UpdateReportRequest,
    ) -> Result<ReportResponse> {
        if req.status.is_none() && req.municipality_response.is_none() {
            return Err(AppError::Validation("Nothing to update.".to_string()));
        }

        let report = Self::get_report(db, report_id).await?;
        let status = req.status.unwrap_or(report.status);
        let municipality_response = req.municipality_response.or(report.municipality_response);

        sqlx::query("UPDATE reports SET status = ?, municipality_response = ? WHERE id = ?")
            .bind(status)
            .bind(&municipality_response)
            .bind(report_id)
            .execute(db.pool())
            .await?;

        let updated = Self::get_report(db, report_id).await?;
        Ok(ReportResponse::from(updated))
    }

    /// Update a report's location
    pub async fn update_location(
        db: &Database,
        report_id: &str,
        req: UpdateLocationRequest,
    ) -> Result<ReportResponse> {
        let city = req.city.as_deref().map(str::trim).unwrap_or_default();
        let street = req.street.as_deref().map(str::trim).unwrap_or_default();
        if city.is_empty() || street.is_empty() {
            return Err(AppError::Validation(
                "City and street are required for location update.".to_string(),
            ));
        }

        Self::get_report(db, report_id).await?;

        sqlx::query(
            r#"
            UPDATE reports SET city = ?, street = ?, house_number = ?, latitude = ?, longitude = ?
            WHERE id = ?
            "#,
        )
        .bind(city)
        .bind(street)
        .bind(req.house_number.unwrap_or_default())
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(report_id)
        .execute(db.pool())
        .await?;

        let updated = Self::get_report(db, report_id).await?;
        Ok(ReportResponse::from(updated))
    }

    /// Delete a report and release its media attachment.
    ///
    /// Only the report's creator may delete it. Blob release happens first
    /// but never blocks the record deletion: a stale report is worse than a
    /// stale blob.
    pub async fn delete_report(
        db: &Database,
        blobs: &BlobStore,
        report_id: &str,
        requesting_user_id: &str,
    ) -> Result<()> {
        let report = Self::get_report(db, report_id).await?;

        if report.creator_id != requesting_user_id {
            return Err(AppError::NotOwner(
                "You are not authorized to delete this report.".to_string(),
            ));
        }

        Self::release_media(blobs, &report).await;

        sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(report_id)
            .execute(db.pool())
            .await?;

        Ok(())
    }

    /// Best-effort release of a report's media blob.
    ///
    /// `NotFound` means the blob was already gone (an orphan from an earlier
    /// partial failure) and is swallowed; any other failure is logged and
    /// the caller proceeds with the record deletion regardless.
    pub(crate) async fn release_media(blobs: &BlobStore, report: &Report) {
        let Some(blob_ref) = report.media_blob_id.as_deref() else {
            return;
        };

        let blob_id = match BlobId::parse(blob_ref) {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(
                    "Report {} references malformed blob id {}",
                    report.id,
                    blob_ref
                );
                return;
            }
        };

        match blobs.delete(blob_id).await {
            Ok(()) => tracing::debug!("Media file deleted: {}", blob_id),
            Err(AppError::NotFound(_)) => {
                tracing::debug!("Media file {} was already deleted", blob_id)
            }
            Err(e) => tracing::error!("Error deleting media file {}: {}", blob_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateUserRequest;
    use crate::services::UserService;
    use tempfile::TempDir;

    async fn create_test_env() -> (Database, BlobStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        db.run_migrations().await.unwrap();
        let blobs = BlobStore::new(&db, 4);
        (db, blobs, temp_dir)
    }

    async fn create_citizen(db: &Database, username: &str) -> String {
        let user = UserService::create_user(
            db,
            CreateUserRequest {
                username: username.to_string(),
                user_type: "citizen".to_string(),
                city: None,
            },
        )
        .await
        .unwrap();
        user.id
    }

    fn new_report(creator_id: &str, location_details: &str) -> NewReport {
        NewReport {
            fault_type: "pothole".to_string(),
            fault_description: None,
            location_details: location_details.to_string(),
            created_by: Some("Dana".to_string()),
            creator_id: creator_id.to_string(),
        }
    }

    fn png_upload(data: &[u8]) -> MediaUpload {
        MediaUpload {
            filename: "fault.png".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::copy_from_slice(data),
        }
    }

    async fn table_count(db: &Database, table: &str) -> i64 {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap();
        count.0
    }

    #[tokio::test]
    async fn submit_with_media_round_trips_bytes() {
        let (db, blobs, _temp) = create_test_env().await;
        let user_id = create_citizen(&db, "dana").await;

        let response = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&user_id, r#"{"type":"exact","city":"Haifa"}"#),
            Some(png_upload(&[1, 2, 3])),
        )
        .await
        .unwrap();

        let blob_id = BlobId::parse(response.media_blob_id.as_deref().unwrap()).unwrap();
        assert_eq!(response.media_mime_type.as_deref(), Some("image/png"));
        assert_eq!(blobs.read(blob_id).await.unwrap().as_ref(), &[1, 2, 3]);

        let report = ReportService::get_report(&db, &response.report_id).await.unwrap();
        assert_eq!(report.city, "Haifa");
        assert_eq!(report.status, ReportStatus::InProgress);
        assert_eq!(report.media_mime_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn submit_without_city_has_no_side_effects() {
        let (db, blobs, _temp) = create_test_env().await;
        let user_id = create_citizen(&db, "dana").await;

        let result = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&user_id, r#"{"type":"exact","city":""}"#),
            Some(png_upload(b"unused")),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(table_count(&db, "reports").await, 0);
        assert_eq!(table_count(&db, "blob_files").await, 0);
        assert_eq!(table_count(&db, "blob_chunks").await, 0);
    }

    #[tokio::test]
    async fn submit_with_malformed_location_is_rejected() {
        let (db, blobs, _temp) = create_test_env().await;
        let user_id = create_citizen(&db, "dana").await;

        let result = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&user_id, "not json"),
            None,
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(table_count(&db, "reports").await, 0);
    }

    #[tokio::test]
    async fn failed_persist_rolls_back_committed_blob() {
        let (db, blobs, _temp) = create_test_env().await;

        // Well-formed creator id with no matching user row: the foreign key
        // rejects the insert after the blob is already committed.
        let ghost = Uuid::new_v4().to_string();
        let result = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&ghost, r#"{"type":"exact","city":"Haifa"}"#),
            Some(png_upload(&[9, 9, 9])),
        )
        .await;

        assert!(matches!(result, Err(AppError::Persist(_))));
        assert_eq!(table_count(&db, "reports").await, 0);
        assert_eq!(table_count(&db, "blob_files").await, 0);
        assert_eq!(table_count(&db, "blob_chunks").await, 0);
    }

    #[tokio::test]
    async fn delete_report_requires_ownership() {
        let (db, blobs, _temp) = create_test_env().await;
        let owner = create_citizen(&db, "owner").await;
        let other = create_citizen(&db, "other").await;

        let response = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&owner, r#"{"type":"exact","city":"Haifa"}"#),
            Some(png_upload(&[1, 2, 3])),
        )
        .await
        .unwrap();
        let blob_id = BlobId::parse(response.media_blob_id.as_deref().unwrap()).unwrap();

        let result =
            ReportService::delete_report(&db, &blobs, &response.report_id, &other).await;
        assert!(matches!(result, Err(AppError::NotOwner(_))));

        // Report and blob are untouched
        assert!(ReportService::get_report(&db, &response.report_id).await.is_ok());
        assert!(blobs.open_read(blob_id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_report_releases_blob() {
        let (db, blobs, _temp) = create_test_env().await;
        let owner = create_citizen(&db, "owner").await;

        let response = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&owner, r#"{"type":"exact","city":"Haifa"}"#),
            Some(png_upload(&[1, 2, 3])),
        )
        .await
        .unwrap();
        let blob_id = BlobId::parse(response.media_blob_id.as_deref().unwrap()).unwrap();

        ReportService::delete_report(&db, &blobs, &response.report_id, &owner)
            .await
            .unwrap();

        assert!(matches!(
            ReportService::get_report(&db, &response.report_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(blobs.open_read(blob_id).await, Err(AppError::NotFound(_))));

        let result = ReportService::delete_report(&db, &blobs, &response.report_id, &owner).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_report_swallows_already_deleted_blob() {
        let (db, blobs, _temp) = create_test_env().await;
        let owner = create_citizen(&db, "owner").await;

        let response = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&owner, r#"{"type":"exact","city":"Haifa"}"#),
            Some(png_upload(&[1, 2, 3])),
        )
        .await
        .unwrap();

        let blob_id = BlobId::parse(response.media_blob_id.as_deref().unwrap()).unwrap();
        blobs.delete(blob_id).await.unwrap();

        ReportService::delete_report(&db, &blobs, &response.report_id, &owner)
            .await
            .unwrap();
        assert!(matches!(
            ReportService::get_report(&db, &response.report_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_report_rejects_empty_payload() {
        let (db, blobs, _temp) = create_test_env().await;
        let owner = create_citizen(&db, "owner").await;

        let response = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&owner, r#"{"type":"exact","city":"Haifa"}"#),
            None,
        )
        .await
        .unwrap();

        let result = ReportService::update_report(
            &db,
            &response.report_id,
            UpdateReportRequest {
                status: None,
                municipality_response: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let updated = ReportService::update_report(
            &db,
            &response.report_id,
            UpdateReportRequest {
                status: Some(ReportStatus::Completed),
                municipality_response: Some("Fixed.".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, ReportStatus::Completed);
        assert_eq!(updated.municipality_response.as_deref(), Some("Fixed."));
    }

    #[tokio::test]
    async fn employee_reports_filters_by_city_and_status() {
        let (db, blobs, _temp) = create_test_env().await;
        let owner = create_citizen(&db, "owner").await;

        let haifa = ReportService::submit_report(
            &db,
            &blobs,
            new_report(&owner, r#"{"type":"exact","city":"Haifa"}"#),
            None,
        )
        .await
        .unwrap();
        ReportService::submit_report(
            &db,
            &blobs,
            new_report(&owner, r#"{"type":"exact","city":"Tel Aviv"}"#),
            None,
        )
        .await
        .unwrap();

        let all = ReportService::employee_reports(&db, "Haifa", Some("all")).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, haifa.report_id);

        let completed = ReportService::employee_reports(&db, "Haifa", Some("completed"))
            .await
            .unwrap();
        assert!(completed.is_empty());
    }
}
