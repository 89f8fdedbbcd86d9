//! Chunked media blob storage
//!
//! Uploaded photos and videos are stored inside the service database as
//! ordered chunk rows (`blob_chunks`) plus one metadata row (`blob_files`),
//! keyed by an opaque id. The metadata row is committed only after the last
//! chunk is flushed, so readers see either no blob or a complete one.

use std::fmt;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};

/// Opaque identifier of a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(Uuid);

impl BlobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id received from a client or a report record.
    ///
    /// This is the only way a string becomes a [`BlobId`], so malformed ids
    /// are rejected at the boundary instead of surfacing as lookup misses.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AppError::MalformedId("Invalid file ID format.".to_string()))
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Blob metadata row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BlobFile {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub length: i64,
    pub chunk_count: i64,
    pub created_at: String,
}

/// Handle to the chunked blob store
#[derive(Clone)]
pub struct BlobStore {
    pool: SqlitePool,
    chunk_size: usize,
}

impl BlobStore {
    pub fn new(db: &Database, chunk_size: usize) -> Self {
        Self {
            pool: db.pool().clone(),
            chunk_size,
        }
    }

    /// Open a write handle for a new blob.
    ///
    /// Nothing is visible to readers until [`BlobWriter::finish`] commits
    /// the metadata row. If a write fails, the caller must
    /// [`BlobWriter::abort`] the handle to discard the partial chunks.
    pub fn open_write(&self, filename: &str, content_type: &str) -> BlobWriter {
        BlobWriter {
            pool: self.pool.clone(),
            id: BlobId::new(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            chunk_size: self.chunk_size,
            buf: BytesMut::new(),
            next_seq: 0,
            length: 0,
        }
    }

    /// Store a fully buffered payload as a new blob
    pub async fn put(&self, filename: &str, content_type: &str, data: &[u8]) -> Result<BlobId> {
        let mut writer = self.open_write(filename, content_type);
        if let Err(e) = writer.write(data).await {
            writer.abort().await;
            return Err(e);
        }
        writer.finish().await
    }

    /// Open a blob for reading
    ///
    /// Returns the metadata row and a fresh lazy chunk reader. Each call
    /// produces an independent reader; a reader cannot be restarted
    /// mid-stream.
    pub async fn open_read(&self, id: BlobId) -> Result<(BlobFile, BlobReader)> {
        let file: BlobFile = sqlx::query_as("SELECT * FROM blob_files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("No file exists.".to_string()))?;

        let reader = BlobReader {
            pool: self.pool.clone(),
            id,
            chunk_count: file.chunk_count,
            next_seq: 0,
        };

        Ok((file, reader))
    }

    /// Read a whole blob into memory
    pub async fn read(&self, id: BlobId) -> Result<Bytes> {
        let (file, reader) = self.open_read(id).await?;
        let mut buf = BytesMut::with_capacity(file.length as usize);
        let mut stream = std::pin::pin!(reader.into_stream());
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Delete a blob, removing its metadata row and all chunk rows together.
    ///
    /// Deleting an unknown id reports `NotFound` so callers can tell
    /// "already gone" from "confirmed removed".
    pub async fn delete(&self, id: BlobId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM blob_files WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("No file exists.".to_string()));
        }

        sqlx::query("DELETE FROM blob_chunks WHERE blob_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!("Deleted blob {}", id);
        Ok(())
    }
}

/// Write handle for one blob
///
/// Bytes are accepted in arbitrary pieces and flushed to `blob_chunks` in
/// fixed-size rows as they accumulate; the metadata row goes in last.
pub struct BlobWriter {
    pool: SqlitePool,
    id: BlobId,
    filename: String,
    content_type: String,
    chunk_size: usize,
    buf: BytesMut,
    next_seq: i64,
    length: i64,
}

impl BlobWriter {
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// Append bytes, flushing every completed chunk
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        self.length += data.len() as i64;
        while self.buf.len() >= self.chunk_size {
            let chunk = self.buf.split_to(self.chunk_size).freeze();
            self.flush_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn flush_chunk(&mut self, chunk: Bytes) -> Result<()> {
        sqlx::query("INSERT INTO blob_chunks (blob_id, seq, data) VALUES (?, ?, ?)")
            .bind(self.id.to_string())
            .bind(self.next_seq)
            .bind(chunk.as_ref())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::StoreWrite(format!("chunk {} of blob {}: {}", self.next_seq, self.id, e))
            })?;
        self.next_seq += 1;
        Ok(())
    }

    /// Flush the tail chunk and commit the metadata row, making the blob
    /// visible to readers. Returns the id the blob is stored under.
    pub async fn finish(mut self) -> Result<BlobId> {
        if !self.buf.is_empty() {
            let chunk = self.buf.split().freeze();
            if let Err(e) = self.flush_chunk(chunk).await {
                self.discard().await;
                return Err(e);
            }
        }

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO blob_files (id, filename, content_type, length, chunk_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.id.to_string())
        .bind(&self.filename)
        .bind(&self.content_type)
        .bind(self.length)
        .bind(self.next_seq)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    "Stored blob {} ({} bytes, {} chunks)",
                    self.id,
                    self.length,
                    self.next_seq
                );
                Ok(self.id)
            }
            Err(e) => {
                let err =
                    AppError::StoreWrite(format!("metadata for blob {}: {}", self.id, e));
                self.discard().await;
                Err(err)
            }
        }
    }

    /// Discard the blob, removing any chunks already flushed
    pub async fn abort(self) {
        self.discard().await;
    }

    async fn discard(&self) {
        if let Err(e) = sqlx::query("DELETE FROM blob_chunks WHERE blob_id = ?")
            .bind(self.id.to_string())
            .execute(&self.pool)
            .await
        {
            tracing::warn!("Failed to discard partial chunks for blob {}: {}", self.id, e);
        }
    }
}

/// Lazy chunk reader for one blob
pub struct BlobReader {
    pool: SqlitePool,
    id: BlobId,
    chunk_count: i64,
    next_seq: i64,
}

impl BlobReader {
    /// Produce the blob's bytes as a chunk stream, in stored order.
    ///
    /// A chunk row missing mid-stream surfaces as a `StoreRead` error so
    /// the consumer terminates instead of emitting a truncated payload.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::try_unfold(self, |mut reader| async move {
            if reader.next_seq >= reader.chunk_count {
                return Ok(None);
            }

            let row: Option<(Vec<u8>,)> =
                sqlx::query_as("SELECT data FROM blob_chunks WHERE blob_id = ? AND seq = ?")
                    .bind(reader.id.to_string())
                    .bind(reader.next_seq)
                    .fetch_optional(&reader.pool)
                    .await
                    .map_err(|e| {
                        AppError::StoreRead(format!(
                            "chunk {} of blob {}: {}",
                            reader.next_seq, reader.id, e
                        ))
                    })?;

            match row {
                Some((data,)) => {
                    reader.next_seq += 1;
                    Ok(Some((Bytes::from(data), reader)))
                }
                None => Err(AppError::StoreRead(format!(
                    "blob {} is missing chunk {}",
                    reader.id, reader.next_seq
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store(chunk_size: usize) -> (BlobStore, Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        db.run_migrations().await.unwrap();
        let store = BlobStore::new(&db, chunk_size);
        (store, db, temp_dir)
    }

    async fn chunk_rows(db: &Database, id: BlobId) -> i64 {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blob_chunks WHERE blob_id = ?")
            .bind(id.to_string())
            .fetch_one(db.pool())
            .await
            .unwrap();
        count.0
    }

    #[tokio::test]
    async fn round_trip_across_chunks() {
        let (store, db, _temp) = create_test_store(4).await;

        let data = b"hello, chunked world";
        let id = store.put("hello.bin", "application/octet-stream", data).await.unwrap();

        let read_back = store.read(id).await.unwrap();
        assert_eq!(read_back.as_ref(), data);

        // 20 bytes at 4 bytes per chunk
        assert_eq!(chunk_rows(&db, id).await, 5);
    }

    #[tokio::test]
    async fn metadata_records_filename_and_length() {
        let (store, _db, _temp) = create_test_store(4).await;

        let id = store.put("pothole.png", "image/png", &[1, 2, 3]).await.unwrap();

        let (file, _reader) = store.open_read(id).await.unwrap();
        assert_eq!(file.filename, "pothole.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.length, 3);
        assert_eq!(file.chunk_count, 1);
    }

    #[tokio::test]
    async fn missing_id_is_not_found_on_read_and_delete() {
        let (store, _db, _temp) = create_test_store(4).await;

        let id = BlobId::new();
        assert!(matches!(store.open_read(id).await, Err(AppError::NotFound(_))));
        assert!(matches!(store.delete(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn blob_invisible_until_finish() {
        let (store, _db, _temp) = create_test_store(4).await;

        let mut writer = store.open_write("partial.bin", "application/octet-stream");
        writer.write(b"some bytes").await.unwrap();
        let id = writer.id();

        assert!(matches!(store.open_read(id).await, Err(AppError::NotFound(_))));

        let committed = writer.finish().await.unwrap();
        assert_eq!(committed, id);
        assert_eq!(store.read(id).await.unwrap().as_ref(), b"some bytes");
    }

    #[tokio::test]
    async fn abort_discards_flushed_chunks() {
        let (store, db, _temp) = create_test_store(4).await;

        let mut writer = store.open_write("partial.bin", "application/octet-stream");
        writer.write(b"0123456789").await.unwrap();
        let id = writer.id();
        assert!(chunk_rows(&db, id).await > 0);

        writer.abort().await;

        assert_eq!(chunk_rows(&db, id).await, 0);
        assert!(matches!(store.open_read(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_metadata_and_chunks_together() {
        let (store, db, _temp) = create_test_store(4).await;

        let id = store.put("gone.bin", "application/octet-stream", b"0123456789").await.unwrap();
        assert_eq!(chunk_rows(&db, id).await, 3);

        store.delete(id).await.unwrap();

        assert_eq!(chunk_rows(&db, id).await, 0);
        assert!(matches!(store.open_read(id).await, Err(AppError::NotFound(_))));
        assert!(matches!(store.delete(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn streamed_writes_match_buffered_put() {
        let (store, _db, _temp) = create_test_store(8).await;

        let mut writer = store.open_write("streamed.bin", "video/mp4");
        writer.write(b"first ").await.unwrap();
        writer.write(b"second ").await.unwrap();
        writer.write(b"third").await.unwrap();
        let id = writer.finish().await.unwrap();

        assert_eq!(store.read(id).await.unwrap().as_ref(), b"first second third");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(matches!(BlobId::parse("not-a-uuid"), Err(AppError::MalformedId(_))));
        let id = BlobId::new();
        assert_eq!(BlobId::parse(&id.to_string()).unwrap(), id);
    }
}
