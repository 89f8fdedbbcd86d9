pub mod media;
pub mod report;
pub mod user;

use crate::error::{AppError, Result};

/// Reject ids that cannot parse as the opaque identifier type before any
/// lookup runs, so a malformed id never reads as a missing resource.
pub(crate) fn ensure_uuid(value: &str, message: &str) -> Result<()> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| AppError::MalformedId(message.to_string()))
}
