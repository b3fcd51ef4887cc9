//! Bounded, content-type-checked body readers.
//!
//! Request bodies are turned into validated payloads before anything touches
//! the store: an item's content for add requests, an item identifier for
//! delete requests. The readers are transport agnostic and consume any stream
//! of byte chunks.
//!
//! Size enforcement is streaming: the reader stops as soon as the running
//! total crosses the limit, whatever the declared `content-length` said.


use bytes::Bytes;
use core::fmt::Display;
use futures::{Stream, StreamExt};

use crate::{EntropySource, IdAuthority, ValidationError};

/// The only media type accepted for request bodies.
pub const EXPECTED_CONTENT_TYPE: &str = "text/plain";

/// Largest item content accepted by [`validate_add`].
pub const MAX_CONTENT_BYTES: usize = 1024;

/// A request body together with the headers that describe it.
pub struct RequestBody<S> {
    /// Value of the `content-type` header, if present.
    pub content_type: Option<String>,
    /// Parsed `content-length` header. `None` when absent or unparsable.
    pub declared_length: Option<u64>,
    pub stream: S,
}

/// Reads `stream` to the end, enforcing the media type and a byte `limit`.
///
/// A missing `declared_length` counts as exceeding the limit.
///
/// # Errors
///
/// - [`ValidationError::IncorrectContentType`] unless `content_type` is exactly
///   [`EXPECTED_CONTENT_TYPE`].
/// - [`ValidationError::TooMuchData`] if the declared length exceeds `limit`,
///   or as soon as the bytes read exceed it.
/// - [`ValidationError::Body`] if the stream yields an error.
pub async fn read_bounded<S, E>(
    stream: S,
    content_type: Option<&str>,
    declared_length: Option<u64>,
    limit: usize,
) -> Result<Vec<u8>, ValidationError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    if content_type != Some(EXPECTED_CONTENT_TYPE) {
        return Err(ValidationError::IncorrectContentType {
            found: content_type.map(str::to_owned),
        });
    }

    let declared = declared_length.unwrap_or(limit as u64 + 1);
    if declared > limit as u64 {
        return Err(ValidationError::TooMuchData { limit });
    }

    let mut stream = core::pin::pin!(stream);
    let mut data = Vec::with_capacity(declared as usize);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ValidationError::Body(e.to_string()))?;
        if data.len() + chunk.len() > limit {
            return Err(ValidationError::TooMuchData { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

/// Extracts the content of an add-item request (at most
/// [`MAX_CONTENT_BYTES`]).
///
/// # Errors
///
/// See [`read_bounded`].
pub async fn validate_add<S, E>(body: RequestBody<S>) -> Result<Vec<u8>, ValidationError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    read_bounded(
        body.stream,
        body.content_type.as_deref(),
        body.declared_length,
        MAX_CONTENT_BYTES,
    )
    .await
}

/// Extracts the item identifier of a delete-item request.
///
/// The body may be no longer than an identifier and must pass
/// [`IdAuthority::validate`].
///
/// # Errors
///
/// - Any error of [`read_bounded`].
/// - [`ValidationError::InvalidData`] if the body is not a valid identifier.
pub async fn validate_delete<S, E, R>(
    body: RequestBody<S>,
    ids: &IdAuthority<R>,
) -> Result<String, ValidationError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
    R: EntropySource,
{
    let bytes = read_bounded(
        body.stream,
        body.content_type.as_deref(),
        body.declared_length,
        ids.length(),
    )
    .await?;

    let id = String::from_utf8(bytes).map_err(|_| ValidationError::InvalidData)?;
    if !ids.validate(&id) {
        return Err(ValidationError::InvalidData);
    }
    Ok(id)
}
