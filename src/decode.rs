//! Decoding of individual event payloads.
//!
//! A payload is first decoded as the expected result type, then as an error
//! envelope. What happens when both fail depends only on where the payload
//! sat in its chunk: the last fragment may simply be cut off by the chunk
//! boundary and is handed back for buffering, any other fragment is a
//! genuine failure.

use serde::de::DeserializeOwned;

use crate::client::ClientError;
use crate::model::{ApiError, ApiErrorResponse};

/// Where a fragment sat among the fragments extracted from one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentPosition {
    /// Followed by another fragment; its end boundary has been seen.
    Inner,
    /// Last fragment of the chunk; its end boundary may still be in flight.
    Last,
}

/// Result of decoding one complete payload.
#[derive(Debug)]
pub enum DecodedEvent<T> {
    Item(T),
    ApiError(ApiError),
    /// Valid text that is neither a `T` nor an error envelope.
    Failure(ClientError),
}

/// Outcome of [`decode`].
#[derive(Debug)]
pub enum Decoded<T> {
    Complete(DecodedEvent<T>),
    /// The payload did not decode but may be the head of a split event.
    Truncated,
}

/// Decode one event payload.
pub fn decode<T: DeserializeOwned>(payload: &str, position: FragmentPosition) -> Decoded<T> {
    let error = match serde_json::from_str::<T>(payload) {
        Ok(item) => return Decoded::Complete(DecodedEvent::Item(item)),
        Err(error) => error,
    };

    if let Ok(response) = serde_json::from_str::<ApiErrorResponse>(payload) {
        return Decoded::Complete(DecodedEvent::ApiError(response.error));
    }

    match position {
        FragmentPosition::Last => Decoded::Truncated,
        FragmentPosition::Inner => Decoded::Complete(DecodedEvent::Failure(ClientError::Parse(error))),
    }
}

/// Decode a complete, non-streamed response body.
pub fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClientError> {
    if body.is_empty() {
        return Err(ClientError::EmptyData);
    }

    match serde_json::from_slice::<T>(body) {
        Ok(value) => Ok(value),
        Err(error) => match serde_json::from_slice::<ApiErrorResponse>(body) {
            Ok(response) => Err(ClientError::Api(response.error)),
            Err(_) => Err(ClientError::Parse(error)),
        },
    }
}
