pub mod conversations;
pub mod documents;
pub mod liveness;
pub mod metrics;
pub mod rag;
pub mod readiness;
pub mod scores;
pub mod sessions;
pub mod test_cases;

use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Parses an optional JSON body; an empty body yields the defaults.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::ValidationError(format!("Invalid JSON body: {e}")))
}
