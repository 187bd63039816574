pub mod auth;
pub mod space;
pub mod teams;

use crate::error::ApiError;

/// Pass successful responses through, turn everything else into a classified error.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApiError::from_response(response).await)
    }
}
