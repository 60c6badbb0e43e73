//! Status-code settlement.

use crate::error::{create_error, AdapterError, RequestError};
use crate::response::{NoRequest, Response};

/// Accept `response` when its config's status validator approves the status
/// (`200..=299` without one), reject otherwise with the response attached.
pub fn settle(response: Response) -> Result<Response, AdapterError> {
    let accepted = match &response.config.validate_status {
        Some(validator) => validator.accepts(response.status),
        None => (200..300).contains(&response.status),
    };
    if accepted {
        Ok(response)
    } else {
        Err(status_error(response).into())
    }
}

fn status_error(response: Response) -> RequestError {
    create_error(
        format!("Request failed with status code {}", response.status),
        response.config.clone(),
        None,
        NoRequest,
    )
    .with_response(response)
}
