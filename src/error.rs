/// Failures talking to the remote collaborators: tracing backend, dataset
/// store, agent runtime and judge model.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn decode(msg: impl Into<String>) -> Self {
        ServiceError::Decode(msg.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Decode(e.to_string())
    }
}

/// Turn a non-success response into `ServiceError::Status`, keeping the body
/// for the log line.
pub async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status,
        body,
    })
}
