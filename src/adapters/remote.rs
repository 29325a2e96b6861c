use thiserror::Error;

/// Failure of an outbound HTTP call, split into transient and protocol errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {message}")]
    Transient { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },
}

impl RemoteError {
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Decode {
                url: url.to_string(),
                message: error.to_string(),
            };
        }

        match error.status() {
            Some(status) => Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
            },
            None => Self::Transient {
                url: url.to_string(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
