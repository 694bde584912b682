use thiserror::Error;

/// Errors raised by the HoYoLAB client.
///
/// Each variant is one failure class, ordered the way a response is checked:
/// transport, JSON decoding, envelope shape, upstream error code, and finally
/// mapping of individual fields. The client never retries; callers decide what
/// to do with each class.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure, timeout, oversized body or non-2xx HTTP status.
    ///
    /// `status` is the HTTP status received, `None` when no response arrived.
    #[error("Could not request {url}: {reason}")]
    Request {
        url: String,
        status: Option<u16>,
        reason: String,
    },
    /// Response body is not valid JSON
    #[error("Could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    /// JSON is valid but lacks the expected envelope or wrapper
    #[error("Unexpected response from {url}: {reason}")]
    ResponseShape { url: String, reason: String },
    /// The API answered with a non-zero `retcode`
    #[error("HoYoLAB API returned error {code}: {message}")]
    Upstream { code: i64, message: String },
    /// A required field is missing or has the wrong type
    #[error("Could not map post: {0}")]
    Mapping(String),
}

/// Plain tag for the failure class of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Request,
    Decode,
    ResponseShape,
    Upstream,
    Mapping,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Request { .. } => ErrorKind::Request,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::ResponseShape { .. } => ErrorKind::ResponseShape,
            ApiError::Upstream { .. } => ErrorKind::Upstream,
            ApiError::Mapping(_) => ErrorKind::Mapping,
        }
    }

    /// HTTP status of a failed request, if a response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Request { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true if a later attempt at the same call could succeed.
    ///
    /// Transport failures, timeouts, 5xx statuses and upstream errors qualify.
    /// A 4xx status or an oversized body will fail the same way again. Only a
    /// hint for callers; the client itself does not retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Request { status: None, .. } => true,
            ApiError::Request {
                status: Some(status),
                ..
            } => (500..600).contains(status),
            ApiError::Upstream { .. } => true,
            ApiError::Decode { .. } | ApiError::ResponseShape { .. } | ApiError::Mapping(_) => {
                false
            }
        }
    }

    /// Transport failure or timeout: no response was received.
    pub(crate) fn request(url: &str, reason: impl ToString) -> Self {
        ApiError::Request {
            url: url.to_owned(),
            status: None,
            reason: reason.to_string(),
        }
    }

    /// A response arrived with `status` but could not be used.
    pub(crate) fn http(url: &str, status: u16, reason: impl ToString) -> Self {
        ApiError::Request {
            url: url.to_owned(),
            status: Some(status),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(url: &str, reason: impl ToString) -> Self {
        ApiError::Decode {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn shape(url: &str, reason: impl ToString) -> Self {
        ApiError::ResponseShape {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }
}
