//! Error returned by the client and pipeline.

use hyper::StatusCode;
use std::{
    error::Error as StdError,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    result::Result as StdResult,
};

/// Result alias with the crate's [`Error`] as the default error type.
pub type Result<T, E = Error> = StdResult<T, E>;

/// Failure while building, sending, or interpreting a request.
///
/// Per-request failures are carried inside the
/// [`RequestAnswer::Error`] variant and never abort the pipeline.
///
/// [`RequestAnswer::Error`]: crate::RequestAnswer::Error
#[derive(Debug)]
pub struct Error {
    pub(crate) kind: ErrorType,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ErrorType, Option<Box<dyn StdError + Send + Sync>>) {
        (self.kind, self.source)
    }

    pub(crate) fn json(source: serde_json::Error) -> Self {
        Self {
            kind: ErrorType::Json,
            source: Some(Box::new(source)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ErrorType::BuildingRequest => f.write_str("failed to build the request"),
            ErrorType::ChunkingResponse => f.write_str("chunking the response failed"),
            ErrorType::CreatingHeader { name } => {
                write!(f, "parsing the value for header {name} failed")
            }
            ErrorType::FlowClosed => f.write_str("the flow has been closed"),
            ErrorType::Json => f.write_str("given value couldn't be serialized"),
            ErrorType::Parsing { body, .. } => {
                write!(f, "response body couldn't be deserialized: {body:?}")
            }
            ErrorType::RatelimiterClosed => f.write_str("the rate-limit ledger has shut down"),
            ErrorType::ReasonInvalid { .. } => {
                f.write_str("audit log reason is longer than 512 characters")
            }
            ErrorType::RequestError => f.write_str("sending the request failed"),
            ErrorType::RequestTimedOut => f.write_str("request timed out"),
            ErrorType::Response { status, .. } => {
                write!(f, "response error: status code {status}")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`Error`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorType {
    /// Assembling the HTTP message failed.
    BuildingRequest,
    /// Reading the response body failed.
    ChunkingResponse,
    /// A header value could not be constructed.
    CreatingHeader {
        /// Name of the header.
        name: String,
    },
    /// The flow's ingress or egress has been closed.
    FlowClosed,
    /// A body could not be serialized as JSON.
    Json,
    /// The request's response parser rejected the body.
    Parsing {
        /// Body of the response.
        body: Vec<u8>,
    },
    /// The rate-limit ledger task has shut down.
    RatelimiterClosed,
    /// An audit log reason exceeded the permitted length.
    ReasonInvalid {
        /// The rejected reason.
        reason: String,
    },
    /// Sending the request failed at the transport level.
    RequestError,
    /// The request did not complete within the configured timeout.
    RequestTimedOut,
    /// The response status was neither a success nor a rate limit.
    Response {
        /// Body of the response, capped at [`ERROR_BODY_LIMIT`] bytes.
        ///
        /// [`ERROR_BODY_LIMIT`]: crate::client::ERROR_BODY_LIMIT
        body: Vec<u8>,
        /// Status code of the response.
        status: StatusCode,
    },
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorType};
    use static_assertions::assert_impl_all;
    use std::{error::Error as StdError, fmt::Debug};

    assert_impl_all!(Error: Debug, Send, StdError, Sync);
    assert_impl_all!(ErrorType: Debug, Send, Sync);
}
