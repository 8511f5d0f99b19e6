//! Typed requests consumed by the pipeline.

use crate::{
    error::{Error, ErrorType},
    routing::Route,
};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    error::Error as StdError,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

/// The maximum audit log reason length in codepoints.
pub const AUDIT_REASON_LENGTH: usize = 512;

/// Function decoding a response body into the request's payload type.
type ParseFn<D> = dyn Fn(&[u8]) -> Result<D, Box<dyn StdError + Send + Sync>> + Send + Sync;

/// Function rendering a request body for logging.
type RenderFn = dyn Fn(&[u8]) -> String + Send + Sync;

/// A single request to run through the pipeline.
///
/// `D` is the decoded response payload type and `C` an opaque caller
/// context, handed back untouched with the request's answer so that answers
/// can be correlated without relying on ordering.
///
/// Each request is consumed exactly once by the pipeline and produces
/// exactly one [`RequestAnswer`].
///
/// [`RequestAnswer`]: crate::RequestAnswer
pub struct Request<D, C> {
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) context: C,
    pub(crate) headers: Option<HeaderMap>,
    pub(crate) log_body: Option<Arc<RenderFn>>,
    pub(crate) parser: Arc<ParseFn<D>>,
    pub(crate) reason: Option<String>,
    pub(crate) route: Route,
}

impl<D: DeserializeOwned + 'static, C> Request<D, C> {
    /// Create a new request builder with the default JSON response parser.
    ///
    /// # Examples
    ///
    /// Create a request posting a message in channel `1` with a caller
    /// context of `77`:
    ///
    /// ```
    /// use concord_http::{Request, Route};
    /// use hyper::Method;
    /// use serde_json::Value;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let route = Route::new(Method::POST, "channels/1/messages", "channels/{channel_id}/messages");
    /// let request: Request<Value, u64> = Request::builder(route, 77)
    ///     .body(br#"{"content":"test"}"#.to_vec())
    ///     .build();
    /// # Ok(()) }
    /// ```
    #[must_use = "request has not been fully built"]
    pub fn builder(route: Route, context: C) -> RequestBuilder<D, C> {
        RequestBuilder(Self {
            body: None,
            context,
            headers: None,
            log_body: None,
            parser: json_parser(),
            reason: None,
            route,
        })
    }
}

impl<D, C> Request<D, C> {
    /// Create a request builder with a custom response parser.
    ///
    /// Use this when `D` is not deserialized from JSON, or when decoding
    /// needs more context than the raw body.
    #[must_use = "request has not been fully built"]
    pub fn with_parser(
        route: Route,
        context: C,
        parser: impl Fn(&[u8]) -> Result<D, Box<dyn StdError + Send + Sync>> + Send + Sync + 'static,
    ) -> RequestBuilder<D, C> {
        RequestBuilder(Self {
            body: None,
            context,
            headers: None,
            log_body: None,
            parser: Arc::new(parser),
            reason: None,
            route,
        })
    }

    /// Immutable reference to the caller context.
    pub const fn context(&self) -> &C {
        &self.context
    }

    /// Route of the request.
    pub const fn route(&self) -> &Route {
        &self.route
    }

    /// Replace the caller context, keeping everything else.
    pub fn with_context<C2>(self, context: C2) -> Request<D, C2> {
        Request {
            body: self.body,
            context,
            headers: self.headers,
            log_body: self.log_body,
            parser: self.parser,
            reason: self.reason,
            route: self.route,
        }
    }
}

impl<D, C: Clone> Clone for Request<D, C> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
            context: self.context.clone(),
            headers: self.headers.clone(),
            log_body: self.log_body.clone(),
            parser: Arc::clone(&self.parser),
            reason: self.reason.clone(),
            route: self.route.clone(),
        }
    }
}

impl<D, C: Debug> Debug for Request<D, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Request")
            .field("body", &self.body)
            .field("context", &self.context)
            .field("headers", &self.headers)
            .field("reason", &self.reason)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

/// Builder to create a customized [`Request`].
pub struct RequestBuilder<D, C>(Request<D, C>);

impl<D, C> RequestBuilder<D, C> {
    /// Consume the builder, returning the built request.
    #[must_use = "request information is not useful on its own and must be acted on"]
    pub fn build(self) -> Request<D, C> {
        self.0
    }

    /// Set the contents of the body.
    #[must_use = "request has not been fully built"]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.0.body.replace(body);

        self
    }

    /// Set the headers to add.
    #[must_use = "request has not been fully built"]
    pub fn headers(mut self, iter: impl Iterator<Item = (HeaderName, HeaderValue)>) -> Self {
        self.0.headers.replace(iter.collect());

        self
    }

    /// Set the body, to be serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::Json`] error type if the value could not be
    /// serialized as JSON.
    ///
    /// [`ErrorType::Json`]: crate::error::ErrorType::Json
    #[must_use = "request has not been fully built"]
    pub fn json(self, to: &impl Serialize) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(to).map_err(Error::json)?;

        Ok(self.body(bytes))
    }

    /// Render the body through the given function when payload logging is
    /// enabled, instead of lossy UTF-8.
    #[must_use = "request has not been fully built"]
    pub fn log_body_with(mut self, render: impl Fn(&[u8]) -> String + Send + Sync + 'static) -> Self {
        self.0.log_body.replace(Arc::new(render));

        self
    }

    /// Attach an audit log reason to the request.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::ReasonInvalid`] error type if the reason is
    /// longer than [`AUDIT_REASON_LENGTH`] codepoints. Overlong reasons are
    /// rejected outright, never truncated.
    ///
    /// [`ErrorType::ReasonInvalid`]: crate::error::ErrorType::ReasonInvalid
    #[must_use = "request has not been fully built"]
    pub fn reason(mut self, reason: impl Into<String>) -> Result<Self, Error> {
        let reason = reason.into();

        if reason.chars().count() > AUDIT_REASON_LENGTH {
            return Err(Error {
                kind: ErrorType::ReasonInvalid { reason },
                source: None,
            });
        }

        self.0.reason.replace(reason);

        Ok(self)
    }

    /// Replace the response parser.
    #[must_use = "request has not been fully built"]
    pub fn parser(
        mut self,
        parser: impl Fn(&[u8]) -> Result<D, Box<dyn StdError + Send + Sync>> + Send + Sync + 'static,
    ) -> Self {
        self.0.parser = Arc::new(parser);

        self
    }
}

impl<D, C: Debug> Debug for RequestBuilder<D, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("RequestBuilder").field(&self.0).finish()
    }
}

/// Default parser deserializing the body as JSON.
///
/// An empty body, as produced by a 204 response, is decoded as JSON `null`
/// so that payload types accepting null keep working.
fn json_parser<D: DeserializeOwned>() -> Arc<ParseFn<D>> {
    Arc::new(|bytes: &[u8]| {
        let bytes = if bytes.is_empty() { b"null" } else { bytes };

        serde_json::from_slice(bytes)
            .map_err(|source| Box::new(source) as Box<dyn StdError + Send + Sync>)
    })
}
