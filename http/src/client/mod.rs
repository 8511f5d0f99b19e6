//! Client over a shared connection pool, dispatching single requests.

mod builder;
mod connector;

pub use self::builder::ClientBuilder;

use crate::{
    answer::RequestAnswer,
    error::{Error, ErrorType},
    flow::{self, Flow, OverflowStrategy, RetryFlow},
    request::Request,
    API_VERSION,
};
use concord_ratelimit::{Ledger, RatelimitSnapshot};
use hyper::{
    body,
    client::Client as HyperClient,
    header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
    Body, Method, StatusCode,
};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};
use tokio::time;

/// Host requests are sent to when no proxy is configured.
const HOST: &str = "discord.com";

/// Maximum number of body bytes kept for a non-success, non-429 response.
pub const ERROR_BODY_LIMIT: usize = 8192;

/// Pipeline parameters shared by the client and its flows.
pub(crate) struct Config {
    pub(crate) buffer_size: usize,
    pub(crate) log_received_rest: bool,
    pub(crate) log_sent_rest: bool,
    pub(crate) max_allowed_wait: Duration,
    pub(crate) max_retry_count: usize,
    pub(crate) overflow_strategy: OverflowStrategy,
    pub(crate) parallelism: usize,
    pub(crate) proxy: Option<Box<str>>,
    pub(crate) timeout: Duration,
    pub(crate) use_http: bool,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Config")
            .field("buffer_size", &self.buffer_size)
            .field("max_allowed_wait", &self.max_allowed_wait)
            .field("max_retry_count", &self.max_retry_count)
            .field("overflow_strategy", &self.overflow_strategy)
            .field("parallelism", &self.parallelism)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

struct State {
    config: Config,
    http: HyperClient<connector::Connector>,
    ledger: Ledger,
    token: Option<Box<str>>,
}

impl Debug for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("State")
            .field("config", &self.config)
            .field("http", &self.http)
            .field("ledger", &self.ledger)
            .field("token", &self.token)
            .finish()
    }
}

/// HTTP client turning streams of requests into streams of answers.
///
/// The client internally wraps its data within an Arc, so it can be cloned
/// and passed around tasks cheaply. All flows created from one client share
/// its connection pool and rate-limit ledger.
///
/// To use a bearer token prefix it with `"Bearer "`; bare tokens are
/// assumed to be bot tokens.
///
/// # Examples
///
/// ```rust,no_run
/// use concord_http::Client;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let client = Client::new("my token".to_owned());
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) state: Arc<State>,
}

impl Client {
    /// Create a new client with a token.
    ///
    /// Spawns the rate-limit ledger task, so this must be called from
    /// within a Tokio runtime.
    pub fn new(token: String) -> Self {
        ClientBuilder::default().token(token).build()
    }

    /// Create a new builder to create a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Immutable reference to the token used by the client.
    ///
    /// If the initial token provided is not prefixed with `Bot `, it will
    /// be, and this method reflects that.
    pub fn token(&self) -> Option<&str> {
        self.state.token.as_deref()
    }

    /// Handle to the rate-limit ledger used by the client.
    ///
    /// Pass it to another client's builder to share rate-limit accounting.
    pub fn ledger(&self) -> Ledger {
        self.state.ledger.clone()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.state.config
    }

    /// Create a rate-limit-aware flow.
    ///
    /// Requests sent into the flow pass the ledger gate, are dispatched
    /// with bounded concurrency, and produce exactly one answer each.
    /// Answer order is not related to request order; use the caller context
    /// to correlate.
    pub fn request_flow<D, C>(&self) -> Flow<D, C>
    where
        D: Send + 'static,
        C: Send + 'static,
    {
        flow::request_flow(self, true)
    }

    /// Create a flow that skips rate-limit handling entirely.
    ///
    /// Requests neither wait at the ledger gate nor report their response
    /// headers back to it.
    pub fn request_flow_without_ratelimit<D, C>(&self) -> Flow<D, C>
    where
        D: Send + 'static,
        C: Send + 'static,
    {
        flow::request_flow(self, false)
    }

    /// Create a rate-limit-aware flow that retries failed requests.
    ///
    /// Only successful answers are emitted. Failed requests are re-injected
    /// ahead of fresh ingress until the configured attempt count is
    /// exhausted, after which they are discarded.
    pub fn retry_request_flow<D, C>(&self) -> RetryFlow<D, C>
    where
        D: Send + 'static,
        C: Clone + Send + 'static,
    {
        flow::retry_request_flow(self)
    }

    /// Execute a single request, returning its answer.
    ///
    /// This is the dispatch stage of the pipeline: it does not consult the
    /// rate-limit ledger. Prefer the flows for anything beyond one-off
    /// calls.
    #[allow(clippy::too_many_lines)]
    pub async fn execute<D, C>(&self, request: Request<D, C>) -> RequestAnswer<D, C> {
        let Request {
            body,
            context,
            headers: extra_headers,
            log_body,
            parser,
            reason,
            route,
        } = request;

        let protocol = if self.state.config.use_http {
            "http"
        } else {
            "https"
        };
        let host = self.state.config.proxy.as_deref().unwrap_or(HOST);
        let url = format!("{protocol}://{host}/api/v{API_VERSION}/{}", route.path());

        let mut builder = hyper::Request::builder()
            .method(route.method().clone())
            .uri(&url);

        if let Some(headers) = builder.headers_mut() {
            if let Some(token) = self.state.token.as_deref() {
                let value = match HeaderValue::from_str(token) {
                    Ok(value) => value,
                    Err(source) => {
                        return RequestAnswer::Error {
                            context,
                            route,
                            source: Error {
                                kind: ErrorType::CreatingHeader {
                                    name: "authorization".to_owned(),
                                },
                                source: Some(Box::new(source)),
                            },
                        };
                    }
                };

                headers.insert(AUTHORIZATION, value);
            }

            let user_agent = HeaderValue::from_static(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_HOMEPAGE"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ") Concord-rs",
            ));
            headers.insert(USER_AGENT, user_agent);

            if let Some(bytes) = &body {
                headers.insert(CONTENT_LENGTH, bytes.len().into());
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            } else if route.method() == Method::PATCH
                || route.method() == Method::POST
                || route.method() == Method::PUT
            {
                headers.insert(CONTENT_LENGTH, 0.into());
            }

            if let Some(reason) = &reason {
                let value = match HeaderValue::from_str(reason) {
                    Ok(value) => value,
                    Err(source) => {
                        return RequestAnswer::Error {
                            context,
                            route,
                            source: Error {
                                kind: ErrorType::CreatingHeader {
                                    name: "x-audit-log-reason".to_owned(),
                                },
                                source: Some(Box::new(source)),
                            },
                        };
                    }
                };

                headers.insert(HeaderName::from_static("x-audit-log-reason"), value);
            }

            if let Some(extra) = extra_headers {
                for (maybe_name, value) in extra {
                    if let Some(name) = maybe_name {
                        headers.insert(name, value);
                    }
                }
            }
        }

        if self.state.config.log_sent_rest {
            let rendered = body.as_deref().map_or_else(String::new, |bytes| {
                log_body
                    .as_ref()
                    .map_or_else(|| String::from_utf8_lossy(bytes).into_owned(), |render| render(bytes))
            });

            tracing::debug!(route = %route, body = %rendered, "sending request");
        }

        let req = match body {
            Some(bytes) => builder.body(Body::from(bytes)),
            None => builder.body(Body::empty()),
        };

        let req = match req {
            Ok(req) => req,
            Err(source) => {
                return RequestAnswer::Error {
                    context,
                    route,
                    source: Error {
                        kind: ErrorType::BuildingRequest,
                        source: Some(Box::new(source)),
                    },
                };
            }
        };

        let inner = self.state.http.request(req);

        let response = match time::timeout(self.state.config.timeout, inner).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return RequestAnswer::Error {
                    context,
                    route,
                    source: Error {
                        kind: ErrorType::RequestError,
                        source: Some(Box::new(source)),
                    },
                };
            }
            Err(source) => {
                return RequestAnswer::Error {
                    context,
                    route,
                    source: Error {
                        kind: ErrorType::RequestTimedOut,
                        source: Some(Box::new(source)),
                    },
                };
            }
        };

        let snapshot = match RatelimitSnapshot::from_pairs(
            response
                .headers()
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_bytes())),
        ) {
            Ok(snapshot) => snapshot,
            Err(source) => {
                tracing::warn!(route = %route, "rate limit header parsing failed: {source}");

                RatelimitSnapshot::new(false, -1, -1, Duration::ZERO)
            }
        };

        let status = response.status();

        // The body of a 429 carries nothing the pipeline needs.
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::debug!(route = %route, global = snapshot.global(), "got rate limited");

            return RequestAnswer::Ratelimited {
                context,
                global: snapshot.global(),
                limit: snapshot.limit(),
                route,
                til_reset: snapshot.til_reset(),
            };
        }

        let bytes = match body::to_bytes(response.into_body()).await {
            Ok(bytes) => bytes,
            Err(source) => {
                return RequestAnswer::Error {
                    context,
                    route,
                    source: Error {
                        kind: ErrorType::ChunkingResponse,
                        source: Some(Box::new(source)),
                    },
                };
            }
        };

        if self.state.config.log_received_rest {
            tracing::debug!(
                route = %route,
                status = %status,
                body = %String::from_utf8_lossy(&bytes),
                "received response",
            );
        }

        if !status.is_success() {
            let mut body = bytes.to_vec();
            body.truncate(ERROR_BODY_LIMIT);

            return RequestAnswer::Error {
                context,
                route,
                source: Error {
                    kind: ErrorType::Response { body, status },
                    source: None,
                },
            };
        }

        match (parser)(&bytes) {
            Ok(data) => RequestAnswer::Response {
                context,
                data,
                limit: snapshot.limit(),
                remaining: snapshot.remaining(),
                route,
                til_reset: snapshot.til_reset(),
            },
            Err(source) => RequestAnswer::Error {
                context,
                route,
                source: Error {
                    kind: ErrorType::Parsing {
                        body: bytes.to_vec(),
                    },
                    source: Some(source),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Client;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Client: Clone, Debug, Send, Sync);
}
