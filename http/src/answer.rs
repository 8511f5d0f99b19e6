//! Outcomes of pipeline requests.

use crate::{error::Error, routing::Route};
use concord_ratelimit::RatelimitSnapshot;
use std::time::Duration;

/// Outcome of a single [`Request`].
///
/// Every request produces exactly one answer. [`Response`] is the only
/// successful variant; the other three are failures the retry harness may
/// re-inject. Each variant carries the request's route and the opaque
/// caller context untouched.
///
/// Numeric rate-limit fields are `-1` when the response did not carry the
/// corresponding header.
///
/// [`Request`]: crate::Request
/// [`Response`]: Self::Response
#[derive(Debug)]
pub enum RequestAnswer<D, C> {
    /// The caller asked to drop the request because the rate-limit ledger
    /// could not admit it within the maximum allowed wait.
    Dropped {
        /// Caller context of the request.
        context: C,
        /// Route of the request.
        route: Route,
    },
    /// The request failed in transport, decoding, or with a non-success
    /// status other than a rate limit.
    Error {
        /// Caller context of the request.
        context: C,
        /// Route of the request.
        route: Route,
        /// What went wrong.
        source: Error,
    },
    /// The server answered with a 429.
    Ratelimited {
        /// Caller context of the request.
        context: C,
        /// Whether the rate limit applies to every route.
        global: bool,
        /// Request allotment of the route's bucket.
        limit: i64,
        /// Route of the request.
        route: Route,
        /// Time until the bucket resets.
        til_reset: Duration,
    },
    /// The request succeeded and its body was decoded.
    Response {
        /// Caller context of the request.
        context: C,
        /// Decoded response payload.
        data: D,
        /// Request allotment of the route's bucket.
        limit: i64,
        /// Requests remaining in the current window.
        remaining: i64,
        /// Route of the request.
        route: Route,
        /// Time until the bucket resets.
        til_reset: Duration,
    },
}

impl<D, C> RequestAnswer<D, C> {
    /// Immutable reference to the caller context.
    pub const fn context(&self) -> &C {
        match self {
            Self::Dropped { context, .. }
            | Self::Error { context, .. }
            | Self::Ratelimited { context, .. }
            | Self::Response { context, .. } => context,
        }
    }

    /// Route of the answered request.
    pub const fn route(&self) -> &Route {
        match self {
            Self::Dropped { route, .. }
            | Self::Error { route, .. }
            | Self::Ratelimited { route, .. }
            | Self::Response { route, .. } => route,
        }
    }

    /// Whether this is the successful variant.
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::Response { .. })
    }

    /// Consume the answer, returning the decoded payload and context if it
    /// was successful.
    #[must_use = "consuming the answer and retrieving the data has no effect if left unused"]
    pub fn into_data(self) -> Option<(D, C)> {
        match self {
            Self::Response { context, data, .. } => Some((data, context)),
            _ => None,
        }
    }

    /// Consume the answer, returning the caller context.
    #[must_use = "consuming the answer and retrieving the context has no effect if left unused"]
    pub fn into_context(self) -> C {
        match self {
            Self::Dropped { context, .. }
            | Self::Error { context, .. }
            | Self::Ratelimited { context, .. }
            | Self::Response { context, .. } => context,
        }
    }

    /// Snapshot worth recording in the ledger, if the answer carries one.
    ///
    /// Successful answers are recorded when they carry a full bucket
    /// description. A rate-limited answer is always recorded as an
    /// exhausted bucket as long as it says how long to back off, even when
    /// the bucket headers themselves were missing.
    pub(crate) fn ledger_update(&self) -> Option<RatelimitSnapshot> {
        match self {
            Self::Ratelimited {
                global,
                limit,
                til_reset,
                ..
            } => (*global || !til_reset.is_zero())
                .then(|| RatelimitSnapshot::exhausted(*global, *til_reset, *limit)),
            Self::Response {
                limit,
                remaining,
                til_reset,
                ..
            } => {
                let snapshot = RatelimitSnapshot::new(false, *limit, *remaining, *til_reset);

                snapshot.is_complete().then(|| snapshot)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequestAnswer;
    use crate::routing::Route;
    use hyper::Method;
    use serde_json::Value;
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, time::Duration};

    assert_impl_all!(RequestAnswer<Value, u64>: Debug, Send, Sync);

    fn route() -> Route {
        Route::new(Method::GET, "users/1", "users/{user_id}")
    }

    #[test]
    fn into_data_only_for_responses() {
        let response = RequestAnswer::<Value, u64>::Response {
            context: 1,
            data: Value::Bool(true),
            limit: 5,
            remaining: 4,
            route: route(),
            til_reset: Duration::from_secs(1),
        };
        assert_eq!(Some((Value::Bool(true), 1)), response.into_data());

        let dropped = RequestAnswer::<Value, u64>::Dropped {
            context: 2,
            route: route(),
        };
        assert!(dropped.into_data().is_none());
    }

    #[test]
    fn incomplete_response_snapshot_not_recorded() {
        let answer = RequestAnswer::<Value, ()>::Response {
            context: (),
            data: Value::Null,
            limit: -1,
            remaining: 4,
            route: route(),
            til_reset: Duration::from_secs(1),
        };

        assert!(answer.ledger_update().is_none());
    }

    #[test]
    fn ratelimited_always_recorded_with_backoff() {
        let answer = RequestAnswer::<Value, ()>::Ratelimited {
            context: (),
            global: false,
            limit: -1,
            route: route(),
            til_reset: Duration::from_secs(2),
        };

        let snapshot = answer.ledger_update().unwrap();
        assert_eq!(0, snapshot.remaining());
        assert_eq!(Duration::from_secs(2), snapshot.til_reset());
    }
}
