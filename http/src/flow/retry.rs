//! Retry harness over the pipeline.
//!
//! Each ingress request is wrapped with an attempt counter and a clone of
//! itself. Failed answers are re-injected at the pipeline's preferred
//! position until the attempt budget is spent; only successful answers
//! reach the caller, with the original context restored.

use super::{spawn, Answers, FlowSender, Harness, Step};
use crate::{answer::RequestAnswer, client::Client, error::Error, request::Request};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Context the retrying pipeline runs with: the attempt number and the
/// request to re-run on failure, which itself carries the caller context.
pub(crate) struct RetryCtx<D, C> {
    attempt: usize,
    original: Request<D, C>,
}

struct RetryHarness {
    max_attempts: usize,
}

impl<D, C> Harness<D, RetryCtx<D, C>> for RetryHarness
where
    D: Send + 'static,
    C: Clone + Send + 'static,
{
    type Out = RequestAnswer<D, C>;

    fn on_answer(
        &mut self,
        answer: RequestAnswer<D, RetryCtx<D, C>>,
    ) -> Step<D, RetryCtx<D, C>, Self::Out> {
        match answer {
            RequestAnswer::Response {
                context,
                data,
                limit,
                remaining,
                route,
                til_reset,
            } => Step::Emit(RequestAnswer::Response {
                context: context.original.context,
                data,
                limit,
                remaining,
                route,
                til_reset,
            }),
            answer => {
                let route = answer.route().clone();
                let RetryCtx { attempt, original } = answer.into_context();
                let next = attempt + 1;

                if next < self.max_attempts {
                    tracing::debug!(
                        bucket = route.bucket(),
                        attempt = next,
                        "re-injecting failed request",
                    );

                    let request = original.clone().with_context(RetryCtx {
                        attempt: next,
                        original,
                    });

                    Step::Reinject(request)
                } else {
                    tracing::debug!(
                        bucket = route.bucket(),
                        attempts = self.max_attempts,
                        "request failed all attempts, dropping",
                    );

                    Step::Discard
                }
            }
        }
    }
}

/// Sending half of a [`RetryFlow`].
pub struct RetrySender<D, C> {
    inner: FlowSender<D, RetryCtx<D, C>>,
}

impl<D, C: Clone> RetrySender<D, C> {
    /// Feed a request into the retrying pipeline.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::FlowClosed`] error type if the pipeline has
    /// shut down.
    ///
    /// [`ErrorType::FlowClosed`]: crate::error::ErrorType::FlowClosed
    pub async fn send(&self, request: Request<D, C>) -> Result<(), Error> {
        let wrapped = request.clone().with_context(RetryCtx {
            attempt: 0,
            original: request,
        });

        self.inner.send(wrapped).await
    }
}

impl<D, C> Clone for RetrySender<D, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D, C> Debug for RetrySender<D, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RetrySender").finish_non_exhaustive()
    }
}

/// A running pipeline that retries failed requests.
///
/// Answers are only ever the successful variant; requests that fail every
/// attempt are silently discarded, leaving a debug-level trace. Answer
/// order is unrelated to request order.
#[derive(Debug)]
pub struct RetryFlow<D, C> {
    answers: Answers<D, C>,
    sender: RetrySender<D, C>,
}

impl<D, C: Clone> RetryFlow<D, C> {
    /// Feed a request into the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::FlowClosed`] error type if the pipeline has
    /// shut down.
    ///
    /// [`ErrorType::FlowClosed`]: crate::error::ErrorType::FlowClosed
    pub async fn send(&self, request: Request<D, C>) -> Result<(), Error> {
        self.sender.send(request).await
    }

    /// An additional sending handle to the pipeline.
    pub fn handle(&self) -> RetrySender<D, C> {
        self.sender.clone()
    }
}

impl<D, C> RetryFlow<D, C> {
    /// Receive the next successful answer.
    ///
    /// Returns `None` once the pipeline has completed.
    pub async fn recv(&mut self) -> Option<RequestAnswer<D, C>> {
        self.answers.recv().await
    }

    /// Receive the next successful answer's payload and context.
    pub async fn recv_data(&mut self) -> Option<(D, C)> {
        self.answers.recv_data().await
    }

    /// Split the flow into its sending and receiving halves.
    ///
    /// The pipeline completes once every sender has been dropped and the
    /// remaining answers have been received.
    #[must_use = "the halves must be used for the flow to make progress"]
    pub fn split(self) -> (RetrySender<D, C>, Answers<D, C>) {
        (self.sender, self.answers)
    }
}

/// Create a retrying flow on the given client.
pub(crate) fn retry_request_flow<D, C>(client: &Client) -> RetryFlow<D, C>
where
    D: Send + 'static,
    C: Clone + Send + 'static,
{
    let max_attempts = client.config().max_retry_count;
    let (inner, rx) = spawn(client, RetryHarness { max_attempts }, true);

    RetryFlow {
        answers: Answers { rx },
        sender: RetrySender { inner },
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryFlow, RetrySender};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(RetryFlow<(), u64>: Debug, Send, Sync);
    assert_impl_all!(RetrySender<(), u64>: Clone, Debug, Send, Sync);
}
