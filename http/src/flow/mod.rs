//! Streaming pipeline turning requests into answers.
//!
//! A flow is a set of cooperating tasks: an optional ingress relay applying
//! the configured overflow strategy, and a driver that gates requests
//! through the rate-limit ledger, dispatches them with bounded concurrency,
//! feeds observed rate limits back into the ledger, and pushes answers to
//! the egress channel.
//!
//! Requests complete in whatever order the network allows; use the caller
//! context to correlate answers with requests.

mod retry;

pub use self::retry::{RetryFlow, RetrySender};

pub(crate) use self::retry::retry_request_flow;

use crate::{
    answer::RequestAnswer,
    client::Client,
    error::{Error, ErrorType},
    request::Request,
};
use concord_ratelimit::{Ledger, Passage};
use futures_util::{
    future::BoxFuture,
    stream::{FuturesUnordered, StreamExt},
};
use std::{
    collections::VecDeque,
    fmt::{Debug, Formatter, Result as FmtResult},
    time::Duration,
};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// What to do with an incoming request when the ingress buffer is full.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OverflowStrategy {
    /// Slow senders down until the buffer has room again.
    Backpressure,
    /// Clear the whole buffer and enqueue the incoming request.
    DropBuffer,
    /// Drop the incoming request.
    DropNewest,
    /// Drop the oldest buffered request to make room.
    DropOldest,
    /// Close the flow; senders observe it as closed.
    Fail,
}

/// Sending half of a [`Flow`].
///
/// Cheaply cloneable so multiple tasks can feed one pipeline.
pub struct FlowSender<D, C> {
    kind: SenderKind<D, C>,
}

enum SenderKind<D, C> {
    Bounded(mpsc::Sender<Request<D, C>>),
    Relayed(mpsc::UnboundedSender<Request<D, C>>),
}

impl<D, C> FlowSender<D, C> {
    /// Feed a request into the pipeline.
    ///
    /// Under [`OverflowStrategy::Backpressure`] this waits until the
    /// ingress buffer has room; under every other strategy it returns
    /// immediately and the buffer applies the strategy.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::FlowClosed`] error type if the pipeline has
    /// shut down.
    ///
    /// [`ErrorType::FlowClosed`]: crate::error::ErrorType::FlowClosed
    pub async fn send(&self, request: Request<D, C>) -> Result<(), Error> {
        let result = match &self.kind {
            SenderKind::Bounded(tx) => tx.send(request).await.map_err(|_| ()),
            SenderKind::Relayed(tx) => tx.send(request).map_err(|_| ()),
        };

        result.map_err(|()| Error {
            kind: ErrorType::FlowClosed,
            source: None,
        })
    }
}

impl<D, C> Clone for FlowSender<D, C> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            SenderKind::Bounded(tx) => SenderKind::Bounded(tx.clone()),
            SenderKind::Relayed(tx) => SenderKind::Relayed(tx.clone()),
        };

        Self { kind }
    }
}

impl<D, C> Debug for FlowSender<D, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FlowSender").finish_non_exhaustive()
    }
}

/// Receiving half of a [`Flow`].
pub struct Answers<D, C> {
    rx: mpsc::Receiver<RequestAnswer<D, C>>,
}

impl<D, C> Answers<D, C> {
    /// Receive the next answer.
    ///
    /// Returns `None` once the pipeline has completed: every sender was
    /// dropped and all in-flight requests have been answered.
    pub async fn recv(&mut self) -> Option<RequestAnswer<D, C>> {
        self.rx.recv().await
    }

    /// Receive the next successful answer's payload and context, skipping
    /// failed answers.
    pub async fn recv_data(&mut self) -> Option<(D, C)> {
        loop {
            let answer = self.recv().await?;

            if let Some(data) = answer.into_data() {
                return Some(data);
            }
        }
    }
}

impl<D, C> Debug for Answers<D, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Answers").finish_non_exhaustive()
    }
}

/// A running request pipeline.
///
/// Dropping the flow (or its [`Answers`] half) cancels the pipeline:
/// upstream tasks stop and in-flight requests are aborted.
#[derive(Debug)]
pub struct Flow<D, C> {
    answers: Answers<D, C>,
    sender: FlowSender<D, C>,
}

impl<D, C> Flow<D, C> {
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

    /// Receive the next answer.
    pub async fn recv(&mut self) -> Option<RequestAnswer<D, C>> {
        self.answers.recv().await
    }

    /// Receive the next successful answer's payload and context, skipping
    /// failed answers.
    pub async fn recv_data(&mut self) -> Option<(D, C)> {
        self.answers.recv_data().await
    }

    /// An additional sending handle to the pipeline.
    pub fn handle(&self) -> FlowSender<D, C> {
        self.sender.clone()
    }

    /// Split the flow into its sending and receiving halves.
    ///
    /// The pipeline completes once every sender has been dropped and the
    /// remaining answers have been received.
    #[must_use = "the halves must be used for the flow to make progress"]
    pub fn split(self) -> (FlowSender<D, C>, Answers<D, C>) {
        (self.sender, self.answers)
    }

    /// Convert the flow into one that preserves ordering.
    ///
    /// Ordering is restored by serializing the pipeline element by element,
    /// giving up all concurrency. Mostly useful for debugging.
    #[must_use]
    pub fn ordered(self) -> OrderedFlow<D, C> {
        OrderedFlow { flow: self }
    }
}

/// A flow wrapper that runs one request at a time.
///
/// Created with [`Flow::ordered`]. Answers come back in request order at
/// the cost of all pipeline concurrency.
#[derive(Debug)]
pub struct OrderedFlow<D, C> {
    flow: Flow<D, C>,
}

impl<D, C> OrderedFlow<D, C> {
    /// Run a single request through the pipeline and wait for its answer.
    ///
    /// Returns `None` if the pipeline shut down before answering.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::FlowClosed`] error type if the pipeline has
    /// shut down.
    ///
    /// [`ErrorType::FlowClosed`]: crate::error::ErrorType::FlowClosed
    pub async fn send_and_recv(
        &mut self,
        request: Request<D, C>,
    ) -> Result<Option<RequestAnswer<D, C>>, Error> {
        self.flow.send(request).await?;

        Ok(self.flow.recv().await)
    }
}

/// What the driver should do with an answer.
pub(crate) enum Step<D, C, Out> {
    /// Forget the answer.
    Discard,
    /// Push a value to the egress channel.
    Emit(Out),
    /// Run the request again, ahead of fresh ingress.
    Reinject(Request<D, C>),
}

/// Per-answer decision seam between the plain and retrying pipelines.
pub(crate) trait Harness<D: Send + 'static, C: Send + 'static>: Send + 'static {
    /// What the egress channel carries.
    type Out: Send + 'static;

    /// Decide what happens to an answer.
    fn on_answer(&mut self, answer: RequestAnswer<D, C>) -> Step<D, C, Self::Out>;
}

/// Harness emitting every answer untouched.
pub(crate) struct PassThrough;

impl<D: Send + 'static, C: Send + 'static> Harness<D, C> for PassThrough {
    type Out = RequestAnswer<D, C>;

    fn on_answer(&mut self, answer: RequestAnswer<D, C>) -> Step<D, C, Self::Out> {
        Step::Emit(answer)
    }
}

/// Create a plain flow on the given client.
pub(crate) fn request_flow<D, C>(client: &Client, use_ledger: bool) -> Flow<D, C>
where
    D: Send + 'static,
    C: Send + 'static,
{
    let (sender, rx) = spawn(client, PassThrough, use_ledger);

    Flow {
        answers: Answers { rx },
        sender,
    }
}

/// Wire up and spawn the pipeline tasks for a flow.
fn spawn<D, C, H>(client: &Client, harness: H, use_ledger: bool) -> (FlowSender<D, C>, mpsc::Receiver<H::Out>)
where
    D: Send + 'static,
    C: Send + 'static,
    H: Harness<D, C>,
{
    let config = client.config();

    let (kind, ingress) = match config.overflow_strategy {
        OverflowStrategy::Backpressure => {
            let (tx, rx) = mpsc::channel(config.buffer_size);

            (SenderKind::Bounded(tx), rx)
        }
        strategy => {
            let (relay_tx, relay_rx) = mpsc::unbounded_channel();
            let (tx, rx) = mpsc::channel(1);

            tokio::spawn(relay(relay_rx, tx, config.buffer_size, strategy));

            (SenderKind::Relayed(relay_tx), rx)
        }
    };

    let (egress, rx) = mpsc::channel(config.buffer_size);

    let driver = Driver {
        client: client.clone(),
        egress,
        harness,
        in_flight: FuturesUnordered::new(),
        ingress,
        ingress_done: false,
        ledger: use_ledger.then(|| client.ledger()),
        max_allowed_wait: config.max_allowed_wait,
        parallelism: config.parallelism,
        retries: VecDeque::new(),
    };

    tokio::spawn(driver.run());

    (FlowSender { kind }, rx)
}

/// Buffer stage applying a dropping overflow strategy.
///
/// Owns the queue between the unbounded ingress channel and the driver's
/// single-slot hand-off. [`OverflowStrategy::Fail`] ends the task, which
/// closes the flow on both sides.
async fn relay<T>(
    mut rx: mpsc::UnboundedReceiver<T>,
    tx: mpsc::Sender<T>,
    capacity: usize,
    strategy: OverflowStrategy,
) {
    let mut queue: VecDeque<T> = VecDeque::new();

    loop {
        if queue.is_empty() {
            match rx.recv().await {
                Some(item) => queue.push_back(item),
                None => break,
            }

            continue;
        }

        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(item) => {
                    if queue.len() < capacity {
                        queue.push_back(item);
                    } else {
                        match strategy {
                            OverflowStrategy::DropBuffer => {
                                tracing::debug!("ingress buffer overflowed, clearing it");
                                queue.clear();
                                queue.push_back(item);
                            }
                            OverflowStrategy::DropOldest => {
                                tracing::debug!("ingress buffer overflowed, dropping oldest");
                                queue.pop_front();
                                queue.push_back(item);
                            }
                            OverflowStrategy::Fail => {
                                tracing::error!("ingress buffer overflowed, failing the flow");

                                return;
                            }
                            // `Backpressure` never routes through the relay.
                            OverflowStrategy::Backpressure | OverflowStrategy::DropNewest => {
                                tracing::debug!("ingress buffer overflowed, dropping newest");
                            }
                        }
                    }
                }
                None => break,
            },
            permit = tx.reserve() => match permit {
                Ok(permit) => {
                    if let Some(item) = queue.pop_front() {
                        permit.send(item);
                    }
                }
                Err(_) => return,
            },
        }
    }

    while let Some(item) = queue.pop_front() {
        if tx.send(item).await.is_err() {
            return;
        }
    }
}

/// The pipeline's driving task.
///
/// Pulls requests, keeps up to `parallelism` of them in flight, reports
/// rate-limit snapshots back to the ledger, and hands answers to the
/// harness. Re-injected requests are preferred over fresh ingress so that
/// feedback can always make progress, no matter how full the buffer is.
struct Driver<D: Send + 'static, C: Send + 'static, H: Harness<D, C>> {
    client: Client,
    egress: mpsc::Sender<H::Out>,
    harness: H,
    in_flight: FuturesUnordered<BoxFuture<'static, RequestAnswer<D, C>>>,
    ingress: mpsc::Receiver<Request<D, C>>,
    ingress_done: bool,
    ledger: Option<Ledger>,
    max_allowed_wait: Duration,
    parallelism: usize,
    retries: VecDeque<Request<D, C>>,
}

impl<D, C, H> Driver<D, C, H>
where
    D: Send + 'static,
    C: Send + 'static,
    H: Harness<D, C>,
{
    async fn run(mut self) {
        loop {
            // Fill flight slots, retries first.
            while self.in_flight.len() < self.parallelism {
                if let Some(request) = self.retries.pop_front() {
                    self.dispatch(request);

                    continue;
                }

                if self.ingress_done {
                    break;
                }

                match self.ingress.try_recv() {
                    Ok(request) => self.dispatch(request),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.ingress_done = true;

                        break;
                    }
                }
            }

            if self.ingress_done && self.in_flight.is_empty() && self.retries.is_empty() {
                break;
            }

            let can_pull = !self.ingress_done && self.in_flight.len() < self.parallelism;

            tokio::select! {
                maybe = self.ingress.recv(), if can_pull => match maybe {
                    Some(request) => self.dispatch(request),
                    None => self.ingress_done = true,
                },
                Some(answer) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    if !self.handle_answer(answer).await {
                        // Egress receiver dropped: cancel the whole graph,
                        // aborting whatever is still in flight.
                        return;
                    }
                }
                else => break,
            }
        }
    }

    fn dispatch(&mut self, request: Request<D, C>) {
        let client = self.client.clone();
        let ledger = self.ledger.clone();
        let max_wait = self.max_allowed_wait;

        self.in_flight
            .push(Box::pin(process(client, ledger, max_wait, request)));
    }

    async fn handle_answer(&mut self, answer: RequestAnswer<D, C>) -> bool {
        if let Some(ledger) = &self.ledger {
            if let Some(snapshot) = answer.ledger_update() {
                ledger.update(answer.route().bucket(), snapshot);
            }
        }

        match self.harness.on_answer(answer) {
            Step::Discard => true,
            Step::Emit(out) => self.egress.send(out).await.is_ok(),
            Step::Reinject(request) => {
                self.retries.push_back(request);

                true
            }
        }
    }
}

/// Gate one request through the ledger, then dispatch it.
async fn process<D, C>(
    client: Client,
    ledger: Option<Ledger>,
    max_wait: Duration,
    request: Request<D, C>,
) -> RequestAnswer<D, C> {
    if let Some(ledger) = ledger {
        match ledger.want_to_pass(request.route().bucket(), max_wait).await {
            Ok(Passage::Pass) => {}
            Ok(Passage::Dropped) => {
                let Request { context, route, .. } = request;

                return RequestAnswer::Dropped { context, route };
            }
            Err(source) => {
                let Request { context, route, .. } = request;

                return RequestAnswer::Error {
                    context,
                    route,
                    source: Error {
                        kind: ErrorType::RatelimiterClosed,
                        source: Some(Box::new(source)),
                    },
                };
            }
        }
    }

    client.execute(request).await
}

#[cfg(test)]
mod tests {
    use super::{relay, Answers, Flow, FlowSender, OrderedFlow, OverflowStrategy};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;
    use tokio::sync::mpsc;

    assert_impl_all!(Flow<(), u64>: Debug, Send, Sync);
    assert_impl_all!(FlowSender<(), u64>: Clone, Debug, Send, Sync);
    assert_impl_all!(Answers<(), u64>: Debug, Send, Sync);
    assert_impl_all!(OrderedFlow<(), u64>: Debug, Send, Sync);
    assert_impl_all!(OverflowStrategy: Clone, Copy, Debug, Eq, PartialEq, Send, Sync);

    async fn run_relay(strategy: OverflowStrategy, capacity: usize, items: u32) -> Vec<u32> {
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(1);

        tokio::spawn(relay(relay_rx, tx, capacity, strategy));

        for item in 0..items {
            relay_tx.send(item).unwrap();
        }

        drop(relay_tx);

        let mut got = Vec::new();

        while let Some(item) = rx.recv().await {
            got.push(item);
        }

        got
    }

    #[tokio::test]
    async fn relay_drop_oldest_keeps_latest() {
        let got = run_relay(OverflowStrategy::DropOldest, 2, 5).await;

        assert_eq!(Some(&4), got.last());
        assert!(got.len() <= 3);
        assert!(got.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn relay_drop_newest_keeps_earliest() {
        let got = run_relay(OverflowStrategy::DropNewest, 2, 5).await;

        assert_eq!(Some(&0), got.first());
        assert!(got.len() <= 3);
        assert!(got.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn relay_drop_buffer_keeps_latest() {
        let got = run_relay(OverflowStrategy::DropBuffer, 2, 5).await;

        assert_eq!(Some(&4), got.last());
        assert!(got.len() <= 3);
    }

    #[tokio::test]
    async fn relay_fail_closes_the_flow() {
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(relay(relay_rx, tx, 1, OverflowStrategy::Fail));

        for item in 0..16_u32 {
            relay_tx.send(item).unwrap();
        }

        // The overflow kills the relay, which closes the flow on both ends.
        handle.await.unwrap();
        assert!(relay_tx.send(99).is_err());

        let mut got = Vec::new();

        while let Some(item) = rx.recv().await {
            got.push(item);
        }

        assert!(got.len() <= 1);
    }

    #[tokio::test]
    async fn relay_under_capacity_passes_everything() {
        let got = run_relay(OverflowStrategy::DropOldest, 16, 5).await;

        assert_eq!(vec![0, 1, 2, 3, 4], got);
    }
}
