//! Single-owner registry of rate-limit buckets.
//!
//! All bucket state is owned by one background task. Consumers ask it for
//! permission to send a request over a command channel and receive the
//! verdict over a per-request reply channel; responses feed observed limits
//! back in through [`Ledger::update`].

use crate::headers::RatelimitSnapshot;
use std::{
    collections::{HashMap, VecDeque},
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    time::{self, Instant},
};

/// Verdict for a single request that asked to pass the ledger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Passage {
    /// The request may go over the wire now.
    Pass,
    /// The bucket did not refill within the caller's maximum wait.
    Dropped,
}

/// The ledger's background task has shut down.
///
/// This only happens when the runtime is tearing down; the pipeline treats
/// it as fatal.
#[derive(Debug)]
pub struct LedgerClosed;

impl Display for LedgerClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("the ledger task has shut down")
    }
}

impl Error for LedgerClosed {}

enum Command {
    WantToPass {
        raw_route: Box<str>,
        max_wait: Duration,
        tx: oneshot::Sender<Passage>,
    },
    Update {
        raw_route: Box<str>,
        snapshot: RatelimitSnapshot,
    },
}

/// Handle to the rate-limit ledger.
///
/// Cheaply cloneable; all clones talk to the same background task. The
/// task stops once every handle has been dropped.
///
/// Buckets are keyed by *raw route* and live for the life of the process.
///
/// # Note
///
/// [`Ledger::new`] spawns the owning task and must be called from within a
/// Tokio runtime.
#[derive(Clone, Debug)]
pub struct Ledger {
    tx: UnboundedSender<Command>,
}

impl Ledger {
    /// Create a new ledger, spawning its owning task.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(
            Worker {
                buckets: HashMap::new(),
                global_until: None,
                rx,
            }
            .run(),
        );

        Self { tx }
    }

    /// Ask whether a request for the given raw route may proceed.
    ///
    /// Resolves with [`Passage::Pass`] once the bucket has room, possibly
    /// immediately, or with [`Passage::Dropped`] if it still has none after
    /// `max_wait`.
    ///
    /// Within one bucket, requests are admitted in the order they asked.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerClosed`] if the ledger task has shut down.
    pub async fn want_to_pass(
        &self,
        raw_route: &str,
        max_wait: Duration,
    ) -> Result<Passage, LedgerClosed> {
        let (tx, rx) = oneshot::channel();

        self.tx
            .send(Command::WantToPass {
                raw_route: raw_route.into(),
                max_wait,
                tx,
            })
            .map_err(|_| LedgerClosed)?;

        rx.await.map_err(|_| LedgerClosed)
    }

    /// Merge a response's rate-limit snapshot into the route's bucket.
    ///
    /// The server is the source of truth: known fields replace the bucket's
    /// bookkeeping outright, while `-1` fields leave it untouched. A global
    /// snapshot additionally gates every route until its reset passes.
    ///
    /// Updates from a closed ledger are silently discarded.
    pub fn update(&self, raw_route: &str, snapshot: RatelimitSnapshot) {
        let _res = self.tx.send(Command::Update {
            raw_route: raw_route.into(),
            snapshot,
        });
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

struct Waiter {
    deadline: Instant,
    tx: oneshot::Sender<Passage>,
}

struct Bucket {
    limit: u64,
    remaining: u64,
    reset_at: Option<Instant>,
    waiters: VecDeque<Waiter>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            limit: u64::MAX,
            remaining: u64::MAX,
            reset_at: None,
            waiters: VecDeque::new(),
        }
    }

    /// Start a fresh window with a full allotment.
    fn refill(&mut self) {
        self.remaining = self.limit;
        self.reset_at = None;
    }

    /// Reply `Dropped` to every waiter whose deadline has passed.
    fn expire_waiters(&mut self, now: Instant) {
        let mut kept = VecDeque::with_capacity(self.waiters.len());

        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.deadline <= now {
                let _res = waiter.tx.send(Passage::Dropped);
            } else {
                kept.push_back(waiter);
            }
        }

        self.waiters = kept;
    }
}

struct Worker {
    buckets: HashMap<Box<str>, Bucket>,
    global_until: Option<Instant>,
    rx: UnboundedReceiver<Command>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let command = match self.next_wake() {
                Some(deadline) => {
                    tokio::select! {
                        command = self.rx.recv() => command,
                        _ = time::sleep_until(deadline) => {
                            self.tick(Instant::now());

                            continue;
                        }
                    }
                }
                None => self.rx.recv().await,
            };

            match command {
                Some(command) => self.handle(command),
                None => break,
            }
        }

        tracing::debug!("all ledger handles dropped, stopping");
    }

    fn handle(&mut self, command: Command) {
        let now = Instant::now();

        match command {
            Command::WantToPass {
                raw_route,
                max_wait,
                tx,
            } => {
                tracing::trace!(%raw_route, "request asking to pass");

                let global_until = self.global_until;
                let bucket = self.buckets.entry(raw_route).or_insert_with(Bucket::new);

                bucket.waiters.push_back(Waiter {
                    deadline: now + max_wait,
                    tx,
                });
                Self::drain(bucket, global_until, now);
            }
            Command::Update {
                raw_route,
                snapshot,
            } => {
                if snapshot.global() {
                    let until = now + snapshot.til_reset();
                    self.global_until = Some(until);

                    tracing::debug!(
                        til_reset = %snapshot.til_reset().as_millis(),
                        "global gate engaged",
                    );
                }

                let global_until = self.global_until;
                let bucket = self.buckets.entry(raw_route).or_insert_with(Bucket::new);

                if snapshot.limit() >= 0 {
                    bucket.limit = snapshot.limit() as u64;
                }

                if snapshot.remaining() >= 0 {
                    bucket.remaining = snapshot.remaining() as u64;
                }

                if !snapshot.til_reset().is_zero() {
                    bucket.reset_at = Some(now + snapshot.til_reset());
                }

                // The authoritative count may have freed room for waiters.
                Self::drain(bucket, global_until, now);
            }
        }
    }

    /// Handle timer-driven work: expired waiter deadlines, the global gate
    /// lifting, and bucket resets.
    fn tick(&mut self, now: Instant) {
        if self.global_until.map_or(false, |until| now >= until) {
            self.global_until = None;

            tracing::debug!("global gate lifted");
        }

        let global_until = self.global_until;

        for bucket in self.buckets.values_mut() {
            bucket.expire_waiters(now);
            Self::drain(bucket, global_until, now);
        }
    }

    /// Admit queued waiters in FIFO order while the bucket has room.
    ///
    /// A reset refills the bucket at most once per drain, so one window
    /// never admits more than `limit` requests.
    fn drain(bucket: &mut Bucket, global_until: Option<Instant>, now: Instant) {
        if global_until.map_or(false, |until| now < until) {
            return;
        }

        let mut refilled = false;

        while !bucket.waiters.is_empty() {
            if bucket.remaining == 0 {
                let due = bucket.reset_at.map_or(false, |reset| now >= reset);

                if due && !refilled && bucket.limit > 0 {
                    bucket.refill();
                    refilled = true;
                } else {
                    break;
                }
            }

            if let Some(waiter) = bucket.waiters.pop_front() {
                // The caller may have given up on its reply already; don't
                // burn a permit on it.
                if waiter.tx.is_closed() {
                    continue;
                }

                bucket.remaining -= 1;

                if waiter.tx.send(Passage::Pass).is_err() {
                    bucket.remaining += 1;
                }
            }
        }
    }

    /// Earliest instant at which timer-driven work becomes due.
    fn next_wake(&self) -> Option<Instant> {
        let mut wake: Option<Instant> = None;
        let mut earliest = |candidate: Instant| {
            wake = Some(wake.map_or(candidate, |at| at.min(candidate)));
        };

        for bucket in self.buckets.values() {
            if bucket.waiters.is_empty() {
                continue;
            }

            if let Some(until) = self.global_until {
                earliest(until);
            }

            if bucket.remaining == 0 {
                if let Some(reset) = bucket.reset_at {
                    earliest(reset);
                }
            }

            for waiter in &bucket.waiters {
                earliest(waiter.deadline);
            }
        }

        wake
    }
}

#[cfg(test)]
mod tests {
    use super::{Ledger, LedgerClosed, Passage};
    use crate::headers::RatelimitSnapshot;
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug, time::Duration};
    use tokio::time::Instant;

    assert_impl_all!(Ledger: Clone, Debug, Default, Send, Sync);
    assert_impl_all!(Passage: Clone, Copy, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(LedgerClosed: Debug, Error, Send, Sync);

    const ROUTE: &str = "GET /users/{user_id}/messages";
    const OTHER_ROUTE: &str = "GET /channels/{channel_id}";

    fn bucket(limit: i64, remaining: i64, til_reset: Duration) -> RatelimitSnapshot {
        let reset = format!("{}", til_reset.as_millis());
        let limit = format!("{limit}");
        let remaining = format!("{remaining}");
        let headers = [
            ("x-ratelimit-limit", limit.as_bytes()),
            ("x-ratelimit-remaining", remaining.as_bytes()),
            ("retry-after", reset.as_bytes()),
        ];

        RatelimitSnapshot::from_pairs(headers.into_iter()).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_passes_immediately() {
        let ledger = Ledger::new();

        let start = Instant::now();
        let passage = ledger
            .want_to_pass(ROUTE, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(Passage::Pass, passage);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exhausted_bucket_waits_for_reset() {
        let ledger = Ledger::new();
        ledger.update(ROUTE, bucket(1, 0, Duration::from_millis(300)));

        let start = Instant::now();
        let passage = ledger
            .want_to_pass(ROUTE, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(Passage::Pass, passage);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn deadline_expiry_drops() {
        let ledger = Ledger::new();
        ledger.update(ROUTE, bucket(1, 0, Duration::from_millis(500)));

        let start = Instant::now();
        let passage = ledger
            .want_to_pass(ROUTE, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(Passage::Dropped, passage);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn global_gate_blocks_unrelated_routes() {
        let ledger = Ledger::new();
        ledger.update(
            ROUTE,
            RatelimitSnapshot::exhausted(true, Duration::from_millis(400), -1),
        );

        let passage = ledger
            .want_to_pass(OTHER_ROUTE, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(Passage::Dropped, passage);

        let start = Instant::now();
        let passage = ledger
            .want_to_pass(OTHER_ROUTE, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(Passage::Pass, passage);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn window_never_admits_more_than_limit() {
        let ledger = Ledger::new();
        ledger.update(ROUTE, bucket(3, 3, Duration::from_millis(500)));

        let mut tasks = Vec::new();

        for _ in 0..5 {
            let ledger = ledger.clone();

            tasks.push(tokio::spawn(async move {
                ledger
                    .want_to_pass(ROUTE, Duration::from_millis(200))
                    .await
                    .unwrap()
            }));
        }

        let mut passed = 0;
        let mut dropped = 0;

        for task in tasks {
            match task.await.unwrap() {
                Passage::Pass => passed += 1,
                Passage::Dropped => dropped += 1,
            }
        }

        assert_eq!(3, passed);
        assert_eq!(2, dropped);
    }

    #[tokio::test]
    async fn authoritative_update_reopens_bucket() {
        let ledger = Ledger::new();
        ledger.update(ROUTE, bucket(1, 0, Duration::from_secs(10)));

        let waiter = {
            let ledger = ledger.clone();

            tokio::spawn(
                async move { ledger.want_to_pass(ROUTE, Duration::from_secs(5)).await },
            )
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        ledger.update(ROUTE, bucket(1, 1, Duration::from_secs(10)));

        let start = Instant::now();
        let passage = waiter.await.unwrap().unwrap();

        assert_eq!(Passage::Pass, passage);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn refill_is_bounded_by_limit() {
        let ledger = Ledger::new();
        ledger.update(ROUTE, bucket(2, 0, Duration::from_millis(200)));

        let mut tasks = Vec::new();

        for _ in 0..4 {
            let ledger = ledger.clone();

            tasks.push(tokio::spawn(async move {
                ledger
                    .want_to_pass(ROUTE, Duration::from_millis(600))
                    .await
                    .unwrap()
            }));

            // Stagger arrivals so queue order is deterministic.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut passed = 0;

        for task in tasks {
            if let Passage::Pass = task.await.unwrap() {
                passed += 1;
            }
        }

        // One refill of the two-permit window; the rest time out.
        assert_eq!(2, passed);
    }
}
