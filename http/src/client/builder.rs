use super::{connector, Client, Config, State};
use crate::flow::OverflowStrategy;
use concord_ratelimit::Ledger;
use std::{sync::Arc, time::Duration};

/// A builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    config: Config,
    ledger: Option<Ledger>,
    token: Option<Box<str>>,
}

impl ClientBuilder {
    /// Create a new builder to create a [`Client`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the [`Client`].
    ///
    /// Spawns the rate-limit ledger task if no shared ledger was provided,
    /// so this must be called from within a Tokio runtime.
    #[must_use]
    pub fn build(self) -> Client {
        let connector = connector::create();
        let http = hyper::client::Builder::default().build(connector);
        let ledger = self.ledger.unwrap_or_default();

        Client {
            state: Arc::new(State {
                config: self.config,
                http,
                ledger,
                token: self.token,
            }),
        }
    }

    /// Set the capacity of the pipeline's ingress buffer.
    ///
    /// The default is 32. What happens when the buffer overflows is
    /// governed by [`overflow_strategy`].
    ///
    /// [`overflow_strategy`]: Self::overflow_strategy
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size.max(1);

        self
    }

    /// Set a shared rate-limit ledger to use.
    ///
    /// Clients given the same ledger share their rate-limit accounting. If
    /// this method is not called then a private ledger is created by
    /// [`ClientBuilder::build`].
    #[allow(clippy::missing_const_for_fn)]
    #[must_use]
    pub fn ledger(mut self, ledger: Ledger) -> Self {
        self.ledger.replace(ledger);

        self
    }

    /// Whether to log response payloads at the REST boundary.
    ///
    /// Defaults to false.
    #[must_use]
    pub const fn log_received_rest(mut self, log: bool) -> Self {
        self.config.log_received_rest = log;

        self
    }

    /// Whether to log request payloads at the REST boundary.
    ///
    /// Defaults to false.
    #[must_use]
    pub const fn log_sent_rest(mut self, log: bool) -> Self {
        self.config.log_sent_rest = log;

        self
    }

    /// Set how long a request may wait at the rate-limit gate before being
    /// answered with [`RequestAnswer::Dropped`].
    ///
    /// The default is 60 seconds.
    ///
    /// [`RequestAnswer::Dropped`]: crate::RequestAnswer::Dropped
    #[must_use]
    pub const fn max_allowed_wait(mut self, duration: Duration) -> Self {
        self.config.max_allowed_wait = duration;

        self
    }

    /// Set the total number of attempts [`retry_request_flow`] may spend on
    /// one request.
    ///
    /// The default is 3. Values below 1 are clamped to 1.
    ///
    /// [`retry_request_flow`]: Client::retry_request_flow
    #[must_use]
    pub fn max_retry_count(mut self, count: usize) -> Self {
        self.config.max_retry_count = count.max(1);

        self
    }

    /// Set what happens when the ingress buffer overflows.
    ///
    /// The default is [`OverflowStrategy::Backpressure`].
    #[must_use]
    pub const fn overflow_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.config.overflow_strategy = strategy;

        self
    }

    /// Set how many requests may be in flight concurrently per flow.
    ///
    /// The default is 4. Values below 1 are clamped to 1.
    #[must_use]
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism.max(1);

        self
    }

    /// Set the proxy to use for all HTTP(S) requests.
    ///
    /// **Note** that this isn't a traditional proxy but a replacement host,
    /// for working with a ratelimit-aware HTTP proxy server.
    #[must_use]
    pub fn proxy(mut self, proxy_url: String, use_http: bool) -> Self {
        self.config.proxy.replace(proxy_url.into_boxed_str());
        self.config.use_http = use_http;

        self
    }

    /// Set the timeout for HTTP requests.
    ///
    /// The default is 10 seconds.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = duration;

        self
    }

    /// Set the token to use for HTTP requests.
    ///
    /// Bot and bearer prefixes are passed through unchanged; a bare token
    /// is assumed to be a bot token.
    #[must_use]
    pub fn token(mut self, mut token: String) -> Self {
        let is_bot = token.starts_with("Bot ");
        let is_bearer = token.starts_with("Bearer ");

        if !is_bot && !is_bearer {
            token.insert_str(0, "Bot ");
        }

        self.token.replace(token.into_boxed_str());

        self
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                buffer_size: 32,
                log_received_rest: false,
                log_sent_rest: false,
                max_allowed_wait: Duration::from_secs(60),
                max_retry_count: 3,
                overflow_strategy: OverflowStrategy::Backpressure,
                parallelism: 4,
                proxy: None,
                timeout: Duration::from_secs(10),
                use_http: false,
            },
            ledger: None,
            token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClientBuilder;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(ClientBuilder: Debug, Default, Send, Sync);

    #[test]
    fn bare_token_gets_bot_prefix() {
        let builder = ClientBuilder::new().token("abc".to_owned());

        assert_eq!(Some("Bot abc"), builder.token.as_deref());
    }

    #[test]
    fn prefixed_tokens_pass_through() {
        let builder = ClientBuilder::new().token("Bearer abc".to_owned());

        assert_eq!(Some("Bearer abc"), builder.token.as_deref());
    }

    #[test]
    fn parallelism_clamped() {
        let builder = ClientBuilder::new().parallelism(0);

        assert_eq!(1, builder.config.parallelism);
    }
}
