//! Parse typed rate-limit information from response headers.
//!
//! Parsing response headers is necessary for the [`Ledger`] to properly
//! function: every response that carries a usable snapshot is fed back into
//! it.
//!
//! [`Ledger`]: super::Ledger

use std::{
    error::Error,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::{self, Utf8Error},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// One or more header name-value pairs failed to be parsed.
#[derive(Debug)]
pub struct HeaderParsingError {
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
    pub(crate) kind: HeaderParsingErrorType,
}

impl HeaderParsingError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &HeaderParsingErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (HeaderParsingErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }

    fn not_utf8(name: HeaderName, value: Vec<u8>, source: Utf8Error) -> Self {
        Self {
            kind: HeaderParsingErrorType::NotUtf8 { name, value },
            source: Some(Box::new(source)),
        }
    }
}

impl Display for HeaderParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            HeaderParsingErrorType::NotUtf8 { name, value } => {
                f.write_str("header '")?;
                f.write_str(name.name())?;
                f.write_str("' is not UTF-8 valid: ")?;

                Debug::fmt(value, f)
            }
            HeaderParsingErrorType::Parsing { name, value } => {
                f.write_str("header '")?;
                f.write_str(name.name())?;
                f.write_str("' can not be parsed as an integer: '")?;
                f.write_str(value)?;

                f.write_str("'")
            }
        }
    }
}

impl Error for HeaderParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`HeaderParsingError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum HeaderParsingErrorType {
    /// Header value is not UTF-8 valid.
    NotUtf8 {
        /// Name of the header.
        name: HeaderName,
        /// Value of the header.
        value: Vec<u8>,
    },
    /// Header value is not of the expected type.
    Parsing {
        /// Name of the header.
        name: HeaderName,
        /// Value of the header.
        value: String,
    },
}

/// Typed name of a rate-limit header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum HeaderName {
    /// Whether the rate limit applies to every route.
    Global,
    /// Maximum requests allotted in the bucket.
    Limit,
    /// Remaining requests allotted.
    Remaining,
    /// When the bucket resets, as epoch milliseconds.
    Reset,
    /// How long until a request can be tried again, in milliseconds.
    RetryAfter,
}

impl HeaderName {
    /// Lowercased name for the global header.
    pub const GLOBAL: &'static str = "x-ratelimit-global";

    /// Lowercased name for the limit header.
    pub const LIMIT: &'static str = "x-ratelimit-limit";

    /// Lowercased name for the remaining header.
    pub const REMAINING: &'static str = "x-ratelimit-remaining";

    /// Lowercased name for the reset header.
    pub const RESET: &'static str = "x-ratelimit-reset";

    /// Lowercased name for the retry-after header.
    // It's correct for this to not have the `x-ratelimit-` prefix.
    pub const RETRY_AFTER: &'static str = "retry-after";

    /// Lowercased name of the header.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Global => Self::GLOBAL,
            Self::Limit => Self::LIMIT,
            Self::Remaining => Self::REMAINING,
            Self::Reset => Self::RESET,
            Self::RetryAfter => Self::RETRY_AFTER,
        }
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Rate-limit information extracted from one response.
///
/// Numeric fields are `-1` when the corresponding header was absent;
/// [`til_reset`] is zero when neither a reset nor a retry-after header was
/// present. `retry-after` takes precedence over the reset timestamp when
/// both appear.
///
/// [`til_reset`]: Self::til_reset
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RatelimitSnapshot {
    global: bool,
    limit: i64,
    remaining: i64,
    til_reset: Duration,
}

impl RatelimitSnapshot {
    /// Create a snapshot from already-parsed values.
    ///
    /// Use `-1` for unknown numeric fields and a zero duration for an
    /// unknown reset.
    #[must_use]
    pub const fn new(global: bool, limit: i64, remaining: i64, til_reset: Duration) -> Self {
        Self {
            global,
            limit,
            remaining,
            til_reset,
        }
    }

    /// Create a snapshot for a rate-limited response whose bucket headers
    /// may be missing.
    ///
    /// `remaining` is forced to zero: a 429 means the bucket is exhausted
    /// regardless of what the response claimed.
    #[must_use]
    pub const fn exhausted(global: bool, til_reset: Duration, limit: i64) -> Self {
        Self {
            global,
            limit,
            remaining: 0,
            til_reset,
        }
    }

    /// Whether the rate limit applies to every route.
    #[must_use]
    pub const fn global(&self) -> bool {
        self.global
    }

    /// Maximum requests allotted in the bucket, or `-1` if unknown.
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.limit
    }

    /// Remaining requests allotted in the bucket, or `-1` if unknown.
    #[must_use]
    pub const fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Time until the bucket resets.
    #[must_use]
    pub const fn til_reset(&self) -> Duration {
        self.til_reset
    }

    /// Whether the snapshot carries a full bucket description.
    ///
    /// Incomplete snapshots are not worth recording, unless the global flag
    /// is set.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.til_reset.is_zero() && self.remaining != -1 && self.limit != -1
    }

    /// Parse a snapshot from an iterator of tuples containing the header
    /// name and value.
    ///
    /// Header names must be UTF-8 valid and lowercased while values *may* be
    /// UTF-8 valid.
    ///
    /// # Examples
    ///
    /// ```
    /// use concord_ratelimit::headers::RatelimitSnapshot;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let headers = [
    ///     ("x-ratelimit-limit", "5".as_bytes()),
    ///     ("x-ratelimit-remaining", "4".as_bytes()),
    ///     ("retry-after", "1000".as_bytes()),
    /// ];
    ///
    /// let snapshot = RatelimitSnapshot::from_pairs(headers.into_iter())?;
    /// assert_eq!(4, snapshot.remaining());
    /// assert!(snapshot.is_complete());
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`HeaderParsingErrorType::NotUtf8`] error type if a value
    /// is not UTF-8 valid, or [`HeaderParsingErrorType::Parsing`] if a
    /// numeric value can not be parsed.
    pub fn from_pairs<'a>(
        headers: impl Iterator<Item = (&'a str, &'a [u8])>,
    ) -> Result<Self, HeaderParsingError> {
        Self::from_pairs_at(headers, now_epoch_millis())
    }

    fn from_pairs_at<'a>(
        headers: impl Iterator<Item = (&'a str, &'a [u8])>,
        now_millis: u64,
    ) -> Result<Self, HeaderParsingError> {
        let mut global = false;
        let mut limit = -1;
        let mut remaining = -1;
        let mut reset = None;
        let mut retry_after = None;

        for (name, value) in headers {
            match name {
                HeaderName::GLOBAL => global = header_bool(value),
                HeaderName::LIMIT => limit = header_int(HeaderName::Limit, value)?,
                HeaderName::REMAINING => {
                    remaining = header_int(HeaderName::Remaining, value)?;
                }
                HeaderName::RESET => {
                    reset.replace(header_int(HeaderName::Reset, value)?);
                }
                HeaderName::RETRY_AFTER => {
                    retry_after.replace(header_int(HeaderName::RetryAfter, value)?);
                }
                _ => continue,
            }
        }

        // `retry-after` is a relative duration and wins over the absolute
        // reset timestamp.
        let til_reset = match (retry_after, reset) {
            (Some(millis), _) => Duration::from_millis(millis.max(0) as u64),
            (None, Some(epoch_millis)) => {
                Duration::from_millis((epoch_millis.max(0) as u64).saturating_sub(now_millis))
            }
            (None, None) => Duration::ZERO,
        };

        Ok(Self {
            global,
            limit,
            remaining,
            til_reset,
        })
    }
}

/// Current time as milliseconds since the Unix epoch.
fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Parse a value as a boolean.
fn header_bool(value: &[u8]) -> bool {
    value == b"true"
}

/// Parse a value expected to be an integer.
fn header_int(name: HeaderName, value: &[u8]) -> Result<i64, HeaderParsingError> {
    let text = str::from_utf8(value)
        .map_err(|source| HeaderParsingError::not_utf8(name, value.to_owned(), source))?;

    let end = text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })?;

    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::{HeaderName, HeaderParsingError, HeaderParsingErrorType, RatelimitSnapshot};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{
        error::Error,
        fmt::{Debug, Display},
        time::Duration,
    };

    assert_fields!(HeaderParsingErrorType::NotUtf8: name, value);
    assert_fields!(HeaderParsingErrorType::Parsing: name, value);
    assert_impl_all!(HeaderParsingError: Error, Send, Sync);
    assert_impl_all!(
        HeaderName: Clone,
        Copy,
        Debug,
        Display,
        Eq,
        PartialEq,
        Send,
        Sync
    );
    assert_impl_all!(RatelimitSnapshot: Clone, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    fn present() -> Result<(), Box<dyn Error>> {
        let headers = [
            ("x-ratelimit-limit", "5".as_bytes()),
            ("x-ratelimit-remaining", "4".as_bytes()),
            ("x-ratelimit-reset", "11000".as_bytes()),
        ];

        let snapshot = RatelimitSnapshot::from_pairs_at(headers.into_iter(), 10_000)?;

        assert_eq!(5, snapshot.limit());
        assert_eq!(4, snapshot.remaining());
        assert_eq!(Duration::from_millis(1000), snapshot.til_reset());
        assert!(!snapshot.global());
        assert!(snapshot.is_complete());

        Ok(())
    }

    #[test]
    fn retry_after_takes_precedence() -> Result<(), Box<dyn Error>> {
        let headers = [
            ("retry-after", "2000".as_bytes()),
            ("x-ratelimit-reset", "10500".as_bytes()),
        ];

        let snapshot = RatelimitSnapshot::from_pairs_at(headers.into_iter(), 10_000)?;
        assert_eq!(Duration::from_millis(2000), snapshot.til_reset());

        Ok(())
    }

    #[test]
    fn global() -> Result<(), Box<dyn Error>> {
        let headers = [
            ("x-ratelimit-global", "true".as_bytes()),
            ("retry-after", "65".as_bytes()),
        ];

        let snapshot = RatelimitSnapshot::from_pairs_at(headers.into_iter(), 10_000)?;

        assert!(snapshot.global());
        assert_eq!(Duration::from_millis(65), snapshot.til_reset());
        assert_eq!(-1, snapshot.limit());
        assert!(!snapshot.is_complete());

        Ok(())
    }

    #[test]
    fn absent() -> Result<(), Box<dyn Error>> {
        let headers = [("content-type", "application/json".as_bytes())];

        let snapshot = RatelimitSnapshot::from_pairs_at(headers.into_iter(), 10_000)?;

        assert_eq!(-1, snapshot.limit());
        assert_eq!(-1, snapshot.remaining());
        assert_eq!(Duration::ZERO, snapshot.til_reset());
        assert!(!snapshot.is_complete());

        Ok(())
    }

    #[test]
    fn reset_in_the_past_saturates() -> Result<(), Box<dyn Error>> {
        let headers = [("x-ratelimit-reset", "9000".as_bytes())];

        let snapshot = RatelimitSnapshot::from_pairs_at(headers.into_iter(), 10_000)?;
        assert_eq!(Duration::ZERO, snapshot.til_reset());

        Ok(())
    }

    #[test]
    fn invalid_integer() {
        let headers = [("x-ratelimit-limit", "five".as_bytes())];

        let err = RatelimitSnapshot::from_pairs(headers.into_iter()).unwrap_err();
        assert!(matches!(
            err.kind(),
            HeaderParsingErrorType::Parsing {
                name: HeaderName::Limit,
                ..
            }
        ));
    }

    #[test]
    fn exhausted_forces_remaining() {
        let snapshot = RatelimitSnapshot::exhausted(true, Duration::from_secs(2), -1);

        assert_eq!(0, snapshot.remaining());
        assert!(snapshot.global());
    }
}
