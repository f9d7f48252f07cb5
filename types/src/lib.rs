//! Core domain types for Beacon.
//!
//! This crate contains pure domain types with no IO and no async: the
//! transport-neutral request/result pair exchanged with the send adapter,
//! and the rate-limit bookkeeping parsed from intake responses. Everything
//! here can be used from any layer of the application.

pub mod ratelimit;

/// Response header carrying per-category quota directives.
pub const RATE_LIMITS_HEADER: &str = "x-sentry-rate-limits";

/// Response header carrying a plain retry delay.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Transport-neutral description of one outbound payload.
///
/// The body is opaque to the transport; serialization is the caller's
/// concern. The `url` records which endpoint the payload was built for,
/// while delivery goes to the endpoint the owning transport was
/// configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeRequest {
    /// Raw payload bytes, posted verbatim.
    pub body: Vec<u8>,
    /// Endpoint the payload was addressed to.
    pub url: String,
}

impl EnvelopeRequest {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            url: url.into(),
        }
    }
}

/// Transport-neutral outcome of one delivered payload.
///
/// Exactly two response headers are propagated: the quota directive header
/// ([`RATE_LIMITS_HEADER`]) and the plain retry delay ([`RETRY_AFTER_HEADER`]).
/// An absent header is `None`; every other response header is dropped at the
/// adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    /// Numeric HTTP status of the response.
    pub status_code: u16,
    /// Value of the `X-Sentry-Rate-Limits` response header, if present.
    pub rate_limits: Option<String>,
    /// Value of the `Retry-After` response header, if present.
    pub retry_after: Option<String>,
}

impl SendResult {
    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// True when the intake answered 429.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == 429
    }
}
