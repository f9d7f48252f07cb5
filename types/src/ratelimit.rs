//! Rate-limit bookkeeping parsed from send results.
//!
//! The intake service communicates quota state through two headers. The
//! richer `X-Sentry-Rate-Limits` form is a comma-separated list of quotas,
//! each `retry_after:categories:scope:reason:namespaces` where `retry_after`
//! is a delay in integer seconds and `categories` is a `;`-separated list
//! (empty = every category). A plain `Retry-After` covers every category
//! with a single delay.
//!
//! Nothing here decides retry policy; [`RateLimits`] only answers "is this
//! category currently disabled" so the surrounding sender can decide.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::DateTime;

use crate::SendResult;

/// Fallback delay when a retry header is missing or unparseable.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Category key for quotas that name no categories.
pub const CATEGORY_ALL: &str = "all";

/// Parse a `Retry-After` value relative to `now`.
///
/// Accepts integer seconds or an HTTP date; anything else yields
/// [`DEFAULT_RETRY_AFTER`]. A date already in the past yields zero.
#[must_use]
pub fn parse_retry_after(header: &str, now: SystemTime) -> Duration {
    let header = header.trim();
    if let Ok(secs) = header.parse::<u64>() {
        return Duration::from_secs(secs);
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(header) {
        let millis = date.timestamp_millis();
        if millis <= 0 {
            return Duration::ZERO;
        }
        let target = UNIX_EPOCH + Duration::from_millis(millis as u64);
        return target.duration_since(now).unwrap_or(Duration::ZERO);
    }
    DEFAULT_RETRY_AFTER
}

/// Per-category disable deadlines accumulated from send results.
#[derive(Debug, Clone, Default)]
pub struct RateLimits {
    disabled_until: HashMap<String, SystemTime>,
}

impl RateLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the quota headers of `result`, observed at `now`.
    ///
    /// `X-Sentry-Rate-Limits` wins when present; otherwise a plain
    /// `Retry-After` disables every category, and a bare 429 without either
    /// header disables every category for [`DEFAULT_RETRY_AFTER`]. Later
    /// quotas for the same category replace earlier deadlines.
    pub fn update(&mut self, result: &SendResult, now: SystemTime) {
        if let Some(header) = &result.rate_limits {
            for quota in header.split(',') {
                self.apply_quota(quota.trim(), now);
            }
        } else if let Some(header) = &result.retry_after {
            self.disabled_until
                .insert(CATEGORY_ALL.to_owned(), now + parse_retry_after(header, now));
        } else if result.is_rate_limited() {
            self.disabled_until
                .insert(CATEGORY_ALL.to_owned(), now + DEFAULT_RETRY_AFTER);
        }
    }

    fn apply_quota(&mut self, quota: &str, now: SystemTime) {
        if quota.is_empty() {
            return;
        }
        let mut parts = quota.split(':');
        let retry_after = parts.next().unwrap_or_default();
        let categories = parts.next().unwrap_or_default();
        let _scope = parts.next();
        let _reason = parts.next();
        let namespaces = parts.next();

        let delay = retry_after
            .parse::<u64>()
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        let until = now + delay;

        if categories.is_empty() {
            self.disabled_until.insert(CATEGORY_ALL.to_owned(), until);
            return;
        }
        for category in categories.split(';') {
            // metric_bucket quotas are scoped to namespaces; only the
            // custom namespace concerns this client.
            if category == "metric_bucket"
                && namespaces.is_some_and(|list| !list.split(';').any(|ns| ns == "custom"))
            {
                continue;
            }
            self.disabled_until.insert(category.to_owned(), until);
        }
    }

    /// Deadline after which `category` is usable again, if any.
    ///
    /// A category-specific quota takes precedence over an `all` quota.
    #[must_use]
    pub fn disabled_until(&self, category: &str) -> Option<SystemTime> {
        self.disabled_until
            .get(category)
            .or_else(|| self.disabled_until.get(CATEGORY_ALL))
            .copied()
    }

    /// True while `category` is disabled at `now`.
    #[must_use]
    pub fn is_limited(&self, category: &str, now: SystemTime) -> bool {
        self.disabled_until(category)
            .is_some_and(|until| until > now)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disabled_until.is_empty()
    }
}
