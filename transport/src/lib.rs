//! Outbound envelope transport for short-lived serverless and edge runtimes.
//!
//! # Architecture
//!
//! Two collaborating components, leaves first:
//!
//! - [`buffer::TaskBuffer`] - a capacity-bounded FIFO of *deferred* send
//!   tasks. Enqueued work is a producer closure, not a running operation;
//!   nothing touches the network until the buffer is drained.
//! - [`http::HttpTransport`] - the network send adapter. Wraps a single
//!   outbound POST with configured headers/options, registers each send as
//!   a task producer in its owned buffer, and maps responses into
//!   [`beacon_types::SendResult`] (status code plus exactly the two
//!   rate-limit headers).
//!
//! # Lifecycle
//!
//! Hosts that tear the execution context down between invocations call
//! [`http::HttpTransport::flush`] before returning; it starts every pending
//! send and waits - bounded by an optional timeout - for them to settle.
//! A timed-out flush resolves `false` but never aborts the in-flight sends.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use beacon_transport::{HttpTransport, TransportOptions};
//! use beacon_types::EnvelopeRequest;
//!
//! # async fn example() -> Result<(), beacon_transport::TransportError> {
//! let url = "https://o0.ingest.example/api/1/envelope/";
//! let transport = HttpTransport::new(TransportOptions::new(url));
//!
//! let pending = transport.send(EnvelopeRequest::new(url, b"{}".to_vec()))?;
//! let flushed = transport.flush(Some(Duration::from_secs(2))).await;
//! # let _ = (pending, flushed);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
mod error;
pub mod http;

use std::sync::OnceLock;
use std::time::Duration;

pub use beacon_types as types;

pub use crate::buffer::{BufferFullError, DEFAULT_BUFFER_SIZE, TaskBuffer, TaskProducer};
pub use crate::error::TransportError;
pub use crate::http::{FetchOptions, HttpTransport, PendingSend, TransportOptions};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 2;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Shared hardened HTTP client used when no override is configured.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}
