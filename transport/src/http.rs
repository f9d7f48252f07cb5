//! HTTP send adapter for envelope delivery.
//!
//! [`HttpTransport`] wraps a single outbound POST with the configured
//! headers and options, and owns one [`TaskBuffer`] for its lifetime. Each
//! [`HttpTransport::send`] only runs the admission decision; the network
//! call itself is packaged as a deferred producer and starts on the next
//! [`HttpTransport::flush`]. Responses are mapped into [`SendResult`],
//! propagating exactly the two rate-limit headers and dropping the rest.

use std::future::IntoFuture;
use std::time::Duration;

use beacon_types::{EnvelopeRequest, RATE_LIMITS_HEADER, RETRY_AFTER_HEADER, SendResult};
use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::oneshot;

use crate::buffer::{DEFAULT_BUFFER_SIZE, TaskBuffer, TaskProducer};
use crate::{TransportError, http_client};

/// Reqwest-native request option overlay merged over the transport defaults.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra headers; overlapping names override [`TransportOptions::headers`].
    pub headers: Vec<(String, String)>,
    /// Timeout applied to each outbound POST.
    pub timeout: Option<Duration>,
    /// Client used instead of the shared hardened one.
    pub client: Option<reqwest::Client>,
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Destination endpoint every envelope is POSTed to.
    pub url: String,
    /// Fixed headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Native request option overlay.
    pub fetch_options: FetchOptions,
    /// Override for the owned buffer's capacity.
    pub buffer_size: Option<usize>,
}

impl TransportOptions {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            fetch_options: FetchOptions::default(),
            buffer_size: None,
        }
    }
}

/// Network send adapter with a bounded, explicitly drained send queue.
#[derive(Debug)]
pub struct HttpTransport {
    url: String,
    headers: HeaderMap,
    request_timeout: Option<Duration>,
    client: reqwest::Client,
    buffer: TaskBuffer<()>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(options: TransportOptions) -> Self {
        let TransportOptions {
            url,
            headers,
            fetch_options,
            buffer_size,
        } = options;
        let merged = merge_headers(&headers, &fetch_options.headers);
        let client = fetch_options
            .client
            .unwrap_or_else(|| http_client().clone());
        Self {
            url,
            headers: merged,
            request_timeout: fetch_options.timeout,
            client,
            buffer: TaskBuffer::new(buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)),
        }
    }

    /// Number of sends admitted but not yet started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Queue one envelope for delivery.
    ///
    /// Runs only the admission decision; no network call happens here. On
    /// success the returned [`PendingSend`] settles once the POST - started
    /// by a later [`flush`](Self::flush) - completes. At capacity this
    /// fails with [`TransportError::BufferFull`] and the envelope never
    /// reaches the network.
    pub fn send(&self, request: EnvelopeRequest) -> Result<PendingSend, TransportError> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let url = self.url.clone();
        let headers = self.headers.clone();
        let timeout = self.request_timeout;
        let producer: TaskProducer<()> = Box::new(move || {
            Box::pin(async move {
                let outcome = post_envelope(&client, &url, headers, timeout, request).await;
                match &outcome {
                    Ok(result) => {
                        tracing::debug!(status = result.status_code, "envelope delivered");
                    }
                    Err(err) => tracing::warn!(error = %err, "envelope send failed"),
                }
                // An abandoned receiver drops the outcome here; that is the
                // no-op error handler a drain sweep relies on.
                let _ = tx.send(outcome);
            })
        });
        self.buffer.add(producer)?;
        Ok(PendingSend { rx })
    }

    /// Start every queued send and wait for the wave to settle.
    ///
    /// Resolves `true` once all started sends have settled, `false` when a
    /// positive `timeout` elapses first. Either way the queue is empty for
    /// new sends the moment this is called, and timed-out sends keep
    /// running unobserved.
    pub async fn flush(&self, timeout: Option<Duration>) -> bool {
        self.buffer.drain(timeout).await
    }
}

/// Handle to one admitted send.
///
/// Settles once the underlying POST - started by a flush - completes, with
/// the mapped [`SendResult`] or the network error. Awaiting the handle is
/// optional; dropping it simply leaves the outcome unobserved.
#[derive(Debug)]
pub struct PendingSend {
    rx: oneshot::Receiver<Result<SendResult, TransportError>>,
}

impl PendingSend {
    /// Wait for the send's outcome.
    pub async fn settled(self) -> Result<SendResult, TransportError> {
        self.rx.await.unwrap_or(Err(TransportError::Abandoned))
    }
}

impl IntoFuture for PendingSend {
    type Output = Result<SendResult, TransportError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.settled())
    }
}

async fn post_envelope(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    timeout: Option<Duration>,
    request: EnvelopeRequest,
) -> Result<SendResult, TransportError> {
    let mut builder = client.post(url).headers(headers).body(request.body);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let response = builder.send().await?;
    Ok(map_response(&response))
}

fn map_response(response: &reqwest::Response) -> SendResult {
    SendResult {
        status_code: response.status().as_u16(),
        rate_limits: header_string(response.headers(), RATE_LIMITS_HEADER),
        retry_after: header_string(response.headers(), RETRY_AFTER_HEADER),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Merge fixed and overlay headers; the overlay wins on overlapping names.
///
/// Entries that are not valid HTTP headers are skipped rather than failing
/// construction.
fn merge_headers(fixed: &[(String, String)], overlay: &[(String, String)]) -> HeaderMap {
    let mut merged = HeaderMap::new();
    for (name, value) in fixed.iter().chain(overlay) {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                merged.insert(name, value);
            }
            _ => tracing::warn!(header = name.as_str(), "skipping invalid request header"),
        }
    }
    merged
}
