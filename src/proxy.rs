use crate::token::{DeliveryRecord, GateError};
use axum::body::Body;
use axum::http::{HeaderValue, Method, Response, StatusCode, header};
use futures::StreamExt;
use mime_guess::from_path;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, error};

/// Paths containing this marker are never proxied upstream
pub const SUBTITLE_MARKER: &str = "subtitles";

pub const USER_AGENT: &str = concat!("stream-gate/", env!("CARGO_PKG_VERSION"), " segment-proxy");

/// Response headers passed through from the origin
const FORWARDED_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::ETAG,
    header::LAST_MODIFIED,
];

pub fn is_subtitle_path(segment_path: &str) -> bool {
    segment_path.contains(SUBTITLE_MARKER)
}

/// A single path component that stays where it is put: no dot segments
/// (plain or percent-encoded), no separators, nothing empty.
fn is_plain_segment(segment: &str) -> bool {
    if segment.is_empty() || segment.contains(['/', '\\']) {
        return false;
    }

    let decoded = urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    !matches!(decoded.as_str(), "." | "..") && !decoded.contains(['/', '\\'])
}

/// Client for the fixed upstream origin
#[derive(Clone, Debug)]
pub struct Upstream {
    client: reqwest::Client,
    origin: Url,
}

impl Upstream {
    pub fn new(origin: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let origin = Url::parse(origin.trim_end_matches('/'))?;
        if origin.cannot_be_a_base() {
            return Err(anyhow::anyhow!("Upstream origin {origin} cannot carry a path"));
        }

        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &str {
        self.origin.as_str()
    }

    /// `<origin>/<content id>/<segment path>`, every component percent-encoded
    /// on its own so nothing can climb out of the bound content directory.
    /// Returns `None` when a component is empty or a dot segment.
    pub fn segment_url(&self, content_id: &str, segment_path: &str) -> Option<Url> {
        let segment_path = segment_path.trim_start_matches('/');
        if !is_plain_segment(content_id) || !segment_path.split('/').all(is_plain_segment) {
            return None;
        }

        let mut url = self.origin.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push(content_id)
            .extend(segment_path.split('/'));
        Some(url)
    }

    /// Forward a segment request for an already validated binding.
    ///
    /// The body is streamed through as it arrives; dropping the returned
    /// response drops the upstream transfer with it.
    pub async fn fetch(
        &self,
        method: Method,
        binding: &DeliveryRecord,
        segment_path: &str,
        range: Option<HeaderValue>,
    ) -> Result<Response<Body>, GateError> {
        if is_subtitle_path(segment_path) {
            debug!(segment_path, "Subtitle segments are not proxied");
            return Err(GateError::UpstreamNotFound);
        }

        let Some(url) = self.segment_url(&binding.content_id, segment_path) else {
            debug!(segment_path, "Rejecting segment path outside the bound content");
            return Err(GateError::UpstreamNotFound);
        };
        debug!(%url, node_id = %binding.node_id, %method, "Forwarding segment request");

        let mut request = self.client.request(method, url.clone());
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }

        let upstream = request.send().await.map_err(|error| {
            error!(%url, ?error, "Upstream request failed");
            GateError::UpstreamTransport(error.to_string())
        })?;

        let status = upstream.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%url, "Segment not found upstream");
            return Err(GateError::UpstreamNotFound);
        }

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .or_else(|| {
                HeaderValue::from_str(from_path(segment_path).first_or_octet_stream().as_ref()).ok()
            });

        let mut builder = Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        for name in FORWARDED_HEADERS {
            if let Some(value) = upstream.headers().get(&name) {
                builder = builder.header(name, value.clone());
            }
        }

        let stream_url = url.clone();
        let stream = upstream.bytes_stream().inspect(move |chunk| {
            if let Err(error) = chunk {
                error!(url = %stream_url, ?error, "Upstream stream interrupted");
            }
        });

        builder
            .body(Body::from_stream(stream))
            .map_err(|error| {
                error!(%url, ?error, "Failed to build proxied response");
                GateError::UpstreamTransport(error.to_string())
            })
    }
}
