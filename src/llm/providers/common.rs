// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::ApiError;
use crate::llm::provider::{ChunkStream, ResponseChunk};

/// Longest error body excerpt carried into an error message
const MAX_ERROR_EXCERPT: usize = 500;

/// Parse numeric Retry-After header (seconds).
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map an HTTP status and a provider message onto the shared taxonomy.
pub(crate) fn status_error(status: u16, message: String, retry_after: Option<Duration>) -> ApiError {
    match status {
        401 | 403 => ApiError::AuthError(message),
        429 => ApiError::RateLimited { retry_after },
        408 | 504 => ApiError::Timeout,
        400 | 402 | 404 | 409 | 413 | 422 => ApiError::InvalidRequest(message),
        500..=599 => ApiError::ProviderUnavailable(format!("HTTP {}: {}", status, message)),
        _ => ApiError::Unknown(format!("HTTP {}: {}", status, message)),
    }
}

/// Map a transport failure. Timeouts and connection failures are transient.
pub(crate) fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_connect() {
        ApiError::ProviderUnavailable(format!("connection failed: {}", err))
    } else if err.is_body() || err.is_request() {
        ApiError::ProviderUnavailable(format!("transport error: {}", err))
    } else if err.is_decode() {
        ApiError::Unknown(format!("malformed response: {}", err))
    } else {
        ApiError::Unknown(err.to_string())
    }
}

/// Trimmed error body for messages when the provider's JSON is not parseable
pub(crate) fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    match body.char_indices().nth(MAX_ERROR_EXCERPT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Strip the `data:` prefix of a server-sent event line.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Splits a byte stream into lines without breaking multi-byte characters.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line, without its terminator.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the body has ended.
    pub(crate) fn take_rest(&mut self) -> Option<String> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).trim().to_string())
    }
}

/// A line-oriented wire protocol (SSE or NDJSON)
pub(crate) trait LineDecoder: Send + 'static {
    /// Chunks produced by one line; blank and keep-alive lines yield none.
    fn decode_line(&mut self, line: &str) -> Vec<ResponseChunk>;
}

/// Turn a successful streaming response into chunks.
///
/// The stream ends after the first `Done` or `Error`. A body that ends
/// before either is reported as `ProviderUnavailable`.
pub(crate) fn line_stream<D: LineDecoder>(response: reqwest::Response, mut decoder: D) -> ChunkStream {
    let bytes = response.bytes_stream();

    Box::pin(async_stream::stream! {
        let mut lines = LineBuffer::default();

        for await chunk in bytes {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield ResponseChunk::Error(transport_error(e));
                    return;
                }
            };
            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                for item in decoder.decode_line(&line) {
                    let terminal = !matches!(item, ResponseChunk::Delta(_));
                    yield item;
                    if terminal {
                        return;
                    }
                }
            }
        }

        if let Some(rest) = lines.take_rest() {
            for item in decoder.decode_line(&rest) {
                let terminal = !matches!(item, ResponseChunk::Delta(_));
                yield item;
                if terminal {
                    return;
                }
            }
        }

        yield ResponseChunk::Error(ApiError::ProviderUnavailable(
            "stream ended before completion".to_string(),
        ));
    })
}
