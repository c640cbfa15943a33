//! Stream relay: turns a chunked SSE body into a stream of text deltas.
//!
//! Chunks arrive with arbitrary boundaries, so bytes are buffered until a
//! full `\n`-terminated line is available. Only `data:` lines carry
//! payloads; `[DONE]` ends the relay. Buffering raw bytes keeps multi-byte
//! characters intact when a chunk boundary falls inside one.

use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tr_domain::error::Result;
use tr_domain::stream::BoxStream;

/// Outcome of interpreting one complete SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

/// Pull complete lines out of `buffer`, leaving any trailing partial line.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
        lines.push(line.trim_end_matches('\r').to_string());
    }
    lines
}

fn parse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(v) => match extract_delta(&v) {
            Some(text) if !text.is_empty() => SseLine::Delta(text.to_owned()),
            _ => SseLine::Skip,
        },
        Err(e) => {
            tracing::warn!(error = %e, payload = %data, "skipping undecodable SSE payload");
            SseLine::Skip
        }
    }
}

/// Find the text delta in a decoded event payload.
///
/// Recognized shapes:
/// - `{"delta": "text"}`
/// - `{"delta": {"content": [{"text": {"value": "text"}}]}}` (thread message delta)
/// - `{"choices": [{"delta": {"content": "text"}}]}` (chat completions chunk)
pub fn extract_delta(v: &Value) -> Option<&str> {
    if let Some(text) = v.get("delta").and_then(Value::as_str) {
        return Some(text);
    }

    if let Some(text) = v
        .pointer("/delta/content/0/text/value")
        .and_then(Value::as_str)
    {
        return Some(text);
    }

    v.pointer("/choices/0/delta/content").and_then(Value::as_str)
}

/// Relay text deltas from an upstream SSE body.
///
/// The returned stream is pull-based: nothing is read until it is polled,
/// and dropping it drops `chunks`. It ends after `[DONE]`, after the input
/// ends (flushing a final unterminated line), or after yielding a transport
/// error.
pub fn relay_deltas<S, B>(chunks: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();

        'read: loop {
            match chunks.next().await {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(bytes.as_ref());
                    for line in drain_lines(&mut buffer) {
                        match parse_line(&line) {
                            SseLine::Delta(text) => yield Ok(text),
                            SseLine::Done => break 'read,
                            SseLine::Skip => {}
                        }
                    }
                }
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => {
                    if !buffer.is_empty() {
                        let line = String::from_utf8_lossy(&buffer).into_owned();
                        buffer.clear();
                        if let SseLine::Delta(text) = parse_line(line.trim_end_matches('\r')) {
                            yield Ok(text);
                        }
                    }
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
