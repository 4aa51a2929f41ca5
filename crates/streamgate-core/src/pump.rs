//! Stream Pump: relays the upstream response body to the caller as it arrives.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::body::Body;
use crate::cors::CorsHeaders;
use crate::error::GatewayError;
use crate::gateway::HostCapabilities;
use crate::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use crate::http::{HeaderMap, StatusCode};
use crate::sse::SseFramer;

/// The caller-facing half of a host adapter. `write_head` is called exactly once, before any
/// chunk; `close` is called exactly once on every path.
#[async_trait(?Send)]
pub trait ResponseWriter {
    async fn write_head(&mut self, status: StatusCode, headers: &HeaderMap)
        -> Result<(), GatewayError>;

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), GatewayError>;

    async fn close(&mut self) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
pub struct PumpOutcome {
    pub chunks: usize,
    pub bytes: usize,
    /// SSE events observed, when the response was an event stream.
    pub events: Option<usize>,
    pub error: Option<GatewayError>,
}

/// Upstream headers minus `content-length`, with the gateway CORS policy applied last.
pub fn response_head(upstream: &HeaderMap, cors: &CorsHeaders) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.keys_len() + 4);
    for (name, value) in upstream {
        if name != CONTENT_LENGTH {
            headers.append(name.clone(), value.clone());
        }
    }
    cors.apply(&mut headers);
    headers
}

pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .trim_start()
                .get(..17)
                .is_some_and(|mime| mime.eq_ignore_ascii_case("text/event-stream"))
        })
        .unwrap_or(false)
}

/// Relays `body` after the head has been written. Streaming hosts get one write per upstream
/// chunk; buffered hosts get a single write once the body is complete. A read or write failure
/// stops the relay, drops the upstream reader, and still closes the response.
pub async fn pump<W>(
    body: Option<Body>,
    writer: &mut W,
    capabilities: HostCapabilities,
    mut framer: Option<SseFramer>,
) -> PumpOutcome
where
    W: ResponseWriter + ?Sized,
{
    let mut outcome = PumpOutcome::default();

    match body {
        None => {}
        Some(Body::Once(bytes)) => {
            observe(&mut framer, &bytes);
            write(writer, bytes, &mut outcome).await;
        }
        Some(Body::Stream(mut stream)) if capabilities.streaming_body => {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(chunk) if chunk.is_empty() => continue,
                    Ok(chunk) => {
                        observe(&mut framer, &chunk);
                        if !write(writer, chunk, &mut outcome).await {
                            break;
                        }
                    }
                    Err(err) => {
                        outcome.error = Some(GatewayError::stream(err));
                        break;
                    }
                }
            }
        }
        Some(Body::Stream(mut stream)) => {
            let mut buffer = BytesMut::new();
            while let Some(next) = stream.next().await {
                match next {
                    Ok(chunk) => buffer.extend_from_slice(&chunk),
                    Err(err) => {
                        outcome.error = Some(GatewayError::stream(err));
                        break;
                    }
                }
            }
            drop(stream);
            let bytes = buffer.freeze();
            observe(&mut framer, &bytes);
            write(writer, bytes, &mut outcome).await;
        }
    }

    if let Some(framer) = framer.as_mut() {
        if framer.is_mid_event() {
            log::debug!("event stream ended without a closing blank line");
        }
        framer.finish();
        outcome.events = Some(framer.event_count());
    }

    if let Err(err) = writer.close().await {
        if outcome.error.is_none() {
            outcome.error = Some(err);
        }
    }

    outcome
}

fn observe(framer: &mut Option<SseFramer>, chunk: &[u8]) {
    if let Some(framer) = framer.as_mut() {
        framer.push(chunk);
    }
}

/// Returns `false` when the caller can no longer be written to.
async fn write<W>(writer: &mut W, chunk: Bytes, outcome: &mut PumpOutcome) -> bool
where
    W: ResponseWriter + ?Sized,
{
    if chunk.is_empty() {
        return true;
    }
    let len = chunk.len();
    match writer.write_chunk(chunk).await {
        Ok(()) => {
            outcome.chunks += 1;
            outcome.bytes += len;
            true
        }
        Err(err) => {
            if outcome.error.is_none() {
                outcome.error = Some(err);
            }
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::http::HeaderValue;
    use futures::executor::block_on;
    use futures::stream;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Records every call in order.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingWriter {
        pub head: Option<(StatusCode, HeaderMap)>,
        pub chunks: Vec<Bytes>,
        pub closed: usize,
        pub fail_after: Option<usize>,
        pub fail_head: bool,
    }

    impl RecordingWriter {
        pub fn failing_head() -> Self {
            Self {
                fail_head: true,
                ..Self::default()
            }
        }

        pub fn failing_after(chunks: usize) -> Self {
            Self {
                fail_after: Some(chunks),
                ..Self::default()
            }
        }

        pub fn body(&self) -> Vec<u8> {
            self.chunks.concat()
        }
    }

    #[async_trait(?Send)]
    impl ResponseWriter for RecordingWriter {
        async fn write_head(
            &mut self,
            status: StatusCode,
            headers: &HeaderMap,
        ) -> Result<(), GatewayError> {
            if self.fail_head {
                return Err(GatewayError::Disconnected);
            }
            assert!(self.head.is_none(), "head written twice");
            self.head = Some((status, headers.clone()));
            Ok(())
        }

        async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), GatewayError> {
            if self.fail_after.is_some_and(|limit| self.chunks.len() >= limit) {
                return Err(GatewayError::Disconnected);
            }
            self.chunks.push(chunk);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), GatewayError> {
            self.closed += 1;
            Ok(())
        }
    }

    fn chunks(parts: &[&'static str]) -> Body {
        Body::stream(stream::iter(
            parts
                .iter()
                .map(|p| Bytes::from_static(p.as_bytes()))
                .collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn streaming_writes_each_chunk_in_order() {
        let mut writer = RecordingWriter::default();
        let outcome = block_on(pump(
            Some(chunks(&["data: 1\n\n", "data: 2\n\n", "data: 3\n\n"])),
            &mut writer,
            HostCapabilities::STREAMING,
            Some(SseFramer::new()),
        ));
        assert_eq!(writer.chunks.len(), 3);
        assert_eq!(writer.body(), b"data: 1\n\ndata: 2\n\ndata: 3\n\n");
        assert_eq!(writer.closed, 1);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(outcome.events, Some(3));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn streaming_counts_events_without_buffering_lines() {
        let big = Bytes::from(vec![b'x'; 1024 * 1024]);
        let mut parts = vec![Bytes::from_static(b"data: ")];
        parts.extend(std::iter::repeat(big).take(10));
        parts.push(Bytes::from_static(b"\n\ndata: tail"));
        let mut writer = RecordingWriter::default();
        let outcome = block_on(pump(
            Some(Body::stream(stream::iter(parts))),
            &mut writer,
            HostCapabilities::STREAMING,
            Some(SseFramer::new()),
        ));
        assert_eq!(outcome.chunks, 12);
        assert_eq!(outcome.bytes, 10 * 1024 * 1024 + 6 + 12);
        assert_eq!(outcome.events, Some(2));
    }

    #[test]
    fn buffered_writes_once() {
        let mut writer = RecordingWriter::default();
        let outcome = block_on(pump(
            Some(chunks(&["a", "b", "c"])),
            &mut writer,
            HostCapabilities::BUFFERED,
            None,
        ));
        assert_eq!(writer.chunks, vec![Bytes::from_static(b"abc")]);
        assert_eq!(outcome.bytes, 3);
        assert!(outcome.events.is_none());
    }

    #[test]
    fn missing_body_closes_immediately() {
        let mut writer = RecordingWriter::default();
        let outcome = block_on(pump(None, &mut writer, HostCapabilities::STREAMING, None));
        assert!(writer.chunks.is_empty());
        assert_eq!(writer.closed, 1);
        assert_eq!(outcome.chunks, 0);
    }

    #[test]
    fn reader_failure_keeps_sent_bytes_and_closes() {
        let dropped = Rc::new(Cell::new(false));
        let guard = DropFlag(dropped.clone());
        let body = Body::from_stream(
            stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(anyhow::anyhow!("connection reset")),
                Ok(Bytes::from_static(b"never")),
            ])
            .map(move |item| {
                let _guard = &guard;
                item
            }),
        );

        let mut writer = RecordingWriter::default();
        let outcome = block_on(pump(
            Some(body),
            &mut writer,
            HostCapabilities::STREAMING,
            None,
        ));
        assert_eq!(writer.body(), b"partial");
        assert_eq!(writer.closed, 1);
        assert!(matches!(outcome.error, Some(GatewayError::Stream { .. })));
        assert!(dropped.get(), "upstream reader released");
    }

    #[test]
    fn buffered_reader_failure_writes_partial_body() {
        let body = Body::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"par")),
            Ok(Bytes::from_static(b"tial")),
            Err(anyhow::anyhow!("reset")),
        ]));
        let mut writer = RecordingWriter::default();
        let outcome = block_on(pump(
            Some(body),
            &mut writer,
            HostCapabilities::BUFFERED,
            None,
        ));
        assert_eq!(writer.body(), b"partial");
        assert!(outcome.error.is_some());
        assert_eq!(writer.closed, 1);
    }

    #[test]
    fn write_failure_stops_reading() {
        let mut writer = RecordingWriter {
            fail_after: Some(1),
            ..RecordingWriter::default()
        };
        let outcome = block_on(pump(
            Some(chunks(&["one", "two", "three"])),
            &mut writer,
            HostCapabilities::STREAMING,
            None,
        ));
        assert_eq!(writer.chunks.len(), 1);
        assert!(outcome
            .error
            .as_ref()
            .is_some_and(GatewayError::is_disconnect));
        assert_eq!(writer.closed, 1);
    }

    #[test]
    fn head_drops_content_length_and_applies_cors_last() {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        upstream.append("set-cookie", HeaderValue::from_static("a=1"));
        upstream.append("set-cookie", HeaderValue::from_static("b=2"));
        upstream.insert(
            "access-control-allow-origin",
            HeaderValue::from_static("https://upstream.example.com"),
        );

        let mut request = HeaderMap::new();
        request.insert("origin", HeaderValue::from_static("https://example.com"));
        let cors = CorsHeaders::for_request(&GatewayConfig::default(), &request);
        let head = response_head(&upstream, &cors);

        assert!(head.get(CONTENT_LENGTH).is_none());
        assert_eq!(head.get_all("set-cookie").iter().count(), 2);
        assert_eq!(
            head.get("access-control-allow-origin").unwrap(),
            "https://example.com"
        );
        assert!(is_event_stream(&head));
    }

    #[test]
    fn event_stream_detection_ignores_case_and_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Text/Event-Stream; charset=utf-8"),
        );
        assert!(is_event_stream(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_event_stream(&headers));
    }

    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }
}
