//! Event parser: raw SSE frames to typed [`Event`]s.
//!
//! A single bad frame never ends the stream: malformed payloads surface as
//! `Protocol` error items that the dispatcher logs and skips, and unknown
//! event names are dropped with a warning so newer servers can add events.

use futures::stream::{Stream, StreamExt};
use url::Url;

use crate::error::{McpError, McpResult};
use crate::types::{Endpoint, Event, RawFrame, ServerError, ToolResult, ToolsData};

use super::transport::FrameStream;

/// Query parameters that may carry the session id in an endpoint path.
const SESSION_ID_PARAMS: &[&str] = &["session_id", "sessionId"];

/// Base used to parse endpoint paths that arrive without a host.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Decode one frame.
///
/// Returns `Ok(None)` for frames that carry no event (unknown names, empty
/// frames); `Err(Protocol)` when a known event has a malformed payload.
pub fn parse_frame(frame: &RawFrame) -> McpResult<Option<Event>> {
    if frame.is_comment() {
        return Ok(Some(Event::Heartbeat));
    }

    match frame.event_name() {
        "endpoint" => parse_endpoint(&frame.data).map(|e| Some(Event::Endpoint(e))),
        "tools" => {
            let tools: ToolsData = serde_json::from_str(&frame.data).map_err(|e| {
                McpError::Protocol(format!("malformed tools payload: {e}"))
            })?;
            let tools = tools.into_tools();
            if let Some(bad) = tools.iter().find(|t| t.name.trim().is_empty()) {
                return Err(McpError::Protocol(format!(
                    "tool descriptor with empty name: {bad:?}"
                )));
            }
            Ok(Some(Event::Tools(tools)))
        }
        "result" => {
            let result: ToolResult = serde_json::from_str(&frame.data).map_err(|e| {
                McpError::Protocol(format!("malformed result payload: {e}"))
            })?;
            Ok(Some(Event::Result(result)))
        }
        "error" => Ok(Some(Event::Error(parse_error_data(&frame.data)))),
        "heartbeat" | "ping" => Ok(Some(Event::Heartbeat)),
        other => {
            tracing::warn!(event = other, "dropping unknown SSE event");
            Ok(None)
        }
    }
}

/// Extract the session id from an `endpoint` payload.
///
/// The payload is usually a path such as `/messages/?session_id=abc`, but an
/// absolute URL is accepted too.
pub fn parse_endpoint(data: &str) -> McpResult<Endpoint> {
    let data = data.trim();
    if data.is_empty() {
        return Err(McpError::Protocol("empty endpoint payload".to_string()));
    }

    let parsed = match Url::parse(data) {
        Ok(url) => url,
        Err(_) => Url::parse(RELATIVE_BASE)
            .and_then(|base| base.join(data))
            .map_err(|e| McpError::Protocol(format!("malformed endpoint '{data}': {e}")))?,
    };

    let session_id = parsed
        .query_pairs()
        .find(|(key, _)| SESSION_ID_PARAMS.contains(&key.as_ref()))
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            McpError::Protocol(format!("endpoint '{data}' does not carry a session id"))
        })?;

    Ok(Endpoint {
        url: data.to_string(),
        session_id,
    })
}

/// `error` payloads that are not JSON still mean something went wrong; keep
/// the raw text as a session-level error instead of dropping it.
fn parse_error_data(data: &str) -> ServerError {
    match serde_json::from_str::<ServerError>(data) {
        Ok(err) => err,
        Err(_) => ServerError::session(data.trim()),
    }
}

/// Adapt a frame stream into a lazy stream of parsed events.
///
/// Transport errors from the frame stream pass through unchanged; the
/// stream is restartable only by opening a new frame stream.
pub fn events(frames: FrameStream) -> impl Stream<Item = McpResult<Event>> + Send {
    frames.filter_map(|item| async move {
        match item {
            Ok(frame) => parse_frame(&frame).transpose(),
            Err(e) => Some(Err(e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event: &str, data: &str) -> RawFrame {
        RawFrame::new(event, data)
    }

    #[test]
    fn test_endpoint_path() {
        let event = parse_frame(&frame("endpoint", "/messages/?session_id=abc"))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::Endpoint(Endpoint {
                url: "/messages/?session_id=abc".to_string(),
                session_id: "abc".to_string(),
            })
        );
    }

    #[test]
    fn test_endpoint_absolute_url_camel_case() {
        let endpoint = parse_endpoint("https://mcp.example.com/messages?sessionId=xyz&x=1").unwrap();
        assert_eq!(endpoint.session_id, "xyz");
    }

    #[test]
    fn test_endpoint_without_session_is_protocol_error() {
        let err = parse_frame(&frame("endpoint", "/messages/")).unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[test]
    fn test_tools_event() {
        let data = json!([{"name": "echo", "description": "Echo", "inputSchema": {"type": "object"}}]);
        let event = parse_frame(&frame("tools", &data.to_string())).unwrap().unwrap();
        match event {
            Event::Tools(tools) => {
                assert_eq!(tools.len(), 1);
                assert_eq!(tools[0].name, "echo");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_tools_with_empty_name_rejected() {
        let result = parse_frame(&frame("tools", r#"[{"name": ""}]"#));
        assert!(matches!(result, Err(McpError::Protocol(_))));
    }

    #[test]
    fn test_malformed_tools_is_protocol_error() {
        let result = parse_frame(&frame("tools", "{not json"));
        assert!(matches!(result, Err(McpError::Protocol(_))));
    }

    #[test]
    fn test_result_event() {
        let data = r#"{"correlationId": "c1", "payload": {"msg": "hi"}}"#;
        let event = parse_frame(&frame("result", data)).unwrap().unwrap();
        assert_eq!(
            event,
            Event::Result(ToolResult {
                correlation_id: "c1".to_string(),
                payload: json!({"msg": "hi"}),
            })
        );
    }

    #[test]
    fn test_result_without_correlation_id_rejected() {
        let result = parse_frame(&frame("result", r#"{"payload": 1}"#));
        assert!(matches!(result, Err(McpError::Protocol(_))));
    }

    #[test]
    fn test_error_event_correlated() {
        let data = r#"{"correlationId": "c2", "message": "boom", "kind": "tool_failed"}"#;
        match parse_frame(&frame("error", data)).unwrap().unwrap() {
            Event::Error(err) => {
                assert_eq!(err.correlation_id.as_deref(), Some("c2"));
                assert_eq!(err.message, "boom");
                assert_eq!(err.kind.as_deref(), Some("tool_failed"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_error_event_plain_text() {
        match parse_frame(&frame("error", "server overloaded")).unwrap().unwrap() {
            Event::Error(err) => {
                assert!(err.correlation_id.is_none());
                assert_eq!(err.message, "server overloaded");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_heartbeats() {
        assert_eq!(
            parse_frame(&RawFrame::comment("ping")).unwrap(),
            Some(Event::Heartbeat)
        );
        assert_eq!(
            parse_frame(&frame("heartbeat", "")).unwrap(),
            Some(Event::Heartbeat)
        );
        assert_eq!(parse_frame(&frame("ping", "")).unwrap(), Some(Event::Heartbeat));
    }

    #[test]
    fn test_unknown_event_dropped() {
        assert_eq!(parse_frame(&frame("progress", "{}")).unwrap(), None);
        assert_eq!(parse_frame(&RawFrame::default()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_events_stream_skips_nothing_silently() {
        let frames: FrameStream = Box::pin(futures::stream::iter(vec![
            Ok(frame("endpoint", "/messages/?session_id=s")),
            Ok(frame("nonsense", "")),
            Ok(frame("tools", "oops")),
            Err(McpError::Transport("reset".to_string())),
        ]));
        let items: Vec<_> = events(frames).collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], Ok(Event::Endpoint(_))));
        assert!(matches!(items[1], Err(McpError::Protocol(_))));
        assert!(matches!(items[2], Err(McpError::Transport(_))));
    }
}
