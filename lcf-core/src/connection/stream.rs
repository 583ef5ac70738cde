//! Push transport
//!
//! Holds one long-lived connection per session. Each drop raises a transient
//! error and schedules a single reconnect after the configured delay; the
//! reconnect is skipped when the session was stopped in the meantime.

use futures::StreamExt;
use lcf_common::model::Comment;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::reconciler::Batch;
use crate::session::FeedSession;

/// One push message after parsing
#[derive(Debug, Clone)]
pub enum StreamMessage {
    Batch(Batch),
    /// `[]` or an envelope with an empty data array; not a batch of zero
    Empty,
    Malformed(String),
}

/// Accepts a bare comment array or `{ "data": [...], "totalCount"?: n }`
pub fn parse_stream_message(raw: &str) -> StreamMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return StreamMessage::Malformed(format!("invalid JSON: {}", e)),
    };

    let (items, total_count) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Array(items)) => {
                (items, envelope.get("totalCount").and_then(Value::as_u64))
            }
            _ => {
                return StreamMessage::Malformed("envelope without a data array".to_string())
            }
        },
        other => {
            return StreamMessage::Malformed(format!(
                "expected array or envelope, got {}",
                json_kind(&other)
            ))
        }
    };

    if items.is_empty() {
        return StreamMessage::Empty;
    }

    match serde_json::from_value::<Vec<Comment>>(Value::Array(items)) {
        Ok(comments) => StreamMessage::Batch(Batch::with_total(comments, total_count)),
        Err(e) => StreamMessage::Malformed(format!("bad comment: {}", e)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Transport task: connect, consume, reconnect once per drop
pub async fn run(session: Arc<FeedSession>, cancel: CancellationToken) {
    let reconnect_delay = session.settings().reconnect_delay;
    info!(session_id = %session.id(), target = %session.target(), "Stream transport started");

    loop {
        let failure = match connect_and_consume(&session, &cancel).await {
            Ok(()) => return,
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            return;
        }

        warn!(
            session_id = %session.id(),
            error = %failure,
            delay_ms = reconnect_delay.as_millis() as u64,
            "Comment stream dropped, reconnecting"
        );
        session.raise_transport_error(failure.to_string());

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }

        if cancel.is_cancelled() || !session.is_live() {
            return;
        }
        debug!(session_id = %session.id(), "Reconnecting comment stream");
    }
}

/// `Ok(())` only when cancelled; any other exit is a drop
async fn connect_and_consume(
    session: &Arc<FeedSession>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let open = session
        .sources()
        .comments
        .open_stream(session.target(), session.credential());

    let mut messages = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        opened = open => opened?,
    };

    info!(session_id = %session.id(), "Comment stream open");
    session.clear_error();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = messages.next() => next,
        };

        match next {
            Some(Ok(raw)) => match parse_stream_message(&raw) {
                StreamMessage::Batch(batch) => {
                    debug!(
                        session_id = %session.id(),
                        size = batch.comments.len(),
                        "Stream batch"
                    );
                    session.ingest(batch).await;
                }
                StreamMessage::Empty => {}
                StreamMessage::Malformed(reason) => {
                    let err = Error::MalformedBatch(reason);
                    warn!(session_id = %session.id(), error = %err, "Dropping stream message");
                }
            },
            Some(Err(e)) => return Err(e),
            None => return Err(Error::Transport("stream closed by server".to_string())),
        }
    }
}
