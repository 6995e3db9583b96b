//! Inbound message routing.
//!
//! The router turns raw text frames into [`InboundFrame`]s using the venue's
//! [`FrameClassifier`] and hands each one to the matching
//! [`ConnectionContext`] transition. Frames that fail to parse are logged and
//! skipped; one bad frame never stalls the stream.

use std::sync::Arc;
use std::time::Instant;

use tracing::{trace, warn};

use crate::error::Error;
use crate::types::InboundFrame;
use crate::venue::FrameClassifier;

use super::ConnectionContext;

/// Classifies inbound frames and dispatches them into a connection context
#[derive(Debug, Clone)]
pub struct MessageRouter {
    classifier: Arc<dyn FrameClassifier>,
}

impl MessageRouter {
    /// Create a router for the given venue dialect
    pub fn new(classifier: Arc<dyn FrameClassifier>) -> Self {
        Self { classifier }
    }

    /// Route one text frame. Returns the number of logical frames dispatched.
    pub fn route(&self, ctx: &mut ConnectionContext, text: &str, now: Instant) -> usize {
        let frames = match self.classifier.classify(text) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, frame = %truncate(text, 256), "unparseable frame");
                return 0;
            }
        };
        let count = frames.len();
        for frame in frames {
            dispatch(ctx, frame, now);
        }
        count
    }
}

/// Apply one classified frame to the context
pub fn dispatch(ctx: &mut ConnectionContext, frame: InboundFrame, now: Instant) {
    match frame {
        InboundFrame::SubscribeAck(topic) => ctx.on_subscribe_ack(&topic, now),
        InboundFrame::UnsubscribeAck(topic) => ctx.on_unsubscribe_ack(&topic, now),
        InboundFrame::Error {
            topic,
            code,
            message,
        } => ctx.on_error(topic.as_ref(), code, message, now),
        InboundFrame::AuthResult { success, message } => {
            let outcome = if success {
                Ok(())
            } else {
                Err(Error::AuthenticationFailed(
                    message.unwrap_or_else(|| "login rejected".to_string()),
                ))
            };
            ctx.on_auth_result(outcome, now);
        }
        InboundFrame::Pong => ctx.on_pong(now),
        InboundFrame::OrderBook {
            topic,
            action,
            update,
        } => ctx.on_book(&topic, action, update, now),
        InboundFrame::Data { topic, payload } => ctx.on_data(&topic, payload, now),
        InboundFrame::Ignored => trace!("ignored frame"),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
