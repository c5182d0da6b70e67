//! Message Channel
//!
//! Connects one inspector session and routes its output. Responses release
//! the pending exchange; notifications go to the debug context's router.

use std::sync::Arc;

use bridge_js_runtime::inspector::{Channel, Inspector, InspectorSession, TrustLevel, CONTEXT_GROUP_ID};

use super::error::DebugResult;
use super::exchange::PendingProtocolExchange;

/// Notifications that report a request the engine could not read. The engine
/// never sends a response for those, so they also release the exchange.
const INVALID_JSON_MARKERS: [&str; 2] = ["{\"error\":{\"code\":-32700", "{\"error\":{\"code\":-32600"];

pub type NotificationSink = Box<dyn Fn(&str) + Send + Sync>;

/// The session's output side.
struct BackChannel {
    exchange: Arc<PendingProtocolExchange>,
    on_notification: NotificationSink,
}

impl Channel for BackChannel {
    fn send_response(&self, call_id: i64, message: String) {
        tracing::trace!(target: "bridge.debug", call_id, "response: {}", message);
        self.exchange.release(Some(call_id), message);
    }

    fn send_notification(&self, message: String) {
        tracing::trace!(target: "bridge.debug", "notification: {}", message);
        (self.on_notification)(&message);
        if INVALID_JSON_MARKERS.iter().any(|marker| message.starts_with(marker)) {
            self.exchange.release(None, message);
        }
    }
}

pub struct MessageChannel {
    session: InspectorSession,
}

impl MessageChannel {
    /// Connect a fully trusted session to the default context group.
    pub fn open(
        inspector: &Inspector,
        exchange: Arc<PendingProtocolExchange>,
        on_notification: NotificationSink,
    ) -> DebugResult<Self> {
        let back_channel = Arc::new(BackChannel {
            exchange,
            on_notification,
        });
        let session = inspector.connect(CONTEXT_GROUP_ID, back_channel, TrustLevel::FullyTrusted)?;
        Ok(Self { session })
    }

    pub fn dispatch_protocol_message(&self, message: &str) {
        tracing::trace!(target: "bridge.debug", "request: {}", message);
        self.session.dispatch_protocol_message(message);
    }

    /// `reason` doubles as the pause detail and the correlation token
    /// reported by `Debugger.paused`.
    pub fn schedule_pause_on_next_statement(&self, reason: &str) {
        self.session.schedule_pause_on_next_statement(reason, reason);
    }

    pub fn cancel_pause_on_next_statement(&self) {
        self.session.cancel_pause_on_next_statement();
    }

    pub fn resume(&self) {
        self.session.resume();
    }

    pub fn disconnect(&self) {
        self.session.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::debug::DebugError;

    fn back_channel() -> (Arc<PendingProtocolExchange>, Arc<Mutex<Vec<String>>>, BackChannel) {
        let exchange = Arc::new(PendingProtocolExchange::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Box::new(move |message: &str| seen.lock().push(message.to_string()))
        };
        let channel = BackChannel {
            exchange: Arc::clone(&exchange),
            on_notification: sink,
        };
        (exchange, seen, channel)
    }

    #[test]
    fn test_response_releases_exchange() {
        let (exchange, seen, channel) = back_channel();
        exchange.arm(Some(3));

        channel.send_response(3, "{\"id\":3,\"result\":{}}".into());
        assert_eq!(exchange.wait(None).unwrap(), "{\"id\":3,\"result\":{}}");
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_plain_notification_does_not_release() {
        let (exchange, seen, channel) = back_channel();
        exchange.arm(Some(1));

        channel.send_notification("{\"method\":\"Debugger.resumed\",\"params\":{}}".into());
        assert_eq!(seen.lock().len(), 1);
        assert!(matches!(
            exchange.wait(Some(Duration::from_millis(10))),
            Err(DebugError::Timeout)
        ));
    }

    #[test]
    fn test_invalid_json_notification_also_releases() {
        let (exchange, seen, channel) = back_channel();
        exchange.arm(None);

        let message = "{\"error\":{\"code\":-32700,\"message\":\"Message must be a valid JSON\"}}";
        channel.send_notification(message.into());
        assert_eq!(seen.lock().as_slice(), [message.to_string()]);
        assert_eq!(exchange.wait(None).unwrap(), message);
    }
}
