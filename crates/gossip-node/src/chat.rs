use chrono::{DateTime, Local};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use gossip_p2p::{Message, PubSub, Shutdown, ShutdownReason};

/// Publish every non-blank line of `input` on `topic`.
///
/// Ends the process lifetime with [`ShutdownReason::InputClosed`] once the
/// input reaches end of stream or fails. Returns without triggering when
/// the shutdown token fires first.
pub async fn chat_input_loop<R>(mut input: R, pubsub: PubSub, topic: String, shutdown: Shutdown)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("chat input loop cancelled");
                return;
            }
            read = input.read_line(&mut line) => read,
        };
        match read {
            Ok(0) => {
                info!("input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "reading input failed");
                break;
            }
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if let Err(e) = pubsub.publish(&topic, text.as_bytes().to_vec()).await {
            warn!(error = %e, "message not sent");
        }
    }
    shutdown.trigger(ShutdownReason::InputClosed);
}

/// Render a received message for the terminal.
///
/// UTF-8 payloads are shown as text, anything else as hex.
pub fn format_message(message: &Message, at: DateTime<Local>) -> String {
    let from = message
        .from
        .map(|peer| peer.to_string())
        .unwrap_or_else(|| "unknown".into());
    let body = match std::str::from_utf8(&message.data) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(&message.data)),
    };
    format!("[{}] {from}: {body}", at.format("%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gossip_p2p::{PeerId, PUBSUB_TOPIC};

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap()
    }

    #[test]
    fn text_messages_show_sender_and_time() {
        let peer = PeerId::random();
        let msg = Message {
            from: Some(peer),
            topic: PUBSUB_TOPIC.into(),
            data: b"hi there".to_vec(),
        };
        assert_eq!(format_message(&msg, at()), format!("[09:30:05] {peer}: hi there"));
    }

    #[test]
    fn binary_payloads_render_as_hex() {
        let msg = Message {
            from: None,
            topic: PUBSUB_TOPIC.into(),
            data: vec![0xff, 0x00, 0x10],
        };
        assert_eq!(format_message(&msg, at()), "[09:30:05] unknown: 0xff0010");
    }
}
