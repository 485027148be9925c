//! JSON-lines event feed
//!
//! One event per line, discriminated by `type`:
//!
//! ```text
//! {"type":"bar","open":"101","high":"112","low":"109","close":"110","timestamp":"2024-03-04T09:00:00Z"}
//! {"type":"tick","price":"103.2","timestamp":"2024-03-04T10:15:00Z"}
//! {"type":"position_opened","position_id":"p1","correlation_tag":"…","entry_price":"100"}
//! {"type":"position_closed","position_id":"p1","correlation_tag":"…","exit_price":"92","realized_pnl":"-16"}
//! {"type":"shutdown"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{Bar, BotEvent, PositionClosed, PositionEvent, PositionOpened, Tick};

/// Wire form of a feed line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Bar(Bar),
    Tick(Tick),
    PositionOpened(PositionOpened),
    PositionClosed(PositionClosed),
    Shutdown,
}

impl From<FeedEvent> for BotEvent {
    fn from(event: FeedEvent) -> Self {
        match event {
            FeedEvent::Bar(bar) => BotEvent::Bar(bar),
            FeedEvent::Tick(tick) => BotEvent::Tick(tick),
            FeedEvent::PositionOpened(opened) => BotEvent::Position(PositionEvent::Opened(opened)),
            FeedEvent::PositionClosed(closed) => BotEvent::Position(PositionEvent::Closed(closed)),
            FeedEvent::Shutdown => BotEvent::Shutdown,
        }
    }
}

/// Parse a single feed line, `None` for blank and comment lines
pub fn parse_event_line(line: &str) -> Result<Option<BotEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let event: FeedEvent = serde_json::from_str(line)?;
    Ok(Some(event.into()))
}

/// Forward every parsed line of `reader` into the bot's channel
///
/// Malformed lines are logged and skipped. Returns the number of events sent;
/// stops early once the receiving side is gone.
pub async fn pump_events<R>(reader: R, sender: mpsc::Sender<BotEvent>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut sent = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let event = match parse_event_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, "Skipping malformed feed line: {}", e);
                continue;
            }
        };
        sender
            .send(event)
            .await
            .map_err(|e| EngineError::ChannelSend(e.to_string()))?;
        sent += 1;
    }

    info!(events = sent, lines = line_no, "Feed exhausted");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::create_event_channel_with_size;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_bar_line() {
        let line = r#"{"type":"bar","open":"101","high":"112","low":109,"close":"110.5","timestamp":"2024-03-04T09:00:00Z"}"#;
        let event = parse_event_line(line).unwrap().unwrap();
        assert_eq!(
            event,
            BotEvent::Bar(Bar::new(
                dec!(101),
                dec!(112),
                dec!(109),
                dec!(110.5),
                Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
            ))
        );
    }

    #[test]
    fn test_parse_lifecycle_and_shutdown() {
        let opened = parse_event_line(
            r#"{"type":"position_opened","position_id":"p1","correlation_tag":"abc","entry_price":"100"}"#,
        )
        .unwrap();
        assert!(matches!(
            opened,
            Some(BotEvent::Position(PositionEvent::Opened(ref o))) if o.correlation_tag == "abc"
        ));

        assert_eq!(parse_event_line(r#"{"type":"shutdown"}"#).unwrap(), Some(BotEvent::Shutdown));
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_event_line("").unwrap(), None);
        assert_eq!(parse_event_line("   ").unwrap(), None);
        assert_eq!(parse_event_line("# warm-up bars").unwrap(), None);
    }

    #[test]
    fn test_unknown_type_is_json_error() {
        let err = parse_event_line(r#"{"type":"candle"}"#).unwrap_err();
        assert!(matches!(err, EngineError::JsonParse(_)));
    }

    #[tokio::test]
    async fn test_pump_skips_bad_lines() {
        let input = concat!(
            "# replay\n",
            "{\"type\":\"tick\",\"price\":\"1.1\",\"timestamp\":\"2024-03-04T09:00:00Z\"}\n",
            "garbage\n",
            "{\"type\":\"shutdown\"}\n",
        );
        let (tx, mut rx) = create_event_channel_with_size(8);

        let sent = pump_events(tokio::io::BufReader::new(input.as_bytes()), tx)
            .await
            .unwrap();

        assert_eq!(sent, 2);
        assert!(matches!(rx.recv().await, Some(BotEvent::Tick(_))));
        assert_eq!(rx.recv().await, Some(BotEvent::Shutdown));
        assert_eq!(rx.recv().await, None);
    }
}
