//! Channel type definitions for feeding events to the bot

use tokio::sync::mpsc;

use super::types::BotEvent;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new bot event channel with the default buffer size
pub fn create_event_channel() -> (mpsc::Sender<BotEvent>, mpsc::Receiver<BotEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new bot event channel with a custom buffer size
pub fn create_event_channel_with_size(
    size: usize,
) -> (mpsc::Sender<BotEvent>, mpsc::Receiver<BotEvent>) {
    mpsc::channel(size)
}
