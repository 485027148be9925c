//! Bot module - host runtime around the trade engine

pub mod feed;
pub mod paper;
pub mod runner;
pub mod store;

pub use feed::{parse_event_line, pump_events, FeedEvent};
pub use paper::{PaperGateway, PaperOrder, PaperPosition};
pub use runner::{BotReport, LevelTrader};
pub use store::StateStore;
