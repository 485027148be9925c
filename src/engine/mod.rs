//! Trade engine: plan derivation and the per-plan state machine
//!
//! Everything in this module is synchronous and free of I/O. The bot drives it
//! and performs the gateway calls it asks for.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    STARTUP (once)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlanConfig ──► Validator (pass a)                          │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  LevelCalculator ──► RiskSizer ──► Validator (pass b)       │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  TradePlan (immutable, correlation id minted)               │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PER EVENT                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Bar / Tick ──► TradeMachine.on_bar() ──► Action            │
//! │                      │                       │              │
//! │                      │                       ▼              │
//! │                      │              OrderGateway call       │
//! │                      │                       │              │
//! │                      ◄──── confirm_*() ──────┘ (on success) │
//! │                                                             │
//! │  PositionEvent ──► PlanRegistry.route(tag) ──► TradeMachine │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`LevelCalculator`]: absolute price levels from entry, stop and fractions
//! - [`RiskSizer`]: position size from a risk budget and a stop distance
//! - [`validate_inputs`] / [`validate_computed`]: the two startup passes
//! - [`TradeMachine`]: phase progression of one plan
//! - [`TrailingStopManager`]: level selection while a position is open
//! - [`PlanRegistry`]: correlation id to machine mapping

pub mod levels;
pub mod machine;
pub mod plan;
pub mod registry;
pub mod sizer;
pub mod trailing;
pub mod types;
pub mod validator;

pub use levels::{LevelCalculator, LevelInputs, PriceLevels};
pub use machine::TradeMachine;
pub use plan::{log_plan, AccountSnapshot, PlanBuilder};
pub use registry::{PlanRegistry, PlanSnapshot};
pub use sizer::{RiskSizer, SizeRounding, SizingError};
pub use trailing::TrailingStopManager;
pub use types::{
    AbortReason, Action, ActivePosition, CloseReason, Phase, PlanOutcome, ReactionDelayPolicy,
    RiskBudget, StepContext, TradePlan, TradeState, TrailingLevel, TrailingRule,
};
pub use validator::{parse_expiration_date, validate_computed, validate_inputs, Violation};
