//! Trading module - trade requests between students
//!
//! The lifecycle rules live in `lifecycle`; `engine` applies them against
//! the database and fans out notifications.

mod engine;
mod lifecycle;

pub use engine::{TradeEngine, TradeError};
pub use lifecycle::{TradeStatus, TransitionError};

#[cfg(test)]
pub use lifecycle::TradeAction;
