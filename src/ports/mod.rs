//! Port traits: the boundary between domain logic and the outside world.

pub mod account_port;
pub mod config_port;
pub mod price_history_port;
