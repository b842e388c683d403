//! Deterministic, event-driven simulator of a single-symbol limit-order-book
//! exchange populated by heterogeneous trading agents.
//!
//! The kernel owns virtual time and routes latency-stamped messages between
//! agents; the exchange agent owns the price-time-priority book and speaks
//! the order protocol; everything else observes through the event bus.

pub mod agents;
pub mod api;
pub mod config;
pub mod events;
pub mod kernel;
pub mod latency;
pub mod logging;
pub mod messages;
pub mod order_book;
pub mod queue;
pub mod scenarios;
pub mod sim_engine;

pub use kernel::Kernel;
pub use messages::{AgentId, Message, MessagePayload, MessageType, Side, SimulatorApi};
pub use order_book::{L2Snapshot, LimitOrder, OrderBook};
pub use sim_engine::SimEngine;
