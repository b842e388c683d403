//! External gateway: HTTP order entry and WebSocket event feed.
//!
//! Gateway threads never touch the kernel directly. Orders flow through the
//! human agent's command channel and are executed on the tick thread; market
//! data flows out through a bus forwarder and the shared book snapshot
//! handle.

mod server;
mod ws;

pub use server::ApiServer;
pub use ws::WsServer;

use crossbeam_channel::Sender;

use crate::events::{EventListener, SimEvent};

/// Bus listener that forwards events into a bounded channel for the
/// WebSocket feed. Uses `try_send` so a slow consumer drops events instead
/// of blocking the tick.
pub struct EventForwarder {
    tx: Sender<SimEvent>,
}

impl EventForwarder {
    pub fn new(tx: Sender<SimEvent>) -> Self {
        Self { tx }
    }
}

impl EventListener for EventForwarder {
    fn on_event(&mut self, event: &SimEvent) {
        let _ = self.tx.try_send(event.clone());
    }
}
