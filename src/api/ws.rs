//! WebSocket event feed: fans bus events out to connected clients.
//!
//! One accept thread, one broadcast thread, and a writer thread per client.
//! tungstenite sockets are blocking, so each client gets its own outbound
//! channel; the broadcast thread never touches a socket directly.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};
use tungstenite::accept;
use tungstenite::Message as WsFrame;

use crate::events::SimEvent;

type ClientRegistry = Arc<Mutex<Vec<Sender<String>>>>;

/// WebSocket server handle.
pub struct WsServer {
    shutdown: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl WsServer {
    pub fn start(port: u16, event_rx: Receiver<SimEvent>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let clients: ClientRegistry = Arc::new(Mutex::new(Vec::new()));

        let thread_handle = thread::spawn(move || {
            let addr = format!("0.0.0.0:{port}");
            let listener = match TcpListener::bind(&addr) {
                Ok(l) => l,
                Err(e) => {
                    error!("[WsServer] failed to bind to {addr}: {e}");
                    return;
                }
            };
            info!("[WsServer] listening on ws://{addr}");

            // Broadcast thread: serialize each event once, fan out to every
            // client channel.
            let broadcast_clients = clients.clone();
            thread::spawn(move || {
                while let Ok(event) = event_rx.recv() {
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            error!("[WsServer] serialization error: {e}");
                            continue;
                        }
                    };
                    broadcast_to_all(&broadcast_clients, &json);
                }
                debug!("[WsServer] broadcast thread exiting");
            });

            if let Err(e) = listener.set_nonblocking(true) {
                error!("[WsServer] set_nonblocking failed: {e}");
                return;
            }
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }
                let stream = match listener.accept() {
                    Ok((s, _)) => s,
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(50));
                        continue;
                    }
                    Err(e) => {
                        error!("[WsServer] accept error: {e}");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("[WsServer] set_nonblocking(false) failed: {e}");
                    continue;
                }

                let (tx, rx) = crossbeam_channel::bounded::<String>(256);
                clients
                    .lock()
                    .expect("client registry poisoned")
                    .push(tx);

                // Writer thread per client: drains its channel into the
                // socket until either side goes away.
                thread::spawn(move || {
                    let mut socket = match accept(stream) {
                        Ok(s) => s,
                        Err(e) => {
                            debug!("[WsServer] handshake failed: {e}");
                            return;
                        }
                    };
                    while let Ok(json) = rx.recv() {
                        if socket.send(WsFrame::Text(json)).is_err() {
                            break;
                        }
                    }
                    let _ = socket.close(None);
                });
            }
        });

        Self {
            shutdown,
            thread_handle: Some(thread_handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Push a frame to every client, pruning the ones whose channel is gone.
/// A full channel drops the frame but keeps the client.
fn broadcast_to_all(clients: &ClientRegistry, json: &str) {
    use crossbeam_channel::TrySendError;

    let mut registry = clients.lock().expect("client registry poisoned");
    registry.retain(|tx| match tx.try_send(json.to_string()) {
        Ok(()) | Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Disconnected(_)) => false,
    });
}
