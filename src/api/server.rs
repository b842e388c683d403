//! HTTP API server for external interaction with the simulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;
use serde_json::json;
use tiny_http::{Method, Request, Response, Server};
use tracing::{error, info};

use crate::agents::{HumanCommand, HumanResponse};
use crate::messages::Side;
use crate::order_book::OrderBook;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct OrderRequest {
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    price: Option<u64>,
    qty: u64,
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ModifyRequest {
    id: String,
    price: Option<u64>,
    qty: Option<u64>,
}

/// HTTP gateway handle.
pub struct ApiServer {
    shutdown: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl ApiServer {
    /// Start the server on `port`. Order commands go to the human agent
    /// through `cmd_tx`; `book` serves read-only depth snapshots.
    pub fn start(
        port: u16,
        cmd_tx: Sender<HumanCommand>,
        response_rx: Receiver<HumanResponse>,
        book: Option<Arc<Mutex<OrderBook>>>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread_handle = thread::spawn(move || {
            let addr = format!("0.0.0.0:{port}");
            let server = match Server::http(&addr) {
                Ok(s) => s,
                Err(e) => {
                    error!("[ApiServer] failed to bind to {addr}: {e}");
                    return;
                }
            };
            info!("[ApiServer] listening on http://{addr}");

            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(100)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(e) => {
                        error!("[ApiServer] recv error: {e}");
                        continue;
                    }
                };

                let method = request.method().clone();
                let url = request.url().to_string();
                match (method, url.as_str()) {
                    (Method::Post, "/order") => handle_order(request, &cmd_tx, &response_rx),
                    (Method::Post, "/cancel") => handle_cancel(request, &cmd_tx, &response_rx),
                    (Method::Post, "/modify") => handle_modify(request, &cmd_tx, &response_rx),
                    (Method::Get, "/open") => {
                        forward_command(request, HumanCommand::ListOpen, &cmd_tx, &response_rx)
                    }
                    (Method::Get, "/balances") => {
                        forward_command(request, HumanCommand::Balances, &cmd_tx, &response_rx)
                    }
                    (Method::Get, "/book") => handle_book(request, book.as_ref()),
                    (Method::Get, "/health") => {
                        respond_json(request, &HumanResponse {
                            success: true,
                            message: "OK".to_string(),
                            data: None,
                        });
                    }
                    _ => {
                        respond_json(request, &HumanResponse {
                            success: false,
                            message: format!("Unknown endpoint: {url}"),
                            data: None,
                        });
                    }
                }
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

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn respond_json(request: Request, resp: &HumanResponse) {
    let body = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    respond_raw(request, body);
}

fn respond_raw(request: Request, body: String) {
    let header =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            .expect("static header is valid");
    let response = Response::from_string(body).with_header(header);
    let _ = request.respond(response);
}

fn read_body<T: for<'de> Deserialize<'de>>(request: &mut Request) -> Result<T, String> {
    let mut body = String::new();
    std::io::Read::read_to_string(&mut request.as_reader(), &mut body)
        .map_err(|e| format!("Failed to read body: {e}"))?;
    serde_json::from_str(&body).map_err(|e| format!("Invalid JSON: {e}"))
}

fn parse_side(s: &str) -> Result<Side, String> {
    match s {
        "buy" | "Buy" | "BUY" | "long" => Ok(Side::Buy),
        "sell" | "Sell" | "SELL" | "short" => Ok(Side::Sell),
        other => Err(format!("side must be buy or sell, got '{other}'")),
    }
}

/// Send a command to the human agent and relay its (channel) response.
fn forward_command(
    request: Request,
    cmd: HumanCommand,
    cmd_tx: &Sender<HumanCommand>,
    response_rx: &Receiver<HumanResponse>,
) {
    if let Err(e) = cmd_tx.send(cmd) {
        respond_json(request, &HumanResponse {
            success: false,
            message: format!("Failed to queue command: {e}"),
            data: None,
        });
        return;
    }
    let resp = response_rx
        .recv_timeout(RESPONSE_TIMEOUT)
        .unwrap_or_else(|_| HumanResponse {
            success: false,
            message: "Timeout waiting for response".to_string(),
            data: None,
        });
    respond_json(request, &resp);
}

fn handle_order(
    mut request: Request,
    cmd_tx: &Sender<HumanCommand>,
    response_rx: &Receiver<HumanResponse>,
) {
    let parsed: Result<OrderRequest, String> = read_body(&mut request);
    let req = match parsed {
        Ok(r) => r,
        Err(msg) => {
            respond_json(request, &HumanResponse { success: false, message: msg, data: None });
            return;
        }
    };
    let side = match parse_side(&req.side) {
        Ok(s) => s,
        Err(msg) => {
            respond_json(request, &HumanResponse { success: false, message: msg, data: None });
            return;
        }
    };

    let cmd = match req.order_type.as_str() {
        "limit" => match req.price {
            Some(price) => HumanCommand::PlaceLimit { side, price, qty: req.qty },
            None => {
                respond_json(request, &HumanResponse {
                    success: false,
                    message: "limit order requires a price".to_string(),
                    data: None,
                });
                return;
            }
        },
        "market" => HumanCommand::PlaceMarket { side, qty: req.qty },
        other => {
            respond_json(request, &HumanResponse {
                success: false,
                message: format!("type must be limit or market, got '{other}'"),
                data: None,
            });
            return;
        }
    };
    forward_command(request, cmd, cmd_tx, response_rx);
}

fn handle_cancel(
    mut request: Request,
    cmd_tx: &Sender<HumanCommand>,
    response_rx: &Receiver<HumanResponse>,
) {
    match read_body::<CancelRequest>(&mut request) {
        Ok(req) => forward_command(request, HumanCommand::Cancel { id: req.id }, cmd_tx, response_rx),
        Err(msg) => respond_json(request, &HumanResponse { success: false, message: msg, data: None }),
    }
}

fn handle_modify(
    mut request: Request,
    cmd_tx: &Sender<HumanCommand>,
    response_rx: &Receiver<HumanResponse>,
) {
    match read_body::<ModifyRequest>(&mut request) {
        Ok(req) => forward_command(
            request,
            HumanCommand::Modify {
                id: req.id,
                price: req.price,
                qty: req.qty,
            },
            cmd_tx,
            response_rx,
        ),
        Err(msg) => respond_json(request, &HumanResponse { success: false, message: msg, data: None }),
    }
}

/// Read-only depth snapshot straight off the shared book handle. The lock
/// is held only long enough to copy.
fn handle_book(request: Request, book: Option<&Arc<Mutex<OrderBook>>>) {
    let Some(book) = book else {
        respond_json(request, &HumanResponse {
            success: false,
            message: "no book registered".to_string(),
            data: None,
        });
        return;
    };
    let snapshot = {
        let guard = book.lock().expect("book mutex poisoned");
        (guard.symbol().to_string(), guard.snapshot(10))
    };
    let body = json!({ "symbol": snapshot.0, "book": snapshot.1 }).to_string();
    respond_raw(request, body);
}
