//! Canned market wiring: exchange, oracle, market maker, momentum trader,
//! a fleet of noise traders, and (optionally) the human bridge + gateway.

use std::path::Path;

use crossbeam_channel::bounded;
use tracing::info;

use crate::agents::{
    ExchangeAgent, HumanAgent, MarketMakerAgent, MarketMakerConfig, MomentumTraderAgent,
    MomentumTraderConfig, NoiseTraderAgent, NoiseTraderConfig, OracleAgent, OracleConfig,
};
use crate::api::{ApiServer, EventForwarder, WsServer};
use crate::config::ScenarioConfig;
use crate::latency::{LatencyModel, RpcLatency};
use crate::messages::AgentId;
use crate::sim_engine::SimEngine;

const EXCHANGE_ID: AgentId = 1;
const ORACLE_ID: AgentId = 2;
const MARKET_MAKER_ID: AgentId = 3;
const MOMENTUM_ID: AgentId = 4;
const HUMAN_ID: AgentId = 5;
const FIRST_NOISE_ID: AgentId = 10;

const HUMAN_STARTING_CASH: i64 = 10_000_000;

/// A built market plus the gateway handles that must stay alive for the run.
pub struct DemoMarket {
    pub engine: SimEngine,
    pub api: Option<ApiServer>,
    pub ws: Option<WsServer>,
}

/// Assemble a full market from a scenario config.
pub fn build_market(cfg: &ScenarioConfig) -> DemoMarket {
    let latency: Option<Box<dyn LatencyModel>> = cfg
        .latency
        .as_ref()
        .map(|l| Box::new(RpcLatency::from_config(EXCHANGE_ID, l)) as Box<dyn LatencyModel>);

    let mut engine = SimEngine::new(
        latency,
        cfg.kernel.tick_ns(),
        cfg.logs_dir.as_deref().map(Path::new),
    );
    let kernel = &mut engine.kernel;
    let symbol = cfg.exchange.symbol.clone();

    let exchange = ExchangeAgent::new(EXCHANGE_ID, "Exchange".to_string(), cfg.exchange.clone());
    let book = exchange.book_handle();
    kernel.set_exchange(EXCHANGE_ID);
    kernel.register_book(book.clone());
    kernel.add_agent(Box::new(exchange));

    kernel.add_agent(Box::new(OracleAgent::new(
        ORACLE_ID,
        OracleConfig {
            symbol: symbol.clone(),
            seed: cfg.seed.wrapping_add(1),
            ..OracleConfig::default()
        },
    )));

    kernel.add_agent(Box::new(MarketMakerAgent::new(
        MARKET_MAKER_ID,
        MarketMakerConfig {
            symbol: symbol.clone(),
            ..MarketMakerConfig::default()
        },
    )));

    kernel.add_agent(Box::new(MomentumTraderAgent::new(
        MOMENTUM_ID,
        MomentumTraderConfig {
            symbol: symbol.clone(),
            ..MomentumTraderConfig::default()
        },
    )));

    for i in 0..cfg.noise_traders {
        let id = FIRST_NOISE_ID + i;
        kernel.add_agent(Box::new(NoiseTraderAgent::new(
            id,
            NoiseTraderConfig {
                name: format!("Noise-{i}"),
                symbol: symbol.clone(),
                seed: cfg.seed.wrapping_add(100 + i as u64),
                ..NoiseTraderConfig::default()
            },
        )));
    }

    // Human bridge + HTTP gateway.
    let api = cfg.api_port.map(|port| {
        let (cmd_tx, cmd_rx) = bounded(100);
        let (resp_tx, resp_rx) = bounded(100);
        kernel.add_agent(Box::new(HumanAgent::new(
            HUMAN_ID,
            "Human".to_string(),
            symbol.clone(),
            cmd_rx,
            resp_tx,
            cfg.kernel.tick_ms,
            HUMAN_STARTING_CASH,
        )));
        ApiServer::start(port, cmd_tx, resp_rx, Some(book.clone()))
    });

    // WebSocket event feed off the bus.
    let ws = cfg.ws_port.map(|port| {
        let (event_tx, event_rx) = bounded(1024);
        kernel
            .event_bus_mut()
            .subscribe_all(Box::new(EventForwarder::new(event_tx)));
        WsServer::start(port, event_rx)
    });

    if cfg.realtime {
        kernel.set_realtime(cfg.kernel.tick_ms);
    }

    DemoMarket { engine, api, ws }
}

/// Run a named scenario to completion.
pub fn run_scenario(name: &str) {
    let cfg = match name {
        "interactive" => ScenarioConfig {
            realtime: true,
            api_port: Some(8090),
            ws_port: Some(8091),
            logs_dir: Some("logs".to_string()),
            max_ticks: usize::MAX,
            ..ScenarioConfig::default()
        },
        "simple_demo" => ScenarioConfig {
            logs_dir: Some("logs".to_string()),
            ..ScenarioConfig::default()
        },
        other => {
            info!("[Scenario] unknown scenario '{other}', using simple_demo");
            ScenarioConfig::default()
        }
    };
    run_with_config(&cfg);
}

pub fn run_with_config(cfg: &ScenarioConfig) {
    let mut market = build_market(cfg);
    market.engine.run(0, cfg.max_ticks);

    if let Some(mut api) = market.api.take() {
        api.stop();
    }
    if let Some(mut ws) = market.ws.take() {
        ws.stop();
    }
}
