use crate::messages::{AgentId, Message, SimulatorApi};

pub mod exchange_agent;
pub mod human_agent;
pub mod market_maker_agent;
pub mod momentum_trader_agent;
pub mod noise_trader_agent;
pub mod oracle_agent;

pub use exchange_agent::{ExchangeAgent, ExchangeConfig};
pub use human_agent::{HumanAgent, HumanCommand, HumanResponse};
pub use market_maker_agent::{MarketMakerAgent, MarketMakerConfig};
pub use momentum_trader_agent::{MomentumTraderAgent, MomentumTraderConfig};
pub use noise_trader_agent::{NoiseTraderAgent, NoiseTraderConfig};
pub use oracle_agent::{OracleAgent, OracleConfig};

/// Runtime contract every simulation participant satisfies.
///
/// The kernel invokes `on_attach` once at registration, `on_start` /
/// `on_stop` at lifecycle edges, `on_wakeup` for its own scheduled wakeups
/// and `on_message` for everything else. Agents own their private state and
/// any PRNG they use; they interact with the world only through the
/// `SimulatorApi` handle they are given.
pub trait Agent {
    fn id(&self) -> AgentId;
    fn name(&self) -> &str;
    fn on_attach(&mut self, _sim: &mut dyn SimulatorApi) {}
    fn on_start(&mut self, _sim: &mut dyn SimulatorApi) {}
    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {}
    fn on_wakeup(&mut self, _sim: &mut dyn SimulatorApi, _now_ns: u64) {}
    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, _msg: &Message) {}
}
