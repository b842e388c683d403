// High-level simulation engine wrapper around the Kernel.
// Scenarios create a SimEngine, register agents, and run it.

use std::path::Path;

use tracing::{info, warn};

use crate::events::{EventKind, EventListener};
use crate::kernel::Kernel;
use crate::latency::LatencyModel;
use crate::logging::{CsvOracleLogger, CsvOrderLogger, CsvRejectionLogger, CsvTradeLogger};

/// Kernel plus the standard CSV sinks.
pub struct SimEngine {
    pub kernel: Kernel,
}

impl SimEngine {
    /// Create an engine with the given latency model and tick size,
    /// optionally attaching CSV sinks under `logs_dir`.
    pub fn new(
        latency: Option<Box<dyn LatencyModel>>,
        tick_ns: u64,
        logs_dir: Option<&Path>,
    ) -> Self {
        let mut kernel = Kernel::new(latency, tick_ns);

        if let Some(dir) = logs_dir {
            attach_sink(&mut kernel, EventKind::Trade, CsvTradeLogger::new(dir), "CsvTradeLogger");
            attach_sink(&mut kernel, EventKind::OrderLog, CsvOrderLogger::new(dir), "CsvOrderLogger");
            attach_sink(
                &mut kernel,
                EventKind::OrderRejected,
                CsvRejectionLogger::new(dir),
                "CsvRejectionLogger",
            );
            attach_sink(&mut kernel, EventKind::OracleTick, CsvOracleLogger::new(dir), "CsvOracleLogger");
        }

        Self { kernel }
    }

    /// Start the kernel, drive it for at most `max_steps` ticks, then stop.
    pub fn run(&mut self, start_ns: u64, max_steps: usize) {
        self.kernel.start(start_ns);
        self.kernel.run(max_steps);
        self.kernel.stop();
    }
}

fn attach_sink<L: EventListener + 'static>(
    kernel: &mut Kernel,
    kind: EventKind,
    sink: std::io::Result<L>,
    name: &str,
) {
    match sink {
        Ok(logger) => {
            kernel.event_bus_mut().subscribe(kind, Box::new(logger));
            info!("[SimEngine] {name} attached");
        }
        Err(e) => warn!("[SimEngine] failed to init {name}: {e}"),
    }
}
