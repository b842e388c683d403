use std::env;

use lobsim::scenarios;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let scenario_name = if args.len() > 1 { &args[1] } else { "simple_demo" };

    tracing::info!("=== LOB Simulation ===");
    tracing::info!("[Main] running scenario: {scenario_name}");

    scenarios::simple_demo::run_scenario(scenario_name);
}
