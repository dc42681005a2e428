use clap::Parser;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nbiot_config::{SharedConfig, toml_config};
use nbiot_core::{SubframeTime, debug};
use nbiot_entities::MessageRouter;
use nbiot_entities::mac::MacEnb;

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

/// Build the eNB stack. Only the MAC runs here; PHY and upper layers attach through the router.
fn build_enb_stack(cfg: &SharedConfig) -> MessageRouter {
    let mut router = MessageRouter::new(cfg.clone());

    let mac = match MacEnb::new(cfg.clone()) {
        Ok(mac) => mac,
        Err(e) => {
            eprintln!("Failed to create MAC: {}", e);
            std::process::exit(1);
        }
    };
    router.register_entity(Box::new(mac));

    router.set_time(SubframeTime::default());
    router
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "NB-IoT eNB MAC",
    long_about = "Runs the NB-IoT eNB MAC scheduler using the provided TOML configuration file"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with cell, MAC, HARQ and SPS parameters")]
    config: String,

    /// Stop after this many subframes instead of running until interrupted
    #[arg(long)]
    ticks: Option<usize>,
}

fn main() {
    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = debug::setup_logging_default(cfg.config().debug_log.clone());

    tracing::info!(
        cell_id = cfg.config().cell.cell_id,
        scheduler = %cfg.config().mac.scheduler,
        "starting eNB MAC"
    );
    let mut router = build_enb_stack(&cfg);

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Failed to set Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    router.run_stack(args.ticks, Some(running));
    tracing::info!(ts = %router.time(), "stopped");
}
