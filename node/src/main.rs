//! Unykorn L1 Node Binary
//!
//! The main entrypoint for running an Unykorn L1 blockchain node.

use node::{Node, NodeConfig};
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();

    let config = if args.len() > 2 && args[1] == "--config" {
        let config_path = PathBuf::from(&args[2]);
        match NodeConfig::load(&config_path) {
            Ok(cfg) => {
                info!(?config_path, "loaded config");
                cfg
            }
            Err(e) => {
                error!(%e, "failed to load config, using defaults");
                NodeConfig::default()
            }
        }
    } else if args.contains(&"--dev".to_string()) {
        info!("running in development mode");
        NodeConfig::dev()
    } else {
        NodeConfig::default()
    };

    match Node::new(config).await {
        Ok(mut node) => {
            info!(height = node.height(), "node initialized");

            let shutdown_handle = tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("received shutdown signal");
            });

            let mut fatal = false;
            tokio::select! {
                result = node.run() => {
                    if let Err(e) = result {
                        error!(%e, "node halted");
                        fatal = true;
                    }
                }
                _ = shutdown_handle => {
                    node.shutdown().await;
                }
            }

            info!("node shutdown complete");
            if fatal {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!(%e, "failed to initialize node");
            std::process::exit(1);
        }
    }
}
