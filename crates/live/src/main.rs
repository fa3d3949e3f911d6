// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use rudlive::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    let _ = rustls::crypto::ring::default_provider().install_default();
    rudlive::init_tracing(&config.log_level, &config.log_format);

    if let Err(e) = rudlive::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
