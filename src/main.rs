use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use ferrite_classify::{AppContext, ClassifyServer, ServiceConfig, StartupError};

fn main() -> ExitCode {
    let config = ServiceConfig::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str())).init();

    match start(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("startup failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn start(config: &ServiceConfig) -> Result<(), StartupError> {
    info!("ferrite-classify {} (pid {})", env!("CARGO_PKG_VERSION"), std::process::id());
    let ctx = AppContext::from_config(config)?;
    let server = ClassifyServer::bind(&config.bind_addr(), ctx)?;
    server.run();
    Ok(())
}
