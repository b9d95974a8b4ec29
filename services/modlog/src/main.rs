//! Modbus register logger (`modlog`)

use clap::Parser;
use tracing::{error, info, warn};

use errors::{ServiceError, ServiceErrorTrait, ServiceResult};
use modlog::bootstrap::{self, Args, Command};
use modlog::ServiceConfig;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let args = Args::parse();
    let config = ServiceConfig::load(&args.config)?;
    bootstrap::initialize_logging(&args, &config)?;

    let result = dispatch(args, config).await;
    if let Err(e) = &result {
        report(e);
    }
    result
}

async fn dispatch(args: Args, config: ServiceConfig) -> ServiceResult<()> {
    match args.command.unwrap_or(Command::Run) {
        Command::Validate => {
            bootstrap::validate_configuration(&config)?;
            info!("Validation completed successfully");
        },
        Command::Write { name, value } => bootstrap::run_write(&config, &name, value)?,
        Command::Run => {
            info!(
                "Starting {} v{} ({} mode)",
                config.service.name,
                env!("CARGO_PKG_VERSION"),
                config.polling.mode
            );
            bootstrap::run(config).await?;
        },
    }
    Ok(())
}

fn report(err: &ServiceError) {
    let retry = if err.is_retryable() { " (retryable)" } else { "" };
    match err.log_level() {
        tracing::Level::ERROR => error!("[{}] {}{}", err.error_code(), err, retry),
        tracing::Level::WARN => warn!("[{}] {}{}", err.error_code(), err, retry),
        _ => info!("[{}] {}{}", err.error_code(), err, retry),
    }
}
