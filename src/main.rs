//! `connprobe` binary

use clap::Parser;
use connprobe::client::PgFactoryProvider;
use connprobe::config::Cli;
use connprobe::probe::{Orchestrator, RunOutcome};
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("connprobe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.resolve(|prompt| rpassword::prompt_password(prompt)) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("failed to start runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout();
    if let Err(err) = writeln!(stdout, "{}", banner()) {
        tracing::error!("{}", err);
        return ExitCode::FAILURE;
    }

    let provider = PgFactoryProvider::new(config.info, config.connection);
    let mut orchestrator = Orchestrator::new(provider, config.settings, stdout);

    let finished = runtime.block_on(async {
        tokio::select! {
            result = orchestrator.run_all() => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    });

    match finished {
        Some(Ok(reports)) => {
            let completed = reports
                .iter()
                .filter(|r| matches!(r.outcome, Ok(RunOutcome::Completed(_))))
                .count();
            tracing::info!(
                variants = reports.len(),
                completed,
                failures = orchestrator.failures().total(),
                "probe finished"
            );
            ExitCode::SUCCESS
        }
        Some(Err(err)) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
        None => {
            tracing::warn!("interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

/// `Connection Test version=… os=… arch=… loc=… tz=…`
fn banner() -> String {
    let locale = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "Connection Test version={} os={}/{} arch={} loc={} tz={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::FAMILY,
        std::env::consts::ARCH,
        locale,
        chrono::Local::now().format("%:z")
    )
}
