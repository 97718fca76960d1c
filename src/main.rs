use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

use pinentry_gate::assuan::{ServeError, Server};
use pinentry_gate::{
    AccessOrchestrator, Args, CommandAuthenticator, Config, EnvironmentError, GateLog,
    PinentryHelper, PinentrySession,
};

#[derive(Debug, Error)]
enum Fatal {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

fn main() -> ExitCode {
    let config = match Config::try_from(Args::parse()) {
        Ok(config) => config,
        Err(err) => return startup_failure(&err),
    };

    let log = match GateLog::open(&config.log_file, config.env_filter()) {
        Ok(log) => log,
        Err(err) => return startup_failure(&err),
    };
    log.info(format_args!("ready"));

    match run(&config, &log) {
        Ok(()) => {
            log.info(format_args!("session closed"));
            ExitCode::SUCCESS
        }
        Err(err) => {
            log.error(format_args!("stopping: {}", err));
            ExitCode::FAILURE
        }
    }
}

// Only reached before the log is open; stdout belongs to the protocol.
fn startup_failure(err: &dyn std::error::Error) -> ExitCode {
    let _ = writeln!(io::stderr(), "pinentry-gate: {}", err);
    ExitCode::FAILURE
}

fn run(config: &Config, log: &GateLog) -> Result<(), Fatal> {
    let store = platform_store(config)?;
    let helper = PinentryHelper::locate(&config.helper)?;
    let authenticator = CommandAuthenticator::locate(&config.authenticator)?;
    log.info(format_args!(
        "prompt helper {:?}, authenticator {:?}",
        helper.program(),
        authenticator.program()
    ));

    let orchestrator = AccessOrchestrator::new(store, authenticator, helper, log.clone());
    let mut session = PinentrySession::new(orchestrator);

    Server::new(&mut session, log.clone()).serve(io::stdin().lock(), io::stdout().lock())?;
    Ok(())
}

#[cfg(target_os = "macos")]
fn platform_store(config: &Config) -> Result<pinentry_gate::KeychainStore, EnvironmentError> {
    Ok(pinentry_gate::KeychainStore::new(config.service.as_str()))
}

#[cfg(not(target_os = "macos"))]
fn platform_store(_config: &Config) -> Result<pinentry_gate::MemoryStore, EnvironmentError> {
    Err(EnvironmentError::UnsupportedPlatform {
        os: std::env::consts::OS,
    })
}
