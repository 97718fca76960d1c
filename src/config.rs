//! Command-line and environment configuration.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Raw command line of `pinentry-gate`.
///
/// Besides its own settings it accepts the standard pinentry flags so that
/// gpg-agent can start it in place of any other pinentry.
#[derive(Parser, Debug, Clone)]
#[command(name = "pinentry-gate", version, about, long_about = None)]
pub struct Args {
    /// Append-only diagnostic log
    #[arg(long, env = "PINENTRY_GATE_LOG_FILE", default_value = "/tmp/pinentry-gate.log")]
    pub log_file: PathBuf,

    /// Log filter directive, for example `info` or `pinentry_gate=debug`
    #[arg(long, env = "PINENTRY_GATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Pinentry program used to collect a new PIN
    #[arg(long, env = "PINENTRY_GATE_HELPER", default_value = "pinentry-mac")]
    pub helper: String,

    /// Program run to authenticate repeat access
    #[arg(long, env = "PINENTRY_GATE_AUTHENTICATOR", default_value = "pinentry-gate-auth")]
    pub authenticator: String,

    /// Keychain service attribute of stored entries
    #[arg(long, env = "PINENTRY_GATE_SERVICE", default_value = "GnuPG")]
    pub service: String,

    /// Log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Standard pinentry flags, accepted and ignored
    #[command(flatten)]
    pub compat: PinentryCompat,
}

/// Flags every pinentry accepts. They describe the caller's terminal or
/// display, which an external prompt helper works out by itself.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PinentryCompat {
    /// X display
    #[arg(long, hide = true)]
    pub display: Option<String>,
    /// Terminal device
    #[arg(long, hide = true)]
    pub ttyname: Option<String>,
    /// Terminal type
    #[arg(long, hide = true)]
    pub ttytype: Option<String>,
    /// Character set locale
    #[arg(long = "lc-ctype", hide = true)]
    pub lc_ctype: Option<String>,
    /// Message locale
    #[arg(long = "lc-messages", hide = true)]
    pub lc_messages: Option<String>,
    /// Dialog timeout in seconds
    #[arg(long, hide = true)]
    pub timeout: Option<String>,
    /// Do not grab the keyboard
    #[arg(short = 'g', long = "no-global-grab", hide = true)]
    pub no_global_grab: bool,
    /// Parent window id
    #[arg(long = "parent-wid", hide = true)]
    pub parent_wid: Option<String>,
    /// Terminal colors
    #[arg(long, hide = true)]
    pub colors: Option<String>,
    /// Terminal alert mode
    #[arg(long, hide = true)]
    pub ttyalert: Option<String>,
}

/// Invalid settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A program name was empty.
    #[error("--{setting} must name a program")]
    EmptyProgram {
        /// Flag that was empty
        setting: &'static str,
    },

    /// The keychain service attribute was empty.
    #[error("--service must not be empty")]
    EmptyService,

    /// The log path names a directory.
    #[error("log file {0:?} is a directory")]
    LogPathIsDirectory(PathBuf),

    /// The log filter does not parse.
    #[error("invalid log level {value:?}: {source}")]
    InvalidLogLevel {
        /// Directive as given
        value: String,
        /// Parse failure
        #[source]
        source: ParseError,
    },
}

/// Validated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Append-only diagnostic log
    pub log_file: PathBuf,
    /// Validated `EnvFilter` directive
    pub log_filter: String,
    /// Pinentry program name or path
    pub helper: String,
    /// Authenticator program name or path
    pub authenticator: String,
    /// Keychain service attribute
    pub service: String,
}

impl Config {
    /// Builds the log filter.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::new(&self.log_filter)
    }
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.helper.trim().is_empty() {
            return Err(ConfigError::EmptyProgram { setting: "helper" });
        }
        if args.authenticator.trim().is_empty() {
            return Err(ConfigError::EmptyProgram {
                setting: "authenticator",
            });
        }
        if args.service.is_empty() {
            return Err(ConfigError::EmptyService);
        }
        if args.log_file.is_dir() {
            return Err(ConfigError::LogPathIsDirectory(args.log_file));
        }

        let log_filter = if args.debug {
            "debug".to_string()
        } else if args.log_level.trim().is_empty() {
            "info".to_string()
        } else {
            args.log_level.trim().to_string()
        };
        EnvFilter::try_new(&log_filter).map_err(|source| ConfigError::InvalidLogLevel {
            value: log_filter.clone(),
            source,
        })?;

        Ok(Config {
            log_file: args.log_file,
            log_filter,
            helper: args.helper,
            authenticator: args.authenticator,
            service: args.service,
        })
    }
}
