mod config_commands;
mod demo;
mod pid;
mod run_commands;

use std::{fs::OpenOptions, path::PathBuf, process::ExitCode};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::{Dispatch, error, info},
    tracing_subscriber::{EnvFilter, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt},
};

use courier_config::CourierConfig;

#[derive(Parser)]
#[command(name = "courier", version, about = "courier: a chat bot for Mattermost")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./courier.toml, then the user config dir).
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Log destination: stderr when unset, `-` for stdout, otherwise a file
    /// (appended). Overrides `common.log`.
    #[arg(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve Mattermost webhooks.
    Run(run_commands::RunArgs),
    /// Talk to the bot from the terminal.
    Shell(run_commands::ShellArgs),
    /// Write a documented starter config.
    NewConfig(config_commands::NewConfigArgs),
    /// Validate the configuration and report errors/warnings.
    CheckConfig(config_commands::CheckConfigArgs),
}

/// Where formatted log lines go.
fn log_writer(dest: Option<&str>) -> anyhow::Result<(BoxMakeWriter, bool)> {
    match dest {
        None | Some("") => Ok((BoxMakeWriter::new(std::io::stderr), true)),
        Some("-") => Ok((BoxMakeWriter::new(std::io::stdout), true)),
        Some(path) => {
            let mut options = OpenOptions::new();
            options.create(true).append(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let file = options
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            Ok((BoxMakeWriter::new(std::sync::Mutex::new(file)), false))
        },
    }
}

/// Build the subscriber, install it process-wide, and return it so the robot
/// can log through the same sink.
fn init_telemetry(cli: &Cli, config_log: Option<&str>) -> anyhow::Result<Dispatch> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let (writer, ansi) = log_writer(cli.log.as_deref().or(config_log))?;

    let registry = tracing_subscriber::registry().with(filter);
    let dispatch = if cli.json_logs {
        Dispatch::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(writer),
            ),
        )
    } else {
        Dispatch::new(
            registry.with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(ansi)
                    .with_writer(writer),
            ),
        )
    };
    tracing::dispatcher::set_global_default(dispatch.clone())
        .context("installing the log subscriber")?;
    Ok(dispatch)
}

fn load_config(cli: &Cli) -> anyhow::Result<CourierConfig> {
    let (config, _path) = courier_config::load(cli.config.as_deref())?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::NewConfig(ref args) => config_commands::new_config(args),
        Commands::CheckConfig(ref args) => {
            Ok(config_commands::check_config(cli.config.as_deref(), args))
        },
        Commands::Run(ref args) => {
            let mut config = load_config(&cli)?;
            args.apply(&mut config);
            let dispatch = init_telemetry(&cli, config.common.log.as_deref())?;
            info!(version = env!("CARGO_PKG_VERSION"), "courier starting");
            run_commands::run(config, dispatch).await
        },
        Commands::Shell(ref args) => {
            let mut config = load_config(&cli)?;
            args.apply(&mut config);
            let dispatch = init_telemetry(&cli, config.common.log.as_deref())?;
            info!(version = env!("CARGO_PKG_VERSION"), "courier shell starting");
            run_commands::shell(config, dispatch).await
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if tracing::dispatcher::has_been_set() {
                error!("{e:#}");
            } else {
                eprintln!("courier: {e:#}");
            }
            ExitCode::FAILURE
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_parse() {
        let cli = Cli::parse_from(["courier", "--config", "x.toml", "run", "--port", "9000"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("x.toml")));
        assert!(matches!(cli.command, Commands::Run(ref a) if a.server.port == Some(9000)));

        let cli = Cli::parse_from(["courier", "shell", "--log-level", "debug", "--json-logs"]);
        assert!(cli.json_logs);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Shell(_)));

        let cli = Cli::parse_from(["courier", "check-config", "--verbose"]);
        assert!(matches!(cli.command, Commands::CheckConfig(ref a) if a.verbose));
    }

    #[test]
    fn log_file_is_created_for_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.log");
        let (_writer, ansi) = log_writer(Some(path.to_str().unwrap())).unwrap();
        assert!(!ansi);
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn missing_log_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("courier.log");
        assert!(log_writer(Some(path.to_str().unwrap())).is_err());
    }
}
