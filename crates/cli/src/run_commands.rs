use std::{path::PathBuf, process::ExitCode, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    clap::Args,
    secrecy::Secret,
    tracing::{Dispatch, info, warn},
};

use {
    courier_channels::Connector,
    courier_config::{
        CourierConfig, Purpose, ServerConfig,
        validate::{Severity, validate_config},
    },
    courier_mattermost::{MattermostConnector, MattermostSettings},
    courier_robot::{Handler, Robot, RobotConfig},
    courier_shell::ShellConnector,
};

use crate::{demo, pid::PidFile};

/// HTTP server flags shared by `run` and `shell`.
#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Do not start the bot HTTP server.
    #[arg(long)]
    pub disable_server: bool,
    /// Bind address for the bot HTTP server (empty = all interfaces).
    #[arg(long)]
    pub bind_address: Option<String>,
    /// Port for the bot HTTP server.
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServerArgs {
    fn apply(&self, server: &mut ServerConfig) {
        if self.disable_server {
            server.enable = false;
        }
        if let Some(ref bind) = self.bind_address {
            server.bind_address.clone_from(bind);
        }
        if let Some(port) = self.port {
            server.port = port;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Mattermost incoming-webhook URL the bot posts to.
    #[arg(long)]
    pub outgoing_url: Option<String>,
    /// Path Mattermost's outgoing webhook calls on this server.
    #[arg(long)]
    pub incoming_path: Option<String>,
    /// Accepted outgoing-webhook token; repeat for several.
    #[arg(long = "token", env = "COURIER_TOKEN", value_delimiter = ',')]
    pub tokens: Vec<String>,
    /// Bot account name.
    #[arg(long)]
    pub username: Option<String>,
    /// Post under this name when a message sets none.
    #[arg(long)]
    pub override_username: Option<String>,
    /// Post with this icon when a message sets none.
    #[arg(long)]
    pub icon_url: Option<String>,
    /// Skip TLS certificate verification on outgoing posts.
    #[arg(long)]
    pub insecure_skip_verify: bool,
    #[command(flatten)]
    pub server: ServerArgs,
    /// Write the process id here while running.
    #[arg(long)]
    pub pid_file: Option<PathBuf>,
}

impl RunArgs {
    /// Flags win over file values.
    pub fn apply(&self, config: &mut CourierConfig) {
        let mm = &mut config.mattermost;
        if let Some(ref url) = self.outgoing_url {
            mm.outgoing_url.clone_from(url);
        }
        if let Some(ref path) = self.incoming_path {
            mm.incoming_path.clone_from(path);
        }
        if !self.tokens.is_empty() {
            mm.tokens = self.tokens.iter().cloned().map(Secret::new).collect();
        }
        if let Some(ref name) = self.username {
            mm.username.clone_from(name);
        }
        if let Some(ref name) = self.override_username {
            mm.override_username.clone_from(name);
        }
        if let Some(ref url) = self.icon_url {
            mm.icon_url.clone_from(url);
        }
        if self.insecure_skip_verify {
            mm.insecure_skip_verify = true;
        }
        self.server.apply(&mut config.server);
        if let Some(ref path) = self.pid_file {
            config.common.pid_file = Some(path.clone());
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ShellArgs {
    /// Bot account name.
    #[arg(long)]
    pub username: Option<String>,
    #[command(flatten)]
    pub server: ServerArgs,
}

impl ShellArgs {
    pub fn apply(&self, config: &mut CourierConfig) {
        if let Some(ref name) = self.username {
            config.mattermost.username.clone_from(name);
        }
        self.server.apply(&mut config.server);
    }
}

/// Serve Mattermost until a signal or a fatal connector error.
pub async fn run(config: CourierConfig, dispatch: Dispatch) -> Result<ExitCode> {
    check(&config, Purpose::Run)?;
    let _pid = config
        .common
        .pid_file
        .as_deref()
        .map(PidFile::create)
        .transpose()?;

    let mm = &config.mattermost;
    let connector = MattermostConnector::new(MattermostSettings {
        outgoing_url: mm.outgoing_url.clone(),
        incoming_path: mm.incoming_path.clone(),
        tokens: mm.tokens.clone(),
        override_username: mm.override_username.clone(),
        icon_url: mm.icon_url.clone(),
        insecure_skip_verify: mm.insecure_skip_verify,
    })
    .context("creating the mattermost connector")?;

    supervise(build_robot(&config, Arc::new(connector), dispatch)?).await
}

/// Drive the bot from the terminal.
pub async fn shell(config: CourierConfig, dispatch: Dispatch) -> Result<ExitCode> {
    check(&config, Purpose::Shell)?;
    let connector = ShellConnector::stdio();
    supervise(build_robot(&config, Arc::new(connector), dispatch)?).await
}

fn check(config: &CourierConfig, purpose: Purpose) -> Result<()> {
    let report = validate_config(config, purpose);
    for d in report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
    {
        warn!(path = %d.path, "{}", d.message);
    }
    if report.has_errors() {
        bail!("invalid configuration: {}", report.error_summary());
    }
    Ok(())
}

pub fn build_robot(
    config: &CourierConfig,
    connector: Arc<dyn Connector>,
    dispatch: Dispatch,
) -> Result<Arc<Robot>> {
    let robot_config = RobotConfig {
        username: config.mattermost.username.clone(),
        server_enabled: config.server.enable,
        address: config.server.address(),
    };
    let handlers = demo::handlers()?
        .into_iter()
        .map(|h| Arc::new(h) as Arc<dyn Handler>);
    Ok(Robot::builder(robot_config, connector)
        .handlers(handlers)
        .routes(demo::routes())
        .jobs(demo::jobs()?)
        .log_dispatch(dispatch)
        .build())
}

async fn supervise(robot: Arc<Robot>) -> Result<ExitCode> {
    let mut errors = robot.start()?;
    info!(
        pid = std::process::id(),
        username = robot.sender_name(),
        handlers = robot.handler_count(),
        routes = robot.route_count(),
        jobs = robot.job_count(),
        "courier started"
    );

    tokio::select! {
        signal = shutdown_signal() => {
            info!(signal, "signal received, stopping");
            robot.stop().await;
            info!("courier stopped");
            Ok(ExitCode::SUCCESS)
        },
        report = errors.recv() => match report {
            Some(err) => {
                warn!(error = %err, "fatal error, waiting for teardown");
                // The robot is already tearing itself down; the queue closes
                // once it reaches `Stopped`.
                while errors.recv().await.is_some() {}
                Err(anyhow::Error::new(err).context("courier stopped on a fatal error"))
            },
            None => {
                info!("connector closed, courier stopped");
                Ok(ExitCode::SUCCESS)
            },
        },
    }
}

/// Resolves with the name of the first shutdown signal.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let kinds = [
        (SignalKind::hangup(), "SIGHUP"),
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::quit(), "SIGQUIT"),
    ];
    let mut streams = Vec::new();
    for (kind, name) in kinds {
        match signal(kind) {
            Ok(stream) => streams.push((stream, name)),
            Err(e) => warn!(signal = name, error = %e, "cannot listen for signal"),
        }
    }
    if streams.is_empty() {
        return ctrl_c().await;
    }

    let waits = streams.iter_mut().map(|(stream, name)| {
        let name = *name;
        Box::pin(async move {
            stream.recv().await;
            name
        })
    });
    let (name, _, _) = futures::future::select_all(waits).await;
    name
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    "ctrl-c"
}
