//! The orchestration core: lifecycle, dispatch loop and shutdown protocol.

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    axum::Router,
    courier_channels::{Connector, ConnectorStreams, InMessage, OutMessage, Sender},
    courier_cron::CronService,
    courier_gateway::{Route, RouteVars},
    tokio::{
        sync::{mpsc, watch},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{Dispatch, debug, error, info, instrument::WithSubscriber, warn},
};

use crate::{
    Error, Result,
    handler::Handler,
    job::Job,
    worker::{self, Stats, WorkItem},
};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_DEPTH: usize = 20;

/// Lifecycle of one robot. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl State {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the core itself consumes.
#[derive(Debug, Clone)]
pub struct RobotConfig {
    /// The bot's own account name; mentions of other names are ignored.
    pub username: String,
    pub server_enabled: bool,
    /// `host:port` for the HTTP listener.
    pub address: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            username: "courier".into(),
            server_enabled: false,
            address: "127.0.0.1:8080".into(),
        }
    }
}

/// Collects everything a [`Robot`] needs. Lists are frozen by [`build`].
///
/// [`build`]: RobotBuilder::build
pub struct RobotBuilder {
    config: RobotConfig,
    connector: Arc<dyn Connector>,
    handlers: Vec<Arc<dyn Handler>>,
    routes: Vec<Route<Arc<Robot>>>,
    jobs: Vec<Job>,
    workers: usize,
    queue_depth: usize,
    dispatch: Option<Dispatch>,
}

impl RobotBuilder {
    #[must_use]
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn handlers(mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    #[must_use]
    pub fn route(mut self, route: Route<Arc<Robot>>) -> Self {
        self.routes.push(route);
        self
    }

    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route<Arc<Robot>>>) -> Self {
        self.routes.extend(routes);
        self
    }

    #[must_use]
    pub fn job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    #[must_use]
    pub fn jobs(mut self, jobs: impl IntoIterator<Item = Job>) -> Self {
        self.jobs.extend(jobs);
        self
    }

    /// Worker count; zero is raised to one.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Dispatch queue capacity; zero is raised to one.
    #[must_use]
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Where the robot and everything it spawns log to. Without one, logs
    /// are discarded.
    #[must_use]
    pub fn log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Robot> {
        let (state, _) = watch::channel(State::Created);
        Arc::new(Robot {
            config: self.config,
            connector: self.connector,
            handlers: self.handlers,
            routes: self.routes,
            jobs: self.jobs,
            workers: self.workers,
            queue_depth: self.queue_depth,
            dispatch: self.dispatch.unwrap_or_else(Dispatch::none),
            aborted: AtomicBool::new(false),
            state,
            quit: Mutex::new(None),
            stats: Arc::new(Stats::default()),
            started_at: Mutex::new(None),
        })
    }
}

/// Sends on behalf of the robot; attached to every dispatched message.
struct RobotSender {
    connector: Arc<dyn Connector>,
    name: String,
}

#[async_trait]
impl Sender for RobotSender {
    async fn send(&self, msg: OutMessage) -> courier_channels::Result<()> {
        self.connector.send(&msg).await
    }

    fn sender_name(&self) -> &str {
        &self.name
    }
}

/// First-failure-wins reporter for the queue returned by [`Robot::start`].
#[derive(Clone)]
struct ErrorReporter(mpsc::Sender<Error>);

impl ErrorReporter {
    fn report(&self, err: Error) {
        if let Err(e) = self.0.try_send(err) {
            debug!(error = %e, "dropping error report, one is already queued");
        }
    }
}

pub struct Robot {
    config: RobotConfig,
    connector: Arc<dyn Connector>,
    handlers: Vec<Arc<dyn Handler>>,
    routes: Vec<Route<Arc<Robot>>>,
    jobs: Vec<Job>,
    workers: usize,
    queue_depth: usize,
    dispatch: Dispatch,
    /// Set when the connector ended the run; decides whether the connector's
    /// own `stop` is called and makes [`Robot::stop`] a no-op.
    aborted: AtomicBool,
    state: watch::Sender<State>,
    quit: Mutex<Option<mpsc::Sender<()>>>,
    stats: Arc<Stats>,
    started_at: Mutex<Option<Instant>>,
}

impl Robot {
    pub fn builder(config: RobotConfig, connector: Arc<dyn Connector>) -> RobotBuilder {
        RobotBuilder {
            config,
            connector,
            handlers: Vec::new(),
            routes: Vec::new(),
            jobs: Vec::new(),
            workers: DEFAULT_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            dispatch: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    #[must_use]
    pub fn sender_name(&self) -> &str {
        &self.config.username
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Time since `start`, zero before it.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Path variables of the route that is serving `req`.
    #[must_use]
    pub fn route_vars<B>(&self, req: &axum::http::Request<B>) -> RouteVars {
        RouteVars::of(req)
    }

    /// Deliver `msg` through the connector. Safe to call concurrently.
    pub async fn send(&self, msg: OutMessage) -> courier_channels::Result<()> {
        self.connector.send(&msg).await
    }

    /// Start the run and return the error-report queue.
    ///
    /// Only the first fatal error (connector start, connector failure, HTTP
    /// listener) is delivered; the queue closes once teardown finishes. Route
    /// registration problems are returned here directly.
    pub fn start(self: &Arc<Self>) -> Result<mpsc::Receiver<Error>> {
        let state = self.state();
        if state != State::Created {
            return Err(Error::InvalidState { state });
        }

        let app = if self.config.server_enabled {
            let webhook = self.connector.incoming_webhook();
            Some(courier_gateway::build_app(
                webhook,
                &self.routes,
                Arc::clone(self),
            )?)
        } else {
            None
        };

        // The quit sender is published under the state lock, so a `stop` that
        // observes `Starting` always finds it.
        let (quit_tx, quit_rx) = mpsc::channel(1);
        let claimed = self.state.send_if_modified(|s| {
            if *s == State::Created {
                *self.quit.lock().unwrap_or_else(|e| e.into_inner()) = Some(quit_tx);
                *s = State::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(Error::InvalidState {
                state: self.state(),
            });
        }

        let (err_tx, err_rx) = mpsc::channel(1);
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        let robot = Arc::clone(self);
        tokio::spawn(
            robot
                .run(app, quit_rx, ErrorReporter(err_tx))
                .with_subscriber(self.dispatch.clone()),
        );
        Ok(err_rx)
    }

    /// Request a graceful shutdown and wait for teardown to finish.
    ///
    /// Returns at once when the run already aborted or was never started.
    /// Every other caller, including one arriving while teardown is already
    /// under way, waits for [`State::Stopped`]. Must not be awaited from a
    /// handler: teardown joins the workers.
    pub async fn stop(&self) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.subscribe();
        if *state.borrow_and_update() == State::Created {
            return;
        }
        self.request_quit();
        let _ = state.wait_for(|s| *s == State::Stopped).await;
    }

    fn set_state(&self, state: State) {
        self.state.send_replace(state);
        debug!(%state, "robot state changed");
    }

    /// Ask the coordinator to quit without waiting for it.
    fn request_quit(&self) {
        let quit = self.quit.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(quit) = quit {
            let _ = quit.try_send(());
        }
    }

    async fn run(
        self: Arc<Self>,
        app: Option<Router>,
        mut quit: mpsc::Receiver<()>,
        errors: ErrorReporter,
    ) {
        let (work_tx, work_rx) = mpsc::channel(self.queue_depth);
        let workers = worker::spawn_pool(self.workers, work_rx, Arc::clone(&self.stats));
        info!(
            connector = self.connector.id(),
            workers = self.workers,
            queue_depth = self.queue_depth,
            handlers = self.handlers.len(),
            "robot starting"
        );

        let http_cancel = CancellationToken::new();
        let http = app.map(|app| self.spawn_http(app, http_cancel.clone(), errors.clone()));

        let mut scheduler = None;
        match self.connector.start().await {
            Ok(streams) => {
                info!(connector = self.connector.id(), "connector started");
                if !self.jobs.is_empty() {
                    scheduler = self.start_scheduler().await;
                }
                self.set_state(State::Running);
                self.event_loop(streams, &mut quit, &errors, &work_tx).await;
            },
            Err(e) => {
                error!(connector = self.connector.id(), error = %e, "connector failed to start");
                self.aborted.store(true, Ordering::SeqCst);
                errors.report(Error::Connector(e));
            },
        }

        self.set_state(State::Stopping);
        self.quit.lock().unwrap_or_else(|e| e.into_inner()).take();
        if self.aborted.load(Ordering::SeqCst) {
            warn!("robot aborted by connector");
        } else {
            info!("robot stopping");
            self.connector.stop().await;
            info!(connector = self.connector.id(), "connector stopped");
        }

        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        drop(work_tx);
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker ended abnormally");
            }
        }

        http_cancel.cancel();
        if let Some(handle) = http
            && let Err(e) = handle.await
        {
            error!(error = %e, "http server task ended abnormally");
        }

        drop(errors);
        self.set_state(State::Stopped);
        info!("robot stopped");
    }

    async fn event_loop(
        &self,
        mut streams: ConnectorStreams,
        quit: &mut mpsc::Receiver<()>,
        errors: &ErrorReporter,
        work: &mpsc::Sender<WorkItem>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = quit.recv() => {
                    debug!("quit requested");
                    return;
                },
                err = streams.errors.recv() => {
                    match err {
                        Some(e) => {
                            self.aborted.store(true, Ordering::SeqCst);
                            error!(error = %e, "connector failed");
                            errors.report(Error::Connector(e));
                        },
                        // Connector finished without a failure: stop it normally.
                        None => info!("connector error stream closed"),
                    }
                    return;
                },
                msg = streams.messages.recv() => match msg {
                    Some(msg) => self.dispatch(msg, work).await,
                    None => {
                        self.aborted.store(true, Ordering::SeqCst);
                        warn!("connector message stream closed");
                        return;
                    },
                },
            }
        }
    }

    /// Offer `msg` to every handler. Blocks while the queue is full.
    async fn dispatch(&self, mut msg: InMessage, work: &mpsc::Sender<WorkItem>) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        msg.sender = Some(Arc::new(RobotSender {
            connector: Arc::clone(&self.connector),
            name: self.config.username.clone(),
        }));
        debug!(
            channel = %msg.channel_name,
            user = %msg.user_name,
            kind = %msg.kind(),
            "dispatching message"
        );

        let msg = Arc::new(msg);
        for handler in &self.handlers {
            let item = WorkItem {
                handler: Arc::clone(handler),
                message: Arc::clone(&msg),
            };
            if work.send(item).await.is_err() {
                error!("work queue closed while dispatching");
                return;
            }
            self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn spawn_http(
        self: &Arc<Self>,
        app: Router,
        cancel: CancellationToken,
        errors: ErrorReporter,
    ) -> JoinHandle<()> {
        let robot = Arc::clone(self);
        tokio::spawn(
            async move {
                let served = match courier_gateway::bind(&robot.config.address).await {
                    Ok(listener) => courier_gateway::serve(listener, app, cancel).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = served {
                    error!(error = %e, "http server failed");
                    errors.report(Error::Gateway(e));
                    robot.request_quit();
                }
            }
            .with_current_subscriber(),
        )
    }

    async fn start_scheduler(self: &Arc<Self>) -> Option<Arc<CronService>> {
        let service = CronService::new(self.jobs.iter().map(|job| job.bind(self)).collect());
        match service.start().await {
            Ok(()) => Some(service),
            Err(e) => {
                error!(error = %e, "job scheduler failed to start");
                None
            },
        }
    }
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("config", &self.config)
            .field("connector", &self.connector.id())
            .field("handlers", &self.handlers.len())
            .field("routes", &self.routes.len())
            .field("jobs", &self.jobs.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
