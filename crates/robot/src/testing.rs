//! Test doubles shared by the unit tests in this crate.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    courier_channels::{
        Connector, ConnectorStreams, Error, InMessage, OutMessage, RateLimit, Result, Sender,
    },
    tokio::sync::mpsc,
};

/// A [`Sender`] that records what it is asked to send.
pub(crate) struct Recorder {
    name: String,
    sent: Mutex<Vec<OutMessage>>,
}

impl Recorder {
    pub(crate) fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<OutMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Sender for Recorder {
    async fn send(&self, msg: OutMessage) -> Result<()> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(msg);
        Ok(())
    }

    fn sender_name(&self) -> &str {
        &self.name
    }
}

type Streams = (mpsc::Sender<InMessage>, mpsc::Sender<Error>);

/// In-memory connector. Tests push inbound messages and errors; sends are
/// recorded, and any send whose text starts with `fail` is answered with a
/// 503.
#[derive(Default)]
pub(crate) struct MockConnector {
    streams: Mutex<Option<Streams>>,
    sent: Mutex<Vec<OutMessage>>,
    /// Error sender kept alive after [`MockConnector::close_messages`].
    held_errors: Mutex<Option<mpsc::Sender<Error>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: bool,
    stop_delay: Duration,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing_start() -> Arc<Self> {
        Arc::new(Self {
            fail_start: true,
            ..Self::default()
        })
    }

    /// A connector whose `stop` takes `delay` to return.
    pub(crate) fn slow_stop(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stop_delay: delay,
            ..Self::default()
        })
    }

    fn streams(&self) -> Option<Streams> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Wait until the robot has started the connector.
    pub(crate) async fn started(&self) {
        while self.starts.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub(crate) async fn push(&self, msg: InMessage) {
        self.started().await;
        if let Some((tx, _)) = self.streams() {
            let _ = tx.send(msg).await;
        }
    }

    pub(crate) async fn fail(&self, err: Error) {
        self.started().await;
        if let Some((_, tx)) = self.streams() {
            let _ = tx.send(err).await;
        }
    }

    /// Drop both stream senders, as a connector that died on its own would.
    pub(crate) async fn close(&self) {
        self.started().await;
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Close only the inbound stream; the error stream stays open.
    pub(crate) async fn close_messages(&self) {
        self.started().await;
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some((_, errors)) = streams {
            *self.held_errors.lock().unwrap_or_else(|e| e.into_inner()) = Some(errors);
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) async fn wait_for_sent(&self, count: usize) -> Vec<OutMessage> {
        for _ in 0..400 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent()
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn id(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> Result<ConnectorStreams> {
        if self.fail_start {
            return Err(Error::unavailable("mock refused to start"));
        }
        let (msg_tx, messages) = mpsc::channel(1);
        let (err_tx, errors) = mpsc::channel(1);
        *self.streams.lock().unwrap_or_else(|e| e.into_inner()) = Some((msg_tx, err_tx));
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectorStreams { messages, errors })
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.stop_delay).await;
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.held_errors.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    async fn send(&self, msg: &OutMessage) -> Result<()> {
        let failing = msg.text.starts_with("fail");
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(msg.clone());
        if failing {
            return Err(Error::Send {
                status: 503,
                rate_limit: RateLimit::default(),
                request_id: None,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}
