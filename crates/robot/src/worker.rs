//! Fixed-size worker pool draining the (handler, message) queue.

use std::{
    any::Any,
    backtrace::Backtrace,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    courier_channels::InMessage,
    futures::FutureExt,
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
    },
    tracing::{debug, error, instrument::WithSubscriber, warn},
};

use crate::handler::Handler;

/// One handler offered one message.
pub(crate) struct WorkItem {
    pub handler: Arc<dyn Handler>,
    pub message: Arc<InMessage>,
}

/// Counters shared between the coordinator, the workers and the stats route.
#[derive(Debug, Default)]
pub struct Stats {
    pub received: AtomicU64,
    pub dispatched: AtomicU64,
    pub handled: AtomicU64,
    pub handler_errors: AtomicU64,
    pub handler_panics: AtomicU64,
}

impl Stats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spawn `count` workers sharing `queue`. Each exits once the queue is
/// closed and drained.
pub(crate) fn spawn_pool(
    count: usize,
    queue: mpsc::Receiver<WorkItem>,
    stats: Arc<Stats>,
) -> Vec<JoinHandle<()>> {
    let queue = Arc::new(Mutex::new(queue));
    (1..=count)
        .map(|id| {
            tokio::spawn(
                run_worker(id, Arc::clone(&queue), Arc::clone(&stats)).with_current_subscriber(),
            )
        })
        .collect()
}

async fn run_worker(id: usize, queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>, stats: Arc<Stats>) {
    debug!(worker = id, "worker started");
    loop {
        // The lock is held only while waiting for the next item.
        let item = queue.lock().await.recv().await;
        let Some(item) = item else {
            break;
        };
        call_handler(id, item, &stats).await;
    }
    debug!(worker = id, "worker stopped");
}

/// Run one work item inside a panic boundary.
async fn call_handler(worker: usize, item: WorkItem, stats: &Stats) {
    let WorkItem { handler, message } = item;
    let outcome = AssertUnwindSafe(async {
        if !handler.can_handle(&message) {
            return None;
        }
        Some(handler.handle(Arc::clone(&message)).await)
    })
    .catch_unwind()
    .await;

    match outcome {
        Ok(None) => {},
        Ok(Some(Ok(()))) => Stats::bump(&stats.handled),
        Ok(Some(Err(e))) => {
            Stats::bump(&stats.handler_errors);
            warn!(worker, channel = %message.channel_name, error = %e, "handler failed");
        },
        Err(payload) => {
            Stats::bump(&stats.handler_panics);
            let backtrace = Backtrace::force_capture();
            error!(
                worker,
                channel = %message.channel_name,
                panic = %panic_message(payload.as_ref()),
                %backtrace,
                "handler panicked"
            );
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
