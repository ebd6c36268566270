//! End-to-end queue behavior through the public API, with a scripted
//! executor standing in for the storage collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use stowage::{
    ProgressSink, QueueConfig, QueueEvent, Result, TransferDestination, TransferDirection,
    TransferExecutor, TransferQueue, TransferRequest, TransferSource, TransferSpec,
    TransferStatus,
};

struct ManualExecutor {
    started: mpsc::UnboundedSender<RunningTransfer>,
}

struct RunningTransfer {
    request: TransferRequest,
    progress: ProgressSink,
    #[allow(dead_code)]
    cancel: CancellationToken,
    complete: oneshot::Sender<Result<()>>,
}

#[async_trait]
impl TransferExecutor for ManualExecutor {
    async fn execute(
        &self,
        request: TransferRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<()> {
        let (complete, resolved) = oneshot::channel();
        let _ = self.started.send(RunningTransfer {
            request,
            progress,
            cancel: cancel.clone(),
            complete,
        });
        tokio::select! {
            _ = cancel.cancelled() => Err(stowage::TransferError::Cancelled),
            result = resolved => result.unwrap_or(Err(stowage::TransferError::Cancelled)),
        }
    }
}

fn manual_queue(cap: usize) -> (TransferQueue, mpsc::UnboundedReceiver<RunningTransfer>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = TransferQueue::new(
        QueueConfig::new(cap),
        Arc::new(ManualExecutor { started: tx }),
    );
    (queue, rx)
}

fn upload(name: &str, size: u64) -> TransferSpec {
    TransferSpec {
        direction: TransferDirection::Upload,
        source: TransferSource::LocalFile {
            path: format!("/home/u/{name}").into(),
            relative_prefix: String::new(),
        },
        destination: TransferDestination::RemoteKey { key: name.into() },
        size_hint: size,
    }
}

async fn wait_for_status(queue: &TransferQueue, id: stowage::TransferId, status: TransferStatus) {
    loop {
        if queue.item(id).map(|item| item.status) == Some(status) {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn five_item_scenario_matches_expected_counts() {
    let (queue, mut rx) = manual_queue(3);
    let ids = queue.enqueue(
        ["a", "b", "c", "d", "e"]
            .iter()
            .map(|name| upload(name, 100))
            .collect(),
    );

    // A, B, C dispatched; D, E waiting.
    let counts = queue.counts();
    assert_eq!(counts.active, 3);
    assert_eq!(counts.pending, 2);

    let a = rx.recv().await.expect("dispatch a");
    assert_eq!(a.request.id, ids[0]);
    let _b = rx.recv().await.expect("dispatch b");
    let _c = rx.recv().await.expect("dispatch c");

    // A finishes; the freed slot goes to D (FIFO).
    a.complete.send(Ok(())).expect("resolve a");
    let d = rx.recv().await.expect("dispatch d");
    assert_eq!(d.request.id, ids[3]);
    wait_for_status(&queue, ids[0], TransferStatus::Completed).await;

    // E is cancelled while still pending: terminal immediately.
    queue.cancel(ids[4]);
    assert_eq!(
        queue.item(ids[4]).expect("item e").status,
        TransferStatus::Cancelled
    );

    let counts = queue.counts();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.active, 3);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.cancelled, 1);
    assert_eq!(counts.total, 5);
    assert_eq!(
        counts.pending
            + counts.active
            + counts.completed
            + counts.failed
            + counts.cancelled,
        counts.total
    );
}

#[tokio::test]
async fn totals_track_enqueued_minus_removed() {
    let (queue, _rx) = manual_queue(2);
    let ids = queue.enqueue((0..6).map(|i| upload(&format!("f{i}"), 10)).collect());
    assert_eq!(queue.counts().total, 6);

    queue.remove(ids[5]);
    queue.remove(ids[4]);
    assert_eq!(queue.counts().total, 4);

    // Removing an id twice changes nothing.
    queue.remove(ids[4]);
    assert_eq!(queue.counts().total, 4);
}

#[tokio::test]
async fn aggregate_progress_spans_the_whole_queue() {
    let (queue, mut rx) = manual_queue(2);
    queue.enqueue(vec![upload("a", 100), upload("b", 100)]);

    let a = rx.recv().await.expect("dispatch a");
    let b = rx.recv().await.expect("dispatch b");
    a.progress.report(50, 100);
    b.progress.report(25, 100);

    assert_eq!(queue.aggregate_progress(), 38); // round(75 / 200 * 100)
    let stats = queue.stats();
    assert_eq!(stats.transferred_bytes, 75);
    assert_eq!(stats.total_bytes, 200);
}

#[tokio::test]
async fn aggregate_progress_is_zero_with_no_known_totals() {
    let (queue, _rx) = manual_queue(2);
    queue.enqueue(vec![upload("a", 0)]);
    assert_eq!(queue.aggregate_progress(), 0);
}

#[tokio::test]
async fn executor_reported_total_corrects_the_size_hint() {
    let (queue, mut rx) = manual_queue(1);
    let ids = queue.enqueue(vec![upload("a", 0)]);

    let a = rx.recv().await.expect("dispatch");
    a.progress.report(10, 400);
    let item = queue.item(ids[0]).expect("item");
    assert_eq!(item.total_bytes, 400);
    assert_eq!(item.progress_percent(), 3); // round(10 / 400 * 100)

    a.progress.report(400, 400);
    a.complete.send(Ok(())).expect("resolve");
    wait_for_status(&queue, ids[0], TransferStatus::Completed).await;
    let item = queue.item(ids[0]).expect("item");
    assert_eq!(item.transferred_bytes, 400);
    assert!(item.completed_at.is_some());
}

#[tokio::test]
async fn failure_only_touches_its_own_item() {
    let (queue, mut rx) = manual_queue(2);
    let ids = queue.enqueue(vec![upload("a", 10), upload("b", 10), upload("c", 10)]);

    let a = rx.recv().await.expect("dispatch a");
    let b = rx.recv().await.expect("dispatch b");
    a.complete
        .send(Err(stowage::TransferError::Remote("403 Forbidden".into())))
        .expect("resolve a");
    wait_for_status(&queue, ids[0], TransferStatus::Failed).await;

    // B keeps running, C was promoted into the freed slot.
    assert_eq!(
        queue.item(ids[1]).expect("item b").status,
        TransferStatus::Active
    );
    let c = rx.recv().await.expect("dispatch c");
    assert_eq!(c.request.id, ids[2]);

    let failed = queue.item(ids[0]).expect("item a");
    assert_eq!(
        failed.error.as_deref(),
        Some("Remote storage error: 403 Forbidden")
    );
    drop(b);
}

#[tokio::test]
async fn events_serialize_for_the_ui_bridge() {
    let (queue, mut rx) = manual_queue(1);
    let mut events = queue.subscribe();
    queue.enqueue(vec![upload("a", 10)]);

    let event = events.recv().await.expect("activation event");
    let value = serde_json::to_value(&event).expect("serializable event");
    assert_eq!(value["type"], "status_changed");
    assert_eq!(value["status"], "active");

    let a = rx.recv().await.expect("dispatch");
    a.progress.report(5, 10);
    loop {
        let event = events.recv().await.expect("progress event");
        if let QueueEvent::Progress(progress) = event {
            let value = serde_json::to_value(&progress).expect("serializable progress");
            assert_eq!(value["percent"], 50);
            assert_eq!(value["transferred_bytes"], 5);
            break;
        }
    }
}
