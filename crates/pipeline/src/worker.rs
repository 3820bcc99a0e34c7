//! sink 작업 태스크 -- sink마다 하나의 tokio 태스크와 bounded 큐를 둡니다.
//!
//! ```text
//! emit -> try_send(Deliver) -> mpsc(capacity) -> worker task -> Sink::deliver
//! flush/close -> send(Flush|Close) -> (같은 큐, 대기 중인 전송 뒤) -> oneshot ack
//! ```
//!
//! 큐가 가득 차면 해당 sink에 대한 레코드는 드롭되고 전송 실패로 보고됩니다.
//! sink 메서드의 panic은 해당 작업의 실패로 보고되며, 작업 태스크는 다음 명령을 계속 처리합니다.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use logflume_core::error::SinkError;
use logflume_core::metrics as m;
use logflume_core::pipeline::Sink;
use logflume_core::record::LogRecord;
use logflume_core::types::Level;

use crate::diagnostics::{Diagnostic, Diagnostics, FailureKind, catch_panic};

type Ack = oneshot::Sender<Result<(), SinkError>>;

/// 작업 태스크로 보내는 명령
enum SinkCommand {
    Deliver(Arc<LogRecord>),
    Flush(Ack),
    Close(Ack),
}

/// 대기 중인 flush/close 응답
pub(crate) struct PendingAck {
    pub(crate) sink: String,
    rx: Result<oneshot::Receiver<Result<(), SinkError>>, SinkError>,
}

impl PendingAck {
    /// 응답을 기다립니다.
    pub(crate) async fn wait(self) -> Result<(), SinkError> {
        match self.rx {
            Ok(rx) => rx
                .await
                .unwrap_or_else(|_| Err(SinkError::delivery(&self.sink, "sink worker stopped"))),
            Err(e) => Err(e),
        }
    }
}

/// 엔진이 보유하는 sink 작업 태스크 핸들
pub(crate) struct SinkWorker {
    name: String,
    level: Option<Level>,
    tx: mpsc::Sender<SinkCommand>,
    task: JoinHandle<()>,
}

impl SinkWorker {
    /// sink를 전용 태스크로 옮깁니다.
    pub(crate) fn spawn(
        runtime: &Handle,
        sink: Box<dyn Sink>,
        capacity: usize,
        diagnostics: Diagnostics,
    ) -> Self {
        let name = sink.name().to_owned();
        let level = sink.level();
        let (tx, rx) = mpsc::channel(capacity);
        let task = runtime.spawn(run(sink, rx, diagnostics));
        tracing::debug!(sink = %name, capacity, "sink worker started");
        Self {
            name,
            level,
            tx,
            task,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// 레벨 필터가 레코드 레벨을 허용하는지 확인합니다.
    pub(crate) fn admits(&self, level: Level) -> bool {
        self.level.is_none_or(|min| min.admits(level))
    }

    /// 레코드를 큐에 넣습니다. 대기하지 않습니다.
    pub(crate) fn try_deliver(&self, record: Arc<LogRecord>) -> Result<(), SinkError> {
        self.tx
            .try_send(SinkCommand::Deliver(record))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    SinkError::delivery(&self.name, "sink queue is full")
                }
                mpsc::error::TrySendError::Closed(_) => SinkError::Closed(self.name.clone()),
            })
    }

    /// 큐에 자리가 날 때까지 기다린 뒤 레코드를 넣습니다.
    pub(crate) async fn deliver_wait(&self, record: Arc<LogRecord>) -> Result<(), SinkError> {
        self.tx
            .send(SinkCommand::Deliver(record))
            .await
            .map_err(|_| SinkError::Closed(self.name.clone()))
    }

    /// flush 요청을 큐에 넣고, 응답 대기 핸들을 반환합니다.
    pub(crate) async fn request_flush(&self) -> PendingAck {
        self.request(SinkCommand::Flush).await
    }

    /// close 요청을 큐에 넣고, 응답 대기 핸들을 반환합니다.
    pub(crate) async fn request_close(&self) -> PendingAck {
        self.request(SinkCommand::Close).await
    }

    async fn request(&self, command: fn(Ack) -> SinkCommand) -> PendingAck {
        let (ack_tx, ack_rx) = oneshot::channel();
        let rx = match self.tx.send(command(ack_tx)).await {
            Ok(()) => Ok(ack_rx),
            Err(_) => Err(SinkError::Closed(self.name.clone())),
        };
        PendingAck {
            sink: self.name.clone(),
            rx,
        }
    }

    /// 작업 태스크 종료를 기다립니다.
    pub(crate) async fn join(self) {
        let SinkWorker { name, tx, task, .. } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::warn!(sink = %name, error = %e, "sink worker terminated abnormally");
        }
    }
}

async fn run(mut sink: Box<dyn Sink>, mut rx: mpsc::Receiver<SinkCommand>, diagnostics: Diagnostics) {
    let name = sink.name().to_owned();

    while let Some(command) = rx.recv().await {
        match command {
            SinkCommand::Deliver(record) => {
                // sink의 panic은 이 레코드의 전송 실패로만 처리하고 작업 태스크는 계속 실행
                let outcome = catch_panic(async { sink.deliver(Arc::clone(&record)).await })
                    .await
                    .unwrap_or_else(|panic| {
                        Err(SinkError::delivery(&name, format!("deliver panicked: {panic}")))
                    });
                match outcome {
                    Ok(()) => {
                        metrics::counter!(m::RECORDS_DISPATCHED_TOTAL, m::LABEL_SINK => name.clone())
                            .increment(1);
                    }
                    Err(e) => diagnostics.report(
                        Diagnostic::new(FailureKind::Delivery, &name, e.to_string())
                            .with_record(record.id()),
                    ),
                }
            }
            SinkCommand::Flush(ack) => {
                let result = catch_panic(async { sink.flush().await })
                    .await
                    .unwrap_or_else(|panic| {
                        Err(SinkError::delivery(&name, format!("flush panicked: {panic}")))
                    });
                report_lifecycle(&diagnostics, &name, "flush", &result);
                let _ = ack.send(result);
            }
            SinkCommand::Close(ack) => {
                let result = close_guarded(sink.as_mut(), &name).await;
                report_lifecycle(&diagnostics, &name, "close", &result);
                let _ = ack.send(result);
                tracing::debug!(sink = %name, "sink worker stopped");
                return;
            }
        }
    }

    // 엔진이 close 없이 drop된 경우
    if let Err(e) = close_guarded(sink.as_mut(), &name).await {
        tracing::warn!(sink = %name, error = %e, "failed to close sink after engine drop");
    }
    tracing::debug!(sink = %name, "sink worker stopped after channel closed");
}

async fn close_guarded(sink: &mut dyn Sink, name: &str) -> Result<(), SinkError> {
    catch_panic(async { sink.close().await })
        .await
        .unwrap_or_else(|panic| Err(SinkError::delivery(name, format!("close panicked: {panic}"))))
}

fn report_lifecycle(diagnostics: &Diagnostics, name: &str, op: &str, result: &Result<(), SinkError>) {
    if let Err(e) = result {
        diagnostics.report(Diagnostic::new(
            FailureKind::Delivery,
            name,
            format!("{op} failed: {e}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflume_core::pipeline::BoxFuture;
    use std::sync::Mutex;

    struct Collect {
        seen: Arc<Mutex<Vec<String>>>,
        fail_flush: bool,
    }

    impl Sink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn level(&self) -> Option<Level> {
            Some(Level::WARN)
        }

        fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
            if record.message() == "boom" {
                panic!("collect cannot handle boom");
            }
            Box::pin(async move {
                if record.message() == "async boom" {
                    panic!("collect failed mid-write");
                }
                self.seen.lock().unwrap().push(record.message().to_owned());
                Ok(())
            })
        }

        fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
            let fail = self.fail_flush;
            Box::pin(async move {
                if fail {
                    return Err(SinkError::delivery("collect", "flush refused"));
                }
                Ok(())
            })
        }
    }

    fn worker(capacity: usize, fail_flush: bool) -> (SinkWorker, Arc<Mutex<Vec<String>>>, Diagnostics) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let diagnostics = Diagnostics::new();
        let sink = Collect {
            seen: Arc::clone(&seen),
            fail_flush,
        };
        let worker = SinkWorker::spawn(&Handle::current(), Box::new(sink), capacity, diagnostics.clone());
        (worker, seen, diagnostics)
    }

    fn rec(message: &str) -> Arc<LogRecord> {
        Arc::new(LogRecord::new(Level::ERROR, message, 0))
    }

    #[tokio::test]
    async fn delivers_in_queue_order_before_flush_ack() {
        let (worker, seen, _) = worker(16, false);
        for m in ["a", "b", "c"] {
            worker.try_deliver(rec(m)).unwrap();
        }
        worker.request_flush().await.wait().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn level_filter_uses_sink_level() {
        let (worker, _, _) = worker(1, false);
        assert!(worker.admits(Level::WARN));
        assert!(worker.admits(Level::FATAL));
        assert!(!worker.admits(Level::INFO));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_waiting() {
        let (worker, _, _) = worker(1, false);
        // current_thread 런타임: 작업 태스크가 아직 큐를 비우지 않음
        worker.try_deliver(rec("first")).unwrap();
        let err = worker.try_deliver(rec("second")).unwrap_err();
        assert!(err.to_string().contains("queue is full"));
    }

    #[tokio::test]
    async fn flush_failure_is_returned_and_reported() {
        let (worker, _, diagnostics) = worker(4, true);
        let mut rx = diagnostics.subscribe();
        let err = worker.request_flush().await.wait().await.unwrap_err();
        assert!(err.to_string().contains("flush refused"));
        assert!(rx.recv().await.unwrap().message.contains("flush failed"));
    }

    #[tokio::test]
    async fn deliver_panic_is_reported_and_worker_keeps_running() {
        let (worker, seen, diagnostics) = worker(16, false);
        let mut rx = diagnostics.subscribe();
        for m in ["boom", "async boom", "after"] {
            worker.try_deliver(rec(m)).unwrap();
        }
        worker.request_flush().await.wait().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["after"]);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, FailureKind::Delivery);
        assert!(first.message.contains("deliver panicked: collect cannot handle boom"));
        let second = rx.recv().await.unwrap();
        assert!(second.message.contains("collect failed mid-write"));
    }

    #[tokio::test]
    async fn deliver_wait_waits_for_queue_space() {
        let (worker, seen, _) = worker(1, false);
        for m in ["a", "b", "c"] {
            worker.deliver_wait(rec(m)).await.unwrap();
        }
        worker.request_flush().await.wait().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn requests_after_close_fail_with_closed() {
        let (worker, _, _) = worker(4, false);
        worker.request_close().await.wait().await.unwrap();
        // 작업 태스크가 종료될 때까지 대기
        tokio::task::yield_now().await;
        let err = worker.request_flush().await.wait().await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(_) | SinkError::Delivery { .. }));
        worker.join().await;
    }
}
