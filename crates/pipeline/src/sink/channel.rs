//! 채널 sink -- 레코드를 `tokio::sync::mpsc` 채널로 발행합니다.
//!
//! 수신측이 느리면 채널 용량만큼 기다립니다. 이 대기는 해당 sink의 작업 태스크
//! 안에서만 일어나므로 다른 sink와 `emit` 호출자에게는 영향을 주지 않습니다.

use std::sync::Arc;

use tokio::sync::mpsc;

use logflume_core::error::SinkError;
use logflume_core::pipeline::{BoxFuture, Sink};
use logflume_core::record::LogRecord;
use logflume_core::types::Level;

/// 채널 sink
pub struct ChannelSink {
    name: String,
    level: Option<Level>,
    /// close 이후 None (수신측에 채널 종료가 전달됨)
    tx: Option<mpsc::Sender<Arc<LogRecord>>>,
}

impl ChannelSink {
    /// 새 채널을 만들고 sink와 수신측을 반환합니다.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<LogRecord>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::from_sender(name, tx), rx)
    }

    /// 기존 송신측으로 sink를 만듭니다.
    pub fn from_sender(name: impl Into<String>, tx: mpsc::Sender<Arc<LogRecord>>) -> Self {
        Self {
            name: name.into(),
            level: None,
            tx: Some(tx),
        }
    }

    /// 최소 레벨을 지정합니다.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }
}

impl Sink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Option<Level> {
        self.level
    }

    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let Some(tx) = self.tx.as_ref() else {
                return Err(SinkError::Closed(self.name.clone()));
            };
            tx.send(record)
                .await
                .map_err(|_| SinkError::delivery(&self.name, "channel receiver dropped"))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        self.tx = None;
        Box::pin(async { Ok(()) })
    }
}
