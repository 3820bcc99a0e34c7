//! 콘솔 sink -- 레코드를 JSON lines로 출력합니다.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use logflume_core::error::SinkError;
use logflume_core::pipeline::{BoxFuture, Sink};
use logflume_core::record::LogRecord;
use logflume_core::types::Level;

use super::json_line;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// 콘솔 sink
pub struct ConsoleSink {
    name: String,
    level: Option<Level>,
    out: Writer,
}

impl ConsoleSink {
    /// stdout으로 출력하는 sink를 생성합니다.
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::with_writer(name, tokio::io::stdout())
    }

    /// stderr로 출력하는 sink를 생성합니다.
    pub fn stderr(name: impl Into<String>) -> Self {
        Self::with_writer(name, tokio::io::stderr())
    }

    /// 임의의 writer로 출력하는 sink를 생성합니다.
    pub fn with_writer(
        name: impl Into<String>,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            level: None,
            out: Box::new(writer),
        }
    }

    /// 최소 레벨을 지정합니다.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Option<Level> {
        self.level
    }

    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let line = json_line(&record)?;
            self.out.write_all(&line).await?;
            Ok(())
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.out.flush().await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        self.flush()
    }
}
