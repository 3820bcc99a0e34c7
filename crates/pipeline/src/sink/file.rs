//! 파일 sink -- 레코드를 파일 끝에 JSON lines로 추가합니다.
//!
//! 쓰기는 `BufWriter`에 모였다가 `flush()`/`close()` 시 디스크에 반영됩니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use logflume_core::error::SinkError;
use logflume_core::pipeline::{BoxFuture, Sink};
use logflume_core::record::LogRecord;
use logflume_core::types::Level;

use super::json_line;

/// 파일 sink
pub struct FileSink {
    name: String,
    level: Option<Level>,
    path: PathBuf,
    /// close 이후 None
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// 파일을 append 모드로 엽니다. 없으면 생성합니다.
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let name = name.into();
        tracing::debug!(sink = %name, path = %path.display(), "file sink opened");
        Ok(Self {
            name,
            level: None,
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// 최소 레벨을 지정합니다.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, SinkError> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(SinkError::Closed(self.name.clone())),
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Option<Level> {
        self.level
    }

    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let line = json_line(&record)?;
            self.writer()?.write_all(&line).await?;
            Ok(())
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            if let Some(writer) = self.writer.as_mut() {
                writer.flush().await?;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            if let Some(mut writer) = self.writer.take() {
                writer.flush().await?;
                tracing::debug!(sink = %self.name, path = %self.path.display(), "file sink closed");
            }
            Ok(())
        })
    }
}
