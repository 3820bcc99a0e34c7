//! 기본 제공 sink
//!
//! # 출력 대상
//! - [`ConsoleSink`]: stdout/stderr 또는 임의의 `AsyncWrite`로 JSON lines 출력
//! - [`FileSink`]: 파일 끝에 JSON lines 추가 (버퍼링, `flush` 시 디스크 반영)
//! - [`ChannelSink`]: `tokio::sync::mpsc` 채널로 레코드 발행
//! - [`WebhookSink`]: HTTP POST로 레코드 전송 (`reqwest`)
//!
//! 모든 sink는 [`Sink`](logflume_core::pipeline::Sink) trait을 구현하며,
//! 엔진은 sink마다 전용 태스크에서 `deliver`를 순서대로 호출합니다.

pub mod channel;
pub mod console;
pub mod file;
pub mod webhook;

pub use channel::ChannelSink;
pub use console::ConsoleSink;
pub use file::FileSink;
pub use webhook::WebhookSink;

use logflume_core::error::SinkError;
use logflume_core::record::LogRecord;

/// 레코드를 개행으로 끝나는 JSON 한 줄로 직렬화합니다.
pub fn json_line(record: &LogRecord) -> Result<Vec<u8>, SinkError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}
