//! 웹훅 sink -- 레코드를 HTTP POST(JSON)로 전송합니다.

use std::sync::Arc;
use std::time::Duration;

use logflume_core::error::SinkError;
use logflume_core::pipeline::{BoxFuture, Sink};
use logflume_core::record::LogRecord;
use logflume_core::types::Level;

/// 기본 요청 타임아웃 (초)
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// 웹훅 sink
pub struct WebhookSink {
    name: String,
    level: Option<Level>,
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    /// 기본 타임아웃으로 웹훅 sink를 생성합니다.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, SinkError> {
        Self::with_timeout(name, url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// 요청 타임아웃을 지정하여 웹훅 sink를 생성합니다.
    pub fn with_timeout(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let name = name.into();
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SinkError::delivery(
                &name,
                format!("webhook url must be http(s): {url}"),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("logflume/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SinkError::delivery(&name, format!("creating HTTP client: {e}")))?;
        Ok(Self {
            name,
            level: None,
            url,
            client,
        })
    }

    /// 최소 레벨을 지정합니다.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// 대상 URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Option<Level> {
        self.level
    }

    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&*record)
                .send()
                .await
                .map_err(|e| SinkError::delivery(&self.name, format!("sending request: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::delivery(
                    &self.name,
                    format!("webhook responded with {status}"),
                ));
            }
            Ok(())
        })
    }
}
