//! `[[sinks]]` 설정 항목으로 sink를 생성합니다.

use anyhow::{Context, Result};

use logflume_core::config::{SinkKind, SinkSpec};
use logflume_core::pipeline::Sink;
use logflume_pipeline::PipelineEngineBuilder;
use logflume_pipeline::sink::{ConsoleSink, FileSink, WebhookSink};

/// 설정에서 만든 sink와 배치 래퍼 적용 여부
pub struct ConfiguredSink {
    pub sink: Box<dyn Sink>,
    pub batched: bool,
}

/// sink 하나를 생성합니다. 파일 sink는 이 시점에 파일을 엽니다.
pub async fn build_sink(spec: &SinkSpec) -> Result<ConfiguredSink> {
    let sink: Box<dyn Sink> = match spec.kind {
        SinkKind::Console => {
            let mut sink = ConsoleSink::stdout(&spec.name);
            if let Some(level) = spec.level {
                sink = sink.with_level(level);
            }
            Box::new(sink)
        }
        SinkKind::File => {
            let path = spec
                .path
                .as_deref()
                .with_context(|| format!("sink '{}' requires a path", spec.name))?;
            let mut sink = FileSink::open(&spec.name, path)
                .await
                .with_context(|| format!("failed to open file sink '{}'", spec.name))?;
            if let Some(level) = spec.level {
                sink = sink.with_level(level);
            }
            Box::new(sink)
        }
        SinkKind::Webhook => {
            let url = spec
                .url
                .as_deref()
                .with_context(|| format!("sink '{}' requires a url", spec.name))?;
            let mut sink = WebhookSink::new(&spec.name, url)
                .with_context(|| format!("failed to create webhook sink '{}'", spec.name))?;
            if let Some(level) = spec.level {
                sink = sink.with_level(level);
            }
            Box::new(sink)
        }
    };

    tracing::debug!(sink = %spec.name, kind = ?spec.kind, batched = spec.batched, "sink built");
    Ok(ConfiguredSink {
        sink,
        batched: spec.batched,
    })
}

/// 모든 sink를 생성해 빌더에 등록합니다.
///
/// 설정에 sink가 없으면 콘솔 sink 하나를 사용합니다.
pub async fn register_sinks(
    mut builder: PipelineEngineBuilder,
    specs: &[SinkSpec],
) -> Result<PipelineEngineBuilder> {
    if specs.is_empty() {
        tracing::warn!("no sinks configured, using stdout console sink");
        return Ok(builder.sink(ConsoleSink::stdout("stdout")));
    }

    for spec in specs {
        let configured = build_sink(spec).await?;
        builder = if configured.batched {
            builder.batched_sink(configured.sink)
        } else {
            builder.sink(configured.sink)
        };
    }
    Ok(builder)
}
