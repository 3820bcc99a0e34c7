//! `logflume run` -- 표준 입력을 파이프라인으로 전송

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use logflume_core::config::FlumeConfig;
use logflume_core::error::{ConfigError, FlumeError};
use logflume_core::scope::Scope;
use logflume_pipeline::{PipelineConfig, PipelineEngine, PipelineEngineBuilder};

use crate::cli::RunArgs;
use crate::input::parse_line;
use crate::sinks::register_sinks;

/// 입력 처리 결과
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// 읽은 줄 수 (빈 줄 포함)
    pub lines: u64,
    /// 파이프라인을 통과한 레코드 수
    pub accepted: u64,
}

/// 설정을 로드합니다.
///
/// `allow_missing`이면 파일이 없을 때 기본 설정을 사용합니다.
pub async fn load_config(path: &Path, allow_missing: bool) -> Result<FlumeConfig> {
    match FlumeConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(FlumeError::Config(ConfigError::FileNotFound { .. })) if allow_missing => {
            let mut config = FlumeConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e).with_context(|| format!("failed to load {}", path.display())),
    }
}

/// 설정으로 엔진을 생성합니다.
pub async fn build_engine(config: &FlumeConfig) -> Result<PipelineEngine> {
    let pipeline = PipelineConfig::from_core(&config.pipeline);
    let builder = PipelineEngineBuilder::new().config(pipeline);
    let engine = register_sinks(builder, &config.sinks)
        .await?
        .build()
        .context("failed to build pipeline")?;
    Ok(engine)
}

/// `run` 실행
///
/// EOF 또는 Ctrl-C까지 읽은 뒤 엔진을 닫습니다.
pub async fn execute(args: RunArgs, config: FlumeConfig) -> Result<()> {
    let mut engine = build_engine(&config).await?;
    let scope = Scope::root(args.scope);
    tracing::info!(sinks = ?engine.sink_names(), stages = ?engine.stage_names(), "logflume running");

    let reader = BufReader::new(tokio::io::stdin());
    let outcome = tokio::select! {
        result = pump(&mut engine, &scope, reader) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(RunSummary::default())
        }
    };

    let closed = engine.close().await;
    let summary = outcome?;
    tracing::info!(
        lines = summary.lines,
        accepted = summary.accepted,
        emitted = engine.emitted_count(),
        dropped = engine.dropped_count(),
        "logflume finished"
    );
    closed.context("failed to close pipeline")?;
    Ok(())
}

/// 입력의 각 줄을 엔진으로 보냅니다.
///
/// sink 큐가 가득 차면 자리가 날 때까지 입력 읽기를 멈춥니다.
pub async fn pump<R>(engine: &mut PipelineEngine, scope: &Scope, reader: R) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = RunSummary::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        summary.lines += 1;
        let Some(event) = parse_line(&line) else {
            continue;
        };
        if engine
            .log_wait(scope, event.level, event.message, event.meta)
            .await
        {
            summary.accepted += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflume_core::types::Level;
    use logflume_pipeline::PipelineConfigBuilder;
    use logflume_pipeline::sink::ChannelSink;
    use serde_json::json;

    #[tokio::test]
    async fn pump_sends_parsed_lines() {
        let (sink, mut rx) = ChannelSink::new("bus", 16);
        let config = PipelineConfigBuilder::new()
            .min_level(Level::INFO)
            .build()
            .unwrap();
        let mut engine = PipelineEngineBuilder::new()
            .config(config)
            .sink(sink)
            .build()
            .unwrap();
        let scope = Scope::root("stdin");

        let input: &[u8] = b"plain text\n\n{\"level\":\"debug\",\"message\":\"hidden\"}\n{\"level\":\"error\",\"message\":\"boom\",\"code\":7}\n";
        let summary = pump(&mut engine, &scope, input).await.unwrap();
        engine.close().await.unwrap();

        assert_eq!(summary.lines, 4);
        assert_eq!(summary.accepted, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.message(), "plain text");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level(), Level::ERROR);
        assert_eq!(second.meta["code"], json!(7));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pump_waits_for_slow_sink_instead_of_dropping() {
        let (sink, mut rx) = ChannelSink::new("bus", 64);
        let config = PipelineConfigBuilder::new()
            .sink_queue_capacity(1)
            .build()
            .unwrap();
        let mut engine = PipelineEngineBuilder::new()
            .config(config)
            .sink(sink)
            .build()
            .unwrap();
        let scope = Scope::root("stdin");

        let input: String = (0..32).map(|i| format!("line {i}\n")).collect();
        let summary = pump(&mut engine, &scope, input.as_bytes()).await.unwrap();
        engine.close().await.unwrap();

        assert_eq!(summary.accepted, 32);
        let mut received = 0;
        while let Some(record) = rx.recv().await {
            assert_eq!(record.message(), format!("line {received}"));
            received += 1;
        }
        assert_eq!(received, 32);
        assert_eq!(engine.dropped_count(), 0);
    }

    #[tokio::test]
    async fn missing_config_is_an_error_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(load_config(&path, false).await.is_err());
        let config = load_config(&path, true).await.unwrap();
        assert!(config.sinks.is_empty());
    }

    #[tokio::test]
    async fn build_engine_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let config_path = dir.path().join("logflume.toml");
        let toml = format!(
            "[pipeline]\nredact_paths = [\"password\"]\nsample_max_per_window = 5\n\n\
             [[sinks]]\nname = \"file\"\nkind = \"file\"\npath = \"{}\"\nbatched = true\n",
            log_path.display()
        );
        tokio::fs::write(&config_path, toml).await.unwrap();

        let config = load_config(&config_path, false).await.unwrap();
        let mut engine = build_engine(&config).await.unwrap();
        assert_eq!(engine.sink_names(), vec!["file"]);
        assert_eq!(engine.stage_names(), vec!["sampling", "redact"]);

        let scope = Scope::root("test");
        let mut meta = logflume_core::record::Fields::new();
        meta.insert("password".to_owned(), json!("hunter2"));
        assert!(engine.log(&scope, Level::INFO, "login", meta));
        engine.close().await.unwrap();

        let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(contents.contains("[REDACTED]"));
        assert!(!contents.contains("hunter2"));
    }
}
