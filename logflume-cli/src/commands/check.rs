//! `logflume check` -- 설정 검증 및 요약 출력

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;

use logflume_core::config::FlumeConfig;
use logflume_pipeline::PipelineConfig;

use crate::cli::{CheckArgs, OutputFormat};

/// 검증 결과
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ConfigSummary>,
}

/// 유효한 설정의 요약
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub min_level: String,
    pub sampling: Option<String>,
    pub redact_paths: Vec<String>,
    pub batch_size: usize,
    pub flush_interval_ms: Option<u64>,
    pub sinks: Vec<SinkSummary>,
}

#[derive(Debug, Serialize)]
pub struct SinkSummary {
    pub name: String,
    pub kind: String,
    pub level: Option<String>,
    pub target: Option<String>,
    pub batched: bool,
}

/// `check` 실행. 설정이 유효하지 않으면 보고서를 출력한 뒤 에러를 반환합니다.
pub async fn execute(config_path: &Path, args: CheckArgs) -> Result<()> {
    tracing::info!(path = %config_path.display(), "validating configuration");

    let report = check(config_path).await;
    let rendered = match args.output {
        OutputFormat::Text => render_text(&report),
        OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
    };
    print!("{rendered}");

    if !report.valid {
        bail!("configuration is invalid");
    }
    Ok(())
}

/// 설정 파일을 로드하고 파이프라인 설정까지 검증합니다.
pub async fn check(config_path: &Path) -> CheckReport {
    let source = config_path.display().to_string();
    let config = match FlumeConfig::load(config_path).await {
        Ok(config) => config,
        Err(e) => {
            return CheckReport {
                source,
                valid: false,
                errors: vec![e.to_string()],
                summary: None,
            };
        }
    };

    let pipeline = PipelineConfig::from_core(&config.pipeline);
    if let Err(e) = pipeline.validate() {
        return CheckReport {
            source,
            valid: false,
            errors: vec![e.to_string()],
            summary: None,
        };
    }

    CheckReport {
        source,
        valid: true,
        errors: Vec::new(),
        summary: Some(summarize(&config, &pipeline)),
    }
}

fn summarize(config: &FlumeConfig, pipeline: &PipelineConfig) -> ConfigSummary {
    let sinks = config
        .sinks
        .iter()
        .map(|spec| SinkSummary {
            name: spec.name.clone(),
            kind: format!("{:?}", spec.kind).to_lowercase(),
            level: spec.level.map(|l| l.to_string()),
            target: spec.path.clone().or_else(|| spec.url.clone()),
            batched: spec.batched,
        })
        .collect();

    ConfigSummary {
        min_level: pipeline.min_level.to_string(),
        sampling: pipeline
            .sampling
            .map(|s| format!("{} per {}ms", s.max_per_window, s.window_ms)),
        redact_paths: pipeline.redact_paths.clone(),
        batch_size: pipeline.batch.batch_size,
        flush_interval_ms: pipeline.batch.flush_interval_ms,
        sinks,
    }
}

fn render_text(report: &CheckReport) -> String {
    let mut out = String::new();
    let status = if report.valid { "valid" } else { "invalid" };
    let _ = writeln!(out, "{}: {status}", report.source);
    for error in &report.errors {
        let _ = writeln!(out, "  error: {error}");
    }

    let Some(summary) = &report.summary else {
        return out;
    };
    let _ = writeln!(out, "  min_level: {}", summary.min_level);
    let _ = writeln!(
        out,
        "  sampling: {}",
        summary.sampling.as_deref().unwrap_or("disabled")
    );
    if !summary.redact_paths.is_empty() {
        let _ = writeln!(out, "  redact: {}", summary.redact_paths.join(", "));
    }
    let flush = summary
        .flush_interval_ms
        .map_or_else(|| "size only".to_owned(), |ms| format!("every {ms}ms"));
    let _ = writeln!(out, "  batch: {} records, {flush}", summary.batch_size);
    let _ = writeln!(out, "  sinks: {}", summary.sinks.len());
    for sink in &summary.sinks {
        let _ = writeln!(
            out,
            "    - {} ({}{}{}){}",
            sink.name,
            sink.kind,
            sink.level
                .as_deref()
                .map(|l| format!(", level>={l}"))
                .unwrap_or_default(),
            if sink.batched { ", batched" } else { "" },
            sink.target
                .as_deref()
                .map(|t| format!(" -> {t}"))
                .unwrap_or_default(),
        );
    }
    out
}
