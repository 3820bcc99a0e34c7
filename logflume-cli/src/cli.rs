//! CLI 인자 정의 (clap derive)
//!
//! 선언만 있으며 I/O는 하지 않습니다.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// logflume -- 구조화 로그 파이프라인
///
/// 표준 입력의 로그 이벤트를 설정된 파이프라인으로 흘려보냅니다.
#[derive(Parser, Debug)]
#[command(name = "logflume", version, about, long_about = None)]
pub struct Cli {
    /// logflume.toml 설정 파일 경로
    #[arg(short, long, default_value = "logflume.toml")]
    pub config: PathBuf,

    /// 내부 로그 레벨 오버라이드 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 표준 입력의 각 줄을 파이프라인으로 전송합니다.
    Run(RunArgs),

    /// 설정 파일을 검증하고 요약을 출력합니다.
    Check(CheckArgs),
}

/// `run` 인자
#[derive(Args, Debug)]
pub struct RunArgs {
    /// 레코드에 바인딩할 스코프 이름
    #[arg(long, default_value = "stdin")]
    pub scope: String,

    /// 설정 파일이 없으면 기본 설정(콘솔 sink)으로 실행합니다.
    #[arg(long)]
    pub allow_missing_config: bool,
}

/// `check` 인자
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// 출력 형식
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,
}

/// 출력 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// 사람이 읽는 텍스트
    Text,
    /// JSON
    Json,
}
