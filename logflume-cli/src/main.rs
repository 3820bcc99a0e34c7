//! logflume -- 표준 입력의 로그 이벤트를 설정된 파이프라인으로 전송하는 CLI

mod cli;
mod commands;
mod input;
mod logging;
mod sinks;

use anyhow::Result;
use clap::Parser;

use logflume_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let mut config =
                commands::run::load_config(&cli.config, args.allow_missing_config).await?;
            if let Some(level) = cli.log_level {
                config.general.log_level = level;
            }
            logging::init_tracing(&config.general)?;
            tracing::info!(config = %cli.config.display(), "logflume starting");
            commands::run::execute(args, config).await
        }
        Commands::Check(args) => {
            // 검증 대상 설정과 무관하게 기본 형식으로 내부 로그를 출력
            let general = GeneralConfig {
                log_level: cli.log_level.unwrap_or_else(|| "warn".to_owned()),
                ..GeneralConfig::default()
            };
            logging::init_tracing(&general)?;
            commands::check::execute(&cli.config, args).await
        }
    }
}
