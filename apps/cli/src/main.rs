//! # PSM CLI
//!
//! 器械接合流程的命令行工具。
//!
//! ```bash
//! # 校验配置文件并打印 SI 单位摘要
//! psm-cli check-config configs/psm-tool.toml
//!
//! # 在内存硬件上跑完整的接合流程（ARM_HOMED -> READY）
//! psm-cli simulate --config configs/psm-tool.toml
//!
//! # 输出 JSON 状态快照
//! psm-cli simulate --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckConfigCommand, SimulateCommand};

/// PSM CLI - 器械接合命令行工具
#[derive(Parser, Debug)]
#[command(name = "psm-cli")]
#[command(about = "Command-line interface for PSM instrument engagement", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 校验器械配置文件
    CheckConfig {
        #[command(flatten)]
        args: CheckConfigCommand,
    },

    /// 在模拟硬件上运行接合流程
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    // 日志写到 stderr，stdout 只留给命令输出
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("psm_cli=info".parse()?)
                .add_directive("psm_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { args } => args.execute(),
        Commands::Simulate { args } => args.execute(),
    }
}
