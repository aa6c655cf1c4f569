//! 国家中小学智慧教育平台电子课本下载器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/凭据/格式化等基础设施
//! - `network_parser`：平台接口、链接解析、资源目录
//! - `download`：下载台账、worker 与批量编排
//! - `ui`：子命令与交互式菜单

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod base_system;
mod download;
mod network_parser;
#[cfg(test)]
mod test_support;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::credential::{CredentialStore, FileTokenVault};
use base_system::logging::{LogOptions, LogSystem};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "tchmaterial-downloader", version)]
#[command(about = "国家中小学智慧教育平台电子课本下载器")]
struct Cli {
    /// 启用调试日志输出（同时输出到控制台）
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml、token.yml 和 logs）
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<ui::cli::Command>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("无法获取当前目录")?,
    };
    let _log = init_logging(cli.debug, &data_dir)?;
    info!("当前版本: v{VERSION}，数据目录: {}", data_dir.display());

    let config = load_or_create::<Config>(&data_dir).context("加载配置失败")?;
    let credentials = CredentialStore::load(Arc::new(FileTokenVault::in_dir(&data_dir)));
    let mut session = ui::Session::new(config, credentials);

    match cli.command {
        Some(command) => ui::cli::run(&mut session, command),
        None => ui::noui::run(&session),
    }
}

fn init_logging(debug: bool, base_dir: &std::path::Path) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: debug,
    };
    LogSystem::init(opts, base_dir).context("初始化日志失败")
}
