//! 子命令处理。

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::{Session, mask_token};
use crate::download::plan::SaveTarget;
use crate::network_parser::catalog::render_tree;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 解析资源页面链接并下载 PDF
    Download(DownloadArgs),
    /// 管理 Access Token
    #[command(subcommand)]
    Token(TokenCommand),
    /// 显示电子课本目录
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// 资源页面链接；留空时从标准输入逐行读取
    pub urls: Vec<String>,

    /// 保存位置：多个链接时为目录，单个链接时可为文件路径
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 401 后刷新 token 并重试一次
    #[arg(long, default_value_t = false)]
    pub retry_after_refresh: bool,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// 保存新的 Access Token
    Set { token: String },
    /// 显示当前 Access Token（掩码）
    Show,
    /// 删除已保存的 Access Token
    Clear,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// 最多显示的层级数
    #[arg(long)]
    pub depth: Option<usize>,
}

pub fn run(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Download(args) => download(session, args),
        Command::Token(cmd) => token(session, cmd),
        Command::Catalog(args) => catalog(session, args),
    }
}

fn download(session: &mut Session, args: DownloadArgs) -> Result<()> {
    let urls = if args.urls.is_empty() {
        read_urls(io::stdin().lock())?
    } else {
        args.urls
    };
    if args.retry_after_refresh {
        session.config.retry_after_refresh = true;
    }

    let target = match args.output {
        Some(path) => SaveTarget::infer(&path, urls.len()),
        None => SaveTarget::Directory(session.config.default_save_dir()),
    };
    let summary = session.download(&urls, &target)?;
    if let Some(summary) = summary
        && !summary.all_succeeded()
    {
        anyhow::bail!("{} 个文件下载失败", summary.failed_urls.len());
    }
    Ok(())
}

fn token(session: &Session, cmd: TokenCommand) -> Result<()> {
    match cmd {
        TokenCommand::Set { token } => {
            session
                .credentials
                .refresh(&token)
                .context("保存 Access Token 失败")?;
            println!("Access Token 已保存！");
        }
        TokenCommand::Show => match session.credentials.token() {
            Some(token) => println!("当前 Access Token: {}", mask_token(&token)),
            None => println!("尚未设置 Access Token"),
        },
        TokenCommand::Clear => {
            session
                .credentials
                .clear()
                .context("删除 Access Token 失败")?;
            println!("已删除保存的 Access Token");
        }
    }
    Ok(())
}

fn catalog(session: &Session, args: CatalogArgs) -> Result<()> {
    let roots = session.catalog()?;
    for line in render_tree(&roots, args.depth) {
        println!("{line}");
    }
    Ok(())
}

/// 非空行即一个链接，读到 EOF 为止。
fn read_urls(reader: impl BufRead) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line.context("读取标准输入失败")?;
        let line = line.trim();
        if !line.is_empty() {
            urls.push(line.to_string());
        }
    }
    Ok(urls)
}
