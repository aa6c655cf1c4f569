//! 交互式文本菜单。
//!
//! 使用标准输入输出进行交互；所有提示都在这里，核心流程只接收结构化参数。

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use tracing::warn;

use super::Session;
use crate::base_system::credential::{CredentialStore, TokenRefresher};

mod catalog;
mod download;

pub fn run(session: &Session) -> Result<()> {
    println!(
        "欢迎使用电子课本下载器 v{}\n\
支持国家中小学智慧教育平台的电子课本、基础性作业与专题课程资源。",
        env!("CARGO_PKG_VERSION")
    );

    loop {
        println!(
            "\n1. 下载资源\n\
2. 设置 Access Token\n\
3. 浏览资源目录\n\
4. 退出"
        );
        let Some(choice) = read_line("请选择操作: ")? else {
            break;
        };
        match choice.trim() {
            "1" => {
                if let Err(err) = download::download_menu(session) {
                    println!("下载失败: {err:#}");
                }
            }
            "2" => set_token_menu(&session.credentials)?,
            "3" => {
                if let Err(err) = catalog::browse(session) {
                    println!("{err:#}");
                }
            }
            "4" | "q" | "Q" => break,
            "" => continue,
            other => println!("无效的选项: {other}"),
        }
    }
    println!("已退出。");
    Ok(())
}

fn set_token_menu(credentials: &CredentialStore) -> Result<()> {
    let Some(input) = read_line("请输入 Access Token: ")? else {
        return Ok(());
    };
    let token = input.trim();
    if token.is_empty() {
        println!("请输入有效的 Access Token！");
        return Ok(());
    }
    match credentials.refresh(token) {
        Ok(()) => println!("Access Token 已保存！"),
        Err(err) => println!("保存 Access Token 失败: {err}"),
    }
    Ok(())
}

/// Reads one line; `None` on EOF.
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut line = String::new();
    let n = io::stdin().lock().read_line(&mut line)?;
    Ok((n > 0).then_some(line))
}

/// 401 时在终端提示输入新 token。
///
/// 多个 worker 同时遇到 401 时只提示一次：进入锁后若 token 已被其他 worker
/// 更新（generation 变化）则直接返回成功。
#[derive(Default)]
pub struct PromptRefresher {
    prompting: Mutex<()>,
}

impl TokenRefresher for PromptRefresher {
    fn refresh(&self, store: &CredentialStore, seen_generation: u64) -> bool {
        let _guard = self.prompting.lock().unwrap_or_else(PoisonError::into_inner);
        if store.generation() != seen_generation {
            return true;
        }
        if !io::stdin().is_terminal() {
            warn!("授权失败，标准输入不是终端，无法提示输入 Access Token");
            return false;
        }

        let input = match read_line("请输入新的 Access Token（留空跳过）: ") {
            Ok(Some(input)) => input,
            Ok(None) => return false,
            Err(err) => {
                warn!("读取 Access Token 失败: {err}");
                return false;
            }
        };
        let token = input.trim();
        if token.is_empty() {
            return false;
        }
        match store.refresh(token) {
            Ok(()) => {
                println!("Access Token 已保存！");
                true
            }
            Err(err) => {
                warn!("保存 Access Token 失败: {err}");
                // 内存中的 token 已更新，本次运行仍可使用
                store.generation() != seen_generation
            }
        }
    }
}
