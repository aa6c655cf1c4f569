//! 菜单中的下载流程：读取链接、询问保存位置并启动批次。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::read_line;
use crate::download::models::DownloadJob;
use crate::download::plan::{BatchPlan, EMPTY_INPUT_MSG, PlannedDownload, SaveTarget, default_file_name};
use crate::ui::Session;

pub(super) fn download_menu(session: &Session) -> Result<()> {
    let urls = read_urls()?;
    match urls.len() {
        0 => println!("{EMPTY_INPUT_MSG}"),
        1 => download_single(session, &urls[0])?,
        _ => download_many(session, &urls)?,
    }
    Ok(())
}

/// 逐行读取链接，空行或 EOF 结束。
fn read_urls() -> Result<Vec<String>> {
    println!("请输入资源页面的网址（每个网址一行），输入空行结束:");
    let mut urls = Vec::new();
    while let Some(line) = read_line("")? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        urls.push(line.to_string());
    }
    Ok(urls)
}

fn download_many(session: &Session, urls: &[String]) -> Result<()> {
    println!("您选择了多个链接，将在指定的文件夹中使用教材名称作为文件名进行下载。");
    let default_dir = session.config.default_save_dir();
    let input = read_line(&format!(
        "请输入保存文件夹路径（默认：{}）: ",
        default_dir.display()
    ))?
    .unwrap_or_default();
    let dir = match input.trim() {
        "" => default_dir,
        p => PathBuf::from(p),
    };
    fs::create_dir_all(&dir).with_context(|| format!("创建目录失败: {}", dir.display()))?;
    session.download(urls, &SaveTarget::Directory(dir))?;
    Ok(())
}

fn download_single(session: &Session, url: &str) -> Result<()> {
    let resolver = session.resolver()?;
    let resource = match resolver.resolve(url) {
        Ok(resource) => resource,
        Err(err) => {
            println!("解析失败: {err}");
            println!("以下链接无法解析:\n{url}");
            return Ok(());
        }
    };

    let file_name = default_file_name(resource.title.as_deref());
    let input = read_line(&format!("请输入保存路径（默认文件名为: {file_name}）: "))?
        .unwrap_or_default();
    let destination = single_destination(input.trim(), &session.config.default_save_dir(), &file_name);

    let plan = BatchPlan {
        downloads: vec![PlannedDownload {
            job: DownloadJob {
                source_url: resource.file_url.clone(),
                destination,
            },
            resource,
        }],
        unresolved: Vec::new(),
    };
    session.run_plan(plan)?;
    Ok(())
}

/// 留空用默认目录；输入已存在的目录时在其中使用默认文件名。
fn single_destination(input: &str, default_dir: &Path, file_name: &str) -> PathBuf {
    if input.is_empty() {
        return default_dir.join(file_name);
    }
    let path = PathBuf::from(input);
    if path.is_dir() {
        path.join(file_name)
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_destination_variants() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            single_destination("", dir.path(), "书.pdf"),
            dir.path().join("书.pdf")
        );
        let as_dir = dir.path().to_string_lossy().to_string();
        assert_eq!(
            single_destination(&as_dir, Path::new("ignored"), "书.pdf"),
            dir.path().join("书.pdf")
        );
        assert_eq!(
            single_destination("out/my.pdf", dir.path(), "书.pdf"),
            PathBuf::from("out/my.pdf")
        );
    }
}
