//! 逐级浏览电子课本目录，选中课本后直接下载。

use anyhow::Result;

use super::read_line;
use crate::download::plan::SaveTarget;
use crate::network_parser::catalog::CatalogNode;
use crate::ui::Session;

pub(super) fn browse(session: &Session) -> Result<()> {
    println!("正在获取电子课本目录...");
    let roots = session.catalog()?;
    let mut path: Vec<usize> = Vec::new();

    loop {
        let nodes = children_at(&roots, &path);
        println!();
        if let Some(title) = breadcrumb(&roots, &path) {
            println!("===== {title} =====");
        }
        for (idx, node) in nodes.iter().enumerate() {
            let marker = if node.is_book { "[课本] " } else { "" };
            println!("{}. {marker}{}", idx + 1, node.display_name);
        }
        println!("0. {}", if path.is_empty() { "返回主菜单" } else { "返回上级" });

        let Some(input) = read_line("请输入编号: ")? else {
            return Ok(());
        };
        let choice = match input.trim().parse::<usize>() {
            Ok(0) => {
                if path.pop().is_none() {
                    return Ok(());
                }
                continue;
            }
            Ok(n) if n <= nodes.len() => n - 1,
            _ => {
                println!("输入无效");
                continue;
            }
        };

        let node = &nodes[choice];
        match node.page_url() {
            Some(url) => {
                let dir = session.config.default_save_dir();
                println!("下载《{}》到 {}", node.display_name, dir.display());
                session.download(&[url], &SaveTarget::Directory(dir))?;
            }
            None if node.children.is_empty() => println!("该分类下没有课本"),
            None => path.push(choice),
        }
    }
}

fn children_at<'a>(roots: &'a [CatalogNode], path: &[usize]) -> &'a [CatalogNode] {
    let mut nodes = roots;
    for &idx in path {
        match nodes.get(idx) {
            Some(node) => nodes = &node.children,
            None => break,
        }
    }
    nodes
}

fn breadcrumb(roots: &[CatalogNode], path: &[usize]) -> Option<String> {
    let mut nodes = roots;
    let mut names = Vec::new();
    for &idx in path {
        let node = nodes.get(idx)?;
        names.push(node.display_name.as_str());
        nodes = &node.children;
    }
    (!names.is_empty()).then(|| names.join(" / "))
}
