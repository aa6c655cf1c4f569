//! 电子课本目录：标签层级 + 课本列表 → 树。

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::network::{Endpoints, FetchError, JsonSource};

const BOOK_PAGE: &str = "https://basic.smartedu.cn/tchMaterial/detail";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("解析 {url} 的响应失败: {source}")]
    Schema {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogNode {
    pub id: String,
    pub display_name: String,
    pub is_book: bool,
    pub children: Vec<CatalogNode>,
}

impl CatalogNode {
    fn tag(id: String, display_name: String, children: Vec<CatalogNode>) -> Self {
        Self {
            id,
            display_name,
            is_book: false,
            children,
        }
    }

    /// 课本详情页链接，可直接交给下载命令。
    pub fn page_url(&self) -> Option<String> {
        self.is_book.then(|| {
            format!(
                "{BOOK_PAGE}?contentType=assets_document&contentId={}",
                self.id
            )
        })
    }

    pub fn book_count(&self) -> usize {
        usize::from(self.is_book) + self.children.iter().map(Self::book_count).sum::<usize>()
    }

    fn child_index(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|c| c.id == id)
    }
}

/// Inserts `node`, replacing an existing entry with the same id in place.
fn upsert(nodes: &mut Vec<CatalogNode>, node: CatalogNode) {
    match nodes.iter_mut().find(|n| n.id == node.id) {
        Some(existing) => *existing = node,
        None => nodes.push(node),
    }
}

#[derive(Debug, Deserialize)]
struct TagDocument {
    #[serde(default)]
    hierarchies: Option<Vec<Hierarchy>>,
}

#[derive(Debug, Deserialize)]
struct Hierarchy {
    #[serde(default)]
    children: Vec<TagChild>,
}

#[derive(Debug, Deserialize)]
struct TagChild {
    tag_id: String,
    tag_name: String,
    #[serde(default)]
    hierarchies: Option<Vec<Hierarchy>>,
}

#[derive(Debug, Deserialize)]
struct DataVersion {
    urls: String,
}

#[derive(Debug, Deserialize)]
struct BookRecord {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tag_paths: Vec<String>,
}

impl BookRecord {
    fn display_name(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("(未知电子课本 {})", self.id))
    }
}

fn parse_hierarchy(hierarchies: Option<&[Hierarchy]>) -> Vec<CatalogNode> {
    let mut nodes = Vec::new();
    for h in hierarchies.unwrap_or_default() {
        for ch in &h.children {
            let children = parse_hierarchy(ch.hierarchies.as_deref());
            upsert(
                &mut nodes,
                CatalogNode::tag(ch.tag_id.clone(), ch.tag_name.clone(), children),
            );
        }
    }
    nodes
}

/// Hangs `book` under the node its first tag path leads to.
///
/// Returns `false` when the path does not match the tag tree.
fn attach_book(roots: &mut [CatalogNode], book: &BookRecord) -> bool {
    let Some(path) = book.tag_paths.first() else {
        return false;
    };
    // 前两段为“教材”“电子教材”，第二段即根节点
    let segments: Vec<&str> = path.split('/').collect();
    let Some(root_id) = segments.get(1) else {
        return false;
    };
    let rest = segments.get(2..).unwrap_or_default();
    let Some(mut node) = roots.iter_mut().find(|n| n.id == *root_id) else {
        return false;
    };
    match rest.first() {
        Some(first) if node.child_index(first).is_some() => {}
        _ => return false,
    }

    for seg in rest {
        if let Some(i) = node.child_index(seg) {
            node = &mut node.children[i];
        }
    }

    upsert(
        &mut node.children,
        CatalogNode {
            id: book.id.clone(),
            display_name: book.display_name(),
            is_book: true,
            children: Vec::new(),
        },
    );
    true
}

fn fetch<T: DeserializeOwned>(source: &impl JsonSource, url: &str) -> Result<T, CatalogError> {
    let value: Value = source.get_json(url)?;
    serde_json::from_value(value).map_err(|source| CatalogError::Schema {
        url: url.to_string(),
        source,
    })
}

pub fn fetch_book_catalog(
    source: &impl JsonSource,
    endpoints: &Endpoints,
) -> Result<Vec<CatalogNode>, CatalogError> {
    let tags: TagDocument = fetch(source, &endpoints.tch_material_tags())?;
    let mut roots = parse_hierarchy(tags.hierarchies.as_deref());

    let version: DataVersion = fetch(source, &endpoints.tch_material_data_version())?;
    let mut attached = 0usize;
    let mut skipped = 0usize;
    for list_url in version.urls.split(',').map(str::trim).filter(|u| !u.is_empty()) {
        let books: Vec<BookRecord> = match fetch(source, list_url) {
            Ok(books) => books,
            Err(err) => {
                warn!("获取课本列表失败，已跳过: {err}");
                continue;
            }
        };
        for book in &books {
            if attach_book(&mut roots, book) {
                attached += 1;
            } else {
                skipped += 1;
            }
        }
    }
    debug!("课本目录: 挂载 {attached} 本，跳过 {skipped} 条");
    info!("已获取电子课本目录，共 {attached} 本");
    Ok(roots)
}

/// Renders the tree as indented lines; `max_depth` of `None` shows everything.
pub fn render_tree(nodes: &[CatalogNode], max_depth: Option<usize>) -> Vec<String> {
    let mut lines = Vec::new();
    render_into(nodes, 0, max_depth, &mut lines);
    lines
}

fn render_into(nodes: &[CatalogNode], depth: usize, max_depth: Option<usize>, out: &mut Vec<String>) {
    if max_depth.is_some_and(|max| depth >= max) {
        return;
    }
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node.page_url() {
            Some(url) => out.push(format!("{indent}- {}  {url}", node.display_name)),
            None => out.push(format!(
                "{indent}+ {} ({} 本)",
                node.display_name,
                node.book_count()
            )),
        }
        render_into(&node.children, depth + 1, max_depth, out);
    }
}
