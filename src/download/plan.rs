//! 下载计划：解析所有链接并为每个资源分配保存路径。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::models::DownloadJob;
use crate::base_system::context::safe_fs_name;
use crate::network_parser::network::JsonSource;
use crate::network_parser::resolver::{ResolvedResource, ResourceResolver};

pub const EMPTY_INPUT_MSG: &str = "未提供任何有效的下载链接";
const DEFAULT_STEM: &str = "download";
const MAX_STEM_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// 多个资源：以标题命名，保存到该目录。
    Directory(PathBuf),
    /// 单个资源：保存为指定文件。
    File(PathBuf),
}

impl SaveTarget {
    /// 多个链接或已存在的目录按目录处理，否则视为文件路径。
    pub fn infer(path: &Path, url_count: usize) -> Self {
        if url_count > 1 || path.is_dir() {
            Self::Directory(path.to_path_buf())
        } else {
            Self::File(path.to_path_buf())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDownload {
    pub resource: ResolvedResource,
    pub job: DownloadJob,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub downloads: Vec<PlannedDownload>,
    pub unresolved: Vec<String>,
}

impl BatchPlan {
    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.downloads.iter().map(|d| d.job.clone()).collect()
    }

    pub fn unresolved_message(&self) -> Option<String> {
        (!self.unresolved.is_empty())
            .then(|| format!("以下链接无法解析:\n{}", self.unresolved.join(", ")))
    }
}

/// `{safe(title)}.pdf`, or `download.pdf` when there is no usable title.
pub fn default_file_name(title: Option<&str>) -> String {
    let stem = match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => safe_fs_name(title, "_", MAX_STEM_LEN),
        None => DEFAULT_STEM.to_string(),
    };
    format!("{stem}.pdf")
}

/// Hands out file names unique within one batch: `a.pdf`, `a (2).pdf`, ...
#[derive(Default)]
struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    fn claim(&mut self, file_name: &str) -> String {
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (file_name, String::new()),
        };
        let mut candidate = file_name.to_string();
        let mut n = 2;
        while !self.used.insert(candidate.to_lowercase()) {
            candidate = format!("{stem} ({n}){ext}");
            n += 1;
        }
        candidate
    }
}

/// Resolves every URL and assigns destinations; unresolvable URLs are collected.
pub fn plan_batch<S: JsonSource>(
    resolver: &ResourceResolver<S>,
    urls: &[String],
    target: &SaveTarget,
) -> BatchPlan {
    let mut plan = BatchPlan::default();
    let mut names = NameAllocator::default();
    let mut file_target_used = false;

    for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        let resource = match resolver.resolve(url) {
            Ok(resource) => resource,
            Err(err) => {
                warn!("解析失败 {url}: {err}");
                plan.unresolved.push(url.to_string());
                continue;
            }
        };

        let destination = match target {
            SaveTarget::File(path) if !file_target_used => {
                file_target_used = true;
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.claim(name);
                }
                path.clone()
            }
            SaveTarget::File(path) => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                dir.join(names.claim(&default_file_name(resource.title.as_deref())))
            }
            SaveTarget::Directory(dir) => {
                dir.join(names.claim(&default_file_name(resource.title.as_deref())))
            }
        };

        plan.downloads.push(PlannedDownload {
            job: DownloadJob {
                source_url: resource.file_url.clone(),
                destination,
            },
            resource,
        });
    }
    plan
}
