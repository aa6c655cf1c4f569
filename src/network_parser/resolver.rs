//! 资源解析：页面链接 → PDF 直链与标题。
//!
//! 流程：
//! 1. 从链接提取 contentId / contentType；
//! 2. 按链接类型选择详情接口（特殊教育资源 / 教材）；
//! 3. 在 `ti_items` 中找第一个 pdf 条目，取其第一个存储地址；
//! 4. 专题课程找不到时回退到课程资源列表中的文档资源。

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::identifiers::{DEFAULT_CONTENT_TYPE, ParsedIdentifiers, extract_identifiers};
use super::network::{Endpoints, FetchError, JsonSource};

const BASIC_WORK_MARKER: &str = "syncClassroom/basicWork/detail";
const PDF_FORMAT: &str = "pdf";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("链接中缺少 contentId 参数")]
    MissingContentId,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("解析 {url} 的响应失败: {source}")]
    Schema {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("资源 {content_id} 中未找到 PDF 文件")]
    NoDocument { content_id: String },
    #[error("资源 {content_id} 的 PDF 条目没有下载地址")]
    NoStorage { content_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub file_url: String,
    pub content_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceDetails {
    ti_items: Vec<TiItem>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TiItem {
    #[serde(default)]
    lc_ti_format: Option<String>,
    #[serde(default)]
    ti_storages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CourseResource {
    #[serde(default)]
    resource_type_code: Option<String>,
    #[serde(default)]
    ti_items: Vec<TiItem>,
}

enum PdfLookup {
    Found(String),
    Missing,
    NoStorage,
}

fn find_pdf(items: &[TiItem]) -> PdfLookup {
    let Some(item) = items
        .iter()
        .find(|i| i.lc_ti_format.as_deref() == Some(PDF_FORMAT))
    else {
        return PdfLookup::Missing;
    };
    match item.ti_storages.first() {
        Some(url) => PdfLookup::Found(url.clone()),
        None => PdfLookup::NoStorage,
    }
}

fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, ResolveError> {
    serde_json::from_value(value).map_err(|source| ResolveError::Schema {
        url: url.to_string(),
        source,
    })
}

pub struct ResourceResolver<S> {
    source: S,
    endpoints: Endpoints,
}

impl<S: JsonSource> ResourceResolver<S> {
    pub fn new(source: S, endpoints: Endpoints) -> Self {
        Self { source, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn resolve(&self, url: &str) -> Result<ResolvedResource, ResolveError> {
        let ids = extract_identifiers(url);
        let content_id = ids
            .content_id
            .clone()
            .ok_or(ResolveError::MissingContentId)?;

        let details_url = self.details_url(url, &ids, &content_id);
        debug!("解析资源 {content_id}: {details_url}");
        let details: ResourceDetails = decode(&details_url, self.source.get_json(&details_url)?)?;

        let file_url = match find_pdf(&details.ti_items) {
            PdfLookup::Found(file_url) => file_url,
            PdfLookup::NoStorage => return Err(ResolveError::NoStorage { content_id }),
            PdfLookup::Missing if ids.is_thematic_course() => {
                self.thematic_fallback(&content_id)?
            }
            PdfLookup::Missing => return Err(ResolveError::NoDocument { content_id }),
        };

        info!("已解析资源 {content_id}");
        Ok(ResolvedResource {
            file_url,
            content_id,
            title: details.title,
        })
    }

    fn details_url(&self, url: &str, ids: &ParsedIdentifiers, content_id: &str) -> String {
        if ids.is_thematic_course() {
            self.endpoints.special_edu_details(content_id)
        } else if url.contains(BASIC_WORK_MARKER) {
            // 基础性作业与特殊教育资源共用详情接口
            self.endpoints.special_edu_details(content_id)
        } else {
            self.endpoints.tch_material_details(content_id)
        }
    }

    fn thematic_fallback(&self, content_id: &str) -> Result<String, ResolveError> {
        let list_url = self.endpoints.thematic_course_resources(content_id);
        debug!("专题课程 {content_id} 详情中无 PDF，查询资源列表: {list_url}");
        let resources: Vec<CourseResource> = decode(&list_url, self.source.get_json(&list_url)?)?;

        // 多个文档资源都含 PDF 时取最后一个
        let mut found = None;
        for resource in resources
            .iter()
            .filter(|r| r.resource_type_code.as_deref() == Some(DEFAULT_CONTENT_TYPE))
        {
            match find_pdf(&resource.ti_items) {
                PdfLookup::Found(file_url) => found = Some(file_url),
                PdfLookup::NoStorage => {
                    return Err(ResolveError::NoStorage {
                        content_id: content_id.to_string(),
                    });
                }
                PdfLookup::Missing => {}
            }
        }
        found.ok_or_else(|| ResolveError::NoDocument {
            content_id: content_id.to_string(),
        })
    }
}
