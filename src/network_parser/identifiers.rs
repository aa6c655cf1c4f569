//! 从资源页面链接中提取 contentId 与 contentType。
//!
//! 只做简单的字符串切分，不做 URL 解码。

pub const DEFAULT_CONTENT_TYPE: &str = "assets_document";
pub const THEMATIC_COURSE: &str = "thematic_course";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifiers {
    pub content_id: Option<String>,
    pub content_type: String,
}

impl ParsedIdentifiers {
    pub fn is_thematic_course(&self) -> bool {
        self.content_type == THEMATIC_COURSE
    }
}

pub fn extract_identifiers(url: &str) -> ParsedIdentifiers {
    let query = query_part(url);
    let content_id = query_value(query, "contentId")
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let content_type = query_value(query, "contentType")
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    ParsedIdentifiers {
        content_id,
        content_type,
    }
}

/// Everything after the first `?`, or the whole input when there is none.
fn query_part(url: &str) -> &str {
    url.split_once('?').map_or(url, |(_, q)| q)
}

fn query_value<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}
