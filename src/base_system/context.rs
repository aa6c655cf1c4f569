//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

pub const DEFAULT_API_BASE: &str = "https://s-file-1.ykt.cbern.com.cn";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 保存配置
    #[serde(default)]
    pub save_path: String,

    // 网络配置
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub download_timeout: u64,

    // 下载配置
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default = "default_false")]
    pub retry_after_refresh: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            api_base: default_api_base(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            download_timeout: 0,
            max_workers: 0,
            retry_after_refresh: default_false(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 7] = [
            FieldMeta {
                name: "save_path",
                description: "默认保存目录（留空表示当前目录）",
            },
            FieldMeta {
                name: "api_base",
                description: "资源接口地址",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "连接超时时间（秒）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "解析请求超时时间（秒）",
            },
            FieldMeta {
                name: "download_timeout",
                description: "单个文件下载的总超时时间（秒），0 表示不限制",
            },
            FieldMeta {
                name: "max_workers",
                description: "同时下载的最大文件数，0 表示全部同时开始",
            },
            FieldMeta {
                name: "retry_after_refresh",
                description: "授权失败并重新设置 Access Token 后，是否自动重新下载该文件",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(self.save_path.trim())
        }
    }

    pub fn api_base(&self) -> &str {
        let base = self.api_base.trim().trim_end_matches('/');
        if base.is_empty() {
            DEFAULT_API_BASE
        } else {
            base
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        (self.download_timeout > 0).then(|| Duration::from_secs(self.download_timeout))
    }

    pub fn worker_limit(&self) -> Option<usize> {
        (self.max_workers > 0).then_some(self.max_workers)
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '"' => '＂',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    trim_trailing(&mut cleaned);

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.insert(0, '_');
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
        trim_trailing(&mut cleaned);
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }
    cleaned
}

fn trim_trailing(s: &mut String) {
    while s.ends_with(' ') || s.ends_with('.') {
        s.pop();
    }
}

fn default_false() -> bool {
    false
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}
