//! 平台 HTTP 客户端：接口地址、鉴权头与 JSON 请求。

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::base_system::context::Config;
use crate::base_system::credential::{AUTH_HEADER, CredentialStore};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("请求 {url} 失败: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("请求 {url} 返回状态码 {status}")]
    Status { url: String, status: u16 },
}

/// Anything that can answer a GET with a JSON document.
pub trait JsonSource: Send + Sync {
    fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

impl<T: JsonSource + ?Sized> JsonSource for &T {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        (**self).get_json(url)
    }
}

/// Endpoint templates of the resource API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_base())
    }

    pub fn special_edu_details(&self, content_id: &str) -> String {
        format!(
            "{}/zxx/ndrs/special_edu/resources/details/{content_id}.json",
            self.base
        )
    }

    pub fn tch_material_details(&self, content_id: &str) -> String {
        format!(
            "{}/zxx/ndrv2/resources/tch_material/details/{content_id}.json",
            self.base
        )
    }

    pub fn thematic_course_resources(&self, content_id: &str) -> String {
        format!(
            "{}/zxx/ndrs/special_edu/thematic_course/{content_id}/resources/list.json",
            self.base
        )
    }

    pub fn tch_material_tags(&self) -> String {
        format!("{}/zxx/ndrs/tags/tch_material_tag.json", self.base)
    }

    pub fn tch_material_data_version(&self) -> String {
        format!(
            "{}/zxx/ndrs/resources/tch_material/version/data_version.json",
            self.base
        )
    }
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers
}

/// Client for resolver and catalog lookups. System proxies are bypassed.
pub fn api_client(config: &Config) -> reqwest::Result<Client> {
    Client::builder()
        .default_headers(base_headers())
        .no_proxy()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()
}

/// Client for file transfers: bounded connect, optional overall timeout.
pub fn download_client(config: &Config) -> reqwest::Result<Client> {
    Client::builder()
        .default_headers(base_headers())
        .no_proxy()
        .connect_timeout(config.connect_timeout())
        .timeout(config.download_timeout())
        .build()
}

pub struct PlatformClient {
    client: Client,
    credentials: CredentialStore,
}

impl PlatformClient {
    pub fn new(client: Client, credentials: CredentialStore) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

impl JsonSource for PlatformClient {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!("请求接口: {url}");
        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(AUTH_HEADER, self.credentials.header_value())
            .send()
            .map_err(http_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json::<Value>().map_err(http_err)
    }
}
