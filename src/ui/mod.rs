//! 交互层入口。
//!
//! `cli` 处理子命令，`noui` 为交互式文本菜单；两者共用 [`Session`]。

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::base_system::context::Config;
use crate::base_system::credential::{CredentialStore, NoRefresh, TokenRefresher};
use crate::download::downloader::BatchDownloader;
use crate::download::models::BatchSummary;
use crate::download::plan::{BatchPlan, EMPTY_INPUT_MSG, SaveTarget, plan_batch};
use crate::download::progress::ConsoleProgress;
use crate::network_parser::catalog::{CatalogNode, fetch_book_catalog};
use crate::network_parser::network::{Endpoints, PlatformClient, api_client, download_client};
use crate::network_parser::resolver::ResourceResolver;

pub mod cli;
pub mod noui;

/// 一次运行中共享的配置与凭据。
pub struct Session {
    pub config: Config,
    pub credentials: CredentialStore,
}

impl Session {
    pub fn new(config: Config, credentials: CredentialStore) -> Self {
        Self {
            config,
            credentials,
        }
    }

    pub fn resolver(&self) -> Result<ResourceResolver<PlatformClient>> {
        let client = api_client(&self.config).context("初始化 HTTP 客户端失败")?;
        Ok(ResourceResolver::new(
            PlatformClient::new(client, self.credentials.clone()),
            Endpoints::from_config(&self.config),
        ))
    }

    pub fn catalog(&self) -> Result<Vec<CatalogNode>> {
        let resolver = self.resolver()?;
        fetch_book_catalog(resolver.source(), resolver.endpoints()).context("获取电子课本目录失败")
    }

    /// Resolves `urls`, reports the unresolved ones and downloads the rest.
    pub fn download(&self, urls: &[String], target: &SaveTarget) -> Result<Option<BatchSummary>> {
        if urls.iter().all(|u| u.trim().is_empty()) {
            println!("{EMPTY_INPUT_MSG}");
            return Ok(None);
        }
        let resolver = self.resolver()?;
        let plan = plan_batch(&resolver, urls, target);
        self.run_plan(plan)
    }

    pub fn run_plan(&self, plan: BatchPlan) -> Result<Option<BatchSummary>> {
        if let Some(message) = plan.unresolved_message() {
            println!("{message}");
        }
        if plan.downloads.is_empty() {
            return Ok(None);
        }
        for planned in &plan.downloads {
            info!(
                "{} -> {}",
                planned.resource.content_id,
                planned.job.destination.display()
            );
        }

        let client = download_client(&self.config).context("初始化下载客户端失败")?;
        let downloader = BatchDownloader::new(
            &self.config,
            client,
            self.credentials.clone(),
            refresher_for_stdin(),
        );
        Ok(downloader.run_batch(plan.jobs(), Arc::new(ConsoleProgress::new())))
    }
}

/// 终端可交互时 401 会提示输入新 token，否则只记录日志。
pub fn refresher_for_stdin() -> Arc<dyn TokenRefresher> {
    if io::stdin().is_terminal() {
        Arc::new(noui::PromptRefresher::default())
    } else {
        Arc::new(NoRefresh)
    }
}

/// 显示用的 token 掩码，只保留首尾各 4 个字符。
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail} (共 {} 位)", chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockServer, memory_credentials};
    use axum::Router;
    use axum::extract::Path as UrlPath;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use serde_json::json;

    fn platform() -> Router {
        Router::new()
            .route(
                "/zxx/ndrv2/resources/tch_material/details/:file",
                get(|UrlPath(file): UrlPath<String>, headers: HeaderMap| async move {
                    let id = file.trim_end_matches(".json").to_string();
                    let host = headers
                        .get("host")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    axum::Json(json!({
                        "title": format!("课本{id}"),
                        "ti_items": [{
                            "lc_ti_format": "pdf",
                            "ti_storages": [format!("http://{host}/files/{id}.pdf")]
                        }]
                    }))
                }),
            )
            .route(
                "/files/:name",
                get(|UrlPath(name): UrlPath<String>| async move { name.into_bytes().repeat(1000) }),
            )
    }

    #[test]
    fn downloads_two_resources_into_directory() {
        let server = MockServer::start(platform());
        let out = tempfile::tempdir().unwrap();
        let (_t, credentials) = memory_credentials(None);
        let config = Config {
            api_base: server.url(""),
            ..Config::default()
        };
        let session = Session::new(config, credentials);

        let urls = vec![
            "https://basic.smartedu.cn/tchMaterial/detail?contentType=assets_document&contentId=A".to_string(),
            "https://basic.smartedu.cn/tchMaterial/detail?contentId=B".to_string(),
            "https://basic.smartedu.cn/tchMaterial/detail?contentType=assets_document".to_string(),
        ];
        let summary = session
            .download(&urls, &SaveTarget::Directory(out.path().to_path_buf()))
            .unwrap()
            .unwrap();

        assert_eq!((summary.completed, summary.total_count), (2, 2));
        assert!(summary.all_succeeded());
        assert_eq!(
            std::fs::read(out.path().join("课本A.pdf")).unwrap(),
            b"A.pdf".repeat(1000)
        );
        assert!(out.path().join("课本B.pdf").exists());
    }

    #[test]
    fn blank_input_downloads_nothing() {
        let (_t, credentials) = memory_credentials(None);
        let session = Session::new(Config::default(), credentials);
        let target = SaveTarget::Directory(std::path::PathBuf::from("unused"));
        assert!(session.download(&[String::new()], &target).unwrap().is_none());
    }

    #[test]
    fn token_mask_hides_middle() {
        assert_eq!(mask_token("ABC"), "***");
        assert_eq!(mask_token("7F938B205F876FC3"), "7F93...6FC3 (共 16 位)");
    }
}
