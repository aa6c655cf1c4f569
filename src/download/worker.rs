//! 单文件下载 worker：流式 GET，128 KiB 分块写盘并上报进度。

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_LENGTH;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ledger::TransferLedger;
use super::models::TransferId;
use super::progress::ProgressSink;
use crate::base_system::credential::{AUTH_HEADER, CredentialStore, TokenRefresher};

pub const CHUNK_SIZE: usize = 128 * 1024;
pub const AUTH_FAILED_MSG: &str = "授权失败: access_token 可能已过期或无效，请重新设置后再试！";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("服务器拒绝访问 (401)")]
    Unauthorized,
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务器返回状态码 {0}")]
    Status(u16),
    #[error("读取响应失败: {0}")]
    Read(#[source] io::Error),
    #[error("写入文件 {path} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything a worker shares with its siblings.
pub struct TransferContext {
    pub client: Client,
    pub credentials: CredentialStore,
    pub ledger: Arc<TransferLedger>,
    pub sink: Arc<dyn ProgressSink>,
    pub refresher: Arc<dyn TokenRefresher>,
    pub retry_after_refresh: bool,
}

impl TransferContext {
    fn send(&self, source_url: &str) -> Result<(Response, u64), TransferError> {
        let auth = self.credentials.snapshot();
        let resp = self
            .client
            .get(source_url)
            .header(AUTH_HEADER, auth.header)
            .send()?;
        Ok((resp, auth.generation))
    }

    /// 401 时提示并调用刷新；只有开启重试且确有新 token 时才重发一次。
    fn open(&self, source_url: &str) -> Result<Response, TransferError> {
        let (resp, generation) = self.send(source_url)?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        self.sink.notice(AUTH_FAILED_MSG);
        warn!("下载被拒绝 (401): {source_url}");
        let refreshed = self.refresher.refresh(&self.credentials, generation);
        if !(refreshed && self.retry_after_refresh) {
            return Err(TransferError::Unauthorized);
        }

        debug!("已刷新 Access Token，重新请求: {source_url}");
        let (resp, _) = self.send(source_url)?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(TransferError::Unauthorized);
        }
        Ok(resp)
    }

    fn transfer(
        &self,
        id: TransferId,
        source_url: &str,
        destination: &Path,
    ) -> Result<(), TransferError> {
        let mut resp = self.open(source_url)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::Status(status.as_u16()));
        }

        let total = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        self.ledger.start(id, total);
        debug!("开始下载 {source_url} -> {} ({total} 字节)", destination.display());

        let write_err = |source| TransferError::Write {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = File::create(destination).map_err(write_err)?;

        let streamed = self.stream(id, &mut resp, &mut file, destination);
        if streamed.is_err() {
            // 只清理本次创建的不完整文件
            drop(file);
            let _ = fs::remove_file(destination);
        }
        streamed
    }

    fn stream(
        &self,
        id: TransferId,
        resp: &mut Response,
        file: &mut File,
        destination: &Path,
    ) -> Result<(), TransferError> {
        let write_err = |source| TransferError::Write {
            path: destination.to_path_buf(),
            source,
        };
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransferError::Read(err)),
            };
            file.write_all(&buf[..n]).map_err(write_err)?;
            self.ledger.add_downloaded(id, n as u64);
            self.sink.progress(self.ledger.aggregate_progress());
        }
        file.flush().map_err(write_err)
    }
}

/// Downloads one file and records the outcome in the ledger.
///
/// The worker that first sees the whole batch finished reports the summary.
pub fn run(ctx: &TransferContext, id: TransferId, source_url: &str, destination: &Path) {
    match ctx.transfer(id, source_url, destination) {
        Ok(()) => {
            ctx.ledger.complete(id);
            info!("下载完成: {}", destination.display());
        }
        Err(err) => {
            ctx.ledger.fail(id);
            warn!("下载失败 {source_url}: {err}");
            ctx.sink.notice(&format!("下载失败: {err}"));
        }
    }
    ctx.sink.progress(ctx.ledger.aggregate_progress());

    if let Some(summary) = ctx.ledger.take_summary() {
        ctx.sink.summary(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::context::Config;
    use crate::download::models::{DownloadJob, TransferState};
    use crate::network_parser::network::download_client;
    use crate::test_support::{MockServer, RecordingSink, memory_credentials};
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
        new_token: Option<&'static str>,
    }

    impl TokenRefresher for CountingRefresher {
        fn refresh(&self, store: &CredentialStore, _seen: u64) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.new_token {
                Some(token) => store.refresh(token).is_ok(),
                None => false,
            }
        }
    }

    fn protected_router() -> Router {
        Router::new().route(
            "/book.pdf",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("x-nd-auth")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if auth.contains("GOOD") {
                    (AxumStatus::OK, vec![7u8; 1000])
                } else {
                    (AxumStatus::UNAUTHORIZED, Vec::new())
                }
            }),
        )
    }

    fn context(
        credentials: CredentialStore,
        sink: Arc<RecordingSink>,
        refresher: Arc<CountingRefresher>,
        retry: bool,
    ) -> TransferContext {
        TransferContext {
            client: download_client(&Config::default()).unwrap(),
            credentials,
            ledger: Arc::new(TransferLedger::new()),
            sink,
            refresher,
            retry_after_refresh: retry,
        }
    }

    fn register(ctx: &TransferContext, url: &str, dest: &Path) -> TransferId {
        ctx.ledger.register(&DownloadJob {
            source_url: url.to_string(),
            destination: dest.to_path_buf(),
        })
    }

    #[test]
    fn streams_body_to_file() {
        let router = Router::new().route("/f.pdf", get(|| async { vec![1u8; CHUNK_SIZE * 2 + 10] }));
        let server = MockServer::start(router);
        let dir = tempfile::tempdir().unwrap();
        let (_t, credentials) = memory_credentials(None);
        let sink = Arc::new(RecordingSink::default());
        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0), new_token: None });
        let ctx = context(credentials, sink.clone(), refresher, false);

        let dest = dir.path().join("nested").join("f.pdf");
        let id = register(&ctx, &server.url("/f.pdf"), &dest);
        run(&ctx, id, &server.url("/f.pdf"), &dest);

        assert_eq!(fs::metadata(&dest).unwrap().len(), (CHUNK_SIZE * 2 + 10) as u64);
        let record = &ctx.ledger.records()[id];
        assert_eq!(record.state, TransferState::Completed);
        assert_eq!(record.bytes_downloaded, record.bytes_total);
        assert_eq!(sink.summaries().len(), 1);
        assert!(sink.progress_lines().iter().any(|l| l.contains("100.00%")));
    }

    #[test]
    fn unauthorized_without_retry_fails_record() {
        let server = MockServer::start(protected_router());
        let dir = tempfile::tempdir().unwrap();
        let (_t, credentials) = memory_credentials(Some("BAD"));
        let sink = Arc::new(RecordingSink::default());
        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0), new_token: Some("GOOD") });
        let ctx = context(credentials.clone(), sink.clone(), refresher.clone(), false);

        let dest = dir.path().join("book.pdf");
        let id = register(&ctx, &server.url("/book.pdf"), &dest);
        run(&ctx, id, &server.url("/book.pdf"), &dest);

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(credentials.token().as_deref(), Some("GOOD"));
        assert_eq!(ctx.ledger.records()[id].state, TransferState::Failed);
        assert!(!dest.exists());
        let notices = sink.notices();
        assert_eq!(notices[0], AUTH_FAILED_MSG);
        assert!(notices[1].starts_with("下载失败: "));
        assert_eq!(sink.summaries()[0].failed_urls, vec![server.url("/book.pdf")]);
    }

    #[test]
    fn rejected_request_keeps_existing_file() {
        let server = MockServer::start(protected_router());
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("课本.pdf");
        fs::write(&dest, b"earlier download").unwrap();

        let (_t, credentials) = memory_credentials(None);
        let sink = Arc::new(RecordingSink::default());
        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0), new_token: None });
        let ctx = context(credentials, sink, refresher, false);

        let id = register(&ctx, &server.url("/book.pdf"), &dest);
        run(&ctx, id, &server.url("/book.pdf"), &dest);

        assert_eq!(ctx.ledger.records()[id].state, TransferState::Failed);
        assert_eq!(fs::read(&dest).unwrap(), b"earlier download");
    }

    #[test]
    fn unauthorized_with_retry_uses_new_token() {
        let server = MockServer::start(protected_router());
        let dir = tempfile::tempdir().unwrap();
        let (_t, credentials) = memory_credentials(Some("BAD"));
        let sink = Arc::new(RecordingSink::default());
        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0), new_token: Some("GOOD") });
        let ctx = context(credentials, sink.clone(), refresher.clone(), true);

        let dest = dir.path().join("book.pdf");
        let id = register(&ctx, &server.url("/book.pdf"), &dest);
        run(&ctx, id, &server.url("/book.pdf"), &dest);

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.ledger.records()[id].state, TransferState::Completed);
        assert_eq!(fs::read(&dest).unwrap().len(), 1000);
        assert!(sink.summaries()[0].all_succeeded());
    }

    #[test]
    fn retry_is_skipped_when_refresh_fails() {
        let server = MockServer::start(protected_router());
        let dir = tempfile::tempdir().unwrap();
        let (_t, credentials) = memory_credentials(None);
        let sink = Arc::new(RecordingSink::default());
        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0), new_token: None });
        let ctx = context(credentials, sink, refresher, true);

        let dest = dir.path().join("book.pdf");
        let id = register(&ctx, &server.url("/book.pdf"), &dest);
        run(&ctx, id, &server.url("/book.pdf"), &dest);
        assert_eq!(ctx.ledger.records()[id].state, TransferState::Failed);
    }

    #[test]
    fn error_status_is_a_transfer_failure() {
        let router = Router::new().route("/missing.pdf", get(|| async { AxumStatus::NOT_FOUND }));
        let server = MockServer::start(router);
        let dir = tempfile::tempdir().unwrap();
        let (_t, credentials) = memory_credentials(None);
        let sink = Arc::new(RecordingSink::default());
        let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0), new_token: None });
        let ctx = context(credentials, sink.clone(), refresher.clone(), false);

        let dest = dir.path().join("missing.pdf");
        let id = register(&ctx, &server.url("/missing.pdf"), &dest);
        run(&ctx, id, &server.url("/missing.pdf"), &dest);

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        let record = &ctx.ledger.records()[id];
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!((record.bytes_downloaded, record.bytes_total), (0, 0));
        assert!(sink.notices()[0].contains("404"));
    }
}
