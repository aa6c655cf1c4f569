//! 批量下载编排：登记全部任务后并发启动 worker，等待全部结束。
//!
//! 默认每个文件一个线程；配置了 `max_workers` 时改用固定大小的工作池。

use std::sync::Arc;
use std::thread;

use crossbeam_channel as channel;
use reqwest::blocking::Client;
use tracing::{debug, error, info};

use super::ledger::TransferLedger;
use super::models::{BatchSummary, DownloadJob, TransferId};
use super::progress::ProgressSink;
use super::worker::{self, TransferContext};
use crate::base_system::context::Config;
use crate::base_system::credential::{CredentialStore, TokenRefresher};

pub struct BatchDownloader {
    client: Client,
    credentials: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    ledger: Arc<TransferLedger>,
    retry_after_refresh: bool,
    worker_limit: Option<usize>,
}

impl BatchDownloader {
    pub fn new(
        config: &Config,
        client: Client,
        credentials: CredentialStore,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            client,
            credentials,
            refresher,
            ledger: Arc::new(TransferLedger::new()),
            retry_after_refresh: config.retry_after_refresh,
            worker_limit: config.worker_limit(),
        }
    }

    pub fn ledger(&self) -> &Arc<TransferLedger> {
        &self.ledger
    }

    /// Runs one batch to completion and returns its summary.
    ///
    /// Every job is registered before the first transfer starts, so the
    /// aggregate counts cover the whole batch from the first progress line.
    pub fn run_batch(
        &self,
        jobs: Vec<DownloadJob>,
        sink: Arc<dyn ProgressSink>,
    ) -> Option<BatchSummary> {
        if jobs.is_empty() {
            return None;
        }

        self.ledger.begin_batch();
        let queued: Vec<(TransferId, DownloadJob)> = jobs
            .into_iter()
            .map(|job| (self.ledger.register(&job), job))
            .collect();
        info!("开始下载 {} 个文件", queued.len());

        let ctx = Arc::new(TransferContext {
            client: self.client.clone(),
            credentials: self.credentials.clone(),
            ledger: Arc::clone(&self.ledger),
            sink: Arc::clone(&sink),
            refresher: Arc::clone(&self.refresher),
            retry_after_refresh: self.retry_after_refresh,
        });

        match self.worker_limit {
            Some(limit) => run_pooled(&ctx, queued, limit),
            None => run_unbounded(&ctx, queued),
        }

        // 兜底：没有 worker 汇报时（例如线程创建失败）由这里汇报
        if let Some(summary) = self.ledger.take_summary() {
            sink.summary(&summary);
        }
        sink.finish();
        self.ledger.summary()
    }
}

fn run_unbounded(ctx: &Arc<TransferContext>, queued: Vec<(TransferId, DownloadJob)>) {
    let mut handles = Vec::with_capacity(queued.len());
    for (id, job) in queued {
        let worker_ctx = Arc::clone(ctx);
        let spawned = thread::Builder::new()
            .name(format!("download-{id}"))
            .spawn(move || worker::run(&worker_ctx, id, &job.source_url, &job.destination));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => spawn_failed(ctx, id, &err),
        }
    }
    join_all(handles);
}

fn run_pooled(ctx: &Arc<TransferContext>, queued: Vec<(TransferId, DownloadJob)>, limit: usize) {
    let workers = limit.clamp(1, queued.len().max(1));
    debug!("使用 {workers} 个下载线程");

    let (tx, rx) = channel::unbounded::<(TransferId, DownloadJob)>();
    for item in queued {
        // 接收端仍在作用域内，发送不会失败
        let _ = tx.send(item);
    }
    drop(tx);

    let mut handles = Vec::with_capacity(workers);
    for n in 0..workers {
        let rx = rx.clone();
        let worker_ctx = Arc::clone(ctx);
        let spawned = thread::Builder::new()
            .name(format!("download-pool-{n}"))
            .spawn(move || {
                for (id, job) in rx.iter() {
                    worker::run(&worker_ctx, id, &job.source_url, &job.destination);
                }
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => error!("创建下载线程失败: {err}"),
        }
    }

    if handles.is_empty() {
        for (id, _) in rx.try_iter() {
            spawn_failed(ctx, id, &std::io::Error::other("no download thread available"));
        }
    }
    join_all(handles);
}

fn spawn_failed(ctx: &TransferContext, id: TransferId, err: &std::io::Error) {
    error!("创建下载线程失败: {err}");
    ctx.ledger.fail(id);
    ctx.sink.notice(&format!("下载失败: {err}"));
}

fn join_all(handles: Vec<thread::JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("下载线程异常退出");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::credential::NoRefresh;
    use crate::download::models::TransferState;
    use crate::network_parser::network::download_client;
    use crate::test_support::{MockServer, RecordingSink, memory_credentials};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::fs;
    use std::path::PathBuf;

    fn router() -> Router {
        Router::new()
            .route("/a.pdf", get(|| async { vec![b'a'; 300_000] }))
            .route("/b.pdf", get(|| async { vec![b'b'; 5_000] }))
            .route("/c.pdf", get(|| async { vec![b'c'; 42] }))
            .route("/broken.pdf", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
    }

    fn downloader(config: &Config) -> (tempfile::TempDir, BatchDownloader) {
        let (dir, credentials) = memory_credentials(None);
        let client = download_client(config).unwrap();
        (dir, BatchDownloader::new(config, client, credentials, Arc::new(NoRefresh)))
    }

    fn job(server: &MockServer, path: &str, dest: PathBuf) -> DownloadJob {
        DownloadJob {
            source_url: server.url(path),
            destination: dest,
        }
    }

    #[test]
    fn downloads_every_job_concurrently() {
        let server = MockServer::start(router());
        let out = tempfile::tempdir().unwrap();
        let (_t, downloader) = downloader(&Config::default());
        let sink = Arc::new(RecordingSink::default());

        let summary = downloader
            .run_batch(
                vec![
                    job(&server, "/a.pdf", out.path().join("A.pdf")),
                    job(&server, "/b.pdf", out.path().join("B.pdf")),
                ],
                sink.clone(),
            )
            .unwrap();

        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.save_dir.as_deref(), Some(out.path()));
        assert_eq!(fs::metadata(out.path().join("A.pdf")).unwrap().len(), 300_000);
        assert_eq!(fs::metadata(out.path().join("B.pdf")).unwrap().len(), 5_000);

        let snap = downloader.ledger().aggregate_progress();
        assert_eq!((snap.downloaded, snap.total), (305_000, 305_000));
        assert_eq!((snap.finished_count, snap.total_count), (2, 2));
        assert_eq!(sink.summaries().len(), 1);
        assert!(sink.finished());
    }

    #[test]
    fn failed_transfer_does_not_affect_siblings() {
        let server = MockServer::start(router());
        let out = tempfile::tempdir().unwrap();
        let (_t, downloader) = downloader(&Config::default());
        let sink = Arc::new(RecordingSink::default());

        let summary = downloader
            .run_batch(
                vec![
                    job(&server, "/broken.pdf", out.path().join("X.pdf")),
                    job(&server, "/c.pdf", out.path().join("C.pdf")),
                ],
                sink.clone(),
            )
            .unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed_urls, vec![server.url("/broken.pdf")]);
        let records = downloader.ledger().records();
        assert_eq!(records[0].state, TransferState::Failed);
        assert_eq!((records[0].bytes_downloaded, records[0].bytes_total), (0, 0));
        assert_eq!(records[1].state, TransferState::Completed);
        assert_eq!(sink.summaries().len(), 1);
        assert!(sink.summaries()[0].lines()[1].starts_with("以下链接下载失败: "));
    }

    #[test]
    fn bounded_pool_finishes_all_jobs() {
        let server = MockServer::start(router());
        let out = tempfile::tempdir().unwrap();
        let config = Config {
            max_workers: 1,
            ..Config::default()
        };
        let (_t, downloader) = downloader(&config);
        let sink = Arc::new(RecordingSink::default());

        let jobs = ["/a.pdf", "/b.pdf", "/c.pdf"]
            .iter()
            .enumerate()
            .map(|(i, p)| job(&server, p, out.path().join(format!("{i}.pdf"))))
            .collect();
        let summary = downloader.run_batch(jobs, sink.clone()).unwrap();

        assert_eq!(summary.completed, 3);
        assert!(summary.all_succeeded());
        assert_eq!(sink.summaries().len(), 1);
    }

    #[test]
    fn empty_batch_does_nothing() {
        let (_t, downloader) = downloader(&Config::default());
        let sink = Arc::new(RecordingSink::default());
        assert!(downloader.run_batch(Vec::new(), sink.clone()).is_none());
        assert!(sink.summaries().is_empty());
    }
}
