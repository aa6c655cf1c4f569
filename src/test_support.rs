//! 测试辅助：进程内 HTTP 服务、内存 JSON 源与记录型进度接收器。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use axum::Router;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::base_system::credential::{CredentialStore, FileTokenVault};
use crate::download::models::{BatchSummary, ProgressSnapshot};
use crate::download::progress::ProgressSink;
use crate::network_parser::network::{FetchError, JsonSource};

/// axum server on 127.0.0.1 with its own runtime thread; stops on drop.
pub struct MockServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub fn start(router: Router) -> Self {
        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock server");
                addr_tx
                    .send(listener.local_addr().expect("mock addr"))
                    .expect("report mock addr");
                let _ = axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });
        let addr = addr_rx.recv().expect("mock server address");
        Self {
            addr,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// In-memory [`JsonSource`]; unknown URLs answer 404. Records every request.
#[derive(Default)]
pub struct FakeJsonSource {
    responses: Mutex<HashMap<String, Value>>,
    requested: Mutex<Vec<String>>,
}

impl FakeJsonSource {
    pub fn insert(&self, url: impl Into<String>, body: Value) {
        self.responses.lock().unwrap().insert(url.into(), body);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl JsonSource for FakeJsonSource {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Credential store persisted into a throwaway directory.
pub fn memory_credentials(token: Option<&str>) -> (tempfile::TempDir, CredentialStore) {
    let dir = tempfile::tempdir().unwrap();
    let vault = Arc::new(FileTokenVault::in_dir(dir.path()));
    let store = CredentialStore::new(vault, token.map(str::to_string));
    (dir, store)
}

#[derive(Default)]
pub struct RecordingSink {
    progress: Mutex<Vec<ProgressSnapshot>>,
    notices: Mutex<Vec<String>>,
    summaries: Mutex<Vec<BatchSummary>>,
    finished: Mutex<bool>,
}

impl RecordingSink {
    pub fn progress_lines(&self) -> Vec<String> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter_map(ProgressSnapshot::progress_line)
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<BatchSummary> {
        self.summaries.lock().unwrap().clone()
    }

    pub fn finished(&self) -> bool {
        *self.finished.lock().unwrap()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, snapshot: ProgressSnapshot) {
        self.progress.lock().unwrap().push(snapshot);
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn summary(&self, summary: &BatchSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }

    fn finish(&self) {
        *self.finished.lock().unwrap() = true;
    }
}
