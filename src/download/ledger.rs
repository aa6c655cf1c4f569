//! 传输台账：一个批次内所有下载记录的共享视图。
//!
//! 每条记录只由其所属 worker 修改；任何线程都可以读取汇总。

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::models::{
    BatchSummary, DownloadJob, ProgressSnapshot, TransferId, TransferRecord, TransferState,
};

#[derive(Default)]
struct LedgerState {
    records: Vec<TransferRecord>,
    summary_taken: bool,
}

impl LedgerState {
    fn all_finished(&self) -> bool {
        self.records.iter().all(TransferRecord::finished)
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary {
            total_count: self.records.len(),
            completed: self
                .records
                .iter()
                .filter(|r| r.state == TransferState::Completed)
                .count(),
            failed_urls: self
                .records
                .iter()
                .filter(|r| r.failed())
                .map(|r| r.source_url.clone())
                .collect(),
            save_dir: self
                .records
                .last()
                .and_then(|r| r.destination.parent())
                .map(PathBuf::from),
        }
    }
}

#[derive(Default)]
pub struct TransferLedger {
    inner: Mutex<LedgerState>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on a non-terminal record. Terminal records are left untouched.
    fn update(&self, id: TransferId, f: impl FnOnce(&mut TransferRecord)) {
        let mut state = self.lock();
        if let Some(record) = state.records.get_mut(id)
            && !record.finished()
        {
            f(record);
        }
    }

    pub fn begin_batch(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.summary_taken = false;
    }

    pub fn register(&self, job: &DownloadJob) -> TransferId {
        let mut state = self.lock();
        state.records.push(TransferRecord::new(
            job.source_url.clone(),
            job.destination.clone(),
        ));
        state.records.len() - 1
    }

    pub fn start(&self, id: TransferId, bytes_total: u64) {
        self.update(id, |r| {
            r.state = TransferState::InProgress;
            r.bytes_total = bytes_total;
        });
    }

    pub fn add_downloaded(&self, id: TransferId, bytes: u64) {
        self.update(id, |r| r.bytes_downloaded += bytes);
    }

    pub fn complete(&self, id: TransferId) {
        self.update(id, |r| {
            r.bytes_downloaded = r.bytes_total;
            r.state = TransferState::Completed;
        });
    }

    pub fn fail(&self, id: TransferId) {
        self.update(id, |r| {
            r.bytes_downloaded = 0;
            r.bytes_total = 0;
            r.state = TransferState::Failed;
        });
    }

    pub fn aggregate_progress(&self) -> ProgressSnapshot {
        let state = self.lock();
        state
            .records
            .iter()
            .fold(ProgressSnapshot::default(), |mut acc, r| {
                acc.downloaded += r.bytes_downloaded;
                acc.total += r.bytes_total;
                acc.finished_count += usize::from(r.finished());
                acc.total_count += 1;
                acc
            })
    }

    pub fn all_finished(&self) -> bool {
        self.lock().all_finished()
    }

    pub fn records(&self) -> Vec<TransferRecord> {
        self.lock().records.clone()
    }

    /// Current summary once every record is terminal.
    pub fn summary(&self) -> Option<BatchSummary> {
        let state = self.lock();
        (!state.records.is_empty() && state.all_finished()).then(|| state.summary())
    }

    /// Like [`summary`](Self::summary), but yields `Some` to exactly one caller per batch.
    pub fn take_summary(&self) -> Option<BatchSummary> {
        let mut state = self.lock();
        if state.summary_taken || state.records.is_empty() || !state.all_finished() {
            return None;
        }
        state.summary_taken = true;
        Some(state.summary())
    }
}
