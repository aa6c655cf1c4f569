//! 下载相关的数据模型定义。
//!
//! 包含传输记录、下载任务、进度快照与批次汇总。

use std::path::PathBuf;

use crate::base_system::byte_size::format_bytes;

pub type TransferId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub source_url: String,
    pub destination: PathBuf,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub state: TransferState,
}

impl TransferRecord {
    pub fn new(source_url: String, destination: PathBuf) -> Self {
        Self {
            source_url,
            destination,
            bytes_downloaded: 0,
            bytes_total: 0,
            state: TransferState::Pending,
        }
    }

    pub fn finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn failed(&self) -> bool {
        self.state == TransferState::Failed
    }
}

/// 一个待下载文件：直链 + 保存位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub source_url: String,
    pub destination: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub downloaded: u64,
    pub total: u64,
    pub finished_count: usize,
    pub total_count: usize,
}

impl ProgressSnapshot {
    /// `None` while no record knows its size yet.
    pub fn percentage(&self) -> Option<f64> {
        (self.total > 0).then(|| self.downloaded as f64 / self.total as f64 * 100.0)
    }

    pub fn progress_line(&self) -> Option<String> {
        let percent = self.percentage()?;
        Some(format!(
            "下载进度: {}/{} ({percent:.2}%) 已下载 {}/{}",
            format_bytes(self.downloaded),
            format_bytes(self.total),
            self.finished_count,
            self.total_count
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total_count: usize,
    pub completed: usize,
    pub failed_urls: Vec<String>,
    pub save_dir: Option<PathBuf>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed_urls.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["下载完成".to_string()];
        if !self.failed_urls.is_empty() {
            lines.push(format!("以下链接下载失败: {}", self.failed_urls.join(" ")));
        } else if let Some(dir) = &self.save_dir {
            lines.push(format!("文件已下载到: {}", dir.display()));
        }
        lines
    }
}
