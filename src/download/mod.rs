//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`     — 数据模型（TransferRecord / DownloadJob / ProgressSnapshot 等）
//! - `ledger`     — 批次内共享的传输台账
//! - `progress`   — 进度上报与 CLI 进度行
//! - `worker`     — 单文件下载
//! - `plan`       — 链接解析与保存路径分配
//! - `downloader` — 批量下载编排

pub mod downloader;
pub mod ledger;
pub mod models;
pub mod plan;
pub mod progress;
pub mod worker;
