//! Access Token 的保存、读取与请求头生成。
//!
//! `X-ND-AUTH` 头中 `MAC id` 即 access_token，`nonce` 与 `mac` 不可缺省但无需有效。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const AUTH_HEADER: &str = "X-ND-AUTH";
const TOKEN_FILE: &str = "token.yml";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("读写 Access Token 文件失败 {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Access Token 文件格式错误 {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Access Token 不能为空")]
    Empty,
}

/// Persistent, application-scoped token storage.
pub trait TokenVault: Send + Sync {
    fn load_token(&self) -> Result<Option<String>, CredentialError>;
    fn save_token(&self, token: &str) -> Result<(), CredentialError>;
    fn clear_token(&self) -> Result<(), CredentialError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
}

pub struct FileTokenVault {
    path: PathBuf,
}

impl FileTokenVault {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(TOKEN_FILE),
        }
    }

    fn io_err(&self, source: io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenVault for FileTokenVault {
    fn load_token(&self) -> Result<Option<String>, CredentialError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_err(err)),
        };
        let file: TokenFile =
            serde_yaml::from_str(&raw).map_err(|source| CredentialError::Parse {
                path: self.path.clone(),
                source,
            })?;
        let token = file.access_token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    fn save_token(&self, token: &str) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let body = serde_yaml::to_string(&TokenFile {
            access_token: token.to_string(),
        })
        .map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, body).map_err(|e| self.io_err(e))
    }

    fn clear_token(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_err(err)),
        }
    }
}

pub fn build_auth_header(token: Option<&str>) -> String {
    format!(r#"MAC id="{}",nonce="0",mac="0""#, token.unwrap_or("0"))
}

/// Header value paired with the generation it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub header: String,
    pub generation: u64,
}

struct CredentialState {
    token: Option<String>,
    header: String,
    generation: u64,
}

/// Shared token holder handed to the resolver and every download worker.
#[derive(Clone)]
pub struct CredentialStore {
    state: Arc<RwLock<CredentialState>>,
    vault: Arc<dyn TokenVault>,
}

impl CredentialStore {
    pub fn new(vault: Arc<dyn TokenVault>, token: Option<String>) -> Self {
        let header = build_auth_header(token.as_deref());
        Self {
            state: Arc::new(RwLock::new(CredentialState {
                token,
                header,
                generation: 0,
            })),
            vault,
        }
    }

    /// Reads the saved token; a broken token file is logged and ignored.
    pub fn load(vault: Arc<dyn TokenVault>) -> Self {
        let token = match vault.load_token() {
            Ok(token) => token,
            Err(err) => {
                warn!("读取已保存的 Access Token 失败: {err}");
                None
            }
        };
        if token.is_some() {
            debug!("已加载保存的 Access Token");
        }
        Self::new(vault, token)
    }

    pub fn header_value(&self) -> String {
        self.snapshot().header
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        match self.state.read() {
            Ok(state) => AuthSnapshot {
                header: state.header.clone(),
                generation: state.generation,
            },
            Err(poisoned) => {
                let state = poisoned.into_inner();
                AuthSnapshot {
                    header: state.header.clone(),
                    generation: state.generation,
                }
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    pub fn token(&self) -> Option<String> {
        self.state
            .read()
            .map(|s| s.token.clone())
            .unwrap_or_else(|p| p.into_inner().token.clone())
    }

    /// Installs a new token, rebuilds the header and persists it.
    ///
    /// The in-memory header is updated even when persisting fails.
    pub fn refresh(&self, token: &str) -> Result<(), CredentialError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Empty);
        }
        self.replace(Some(token.to_string()));
        self.vault.save_token(token)?;
        info!("Access Token 已更新");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CredentialError> {
        self.replace(None);
        self.vault.clear_token()
    }

    fn replace(&self, token: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.header = build_auth_header(token.as_deref());
        state.token = token;
        state.generation += 1;
    }
}

/// Collaborator invoked by a worker after the platform answered 401.
pub trait TokenRefresher: Send + Sync {
    /// `seen_generation` is the credential generation the rejected request was
    /// sent with. Returns `true` when a newer token is in place.
    fn refresh(&self, store: &CredentialStore, seen_generation: u64) -> bool;
}

/// Refresher for non-interactive runs: only reports the condition.
pub struct NoRefresh;

impl TokenRefresher for NoRefresh {
    fn refresh(&self, store: &CredentialStore, seen_generation: u64) -> bool {
        if store.generation() != seen_generation {
            return true;
        }
        warn!("授权失败且当前无法交互，请使用 `token set` 设置新的 Access Token");
        false
    }
}
