//! 沙箱文件系统能力
//!
//! SandboxFs 绑定 root_dir，所有路径必须落在 root 下（禁止 ../ 与绝对路径逃逸）；
//! 提供读、写、列目录、按 glob 查找文件、按正则检索内容。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::CapabilityError;

/// search / grep 单次返回的最大条数
const MAX_SEARCH_RESULTS: usize = 200;
/// grep 跳过超过此大小的文件
const MAX_GREP_FILE_BYTES: u64 = 1024 * 1024;

/// 文件系统能力 trait（路径均相对于会话工作区）
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &str) -> Result<String, CapabilityError>;

    /// 写入文件（父目录不存在时创建），返回写入字节数
    async fn write(&self, path: &str, content: &str) -> Result<usize, CapabilityError>;

    /// 列出目录项，目录名带 '/' 后缀，隐藏文件跳过
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, CapabilityError>;

    /// 按文件名 glob（如 `*.rs`）在 dir 下递归查找
    async fn find_files(&self, pattern: &str, dir: &str) -> Result<Vec<String>, CapabilityError>;

    /// 按正则在 dir 下递归检索，每条结果为 `path:line: text`
    async fn grep(&self, pattern: &str, dir: &str) -> Result<Vec<String>, CapabilityError>;
}

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下
#[derive(Debug, Clone)]
pub struct SandboxFs {
    root_dir: PathBuf,
}

impl SandboxFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析已存在的路径：canonicalize 后必须仍在根下（可识别符号链接逃逸）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, CapabilityError> {
        let relative = self.normalize(path)?;
        let full = self.root_dir.join(&relative);
        let canonical = full
            .canonicalize()
            .map_err(|_| CapabilityError::NotFound(path.to_string()))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(CapabilityError::PathEscape(path.to_string()))
        }
    }

    /// 解析待写入的路径：文件可以不存在，但父目录创建后必须在根下
    async fn resolve_for_write(&self, path: &str) -> Result<PathBuf, CapabilityError> {
        let relative = self.normalize(path)?;
        if relative.as_os_str().is_empty() {
            return Err(CapabilityError::NotFound(path.to_string()));
        }
        let full = self.root_dir.join(&relative);
        let parent = full
            .parent()
            .ok_or_else(|| CapabilityError::PathEscape(path.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;
        let parent = tokio::fs::canonicalize(parent).await?;
        if !parent.starts_with(&self.root_dir) {
            return Err(CapabilityError::PathEscape(path.to_string()));
        }
        let file_name = full
            .file_name()
            .ok_or_else(|| CapabilityError::NotFound(path.to_string()))?;
        Ok(parent.join(file_name))
    }

    /// 词法归一化：拒绝绝对路径与越过根的 ..
    fn normalize(&self, path: &str) -> Result<PathBuf, CapabilityError> {
        let trimmed = path.trim();
        let mut out = PathBuf::new();
        for component in Path::new(trimmed).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => out.push(part),
                Component::ParentDir => {
                    if !out.pop() {
                        return Err(CapabilityError::PathEscape(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(CapabilityError::PathEscape(path.to_string()));
                }
            }
        }
        Ok(out)
    }

    fn resolve_dir(&self, dir: &str) -> Result<PathBuf, CapabilityError> {
        if dir.trim().is_empty() || dir.trim() == "." {
            Ok(self.root_dir.clone())
        } else {
            self.resolve(dir)
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn join_error(e: tokio::task::JoinError) -> CapabilityError {
    CapabilityError::Io(std::io::Error::other(e.to_string()))
}

#[async_trait]
impl FileSystem for SandboxFs {
    async fn read_to_string(&self, path: &str) -> Result<String, CapabilityError> {
        let resolved = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    async fn write(&self, path: &str, content: &str) -> Result<usize, CapabilityError> {
        let resolved = self.resolve_for_write(path).await?;
        tokio::fs::write(&resolved, content).await?;
        tracing::debug!(path = %resolved.display(), bytes = content.len(), "file written");
        Ok(content.len())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, CapabilityError> {
        let base = self.resolve_dir(path)?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&base).await?;
        while let Some(e) = dir.next_entry().await? {
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let suffix = if e.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            entries.push(format!("{}{}", name, suffix));
        }
        entries.sort();
        Ok(entries)
    }

    async fn find_files(&self, pattern: &str, dir: &str) -> Result<Vec<String>, CapabilityError> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| CapabilityError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        let base = self.resolve_dir(dir)?;
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut found: Vec<String> = WalkDir::new(&base)
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| matcher.matches(&e.file_name().to_string_lossy()))
                .map(|e| this.relative(e.path()))
                .take(MAX_SEARCH_RESULTS)
                .collect();
            found.sort();
            Ok::<_, CapabilityError>(found)
        })
        .await
        .map_err(join_error)?
    }

    async fn grep(&self, pattern: &str, dir: &str) -> Result<Vec<String>, CapabilityError> {
        let re = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CapabilityError::InvalidPattern(e.to_string()))?;
        let base = self.resolve_dir(dir)?;
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            let files = WalkDir::new(&base)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.metadata()
                        .map(|m| m.len() <= MAX_GREP_FILE_BYTES)
                        .unwrap_or(false)
                });
            'files: for entry in files {
                // 非 UTF-8（二进制）文件直接跳过
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let rel = this.relative(entry.path());
                for (idx, line) in content.lines().enumerate() {
                    if re.is_match(line) {
                        matches.push(format!("{}:{}: {}", rel, idx + 1, line.trim()));
                        if matches.len() >= MAX_SEARCH_RESULTS {
                            break 'files;
                        }
                    }
                }
            }
            Ok::<_, CapabilityError>(matches)
        })
        .await
        .map_err(join_error)?
    }
}
