//! 文件系统动作：read_file / write_file / list_directory / search_files / grep_code / get_repo_structure
//!
//! 全部经 SessionContext.fs（沙箱）访问，路径相对于会话工作区。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::session::SessionContext;
use crate::tools::schema::params_schema;
use crate::tools::{parse_params, truncate_output, ActionError, ActionHandler};

fn default_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    /// 相对于工作区的文件路径
    pub path: String,
}

/// 读取文件内容
pub struct ReadFileAction;

#[async_trait]
impl ActionHandler for ReadFileAction {
    fn kind(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<ReadFileParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: ReadFileParams = parse_params(self.kind(), params)?;
        tracing::info!(path = %p.path, "read_file");
        let content = ctx.fs.read_to_string(&p.path).await?;
        Ok(format!("File: {}\n\n{}", p.path, truncate_output(&content)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    /// 相对于工作区的文件路径，父目录不存在时自动创建
    pub path: String,
    /// 完整文件内容（覆盖写入）
    pub content: String,
}

/// 写文件（覆盖）
pub struct WriteFileAction;

#[async_trait]
impl ActionHandler for WriteFileAction {
    fn kind(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, replacing it if it exists."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<WriteFileParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: WriteFileParams = parse_params(self.kind(), params)?;
        tracing::info!(path = %p.path, bytes = p.content.len(), "write_file");
        let written = ctx.fs.write(&p.path, &p.content).await?;
        Ok(format!("Wrote {} bytes to {}", written, p.path))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDirectoryParams {
    /// 目录路径，默认工作区根
    #[serde(default = "default_dir")]
    pub path: String,
}

/// 列目录
pub struct ListDirectoryAction;

#[async_trait]
impl ActionHandler for ListDirectoryAction {
    fn kind(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories end with '/'."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<ListDirectoryParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: ListDirectoryParams = parse_params(self.kind(), params)?;
        let entries = ctx.fs.list_dir(&p.path).await?;
        let body = if entries.is_empty() {
            "(empty)".to_string()
        } else {
            entries.join("\n")
        };
        Ok(format!("Directory: {}\n\n{}", p.path, body))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchFilesParams {
    /// 文件名 glob，如 `*.rs`
    pub pattern: String,
    /// 搜索起点目录，默认工作区根
    #[serde(default = "default_dir")]
    pub directory: String,
}

/// 按文件名查找
pub struct SearchFilesAction;

#[async_trait]
impl ActionHandler for SearchFilesAction {
    fn kind(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Find files whose name matches a glob pattern, recursively."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<SearchFilesParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: SearchFilesParams = parse_params(self.kind(), params)?;
        let files = ctx.fs.find_files(&p.pattern, &p.directory).await?;
        let body = if files.is_empty() {
            "No files found".to_string()
        } else {
            files.join("\n")
        };
        Ok(format!("Files matching '{}':\n\n{}", p.pattern, body))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrepCodeParams {
    /// 正则表达式（不区分大小写）
    pub pattern: String,
    /// 搜索起点目录，默认工作区根
    #[serde(default = "default_dir")]
    pub directory: String,
}

/// 按内容检索
pub struct GrepCodeAction;

#[async_trait]
impl ActionHandler for GrepCodeAction {
    fn kind(&self) -> &str {
        "grep_code"
    }

    fn description(&self) -> &str {
        "Search file contents with a case-insensitive regex. Results are 'path:line: text'."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<GrepCodeParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: GrepCodeParams = parse_params(self.kind(), params)?;
        let hits = ctx.fs.grep(&p.pattern, &p.directory).await?;
        let body = if hits.is_empty() {
            "No matches found".to_string()
        } else {
            truncate_output(&hits.join("\n"))
        };
        Ok(format!("Matches for '{}':\n\n{}", p.pattern, body))
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RepoStructureParams {
    /// 只列出该扩展名的文件（如 `rs`），省略时列出全部
    #[serde(default)]
    pub extension: Option<String>,
}

/// 工作区文件总览（跳过隐藏目录）
pub struct RepoStructureAction;

#[async_trait]
impl ActionHandler for RepoStructureAction {
    fn kind(&self) -> &str {
        "get_repo_structure"
    }

    fn description(&self) -> &str {
        "List every file in the workspace, optionally only those with a given extension."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<RepoStructureParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: RepoStructureParams = parse_params(self.kind(), params)?;
        let pattern = match p.extension.as_deref().map(|e| e.trim_start_matches('.')) {
            Some(ext) if !ext.is_empty() => format!("*.{}", ext),
            _ => "*".to_string(),
        };
        let files = ctx.fs.find_files(&pattern, ".").await?;
        let body = if files.is_empty() {
            "No files found".to_string()
        } else {
            truncate_output(&files.join("\n"))
        };
        Ok(format!("Repository files ({}):\n\n{}", pattern, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn context() -> (TempDir, SessionContext) {
        let dir = TempDir::new().unwrap();
        let ctx = SessionContext::new("fs".into(), dir.path(), Vec::new(), 5);
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_dir, ctx) = context();
        let out = WriteFileAction
            .execute(json!({"path": "notes/a.txt", "content": "hello"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "Wrote 5 bytes to notes/a.txt");

        let out = ReadFileAction
            .execute(json!({"path": "notes/a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "File: notes/a.txt\n\nhello");
    }

    #[tokio::test]
    async fn test_list_directory_defaults_to_root() {
        let (_dir, ctx) = context();
        ctx.fs.write("src/lib.rs", "").await.unwrap();
        ctx.fs.write("README.md", "").await.unwrap();
        let out = ListDirectoryAction.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(out, "Directory: .\n\nREADME.md\nsrc/");
    }

    #[tokio::test]
    async fn test_search_and_grep() {
        let (_dir, ctx) = context();
        ctx.fs.write("src/lib.rs", "pub fn light() {}\n").await.unwrap();
        ctx.fs.write("src/main.rs", "fn main() {}\n").await.unwrap();

        let out = SearchFilesAction
            .execute(json!({"pattern": "lib*"}), &ctx)
            .await
            .unwrap();
        assert!(out.contains("src/lib.rs"));
        assert!(!out.contains("main.rs"));

        let out = GrepCodeAction
            .execute(json!({"pattern": "LIGHT", "directory": "src"}), &ctx)
            .await
            .unwrap();
        assert!(out.contains("src/lib.rs:1:"), "{}", out);

        let out = GrepCodeAction
            .execute(json!({"pattern": "nothing_here"}), &ctx)
            .await
            .unwrap();
        assert!(out.ends_with("No matches found"));
    }

    #[tokio::test]
    async fn test_repo_structure() {
        let (_dir, ctx) = context();
        ctx.fs.write("src/lib.rs", "").await.unwrap();
        ctx.fs.write("docs/guide.md", "").await.unwrap();
        ctx.fs.write(".git/config", "").await.unwrap();

        let out = RepoStructureAction.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(out, "Repository files (*):\n\ndocs/guide.md\nsrc/lib.rs");

        let out = RepoStructureAction
            .execute(json!({"extension": ".rs"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "Repository files (*.rs):\n\nsrc/lib.rs");
    }

    #[tokio::test]
    async fn test_missing_path_param() {
        let (_dir, ctx) = context();
        let err = ReadFileAction.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { .. }));
    }
}
