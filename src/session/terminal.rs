//! 终端能力：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、cargo）；禁止 rm -rf、wget、chmod 777 等子串与 shell 元字符。
//! 命令行按引号规则切分为 argv 后直接执行（不经过 shell），工作目录为会话工作区，带超时。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::CapabilityError;

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// shell 元字符：不经过 shell 执行，出现即说明模型期望串联、后台或重定向，直接拒绝
const SHELL_METACHARS: &[&str] = &[";", "&", "|", "`", "$(", ">", "<", "\n", "\r"];

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// 进程退出码（被信号终止时为 None）
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// 终端能力 trait
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, CapabilityError>;
}

/// Shell 终端：仅允许白名单内命令
#[derive(Debug, Clone)]
pub struct ShellTerminal {
    working_dir: PathBuf,
    allowed_commands: HashSet<String>,
    timeout_secs: u64,
}

impl ShellTerminal {
    pub fn new(working_dir: impl AsRef<Path>, allowed_commands: Vec<String>, timeout_secs: u64) -> Self {
        let allowed_commands = allowed_commands
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            allowed_commands,
            timeout_secs,
        }
    }

    /// 允许的命令名（排序后，用于错误提示）
    pub fn allowed(&self) -> Vec<String> {
        let mut names: Vec<String> = self.allowed_commands.iter().cloned().collect();
        names.sort();
        names
    }

    /// 校验并切分命令行，返回 argv（argv[0] 为白名单内的命令名）
    pub fn check(&self, raw: &str) -> Result<Vec<String>, CapabilityError> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(CapabilityError::CommandRejected(format!(
                    "forbidden pattern '{}'",
                    forbidden
                )));
            }
        }
        if let Some(token) = SHELL_METACHARS.iter().find(|t| raw.contains(*t)) {
            return Err(CapabilityError::CommandRejected(format!(
                "shell operator '{}' is not allowed",
                token.escape_debug()
            )));
        }
        let argv = split_args(raw)?;
        let name = match argv.first() {
            Some(name) => name.to_lowercase(),
            None => return Err(CapabilityError::CommandRejected("empty command".to_string())),
        };
        if self.allowed_commands.contains(&name) {
            return Ok(argv);
        }
        Err(CapabilityError::CommandRejected(format!(
            "'{}' not allowed. Safe commands: {}",
            name,
            self.allowed().join(", ")
        )))
    }
}

#[async_trait]
impl Terminal for ShellTerminal {
    async fn run(&self, command: &str) -> Result<CommandOutput, CapabilityError> {
        let command = command.trim();
        let argv = self.check(command)?;

        tracing::info!(command = %command, "terminal execute");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&self.working_dir)
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| CapabilityError::Timeout(self.timeout_secs))?
            .map_err(|e| CapabilityError::CommandFailed(e.to_string()))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// 按 POSIX 引号规则切分：单引号内原样，双引号与无引号处反斜杠转义下一个字符
fn split_args(raw: &str) -> Result<Vec<String>, CapabilityError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch) => current.push(ch),
                            None => return Err(unterminated('"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

fn unterminated(quote: char) -> CapabilityError {
    CapabilityError::CommandRejected(format!("unterminated {} quote", quote))
}
