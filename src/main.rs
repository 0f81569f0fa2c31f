//! Pilot 命令行入口
//!
//! 每行标准输入是一条指令，逐条跑一次 Agent 循环；sink 事件以 JSON 行打印到 stdout，
//! 日志走 stderr。运行中按 Ctrl+C 只取消当前这一次调用；空闲时按 Ctrl+C 退出。
//!
//! 用法: pilot [config.toml]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pilot::config::load_config;
use pilot::core::{session_context_from_config, AgentBuilder};
use pilot::session::{ChannelSink, SessionId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// 读下一行指令；interrupt 先完成或输入结束时返回 None
async fn next_prompt<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Option<String>> {
    tokio::select! {
        biased;
        _ = interrupt => Ok(None),
        line = lines.next_line() => line.context("Failed to read stdin"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pilot::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let session_id = match &cfg.app.session_id {
        Some(raw) => SessionId::parse(raw)
            .with_context(|| format!("Invalid app.session_id: {:?}", raw))?,
        None => SessionId::new(),
    };
    let mode = cfg.app.default_mode.clone();

    let agent = AgentBuilder::new(cfg.clone())
        .build()
        .await
        .context("Failed to build agent")?;

    let (sink, mut events) = ChannelSink::channel();
    let ctx = session_context_from_config(&cfg, session_id)
        .context("Failed to prepare workspace")?
        .with_sink(Arc::new(sink));

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            }
        }
    });

    tracing::info!(session = %ctx.id, mode = %mode, "pilot ready, one instruction per line");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let idle_interrupt = || async {
        let _ = tokio::signal::ctrl_c().await;
    };
    while let Some(line) = next_prompt(&mut lines, idle_interrupt()).await? {
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        let token = agent.supervisor().child_token();
        let watcher = tokio::spawn({
            let token = token.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            }
        });

        match agent.run_with_cancel(prompt, &ctx, &mode, token).await {
            Ok(outcome) => tracing::info!(steps = outcome.steps, stop = ?outcome.stop, "run complete"),
            Err(e) => tracing::error!(error = %e, "run failed"),
        }
        watcher.abort();
    }

    agent.supervisor().cancel();
    // 释放最后一个 sender，打印任务随之结束
    drop(ctx);
    let _ = printer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_prompt_reads_lines_until_eof() {
        let mut lines = BufReader::new(&b"turn on the light\nbye\n"[..]).lines();
        let first = next_prompt(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(first.as_deref(), Some("turn on the light"));
        let second = next_prompt(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(second.as_deref(), Some("bye"));
        assert!(next_prompt(&mut lines, std::future::pending()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_prompt_stops_on_interrupt() {
        let mut lines = BufReader::new(&b"never read\n"[..]).lines();
        let got = next_prompt(&mut lines, async {}).await.unwrap();
        assert!(got.is_none());
    }
}
