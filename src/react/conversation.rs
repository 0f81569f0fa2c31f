//! 对话构建：每一步都从头拼出完整的消息序列（模型服务无状态）
//!
//! 顺序固定：system(提示词 + 模式) → 每条记忆一条 system（最旧在前）→ assistant(Transcript) → user(原始指令)。

use crate::memory::Message;
use crate::tools::{action_call_schema_json, ActionRegistry};

/// 内置系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous assistant working inside a sandboxed workspace. \
Each turn, reply with exactly one JSON object naming the next action, for example \
{\"action\": \"read_file\", \"path\": \"README.md\"}. All fields other than \"action\" are the action's parameters. \
Results of earlier actions are given to you as 'Action: <kind> → <result>' notes and in your own scratchpad. \
When the task is complete, reply {\"action\": \"finish\", \"summary\": \"<answer for the user>\"}.";

/// 系统消息：基础提示词 + 动作格式 + 可用动作 + 模式；每次调用只生成一次
pub fn system_preamble(base_prompt: &str, mode: &str, registry: &ActionRegistry) -> String {
    format!(
        "{}\n\nAction format (JSON Schema):\n{}\n\nAvailable actions:\n{}\n\nMode: {}",
        base_prompt.trim(),
        action_call_schema_json(),
        registry.to_schema_json(),
        mode
    )
}

/// 拼出一步的完整对话；Transcript 为空时也保留 assistant 消息，保证结构稳定
pub fn build_conversation(
    preamble: &str,
    memory: &[String],
    transcript: &str,
    prompt: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(memory.len() + 3);
    messages.push(Message::system(preamble));
    messages.extend(memory.iter().map(|entry| Message::system(entry.as_str())));
    messages.push(Message::assistant(transcript));
    messages.push(Message::user(prompt));
    messages
}

/// 向 Transcript 追加一段，段间以换行分隔
pub fn append_transcript(transcript: &mut String, text: &str) {
    if !transcript.is_empty() {
        transcript.push('\n');
    }
    transcript.push_str(text);
}
