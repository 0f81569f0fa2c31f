//! 动作层：ActionHandler 抽象、注册表、分发器与内置动作

pub mod executor;
pub mod filesystem;
pub mod finish;
pub mod kv;
pub mod registry;
pub mod schema;
pub mod shell;

pub use executor::ActionDispatcher;
pub use filesystem::{
    GrepCodeAction, ListDirectoryAction, ReadFileAction, RepoStructureAction, SearchFilesAction,
    WriteFileAction,
};
pub use finish::{FinishAction, FINISH_KIND};
pub use kv::{GetSettingAction, KvGetAction, KvSetAction};
pub use registry::{parse_params, ActionError, ActionHandler, ActionRegistry};
pub use schema::{action_call_schema_json, params_schema};
pub use shell::RunCommandAction;

/// 单条动作结果的最大字符数（结果会进入记忆与后续提示词）
pub const MAX_OUTPUT_CHARS: usize = 8000;

/// 超长输出截断并标注
pub fn truncate_output(text: &str) -> String {
    match text.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((idx, _)) => format!(
            "{}\n... [truncated, {} chars total]",
            &text[..idx],
            text.chars().count()
        ),
        None => text.to_string(),
    }
}

/// 全部内置动作
pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(ReadFileAction);
    registry.register(WriteFileAction);
    registry.register(ListDirectoryAction);
    registry.register(SearchFilesAction);
    registry.register(GrepCodeAction);
    registry.register(RepoStructureAction);
    registry.register(RunCommandAction);
    registry.register(KvGetAction);
    registry.register(KvSetAction);
    registry.register(GetSettingAction);
    registry.register(FinishAction);
    registry
}
