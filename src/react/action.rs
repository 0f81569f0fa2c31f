//! 动作解码：从模型回复中提取扁平 JSON 动作
//!
//! 线上格式为一个 JSON 对象，字符串字段 "action" 是动作名，其余字段为参数：
//! `{"action": "toggle_light", "room": "kitchen"}`。对象可以包在 ```json 代码块里或夹在文字中间，
//! 从第一个 '{' 起只解析一个完整的 JSON 值，之后的文字忽略。参数的具体校验由各动作自己完成。

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::FINISH_KIND;

/// 回复中没有可用的动作（不是错误，回复原文进入 Transcript）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no JSON object in reply")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("JSON value is not an object")]
    NotAnObject,

    #[error("missing or empty \"action\" field")]
    MissingAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// 结束循环
    Finish,
    Named(String),
}

impl ActionKind {
    fn from_wire(name: &str) -> Self {
        if name == FINISH_KIND {
            ActionKind::Finish
        } else {
            ActionKind::Named(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Finish => FINISH_KIND,
            ActionKind::Named(name) => name,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, ActionKind::Finish)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// 去掉 "action" 后的其余字段
    pub params: Map<String, Value>,
}

impl Action {
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// JSON 起点：优先 ```json 代码块内容，否则从第一个 '{' 开始
fn json_start(reply: &str) -> Option<&str> {
    if let Some(start) = reply.find("```json") {
        let rest = &reply[start + "```json".len()..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(body);
    }
    reply.find('{').map(|start| &reply[start..])
}

pub fn decode_action(reply: &str) -> Result<Action, ParseFailure> {
    let text = json_start(reply).ok_or(ParseFailure::NoJson)?;
    let value = serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .ok_or(ParseFailure::NoJson)?
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    let Value::Object(mut params) = value else {
        return Err(ParseFailure::NotAnObject);
    };
    let name = match params.remove("action") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(ParseFailure::MissingAction),
    };
    Ok(Action {
        kind: ActionKind::from_wire(&name),
        params,
    })
}
