use serde::{Deserialize, Serialize};
use std::fmt;

/// 次回送信でエンティティが表す操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// サーバー未登録
    Add,
    /// サーバー登録済み（ローカル変更の有無は問わない）
    Edit,
    /// 削除予定。送信成功後にコレクションから取り除かれる
    Delete,
}

/// サーバーへ送るときの操作タグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    Create,
    Update,
    Delete,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Add => "add",
            Intent::Edit => "edit",
            Intent::Delete => "delete",
        }
    }

    pub fn operation(&self) -> OperationTag {
        match self {
            Intent::Add => OperationTag::Create,
            Intent::Edit => OperationTag::Update,
            Intent::Delete => OperationTag::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Intent::Delete)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Intent {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "add" => Ok(Intent::Add),
            "edit" => Ok(Intent::Edit),
            "delete" => Ok(Intent::Delete),
            other => Err(format!("Unknown intent: {other}")),
        }
    }
}

impl OperationTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationTag::Create => "create",
            OperationTag::Update => "update",
            OperationTag::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
