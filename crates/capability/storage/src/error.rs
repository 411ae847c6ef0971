//! 存储层错误类型
//!
//! 重复的身份键不是错误：`save` 返回 `Ok(false)`。

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid row: {0}")]
    Decode(String),
    #[error("visitor error: {0}")]
    Visitor(String),
    #[error("storage lock failed")]
    Lock,
    #[error("cancelled")]
    Cancelled,
}

impl StorageError {
    pub fn visitor(err: impl std::fmt::Display) -> Self {
        Self::Visitor(err.to_string())
    }
}
