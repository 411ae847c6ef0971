//! 可配置的处理策略。

use std::str::FromStr;

/// 策略解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown policy: {0}")]
pub struct ParsePolicyError(pub String);

/// 能解析但不合法的读数的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidPolicy {
    /// 收集全部不合法记录并在结果中返回，合法记录照常发布。
    #[default]
    Report,
    /// 记录日志后跳过。
    SkipAndLog,
}

impl FromStr for InvalidPolicy {
    type Err = ParsePolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "skip" | "skip_and_log" => Ok(Self::SkipAndLog),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// 空时间桶的填充方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapFill {
    /// 沿用前一个有数据桶的均值（locf），此前无数据时为 0。
    #[default]
    CarryForward,
    /// 填 0。
    Zero,
}

impl FromStr for GapFill {
    type Err = ParsePolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "locf" | "carry_forward" => Ok(Self::CarryForward),
            "zero" => Ok(Self::Zero),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}
