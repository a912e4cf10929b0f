// ==========================================
// 产能落位引擎 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 默认方案名称（始终存在）
pub const DEFAULT_PLAN: &str = "Default";

/// 无颜色订单行的统一颜色键
pub const NO_COLOR: &str = "NO COLOR";

/// 方案名称归一化
///
/// 空值/空白/"Default" 均视为默认方案。
pub fn normalize_plan_name(plan_name: Option<&str>) -> String {
    match plan_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_PLAN.to_string(),
    }
}

/// 颜色归一化：去空白 + 大写，空颜色记为 NO COLOR
pub fn normalize_color(color: &str) -> String {
    let trimmed = color.trim();
    if trimmed.is_empty() {
        NO_COLOR.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// 品质归一化：去空白 + 大写
pub fn normalize_quality(quality: &str) -> String {
    quality.trim().to_uppercase()
}

// ==========================================
// 单据状态 (Sheet Status)
// ==========================================
// DRAFT 可移动; SUBMITTED 占用产能但不可移动; CANCELLED 不占用产能
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetStatus {
    Draft,
    Submitted,
    Cancelled,
}

impl SheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetStatus::Draft => "DRAFT",
            SheetStatus::Submitted => "SUBMITTED",
            SheetStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否允许产能变更类移动
    pub fn is_mutable(&self) -> bool {
        matches!(self, SheetStatus::Draft)
    }

    /// 是否计入产能负载
    pub fn counts_toward_load(&self) -> bool {
        !matches!(self, SheetStatus::Cancelled)
    }
}

impl fmt::Display for SheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("未知的单据状态: {0}")]
pub struct UnknownSheetStatus(pub String);

impl FromStr for SheetStatus {
    type Err = UnknownSheetStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(SheetStatus::Draft),
            "SUBMITTED" => Ok(SheetStatus::Submitted),
            "CANCELLED" => Ok(SheetStatus::Cancelled),
            other => Err(UnknownSheetStatus(other.to_string())),
        }
    }
}

// ==========================================
// 负载等级 (Load Level)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadLevel {
    Normal,     // 低于软上限
    AboveSoft,  // 超过软上限（告警）
    Full,       // 恰好达到硬上限
    Overloaded, // 超过硬上限
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadLevel::Normal => write!(f, "NORMAL"),
            LoadLevel::AboveSoft => write!(f, "ABOVE_SOFT"),
            LoadLevel::Full => write!(f, "FULL"),
            LoadLevel::Overloaded => write!(f, "OVERLOADED"),
        }
    }
}

// ==========================================
// 排序阶段 / 过渡点
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePhase {
    White,
    Color,
    Unassigned,
}

impl fmt::Display for SequencePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencePhase::White => write!(f, "white"),
            SequencePhase::Color => write!(f, "color"),
            SequencePhase::Unassigned => write!(f, "unassigned"),
        }
    }
}

/// 过渡点原因（批次末尾，下一批需要换品质或插入缓冲色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeReason {
    WhiteToColor,
    QualityChange,
    DarkBuffer,
}

impl fmt::Display for BridgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeReason::WhiteToColor => write!(f, "WHITE_TO_COLOR"),
            BridgeReason::QualityChange => write!(f, "QUALITY_CHANGE"),
            BridgeReason::DarkBuffer => write!(f, "DARK_BUFFER"),
        }
    }
}
