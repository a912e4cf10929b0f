// ==========================================
// 产能落位引擎 - 引擎层错误类型
// ==========================================
// 所有失败路径均不修改存储状态
// 产能不足 (Overflow) 不是错误，见 MoveOutcome::Overflow
// ==========================================

use crate::domain::capacity::OverflowReport;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum AllocationError {
    // ===== 业务规则错误 =====
    #[error("质量不适配: 机组{unit}不允许质量{quality} (订单行{item_id})")]
    IneligibleQuality {
        item_id: String,
        unit: String,
        quality: String,
    },

    #[error("前瞻窗口内无可用槽位: 重量={weight}, 质量={quality}, 起始日期={start_date}, 前瞻天数={lookahead_days}")]
    NoSlotAvailable {
        weight: String,
        quality: String,
        start_date: String,
        lookahead_days: u32,
    },

    #[error("可用产能不足以拆分: 可用={available}, 最小拆分量={minimum}")]
    SplitTooSmall { available: String, minimum: String },

    #[error("排产单已定稿，禁止移动: item_id={item_id}, status={status}")]
    FinalizedRecord { item_id: String, status: String },

    #[error("未知机组: {0}")]
    UnknownUnit(String),

    #[error("请求无效: {0}")]
    InvalidRequest(String),

    /// 批量操作超过硬上限（整批拒绝）
    #[error("批量落位超过硬上限: {0}")]
    CapacityExceeded(OverflowReport),

    // ===== 并发控制错误 =====
    #[error("并发修改冲突，重试{attempts}次后仍失败: {detail}")]
    ConcurrentModification { attempts: u32, detail: String },

    // ===== 存储层错误（原样透传）=====
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AllocationError {
    /// 是否为提交时产能复核冲突（可重新评估后重试）
    pub fn is_capacity_conflict(&self) -> bool {
        matches!(
            self,
            AllocationError::Repository(RepositoryError::CapacityConflict { .. })
        )
    }
}

/// Result 类型别名
pub type AllocationResult<T> = Result<T, AllocationError>;
