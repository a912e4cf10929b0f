// ==========================================
// 产能落位引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把引擎/仓储/配置错误转换为用户可读的消息
// 约束: 每个错误都携带显式原因
// ==========================================

use crate::config::ConfigError;
use crate::engine::error::AllocationError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 产能/适配规则错误
    // ==========================================
    #[error("产能约束违反: unit={unit}, date={date}, plan={plan}, excess={excess_t:.3}t")]
    CapacityConstraintViolation {
        unit: String,
        date: String,
        plan: String,
        excess_t: f64,
    },

    #[error("质量不适配: {0}")]
    IneligibleQuality(String),

    #[error("无可用槽位: {0}")]
    NoSlotAvailable(String),

    #[error("拆分量过小: {0}")]
    SplitTooSmall(String),

    #[error("单据已定稿: {0}")]
    FinalizedRecord(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::CapacityConflict {
                slot,
                load_kg,
                limit_kg,
            } => ApiError::OptimisticLockFailure(format!(
                "槽位{}已被其他请求修改（提交时负载{}kg，硬上限{}kg）",
                slot, load_kg, limit_kg
            )),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 AllocationError 转换
// ==========================================
impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::CapacityExceeded(report) => ApiError::CapacityConstraintViolation {
                unit: report.slot.unit_code.clone(),
                date: report.slot.date.to_string(),
                plan: report.slot.plan_name.clone(),
                excess_t: (report.current_load + report.required - report.limit).tons(),
            },
            e @ AllocationError::IneligibleQuality { .. } => {
                ApiError::IneligibleQuality(e.to_string())
            }
            e @ AllocationError::NoSlotAvailable { .. } => ApiError::NoSlotAvailable(e.to_string()),
            e @ AllocationError::SplitTooSmall { .. } => ApiError::SplitTooSmall(e.to_string()),
            e @ AllocationError::FinalizedRecord { .. } => ApiError::FinalizedRecord(e.to_string()),
            AllocationError::UnknownUnit(unit) => ApiError::NotFound(format!("机组{}不存在", unit)),
            AllocationError::InvalidRequest(msg) => ApiError::InvalidInput(msg),
            e @ AllocationError::ConcurrentModification { .. } => {
                ApiError::OptimisticLockFailure(e.to_string())
            }
            AllocationError::Repository(err) => err.into(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
