// ==========================================
// 产能落位引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供上层应用直接调用
// ==========================================

pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use schedule_api::{parse_date, ScheduleApi};
