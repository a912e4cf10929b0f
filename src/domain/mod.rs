// ==========================================
// 产能落位引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、值对象、约束接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod capacity;
pub mod item;
pub mod mass;
pub mod sheet;
pub mod types;

// 重导出核心类型
pub use capacity::{CapacityConstraint, OverflowReport, SlotKey, SlotLoad};
pub use item::OrderItem;
pub use mass::Mass;
pub use sheet::PlanSheet;
pub use types::{
    normalize_color, normalize_plan_name, normalize_quality, BridgeReason, LoadLevel,
    SequencePhase, SheetStatus, DEFAULT_PLAN, NO_COLOR,
};
