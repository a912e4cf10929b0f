// ==========================================
// 产能落位引擎 - 引擎层
// ==========================================
// 职责: 实现产能/适配/落位/排序规则,不拼 SQL
// 红线: Engine 不拼 SQL, 存储访问经由仓储层
// ==========================================

pub mod eligibility;
pub mod error;
pub mod ledger;
pub mod move_engine;
pub mod sequencer;
pub mod slot_finder;

// 重导出核心引擎
pub use eligibility::EligibilityRules;
pub use error::{AllocationError, AllocationResult};
pub use ledger::{CapacityLedger, LoadQuery, LoadSnapshot, ProjectedLoads, SlotStatus};
pub use move_engine::{
    MoveEngine, MoveOutcome, MoveOverrides, MovePolicy, MoveRequest, Placement, Resolution,
    SplitPlacement,
};
pub use sequencer::{SequenceSeed, SequencedItem, Sequencer};
pub use slot_finder::{SlotFinder, SlotRequest};
