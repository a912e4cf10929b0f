// ==========================================
// 产能落位引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 机组/日期槽位分配 + 上机换色排序 (人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 产能/适配/落位/排序规则
pub mod engine;

// 配置层 - 分配配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BridgeReason, LoadLevel, SequencePhase, SheetStatus, DEFAULT_PLAN};

// 领域实体
pub use domain::{Mass, OrderItem, OverflowReport, PlanSheet, SlotKey};

// 配置
pub use config::{AllocatorConfig, ConfigManager, UnitProfile};

// 引擎
pub use engine::{
    AllocationError, CapacityLedger, EligibilityRules, MoveEngine, MoveOutcome, MoveOverrides,
    MovePolicy, MoveRequest, SequenceSeed, Sequencer, SlotFinder,
};

// API
pub use api::{ApiError, ScheduleApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "产能落位引擎";
