// ==========================================
// 产能落位引擎 - 配置层
// ==========================================
// 职责: 分配配置加载/校验/持久化
// 存储: JSON 文件 或 config_kv 表
// ==========================================

pub mod allocator_config;
pub mod config_manager;

// 重导出核心配置
pub use allocator_config::{AllocatorConfig, ConfigError, ConfigResult, UnitProfile};
pub use config_manager::{config_keys, ConfigManager};
