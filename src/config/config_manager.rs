// ==========================================
// 产能落位引擎 - 配置管理器
// ==========================================
// 职责: 分配配置加载/保存、自定义颜色顺序覆盖
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocator_config::{AllocatorConfig, ConfigError, ConfigResult};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 配置键
pub mod config_keys {
    /// 完整分配配置 (JSON)
    pub const ALLOCATOR_CONFIG: &str = "allocator/config";
    /// 自定义颜色顺序 (JSON 数组，覆盖 color_order)
    pub const COLOR_ORDER: &str = "production_color_order";
}

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ConfigResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::Lock(e.to_string()))
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 加载分配配置
    ///
    /// 1) config_kv 中的 allocator/config，缺失时使用现场默认配置
    /// 2) 若存在自定义颜色顺序，则覆盖 color_order
    /// 3) 统一校验
    pub fn load_allocator_config(&self) -> ConfigResult<AllocatorConfig> {
        let base = match self.get_global_config_value(config_keys::ALLOCATOR_CONFIG)? {
            Some(raw) => serde_json::from_str::<AllocatorConfig>(&raw)?,
            None => {
                tracing::debug!("未找到分配配置，使用默认配置");
                AllocatorConfig::default()
            }
        };

        let config = match self.get_color_order()? {
            order if !order.is_empty() => base.with_color_order(order)?,
            _ => base.validated()?,
        };

        tracing::info!(
            units = config.units.len(),
            colors = config.color_order.len(),
            lookahead_days = config.lookahead_days,
            "分配配置已加载"
        );
        Ok(config)
    }

    /// 保存分配配置（保存前校验）
    pub fn save_allocator_config(&self, config: &AllocatorConfig) -> ConfigResult<()> {
        let validated = config.clone().validated()?;
        self.set_global_config_value(config_keys::ALLOCATOR_CONFIG, &validated.to_json()?)
    }

    /// 保存自定义颜色顺序（全局默认）
    pub fn save_color_order(&self, order: &[String]) -> ConfigResult<()> {
        let raw = serde_json::to_string(order)?;
        self.set_global_config_value(config_keys::COLOR_ORDER, &raw)
    }

    /// 读取自定义颜色顺序；未设置或内容损坏时返回空列表
    pub fn get_color_order(&self) -> ConfigResult<Vec<String>> {
        let raw = match self.get_global_config_value(config_keys::COLOR_ORDER)? {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(order) => Ok(order),
            Err(e) => {
                tracing::warn!("自定义颜色顺序解析失败，已忽略: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_load_defaults_when_empty() {
        let config = manager().load_allocator_config().unwrap();
        assert_eq!(config, AllocatorConfig::default().validated().unwrap());
    }

    #[test]
    fn test_color_order_override_applied() {
        let mgr = manager();
        mgr.save_color_order(&["red".to_string(), "white".to_string()]).unwrap();
        assert_eq!(mgr.get_color_order().unwrap(), vec!["red", "white"]);

        let config = mgr.load_allocator_config().unwrap();
        assert_eq!(config.color_order, vec!["RED", "WHITE"]);
    }

    #[test]
    fn test_corrupt_color_order_ignored() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::COLOR_ORDER, "not json").unwrap();
        assert!(mgr.get_color_order().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_reload_config() {
        let mgr = manager();
        let mut config = AllocatorConfig::default();
        config.lookahead_days = 10;
        mgr.save_allocator_config(&config).unwrap();

        let loaded = mgr.load_allocator_config().unwrap();
        assert_eq!(loaded.lookahead_days, 10);
    }

    #[test]
    fn test_invalid_config_not_saved() {
        let mgr = manager();
        let mut config = AllocatorConfig::default();
        config.units.clear();
        assert!(mgr.save_allocator_config(&config).is_err());
        assert!(mgr
            .get_global_config_value(config_keys::ALLOCATOR_CONFIG)
            .unwrap()
            .is_none());
    }
}
