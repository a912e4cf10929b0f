// ==========================================
// 产能落位引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表/索引，负载查询走索引聚合而非全表扫描
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "PRODUCTION_ALLOCATOR_DB_PATH";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// foreign_keys / busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS plan_sheet (
            sheet_id TEXT PRIMARY KEY,
            order_ref TEXT NOT NULL,
            customer TEXT,
            plan_name TEXT NOT NULL DEFAULT 'Default',
            ordered_date TEXT NOT NULL,
            planned_date TEXT,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_plan_sheet_scope
            ON plan_sheet (plan_name, COALESCE(planned_date, ordered_date));

        CREATE INDEX IF NOT EXISTS idx_plan_sheet_order
            ON plan_sheet (order_ref, plan_name);

        CREATE TABLE IF NOT EXISTS order_item (
            item_id TEXT PRIMARY KEY,
            sheet_id TEXT NOT NULL REFERENCES plan_sheet(sheet_id) ON DELETE CASCADE,
            unit_code TEXT,
            weight_kg INTEGER NOT NULL CHECK (weight_kg >= 0),
            quality TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            gsm REAL NOT NULL DEFAULT 0,
            seq_no INTEGER NOT NULL DEFAULT 0,
            is_split INTEGER NOT NULL DEFAULT 0,
            split_from TEXT,
            created_seq INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_order_item_sheet_unit
            ON order_item (sheet_id, unit_code);

        CREATE INDEX IF NOT EXISTS idx_order_item_unit
            ON order_item (unit_code, sheet_id);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 打开连接并确保 schema 就绪；版本不一致时仅告警
pub fn open_and_prepare(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    match read_schema_version(&conn)? {
        Some(v) if v == CURRENT_SCHEMA_VERSION => {}
        other => tracing::warn!(
            expected = CURRENT_SCHEMA_VERSION,
            actual = ?other,
            "schema_version 与代码期望不一致"
        ),
    }
    Ok(conn)
}

/// 默认数据库路径
///
/// 1) 环境变量 PRODUCTION_ALLOCATOR_DB_PATH
/// 2) 用户数据目录/production-allocator/production_allocator.db
/// 3) ./production_allocator.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./production_allocator.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("production-allocator");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("production_allocator.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
