// ==========================================
// 分配配置集成测试
// ==========================================
// 测试目标: 验证 JSON 文件加载、config_kv 持久化与 API 启动时的配置装配
// ==========================================

mod test_helpers;

use production_allocator::api::ApiError;
use production_allocator::config::{AllocatorConfig, ConfigError, ConfigManager};
use production_allocator::domain::Mass;
use production_allocator::ScheduleApi;
use std::io::Write;
use tempfile::NamedTempFile;
use test_helpers::{create_test_db, open_shared};

const TWO_UNIT_CONFIG: &str = r#"{
    "units": [
        {"code": "Line A", "hard_limit_t": 5.0, "soft_limit_t": 4.5, "qualities": ["gold", "silver"]},
        {"code": "Line B", "hard_limit_t": 8.0, "soft_limit_t": 7.0, "qualities": ["silver"],
         "quality_priority": ["silver"]}
    ],
    "color_order": ["white", "red", "black"],
    "white_colors": ["white"],
    "very_dark_colors": ["black"],
    "buffer_colors": [],
    "lookahead_days": 7
}"#;

#[test]
fn test_load_config_from_json_file() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(TWO_UNIT_CONFIG.as_bytes()).unwrap();

    let config = AllocatorConfig::from_json_file(file.path()).expect("config should load");
    assert_eq!(config.units.len(), 2);
    assert_eq!(config.units[0].qualities, vec!["GOLD", "SILVER"]);
    assert_eq!(config.unit("Line B").unwrap().hard_limit(), Mass::from_tons(8.0));
    assert_eq!(config.color_order, vec!["WHITE", "RED", "BLACK"]);
    assert_eq!(config.lookahead_days, 7);
    // 缺省字段取默认值
    assert_eq!(config.min_split(), Mass::from_kg(100));
    assert_eq!(config.commit_retries, 3);
}

#[test]
fn test_invalid_config_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"units": [{"code": "Line A", "hard_limit_t": 4.0, "soft_limit_t": 5.0, "qualities": ["gold"]}],
             "color_order": [], "white_colors": [], "very_dark_colors": [], "buffer_colors": []}"#,
    )
    .unwrap();
    let err = AllocatorConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{:?}", err);

    let err = AllocatorConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "{:?}", err);

    let err = AllocatorConfig::from_json_file("/nonexistent/allocator.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)), "{:?}", err);
}

#[test]
fn test_api_open_uses_persisted_config() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");

    let manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");
    let config = AllocatorConfig::from_json_str(TWO_UNIT_CONFIG).unwrap();
    manager.save_allocator_config(&config).unwrap();
    manager
        .save_color_order(&["black".to_string(), "white".to_string()])
        .unwrap();

    let api = ScheduleApi::open(&db_path).expect("api should open");
    assert_eq!(api.config().units.len(), 2);
    assert_eq!(api.config().lookahead_days, 7);
    // 自定义颜色顺序覆盖保存的配置
    assert_eq!(api.config().color_order, vec!["BLACK", "WHITE"]);

    let table = api.load_table(None, "2026-03-02", "2026-03-02").unwrap();
    let units: Vec<&str> = table.iter().map(|row| row.slot.unit_code.as_str()).collect();
    assert_eq!(units, vec!["Line A", "Line B"]);
}

#[test]
fn test_api_rejects_invalid_config() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let mut config = AllocatorConfig::default();
    config.lookahead_days = 0;

    let result = ScheduleApi::new(open_shared(&db_path), config);
    assert!(matches!(result, Err(ApiError::ConfigError(_))));
}
