// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================
#![allow(dead_code)]

use chrono::{Local, NaiveDate};
use production_allocator::config::AllocatorConfig;
use production_allocator::db::open_and_prepare;
use production_allocator::domain::{Mass, OrderItem, PlanSheet, SheetStatus, SlotKey};
use production_allocator::logging;
use production_allocator::repository::{NewOrderItem, OrderItemRepository, PlanSheetRepository};
use production_allocator::ScheduleApi;
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    open_and_prepare(&db_path)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_and_prepare(db_path).unwrap()))
}

/// 2026-03-{d}
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

pub fn slot(unit: &str, d: u32) -> SlotKey {
    SlotKey::new(unit, day(d), "Default")
}

// ==========================================
// 测试环境
// ==========================================

pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub api: ScheduleApi,
    pub sheets: PlanSheetRepository,
    pub items: OrderItemRepository,
}

pub fn setup_env() -> TestEnv {
    setup_env_with(AllocatorConfig::default())
}

pub fn setup_env_with(config: AllocatorConfig) -> TestEnv {
    logging::init_test();
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path);
    let api = ScheduleApi::new(conn.clone(), config).unwrap();
    TestEnv {
        _temp_file: temp_file,
        db_path,
        sheets: PlanSheetRepository::new(conn.clone()),
        items: OrderItemRepository::new(conn.clone()),
        conn,
        api,
    }
}

impl TestEnv {
    /// 新建草稿排产单（默认方案）
    pub fn sheet(&self, sheet_id: &str, order_ref: &str, d: u32) -> PlanSheet {
        self.sheet_in_plan(sheet_id, order_ref, d, "Default")
    }

    pub fn sheet_in_plan(&self, sheet_id: &str, order_ref: &str, d: u32, plan: &str) -> PlanSheet {
        let sheet = PlanSheet {
            sheet_id: sheet_id.to_string(),
            order_ref: order_ref.to_string(),
            customer: Some("ACME".to_string()),
            plan_name: plan.to_string(),
            ordered_date: day(d),
            planned_date: None,
            status: SheetStatus::Draft,
            created_at: Local::now().naive_local(),
        };
        self.sheets.insert(&sheet).unwrap();
        sheet
    }

    /// 新建订单行（吨）
    pub fn item(
        &self,
        item_id: &str,
        sheet_id: &str,
        unit: Option<&str>,
        weight_t: f64,
        quality: &str,
        color: &str,
    ) -> OrderItem {
        self.items
            .insert(&NewOrderItem {
                item_id: item_id.to_string(),
                sheet_id: sheet_id.to_string(),
                unit_code: unit.map(str::to_string),
                weight: Mass::from_tons(weight_t),
                quality: quality.to_string(),
                color: color.to_string(),
                gsm: 60.0,
            })
            .unwrap()
    }

    /// 以单个订单行把槽位填到指定负载
    pub fn fill(&self, unit: &str, d: u32, load_t: f64, quality: &str) {
        let sheet_id = format!("FILL-{}-{}", unit.replace(' ', ""), d);
        if self.sheets.find_by_id(&sheet_id).unwrap().is_none() {
            self.sheet(&sheet_id, &format!("ORD-{}", sheet_id), d);
        }
        let item_id = format!("{}-{}", sheet_id, uuid::Uuid::new_v4());
        self.item(&item_id, &sheet_id, Some(unit), load_t, quality, "RED");
    }

    pub fn load(&self, unit: &str, d: u32) -> Mass {
        self.items.sum_load(&slot(unit, d)).unwrap()
    }

    pub fn get(&self, item_id: &str) -> OrderItem {
        self.items.find_by_id(item_id).unwrap().unwrap()
    }

    /// 槽位内订单行ID（按序号）
    pub fn slot_ids(&self, unit: &str, d: u32) -> Vec<String> {
        self.items
            .find_by_slot(&slot(unit, d))
            .unwrap()
            .into_iter()
            .map(|i| i.item_id)
            .collect()
    }

    pub fn item_count(&self) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM order_item", [], |row| row.get(0))
            .unwrap()
    }
}
