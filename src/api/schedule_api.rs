// ==========================================
// 产能落位引擎 - 排产 API
// ==========================================
// 职责: 组装 仓储/台账/规则/查找/引擎/排序器，对外提供按字符串日期调用的接口
// 日期格式: YYYY-MM-DD
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{AllocatorConfig, ConfigManager};
use crate::db::open_and_prepare;
use crate::domain::capacity::SlotKey;
use crate::domain::mass::Mass;
use crate::domain::types::normalize_plan_name;
use crate::engine::{
    EligibilityRules, MoveEngine, MoveOutcome, MoveOverrides, MovePolicy, MoveRequest, Placement,
    SequenceSeed, SequencedItem, Sequencer, SlotRequest, SlotStatus, SplitPlacement,
};
use crate::repository::{OrderItemRepository, PlanSheetRepository};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 解析 YYYY-MM-DD
pub fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::InvalidInput(format!("日期格式错误（应为 YYYY-MM-DD）: {}", raw)))
}

/// 单次请求重量上限（吨）
const MAX_WEIGHT_T: f64 = 100_000.0;

fn parse_weight(weight_t: f64) -> ApiResult<Mass> {
    if !weight_t.is_finite() || weight_t < 0.0 || weight_t > MAX_WEIGHT_T {
        return Err(ApiError::InvalidInput(format!("重量无效: {}", weight_t)));
    }
    Ok(Mass::from_tons(weight_t))
}

// ==========================================
// ScheduleApi - 排产 API
// ==========================================
pub struct ScheduleApi {
    config: AllocatorConfig,
    sheets: PlanSheetRepository,
    items: Arc<OrderItemRepository>,
    engine: MoveEngine,
    sequencer: Sequencer,
}

impl ScheduleApi {
    /// 打开数据库，从 config_kv 加载配置（缺省为现场默认配置）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_and_prepare(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        let conn = Arc::new(Mutex::new(conn));
        let config = ConfigManager::from_connection(conn.clone()).load_allocator_config()?;
        Self::new(conn, config)
    }

    /// 使用已有连接与显式配置
    pub fn new(conn: Arc<Mutex<Connection>>, config: AllocatorConfig) -> ApiResult<Self> {
        let config = config.validated()?;
        let rules = Arc::new(EligibilityRules::new(&config));
        let items = Arc::new(OrderItemRepository::new(conn.clone()));
        Ok(Self {
            sheets: PlanSheetRepository::new(conn),
            engine: MoveEngine::new(items.clone(), rules, &config),
            sequencer: Sequencer::new(&config),
            items,
            config,
        })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn sheets(&self) -> &PlanSheetRepository {
        &self.sheets
    }

    pub fn items(&self) -> &OrderItemRepository {
        &self.items
    }

    pub fn engine(&self) -> &MoveEngine {
        &self.engine
    }

    // ==========================================
    // 移动 / 拆分 / 重排
    // ==========================================

    /// 移动订单行
    #[allow(clippy::too_many_arguments)]
    pub fn move_item(
        &self,
        item_id: &str,
        unit: &str,
        date: &str,
        plan: Option<&str>,
        sequence_hint: Option<u32>,
        policy: MovePolicy,
        overrides: MoveOverrides,
    ) -> ApiResult<MoveOutcome> {
        let mut request = MoveRequest::new(item_id, unit, parse_date(date)?)
            .with_plan(&normalize_plan_name(plan))
            .with_policy(policy)
            .with_overrides(overrides);
        if let Some(position) = sequence_hint {
            if position == 0 {
                return Err(ApiError::InvalidInput("序号位置从 1 开始".to_string()));
            }
            request = request.with_sequence_hint(position);
        }
        Ok(self.engine.move_item(&request)?)
    }

    /// 批量移动到日期
    pub fn move_items_to_date(
        &self,
        item_ids: &[String],
        date: &str,
        unit: Option<&str>,
        plan: Option<&str>,
        overrides: MoveOverrides,
    ) -> ApiResult<Vec<Placement>> {
        let date = parse_date(date)?;
        Ok(self.engine.move_items_to_date(
            item_ids,
            date,
            unit,
            &normalize_plan_name(plan),
            overrides,
        )?)
    }

    /// 手工拆分（吨）
    pub fn split_item(
        &self,
        item_id: &str,
        split_weight_t: f64,
        target_unit: &str,
        overrides: MoveOverrides,
    ) -> ApiResult<SplitPlacement> {
        let split_weight = parse_weight(split_weight_t)?;
        Ok(self
            .engine
            .split_item(item_id, split_weight, target_unit, overrides)?)
    }

    /// 手工重排槽位
    pub fn reorder_slot(
        &self,
        unit: &str,
        date: &str,
        plan: Option<&str>,
        ordered_ids: &[String],
    ) -> ApiResult<Vec<(String, i32)>> {
        let slot = SlotKey::new(unit.trim(), parse_date(date)?, &normalize_plan_name(plan));
        Ok(self.engine.reorder_slot(&slot, ordered_ids)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 落位查找（只读，结果在提交时由引擎复核）
    pub fn find_slot(
        &self,
        weight_t: f64,
        quality: &str,
        preferred_unit: &str,
        start_date: &str,
        plan: Option<&str>,
        max_lookahead_days: Option<u32>,
    ) -> ApiResult<Option<SlotKey>> {
        let plan_name = normalize_plan_name(plan);
        let request = SlotRequest {
            weight: parse_weight(weight_t)?,
            quality,
            preferred_unit: preferred_unit.trim(),
            start_date: parse_date(start_date)?,
            plan_name: &plan_name,
            max_lookahead_days,
        };
        Ok(self.engine.finder().find_slot(self.engine.ledger(), &request)?)
    }

    /// 槽位状态
    pub fn slot_status(&self, unit: &str, date: &str, plan: Option<&str>) -> ApiResult<SlotStatus> {
        let slot = SlotKey::new(unit.trim(), parse_date(date)?, &normalize_plan_name(plan));
        Ok(self.engine.ledger().slot_status(&slot)?)
    }

    /// 负载表（日期 × 机组）
    pub fn load_table(
        &self,
        plan: Option<&str>,
        date_from: &str,
        date_to: &str,
    ) -> ApiResult<Vec<SlotStatus>> {
        let from = parse_date(date_from)?;
        let to = parse_date(date_to)?;
        if from > to {
            return Err(ApiError::InvalidInput("起始日期不能晚于结束日期".to_string()));
        }
        Ok(self
            .engine
            .ledger()
            .status_table(&normalize_plan_name(plan), from, to)?)
    }

    // ==========================================
    // 上机排序
    // ==========================================

    /// 对槽位排序并写回序号
    ///
    /// 未给定种子时，取该机组在更早日期（同方案）最后运行的订单行作为种子
    #[instrument(skip(self, seed), fields(unit = unit, date = date))]
    pub fn sequence_slot(
        &self,
        unit: &str,
        date: &str,
        plan: Option<&str>,
        seed: Option<SequenceSeed>,
    ) -> ApiResult<Vec<SequencedItem>> {
        let slot = SlotKey::new(unit.trim(), parse_date(date)?, &normalize_plan_name(plan));
        let slot_items = self.items.find_by_slot(&slot)?;
        if slot_items.is_empty() {
            return Ok(Vec::new());
        }

        let seed = match seed.filter(|s| !s.is_empty()) {
            Some(seed) => seed,
            None => self
                .items
                .find_last_run(&slot.unit_code, slot.date, &slot.plan_name)?
                .map(|last| SequenceSeed::from_item(&last))
                .unwrap_or_default(),
        };

        let sequenced = self.sequencer.sequence(slot_items, &slot.unit_code, &seed);
        let ordered_ids: Vec<String> = sequenced.iter().map(|s| s.item.item_id.clone()).collect();
        self.engine.reorder_slot(&slot, &ordered_ids)?;

        info!(slot = %slot, count = sequenced.len(), seed = ?seed, "上机排序已写回");
        Ok(sequenced)
    }
}
