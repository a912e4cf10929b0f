// ==========================================
// 产能落位引擎 - 产能台账
// ==========================================
// 职责: 槽位负载查询 (机组, 有效日期, 方案)
// 口径: 草稿 + 已提交 的订单行重量之和，排除已取消
// 红线: 只读，不持有状态；负载由仓储层索引聚合得到
// ==========================================

use crate::domain::capacity::{CapacityConstraint, SlotKey, SlotLoad};
use crate::domain::mass::Mass;
use crate::domain::types::LoadLevel;
use crate::engine::eligibility::EligibilityRules;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::repository::error::RepositoryResult;
use crate::repository::item_repo::OrderItemRepository;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ==========================================
// Trait: LoadQuery
// ==========================================
// 落位查找对每个候选槽位调用一次
pub trait LoadQuery {
    fn load(&self, slot: &SlotKey) -> RepositoryResult<Mass>;
}

impl LoadQuery for OrderItemRepository {
    fn load(&self, slot: &SlotKey) -> RepositoryResult<Mass> {
        self.sum_load(slot)
    }
}

/// 槽位状态（负载 + 上限 + 等级）
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub slot: SlotKey,
    pub load: Mass,
    pub hard_limit: Mass,
    pub soft_limit: Mass,
    pub remaining: Mass,
    pub level: LoadLevel,
}

// ==========================================
// CapacityLedger - 产能台账
// ==========================================
pub struct CapacityLedger {
    items: Arc<OrderItemRepository>,
    rules: Arc<EligibilityRules>,
}

impl CapacityLedger {
    pub fn new(items: Arc<OrderItemRepository>, rules: Arc<EligibilityRules>) -> Self {
        Self { items, rules }
    }

    /// 槽位当前负载
    pub fn load(&self, slot: &SlotKey) -> RepositoryResult<Mass> {
        self.items.sum_load(slot)
    }

    /// 槽位负载 + 机组上限（移动引擎的容量判断入口）
    pub fn slot_load(&self, slot: &SlotKey) -> AllocationResult<SlotLoad> {
        let (hard_limit, soft_limit) = self
            .rules
            .limits(&slot.unit_code)
            .ok_or_else(|| AllocationError::UnknownUnit(slot.unit_code.clone()))?;
        let load = self.load(slot)?;
        Ok(SlotLoad {
            slot: slot.clone(),
            load,
            hard_limit,
            soft_limit,
        })
    }

    /// 槽位状态
    pub fn slot_status(&self, slot: &SlotKey) -> AllocationResult<SlotStatus> {
        Ok(status_of(self.slot_load(slot)?))
    }

    /// 方案在日期窗口内的负载快照（单次分组查询）
    pub fn load_window(
        &self,
        plan_name: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> RepositoryResult<LoadSnapshot> {
        let rows = self.items.sum_load_window(plan_name, date_from, date_to)?;
        Ok(LoadSnapshot {
            loads: rows.into_iter().collect(),
        })
    }

    /// 窗口内每个 (机组, 日期) 的状态表，机组按配置顺序
    pub fn status_table(
        &self,
        plan_name: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> AllocationResult<Vec<SlotStatus>> {
        let snapshot = self.load_window(plan_name, date_from, date_to)?;
        let mut table = Vec::new();
        for date in date_from.iter_days().take_while(|d| *d <= date_to) {
            for unit in self.rules.unit_codes() {
                let slot = SlotKey::new(unit, date, plan_name);
                let (hard_limit, soft_limit) = self
                    .rules
                    .limits(unit)
                    .ok_or_else(|| AllocationError::UnknownUnit(unit.to_string()))?;
                let load = snapshot.load(&slot)?;
                table.push(status_of(SlotLoad {
                    slot,
                    load,
                    hard_limit,
                    soft_limit,
                }));
            }
        }
        Ok(table)
    }
}

impl LoadQuery for CapacityLedger {
    fn load(&self, slot: &SlotKey) -> RepositoryResult<Mass> {
        CapacityLedger::load(self, slot)
    }
}

fn status_of(slot_load: SlotLoad) -> SlotStatus {
    SlotStatus {
        remaining: slot_load.remaining(),
        level: slot_load.level(),
        slot: slot_load.slot,
        load: slot_load.load,
        hard_limit: slot_load.hard_limit,
        soft_limit: slot_load.soft_limit,
    }
}

// ==========================================
// LoadSnapshot - 内存负载快照
// ==========================================
// 快照中不存在的槽位视为空载
#[derive(Debug, Clone, Default)]
pub struct LoadSnapshot {
    loads: BTreeMap<SlotKey, Mass>,
}

impl LoadSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: SlotKey, load: Mass) {
        self.loads.insert(slot, load);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &Mass)> {
        self.loads.iter()
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }
}

impl LoadQuery for LoadSnapshot {
    fn load(&self, slot: &SlotKey) -> RepositoryResult<Mass> {
        Ok(self.loads.get(slot).copied().unwrap_or(Mass::ZERO))
    }
}

// ==========================================
// ProjectedLoads - 预估负载（基础负载 + 增量）
// ==========================================
// 用于在未提交前模拟 "移出原槽位 / 放入目标槽位" 后的负载
pub struct ProjectedLoads<'a> {
    base: &'a dyn LoadQuery,
    deltas: HashMap<SlotKey, Mass>,
}

impl<'a> ProjectedLoads<'a> {
    pub fn new(base: &'a dyn LoadQuery) -> Self {
        Self {
            base,
            deltas: HashMap::new(),
        }
    }

    pub fn adjust(&mut self, slot: &SlotKey, delta: Mass) -> &mut Self {
        *self.deltas.entry(slot.clone()).or_insert(Mass::ZERO) += delta;
        self
    }
}

impl LoadQuery for ProjectedLoads<'_> {
    fn load(&self, slot: &SlotKey) -> RepositoryResult<Mass> {
        let base = self.base.load(slot)?;
        let delta = self.deltas.get(slot).copied().unwrap_or(Mass::ZERO);
        Ok((base + delta).clamp_non_negative())
    }
}
