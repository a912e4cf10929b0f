// ==========================================
// 产能落位引擎 - 槽位产能领域模型
// ==========================================
// 槽位 = (机组, 有效日期, 方案)
// 不同方案之间负载互不影响
// 红线: 提交后任一槽位负载不得超过机组硬上限
// ==========================================

use crate::domain::mass::Mass;
use crate::domain::types::LoadLevel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// SlotKey - 槽位键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub unit_code: String,
    pub date: NaiveDate,
    pub plan_name: String,
}

impl SlotKey {
    pub fn new(unit_code: &str, date: NaiveDate, plan_name: &str) -> Self {
        Self {
            unit_code: unit_code.to_string(),
            date,
            plan_name: plan_name.to_string(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}[{}]", self.unit_code, self.date, self.plan_name)
    }
}

// ==========================================
// SlotLoad - 槽位负载快照
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotLoad {
    pub slot: SlotKey,
    pub load: Mass,       // 已占用
    pub hard_limit: Mass, // 硬上限
    pub soft_limit: Mass, // 软上限 (告警阈值)
}

impl SlotLoad {
    /// 放入 required 时的超限报告
    pub fn overflow_report(&self, required: Mass) -> OverflowReport {
        OverflowReport::new(self.slot.clone(), self.hard_limit, self.load, required)
    }
}

// ==========================================
// Trait: CapacityConstraint
// ==========================================
// 用途: 移动引擎/落位查找的约束检查接口
pub trait CapacityConstraint {
    /// 检查是否可再放入指定重量（不超过硬上限）
    fn can_add(&self, weight: Mass) -> bool;

    /// 检查是否超过硬上限
    fn is_overflow(&self) -> bool;

    /// 剩余产能（相对硬上限，下限 0）
    fn remaining(&self) -> Mass;

    /// 负载等级
    fn level(&self) -> LoadLevel;
}

impl CapacityConstraint for SlotLoad {
    fn can_add(&self, weight: Mass) -> bool {
        self.load + weight <= self.hard_limit
    }

    fn is_overflow(&self) -> bool {
        self.load > self.hard_limit
    }

    fn remaining(&self) -> Mass {
        (self.hard_limit - self.load).clamp_non_negative()
    }

    fn level(&self) -> LoadLevel {
        if self.is_overflow() {
            LoadLevel::Overloaded
        } else if self.load == self.hard_limit {
            LoadLevel::Full
        } else if self.load > self.soft_limit {
            LoadLevel::AboveSoft
        } else {
            LoadLevel::Normal
        }
    }
}

// ==========================================
// OverflowReport - 超限报告
// ==========================================
// 不做任何修改，供调用方选择策略后重试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowReport {
    pub slot: SlotKey,
    pub available: Mass,
    pub limit: Mass,
    pub current_load: Mass,
    pub required: Mass,
}

impl OverflowReport {
    pub fn new(slot: SlotKey, limit: Mass, current_load: Mass, required: Mass) -> Self {
        Self {
            slot,
            available: (limit - current_load).clamp_non_negative(),
            limit,
            current_load,
            required,
        }
    }
}

impl fmt::Display for OverflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 产能不足: 可用={}, 上限={}, 当前={}, 需求={}",
            self.slot, self.available, self.limit, self.current_load, self.required
        )
    }
}
