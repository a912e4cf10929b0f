// ==========================================
// 产能落位引擎 - 订单行领域模型
// ==========================================
// 订单行是分配的最小单位
// 可由移动引擎改变 机组/作用域/序号，由排序器改变 序号
// 拆分后产生一个兄弟订单行，二者此后独立移动，不再合并
// ==========================================

use crate::domain::capacity::SlotKey;
use crate::domain::mass::Mass;
use crate::domain::types::SheetStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// OrderItem - 订单行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    // ===== 主键 / 归属 =====
    pub item_id: String,
    pub sheet_id: String,

    // ===== 分配信息 =====
    pub unit_code: Option<String>, // 机组 (None = 未分配)
    pub seq_no: i32,               // 机组+日期+方案 内的运行顺序

    // ===== 物料属性 =====
    pub weight: Mass,
    pub quality: String,
    pub color: String,
    pub gsm: f64, // 克重 (排序时作为浓度代理，越大越靠前)

    // ===== 拆分追溯 =====
    pub is_split: bool,
    pub split_from: Option<String>,

    // ===== 创建顺序 (同序号时的稳定排序键) =====
    pub created_seq: i64,

    // ===== 快照字段 (由仓储层 JOIN 排产单补充) =====
    pub plan_date: NaiveDate,
    pub plan_name: String,
    pub sheet_status: SheetStatus,
}

impl OrderItem {
    /// 当前所在槽位（未分配机组时为 None）
    pub fn slot(&self) -> Option<SlotKey> {
        self.unit_code
            .as_deref()
            .map(|unit| SlotKey::new(unit, self.plan_date, &self.plan_name))
    }

    /// 是否计入当前槽位负载
    pub fn counts_toward_load(&self) -> bool {
        self.unit_code.is_some() && self.sheet_status.counts_toward_load()
    }

    /// 是否位于指定槽位
    pub fn is_in_slot(&self, slot: &SlotKey) -> bool {
        self.unit_code.as_deref() == Some(slot.unit_code.as_str())
            && self.plan_date == slot.date
            && self.plan_name == slot.plan_name
    }
}
