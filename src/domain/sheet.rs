// ==========================================
// 产能落位引擎 - 排产单（作用域容器）领域模型
// ==========================================
// 作用域 = (有效日期, 方案名称)
// 同一上游订单在同一作用域下只保留一个草稿排产单
// ==========================================

use crate::domain::types::SheetStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// PlanSheet - 排产单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSheet {
    pub sheet_id: String,                 // 排产单ID
    pub order_ref: String,                // 上游订单引用 (销售订单号/客户编码)
    pub customer: Option<String>,         // 客户名称
    pub plan_name: String,                // 方案名称
    pub ordered_date: NaiveDate,          // 下单日期
    pub planned_date: Option<NaiveDate>,  // 计划日期 (覆盖下单日期)
    pub status: SheetStatus,              // 单据状态
    pub created_at: NaiveDateTime,        // 创建时间
}

impl PlanSheet {
    /// 有效日期：计划日期优先，否则为下单日期
    pub fn effective_date(&self) -> NaiveDate {
        self.planned_date.unwrap_or(self.ordered_date)
    }

    pub fn is_mutable(&self) -> bool {
        self.status.is_mutable()
    }
}
