// ==========================================
// 产能落位引擎 - 订单行数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 订单行查询、槽位负载聚合、变更集事务提交
// ==========================================
// 负载口径: 排除已取消单据；有效日期 = COALESCE(计划日期, 下单日期)
// ==========================================

mod changeset;

pub use changeset::{AppliedChanges, CapacityGuard, ItemChange, ItemChangeSet, SeqPosition};

use crate::domain::capacity::SlotKey;
use crate::domain::item::OrderItem;
use crate::domain::mass::Mass;
use crate::domain::types::{normalize_color, normalize_quality};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sheet_repo::status_from_row;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub(crate) const ITEM_SELECT: &str = r#"
    SELECT i.item_id, i.sheet_id, i.unit_code, i.weight_kg, i.quality, i.color, i.gsm,
           i.seq_no, i.is_split, i.split_from, i.created_seq,
           COALESCE(s.planned_date, s.ordered_date) AS eff_date, s.plan_name, s.status
    FROM order_item i
    JOIN plan_sheet s ON s.sheet_id = i.sheet_id"#;

pub(crate) fn map_item(row: &Row<'_>) -> rusqlite::Result<OrderItem> {
    Ok(OrderItem {
        item_id: row.get(0)?,
        sheet_id: row.get(1)?,
        unit_code: row.get(2)?,
        weight: Mass::from_kg(row.get(3)?),
        quality: row.get(4)?,
        color: row.get(5)?,
        gsm: row.get(6)?,
        seq_no: row.get(7)?,
        is_split: row.get::<_, i64>(8)? != 0,
        split_from: row.get(9)?,
        created_seq: row.get(10)?,
        plan_date: row.get(11)?,
        plan_name: row.get(12)?,
        sheet_status: status_from_row(row, 13)?,
    })
}

/// 新订单行（上游订单准入时写入）
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub item_id: String,
    pub sheet_id: String,
    pub unit_code: Option<String>,
    pub weight: Mass,
    pub quality: String,
    pub color: String,
    pub gsm: f64,
}

/// 订单行查询条件
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub unit_code: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub plan_name: Option<String>,
    pub quality: Option<String>,
    pub color: Option<String>,
    pub include_cancelled: bool,
}

// ==========================================
// OrderItemRepository - 订单行仓储
// ==========================================
pub struct OrderItemRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderItemRepository {
    /// 创建新的OrderItemRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入新订单行，序号追加到所在槽位末尾
    pub fn insert(&self, item: &NewOrderItem) -> RepositoryResult<OrderItem> {
        if item.weight.is_negative() {
            return Err(RepositoryError::ValidationError(format!(
                "订单行{}重量不能为负: {}",
                item.item_id, item.weight
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO order_item (
                    item_id, sheet_id, unit_code, weight_kg, quality, color, gsm,
                    seq_no, is_split, split_from, created_seq
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, NULL,
                    (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM order_item))"#,
            params![
                &item.item_id,
                &item.sheet_id,
                &item.unit_code,
                item.weight.kg(),
                normalize_quality(&item.quality),
                normalize_color(&item.color),
                item.gsm,
            ],
        )?;

        let inserted = Self::find_by_id_tx(&tx, &item.item_id)?
            .ok_or_else(|| RepositoryError::not_found("OrderItem", &item.item_id))?;
        if let Some(slot) = inserted.slot() {
            let next_seq = Self::slot_item_ids_tx(&tx, &slot)?.len() as i32;
            tx.execute(
                "UPDATE order_item SET seq_no = ?1 WHERE item_id = ?2",
                params![next_seq, &item.item_id],
            )?;
        }

        let inserted = Self::find_by_id_tx(&tx, &item.item_id)?
            .ok_or_else(|| RepositoryError::not_found("OrderItem", &item.item_id))?;
        tx.commit()?;
        Ok(inserted)
    }

    /// 按ID查询订单行
    pub fn find_by_id(&self, item_id: &str) -> RepositoryResult<Option<OrderItem>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, item_id)
    }

    /// 查询槽位内订单行（排除已取消），按 序号、创建顺序 排列
    pub fn find_by_slot(&self, slot: &SlotKey) -> RepositoryResult<Vec<OrderItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"{}
               WHERE i.unit_code = ?1
                 AND COALESCE(s.planned_date, s.ordered_date) = ?2
                 AND s.plan_name = ?3
                 AND s.status != 'CANCELLED'
               ORDER BY i.seq_no, i.created_seq"#,
            ITEM_SELECT
        ))?;
        let items = stmt
            .query_map(params![&slot.unit_code, slot.date, &slot.plan_name], map_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// 条件查询订单行
    pub fn find_by_filter(&self, filter: &ItemFilter) -> RepositoryResult<Vec<OrderItem>> {
        let conn = self.get_conn()?;

        let mut sql = format!("{} WHERE 1 = 1", ITEM_SELECT);
        let mut values: Vec<Value> = Vec::new();

        if let Some(unit) = filter.unit_code.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(Value::from(unit.to_string()));
            sql.push_str(&format!(" AND i.unit_code = ?{}", values.len()));
        }
        if let Some(from) = filter.date_from {
            values.push(Value::from(from.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(
                " AND COALESCE(s.planned_date, s.ordered_date) >= ?{}",
                values.len()
            ));
        }
        if let Some(to) = filter.date_to {
            values.push(Value::from(to.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(
                " AND COALESCE(s.planned_date, s.ordered_date) <= ?{}",
                values.len()
            ));
        }
        if let Some(plan) = filter.plan_name.as_deref() {
            values.push(Value::from(plan.to_string()));
            sql.push_str(&format!(" AND s.plan_name = ?{}", values.len()));
        }
        if let Some(quality) = filter.quality.as_deref() {
            values.push(Value::from(normalize_quality(quality)));
            sql.push_str(&format!(" AND i.quality = ?{}", values.len()));
        }
        if let Some(color) = filter.color.as_deref() {
            values.push(Value::from(normalize_color(color)));
            sql.push_str(&format!(" AND i.color = ?{}", values.len()));
        }
        if !filter.include_cancelled {
            sql.push_str(" AND s.status != 'CANCELLED'");
        }
        sql.push_str(
            " ORDER BY COALESCE(s.planned_date, s.ordered_date), i.unit_code, i.seq_no, i.created_seq",
        );

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), map_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// 槽位负载（索引聚合）
    pub fn sum_load(&self, slot: &SlotKey) -> RepositoryResult<Mass> {
        let conn = self.get_conn()?;
        Self::sum_load_tx(&conn, slot)
    }

    /// 方案在日期窗口内的全部槽位负载（单次分组聚合）
    pub fn sum_load_window(
        &self,
        plan_name: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> RepositoryResult<Vec<(SlotKey, Mass)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT i.unit_code, COALESCE(s.planned_date, s.ordered_date) AS eff_date,
                      SUM(i.weight_kg)
               FROM order_item i
               JOIN plan_sheet s ON s.sheet_id = i.sheet_id
               WHERE s.plan_name = ?1
                 AND COALESCE(s.planned_date, s.ordered_date) BETWEEN ?2 AND ?3
                 AND s.status != 'CANCELLED'
                 AND i.unit_code IS NOT NULL
               GROUP BY i.unit_code, eff_date
               ORDER BY eff_date, i.unit_code"#,
        )?;
        let rows = stmt
            .query_map(params![plan_name, date_from, date_to], |row| {
                let unit: String = row.get(0)?;
                let date: NaiveDate = row.get(1)?;
                let kg: i64 = row.get(2)?;
                Ok((SlotKey::new(&unit, date, plan_name), Mass::from_kg(kg)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 机组在指定日期之前最近一次运行的最后一个订单行（作为排序种子）
    pub fn find_last_run(
        &self,
        unit_code: &str,
        before: NaiveDate,
        plan_name: &str,
    ) -> RepositoryResult<Option<OrderItem>> {
        let conn = self.get_conn()?;
        let item = conn
            .query_row(
                &format!(
                    r#"{}
                       WHERE i.unit_code = ?1
                         AND COALESCE(s.planned_date, s.ordered_date) < ?2
                         AND s.plan_name = ?3
                         AND s.status != 'CANCELLED'
                       ORDER BY eff_date DESC, i.seq_no DESC, i.created_seq DESC
                       LIMIT 1"#,
                    ITEM_SELECT
                ),
                params![unit_code, before, plan_name],
                map_item,
            )
            .optional()?;
        Ok(item)
    }

    /// 提交变更集（IMMEDIATE 事务 + 提交时产能复核）
    pub fn apply_changeset(&self, changeset: &ItemChangeSet) -> RepositoryResult<AppliedChanges> {
        let mut conn = self.get_conn()?;
        changeset::apply(&mut conn, changeset)
    }

    // ==========================================
    // 事务内辅助方法
    // ==========================================

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        item_id: &str,
    ) -> RepositoryResult<Option<OrderItem>> {
        let item = conn
            .query_row(
                &format!("{} WHERE i.item_id = ?1", ITEM_SELECT),
                params![item_id],
                map_item,
            )
            .optional()?;
        Ok(item)
    }

    pub(crate) fn sum_load_tx(conn: &Connection, slot: &SlotKey) -> RepositoryResult<Mass> {
        let kg: i64 = conn.query_row(
            r#"SELECT COALESCE(SUM(i.weight_kg), 0)
               FROM order_item i
               JOIN plan_sheet s ON s.sheet_id = i.sheet_id
               WHERE i.unit_code = ?1
                 AND COALESCE(s.planned_date, s.ordered_date) = ?2
                 AND s.plan_name = ?3
                 AND s.status != 'CANCELLED'"#,
            params![&slot.unit_code, slot.date, &slot.plan_name],
            |row| row.get(0),
        )?;
        Ok(Mass::from_kg(kg))
    }

    /// 槽位内订单行ID（排除已取消），按 序号、创建顺序
    pub(crate) fn slot_item_ids_tx(
        conn: &Connection,
        slot: &SlotKey,
    ) -> RepositoryResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"SELECT i.item_id
               FROM order_item i
               JOIN plan_sheet s ON s.sheet_id = i.sheet_id
               WHERE i.unit_code = ?1
                 AND COALESCE(s.planned_date, s.ordered_date) = ?2
                 AND s.plan_name = ?3
                 AND s.status != 'CANCELLED'
               ORDER BY i.seq_no, i.created_seq"#,
        )?;
        let ids = stmt
            .query_map(params![&slot.unit_code, slot.date, &slot.plan_name], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
