// ==========================================
// 订单行变更集 - 单事务原子提交
// ==========================================
// 一次移动/拆分/重排产生的全部写操作在同一个 IMMEDIATE 事务内完成:
// - 改挂排产单（跨日期/方案时查找或新建目标草稿单）
// - 源/目标槽位序号重排为 1..N
// - 提交前按硬上限复核受保护槽位，超限整体回滚
// ==========================================

use super::OrderItemRepository;
use crate::domain::capacity::SlotKey;
use crate::domain::mass::Mass;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sheet_repo::PlanSheetRepository;
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 目标槽位中的插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqPosition {
    /// 追加到末尾
    Append,
    /// 插入到第 n 位（1 起始，越界按末尾处理）
    At(u32),
}

/// 单条写操作
#[derive(Debug, Clone, PartialEq)]
pub enum ItemChange {
    /// 订单行落位到目标槽位
    Relocate {
        item_id: String,
        target: SlotKey,
        position: SeqPosition,
    },
    /// 调整重量（拆分时原行保留部分）
    Resize {
        item_id: String,
        weight: Mass,
        mark_split: bool,
    },
    /// 以原行为模板新建拆分行并落位
    SpawnSplit {
        item_id: String,
        origin_id: String,
        weight: Mass,
        target: SlotKey,
        position: SeqPosition,
    },
    /// 按给定顺序重写槽位序号
    Reorder {
        slot: SlotKey,
        ordered_ids: Vec<String>,
    },
}

/// 提交时复核的槽位硬上限
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityGuard {
    pub slot: SlotKey,
    pub hard_limit: Mass,
}

/// 变更集
#[derive(Debug, Clone, Default)]
pub struct ItemChangeSet {
    pub changes: Vec<ItemChange>,
    pub guards: Vec<CapacityGuard>,
}

impl ItemChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: ItemChange) -> &mut Self {
        self.changes.push(change);
        self
    }

    /// 登记复核槽位（同一槽位只登记一次）
    pub fn guard(&mut self, slot: SlotKey, hard_limit: Mass) -> &mut Self {
        if !self.guards.iter().any(|g| g.slot == slot) {
            self.guards.push(CapacityGuard { slot, hard_limit });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// 提交结果
#[derive(Debug, Clone, Default)]
pub struct AppliedChanges {
    /// 受影响订单行的最终序号
    pub seq_nos: HashMap<String, i32>,
    /// 被删除的空排产单
    pub removed_sheets: Vec<String>,
}

impl AppliedChanges {
    pub fn seq_no(&self, item_id: &str) -> Option<i32> {
        self.seq_nos.get(item_id).copied()
    }
}

pub(super) fn apply(
    conn: &mut Connection,
    changeset: &ItemChangeSet,
) -> RepositoryResult<AppliedChanges> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut vacated_sheets: Vec<String> = Vec::new();
    let mut touched_items: Vec<String> = Vec::new();

    for change in &changeset.changes {
        match change {
            ItemChange::Relocate {
                item_id,
                target,
                position,
            } => {
                relocate(&tx, item_id, target, *position, &mut vacated_sheets)?;
                touched_items.push(item_id.clone());
            }
            ItemChange::Resize {
                item_id,
                weight,
                mark_split,
            } => {
                if weight.is_negative() {
                    return Err(RepositoryError::ValidationError(format!(
                        "订单行{}重量不能为负: {}",
                        item_id, weight
                    )));
                }
                let affected = tx.execute(
                    "UPDATE order_item SET weight_kg = ?1, is_split = MAX(is_split, ?2) WHERE item_id = ?3",
                    params![weight.kg(), *mark_split as i64, item_id],
                )?;
                if affected == 0 {
                    return Err(RepositoryError::not_found("OrderItem", item_id));
                }
                touched_items.push(item_id.clone());
            }
            ItemChange::SpawnSplit {
                item_id,
                origin_id,
                weight,
                target,
                position,
            } => {
                spawn_split(&tx, item_id, origin_id, *weight, target)?;
                relocate(&tx, item_id, target, *position, &mut vacated_sheets)?;
                touched_items.push(item_id.clone());
            }
            ItemChange::Reorder { slot, ordered_ids } => {
                reorder(&tx, slot, ordered_ids)?;
                touched_items.extend(ordered_ids.iter().cloned());
            }
        }
    }

    let mut removed_sheets = Vec::new();
    vacated_sheets.dedup();
    for sheet_id in vacated_sheets {
        if PlanSheetRepository::delete_if_empty_tx(&tx, &sheet_id)? {
            debug!(sheet_id = %sheet_id, "源排产单已清空，删除");
            removed_sheets.push(sheet_id);
        }
    }

    for guard in &changeset.guards {
        let load = OrderItemRepository::sum_load_tx(&tx, &guard.slot)?;
        if load > guard.hard_limit {
            warn!(
                slot = %guard.slot,
                load = %load,
                limit = %guard.hard_limit,
                "提交复核超过硬上限，回滚"
            );
            return Err(RepositoryError::CapacityConflict {
                slot: guard.slot.to_string(),
                load_kg: load.kg(),
                limit_kg: guard.hard_limit.kg(),
            });
        }
    }

    let mut seq_nos = HashMap::new();
    for item_id in touched_items {
        if seq_nos.contains_key(&item_id) {
            continue;
        }
        let seq: i32 = tx.query_row(
            "SELECT seq_no FROM order_item WHERE item_id = ?1",
            params![&item_id],
            |row| row.get(0),
        )?;
        seq_nos.insert(item_id, seq);
    }

    tx.commit()?;

    Ok(AppliedChanges {
        seq_nos,
        removed_sheets,
    })
}

/// 改挂排产单 + 更新机组 + 源/目标槽位重排序号
fn relocate(
    conn: &Connection,
    item_id: &str,
    target: &SlotKey,
    position: SeqPosition,
    vacated_sheets: &mut Vec<String>,
) -> RepositoryResult<()> {
    let item = OrderItemRepository::find_by_id_tx(conn, item_id)?
        .ok_or_else(|| RepositoryError::not_found("OrderItem", item_id))?;
    let source_slot = item.slot();

    if item.plan_date != target.date || item.plan_name != target.plan_name {
        let sheet = PlanSheetRepository::find_by_id_tx(conn, &item.sheet_id)?
            .ok_or_else(|| RepositoryError::not_found("PlanSheet", &item.sheet_id))?;
        let target_sheet = match PlanSheetRepository::find_draft_for_order_tx(
            conn,
            &sheet.order_ref,
            target.date,
            &target.plan_name,
            &sheet.sheet_id,
        )? {
            Some(existing) => existing,
            None => PlanSheetRepository::clone_for_scope_tx(
                conn,
                &sheet,
                target.date,
                &target.plan_name,
            )?,
        };
        conn.execute(
            "UPDATE order_item SET sheet_id = ?1 WHERE item_id = ?2",
            params![&target_sheet, item_id],
        )?;
        if !vacated_sheets.contains(&sheet.sheet_id) {
            vacated_sheets.push(sheet.sheet_id);
        }
    }

    conn.execute(
        "UPDATE order_item SET unit_code = ?1 WHERE item_id = ?2",
        params![&target.unit_code, item_id],
    )?;

    let mut ids: Vec<String> = OrderItemRepository::slot_item_ids_tx(conn, target)?
        .into_iter()
        .filter(|id| id != item_id)
        .collect();
    let index = match position {
        SeqPosition::Append => ids.len(),
        SeqPosition::At(n) => (n.max(1) as usize - 1).min(ids.len()),
    };
    ids.insert(index, item_id.to_string());
    write_sequence(conn, &ids)?;

    if let Some(source) = source_slot {
        if &source != target {
            let remaining = OrderItemRepository::slot_item_ids_tx(conn, &source)?;
            write_sequence(conn, &remaining)?;
        }
    }
    Ok(())
}

/// 新建拆分行（继承原行的排产单、质量、颜色、克重）
fn spawn_split(
    conn: &Connection,
    item_id: &str,
    origin_id: &str,
    weight: Mass,
    target: &SlotKey,
) -> RepositoryResult<()> {
    if !weight.is_positive() {
        return Err(RepositoryError::ValidationError(format!(
            "拆分行{}重量必须为正: {}",
            item_id, weight
        )));
    }
    let origin = OrderItemRepository::find_by_id_tx(conn, origin_id)?
        .ok_or_else(|| RepositoryError::not_found("OrderItem", origin_id))?;
    conn.execute(
        r#"INSERT INTO order_item (
                item_id, sheet_id, unit_code, weight_kg, quality, color, gsm,
                seq_no, is_split, split_from, created_seq
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 1, ?8,
                (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM order_item))"#,
        params![
            item_id,
            &origin.sheet_id,
            &target.unit_code,
            weight.kg(),
            &origin.quality,
            &origin.color,
            origin.gsm,
            origin_id,
        ],
    )?;
    Ok(())
}

/// 按给定顺序重写槽位序号；给定ID必须恰好覆盖槽位全部订单行
fn reorder(conn: &Connection, slot: &SlotKey, ordered_ids: &[String]) -> RepositoryResult<()> {
    let current = OrderItemRepository::slot_item_ids_tx(conn, slot)?;

    let mut expected = current.clone();
    expected.sort();
    let mut given = ordered_ids.to_vec();
    given.sort();
    if expected != given {
        return Err(RepositoryError::ValidationError(format!(
            "槽位{}重排列表与槽位订单行不一致: 槽位{}行, 给定{}行",
            slot,
            current.len(),
            ordered_ids.len()
        )));
    }

    write_sequence(conn, ordered_ids)
}

fn write_sequence(conn: &Connection, ids: &[String]) -> RepositoryResult<()> {
    let mut stmt = conn.prepare("UPDATE order_item SET seq_no = ?1 WHERE item_id = ?2")?;
    for (idx, id) in ids.iter().enumerate() {
        stmt.execute(params![(idx + 1) as i32, id])?;
    }
    Ok(())
}
