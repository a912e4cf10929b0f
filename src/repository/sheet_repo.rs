// ==========================================
// 产能落位引擎 - 排产单（作用域容器）数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 排产单查找/创建/空单删除
// ==========================================

use crate::domain::sheet::PlanSheet;
use crate::domain::types::SheetStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SHEET_COLUMNS: &str = "sheet_id, order_ref, customer, plan_name, ordered_date, planned_date, status, created_at";

/// 文本列 → SheetStatus
pub(crate) fn status_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<SheetStatus> {
    let raw: String = row.get(idx)?;
    raw.parse::<SheetStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_sheet(row: &Row<'_>) -> rusqlite::Result<PlanSheet> {
    Ok(PlanSheet {
        sheet_id: row.get(0)?,
        order_ref: row.get(1)?,
        customer: row.get(2)?,
        plan_name: row.get(3)?,
        ordered_date: row.get(4)?,
        planned_date: row.get(5)?,
        status: status_from_row(row, 6)?,
        created_at: row.get(7)?,
    })
}

// ==========================================
// PlanSheetRepository - 排产单仓储
// ==========================================
pub struct PlanSheetRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanSheetRepository {
    /// 创建新的PlanSheetRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建排产单
    pub fn insert(&self, sheet: &PlanSheet) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, sheet)
    }

    /// 按ID查询排产单
    pub fn find_by_id(&self, sheet_id: &str) -> RepositoryResult<Option<PlanSheet>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, sheet_id)
    }

    /// 查询作用域 (有效日期 + 方案) 下的全部排产单
    pub fn list_by_scope(
        &self,
        date: NaiveDate,
        plan_name: &str,
    ) -> RepositoryResult<Vec<PlanSheet>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM plan_sheet
             WHERE COALESCE(planned_date, ordered_date) = ?1 AND plan_name = ?2
             ORDER BY created_at, sheet_id",
            SHEET_COLUMNS
        ))?;
        let sheets = stmt
            .query_map(params![date, plan_name], map_sheet)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sheets)
    }

    /// 更新单据状态（提交/取消由外部流程驱动）
    pub fn set_status(&self, sheet_id: &str, status: SheetStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE plan_sheet SET status = ?1 WHERE sheet_id = ?2",
            params![status.as_str(), sheet_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("PlanSheet", sheet_id));
        }
        Ok(())
    }

    // ==========================================
    // 事务内辅助方法（供订单行变更集复用）
    // ==========================================

    pub(crate) fn insert_tx(conn: &Connection, sheet: &PlanSheet) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO plan_sheet ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                SHEET_COLUMNS
            ),
            params![
                &sheet.sheet_id,
                &sheet.order_ref,
                &sheet.customer,
                &sheet.plan_name,
                sheet.ordered_date,
                sheet.planned_date,
                sheet.status.as_str(),
                sheet.created_at,
            ],
        )?;
        Ok(())
    }

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        sheet_id: &str,
    ) -> RepositoryResult<Option<PlanSheet>> {
        let sheet = conn
            .query_row(
                &format!("SELECT {} FROM plan_sheet WHERE sheet_id = ?1", SHEET_COLUMNS),
                params![sheet_id],
                map_sheet,
            )
            .optional()?;
        Ok(sheet)
    }

    /// 查找同一上游订单在目标作用域下的草稿排产单（排除源单）
    pub(crate) fn find_draft_for_order_tx(
        conn: &Connection,
        order_ref: &str,
        date: NaiveDate,
        plan_name: &str,
        exclude_sheet_id: &str,
    ) -> RepositoryResult<Option<String>> {
        let sheet_id = conn
            .query_row(
                r#"SELECT sheet_id FROM plan_sheet
                   WHERE order_ref = ?1
                     AND COALESCE(planned_date, ordered_date) = ?2
                     AND plan_name = ?3
                     AND status = 'DRAFT'
                     AND sheet_id != ?4
                   ORDER BY created_at, sheet_id
                   LIMIT 1"#,
                params![order_ref, date, plan_name, exclude_sheet_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(sheet_id)
    }

    /// 以源单为模板，在目标作用域创建新的草稿排产单
    pub(crate) fn clone_for_scope_tx(
        conn: &Connection,
        source: &PlanSheet,
        date: NaiveDate,
        plan_name: &str,
    ) -> RepositoryResult<String> {
        let sheet = PlanSheet {
            sheet_id: uuid::Uuid::new_v4().to_string(),
            order_ref: source.order_ref.clone(),
            customer: source.customer.clone(),
            plan_name: plan_name.to_string(),
            ordered_date: source.ordered_date,
            planned_date: Some(date),
            status: SheetStatus::Draft,
            created_at: chrono::Local::now().naive_local(),
        };
        Self::insert_tx(conn, &sheet)?;
        tracing::debug!(
            sheet_id = %sheet.sheet_id,
            order_ref = %sheet.order_ref,
            date = %date,
            plan = plan_name,
            "为目标作用域创建排产单"
        );
        Ok(sheet.sheet_id)
    }

    /// 排产单为空时删除，返回是否已删除
    pub(crate) fn delete_if_empty_tx(conn: &Connection, sheet_id: &str) -> RepositoryResult<bool> {
        let affected = conn.execute(
            r#"DELETE FROM plan_sheet
               WHERE sheet_id = ?1
                 AND status = 'DRAFT'
                 AND NOT EXISTS (SELECT 1 FROM order_item WHERE sheet_id = ?1)"#,
            params![sheet_id],
        )?;
        Ok(affected > 0)
    }
}
