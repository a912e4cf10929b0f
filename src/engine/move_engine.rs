// ==========================================
// 产能落位引擎 - 移动/拆分引擎
// ==========================================
// 流程: 台账检查 → (超限时) 落位查找 → 变更集提交 (事务内复核硬上限)
// 超限策略: 询问 / 强制移动 / 严格次日 / 拆分，互斥
// 红线: 任一失败路径不修改存储状态；拆分全有或全无
// 并发: 提交复核冲突时从最新负载重新评估整个请求，最多 commit_retries 次
// ==========================================

use crate::config::AllocatorConfig;
use crate::domain::capacity::{CapacityConstraint, OverflowReport, SlotKey, SlotLoad};
use crate::domain::item::OrderItem;
use crate::domain::mass::Mass;
use crate::domain::types::normalize_plan_name;
use crate::engine::eligibility::EligibilityRules;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::ledger::{CapacityLedger, ProjectedLoads};
use crate::engine::slot_finder::{SlotFinder, SlotRequest};
use crate::repository::error::RepositoryError;
use crate::repository::item_repo::{
    AppliedChanges, ItemChange, ItemChangeSet, OrderItemRepository, SeqPosition,
};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ==========================================
// 请求 / 策略
// ==========================================

/// 超限处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovePolicy {
    /// 不修改，返回超限报告
    #[default]
    Ask,
    /// 通过落位查找移到最近可行槽位
    ForceMove,
    /// 只尝试目标机组的次日
    StrictNextDay,
    /// 目标槽位放入可用部分，余量经落位查找另行安置
    Split { min_split: Option<Mass> },
}

/// 显式放行项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveOverrides {
    /// 忽略质量适配
    pub ignore_quality: bool,
    /// 允许移动非草稿排产单上的订单行
    pub allow_finalized: bool,
}

/// 移动请求
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub item_id: String,
    pub target_unit: String,
    pub target_date: NaiveDate,
    pub plan_name: String,
    /// 目标槽位中的位置（1 起始）
    pub sequence_hint: Option<u32>,
    pub policy: MovePolicy,
    pub overrides: MoveOverrides,
}

impl MoveRequest {
    pub fn new(item_id: &str, target_unit: &str, target_date: NaiveDate) -> Self {
        Self {
            item_id: item_id.to_string(),
            target_unit: target_unit.trim().to_string(),
            target_date,
            plan_name: normalize_plan_name(None),
            sequence_hint: None,
            policy: MovePolicy::Ask,
            overrides: MoveOverrides::default(),
        }
    }

    pub fn with_plan(mut self, plan_name: &str) -> Self {
        self.plan_name = normalize_plan_name(Some(plan_name));
        self
    }

    pub fn with_sequence_hint(mut self, position: u32) -> Self {
        self.sequence_hint = Some(position);
        self
    }

    pub fn with_policy(mut self, policy: MovePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_overrides(mut self, overrides: MoveOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    fn target_slot(&self) -> SlotKey {
        SlotKey::new(&self.target_unit, self.target_date, &self.plan_name)
    }

    fn position(&self) -> SeqPosition {
        self.sequence_hint
            .map(SeqPosition::At)
            .unwrap_or(SeqPosition::Append)
    }
}

// ==========================================
// 结果
// ==========================================

/// 最终槽位的得出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 直接放入请求的槽位
    Direct,
    /// 强制移动，由落位查找给出
    Relocated,
    /// 严格次日
    NextDay,
}

/// 订单行落位结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub item_id: String,
    pub slot: SlotKey,
    pub weight: Mass,
    pub seq_no: i32,
    pub resolution: Resolution,
    /// 提交后槽位负载超过软上限
    pub soft_limit_exceeded: bool,
}

/// 拆分结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitPlacement {
    /// 原订单行（保留部分）
    pub kept: Placement,
    /// 新建的拆分订单行
    pub spawned: Placement,
}

impl SplitPlacement {
    pub fn total_weight(&self) -> Mass {
        self.kept.weight + self.spawned.weight
    }
}

/// 移动结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MoveOutcome {
    Moved(Placement),
    Split(SplitPlacement),
    /// 产能不足，未做任何修改
    Overflow(OverflowReport),
}

// ==========================================
// MoveEngine - 移动/拆分引擎
// ==========================================
pub struct MoveEngine {
    items: Arc<OrderItemRepository>,
    rules: Arc<EligibilityRules>,
    ledger: CapacityLedger,
    finder: SlotFinder,
    min_split: Mass,
    commit_retries: u32,
}

impl MoveEngine {
    pub fn new(
        items: Arc<OrderItemRepository>,
        rules: Arc<EligibilityRules>,
        config: &AllocatorConfig,
    ) -> Self {
        Self {
            ledger: CapacityLedger::new(items.clone(), rules.clone()),
            finder: SlotFinder::new(rules.clone(), config.lookahead_days),
            items,
            rules,
            min_split: config.min_split(),
            commit_retries: config.commit_retries,
        }
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn finder(&self) -> &SlotFinder {
        &self.finder
    }

    // ==========================================
    // 单行移动
    // ==========================================

    /// 移动订单行到目标槽位，按策略处理超限
    #[instrument(skip(self, request), fields(
        item_id = %request.item_id,
        unit = %request.target_unit,
        date = %request.target_date,
        plan = %request.plan_name,
        policy = ?request.policy
    ))]
    pub fn move_item(&self, request: &MoveRequest) -> AllocationResult<MoveOutcome> {
        self.with_retry(|| self.try_move(request))
    }

    fn try_move(&self, request: &MoveRequest) -> AllocationResult<MoveOutcome> {
        let item = self.load_item(&request.item_id)?;
        self.check_mutable(&item, request.overrides)?;
        self.unit_limits(&request.target_unit)?;
        self.check_quality(&item, &request.target_unit, request.overrides)?;

        let target = request.target_slot();

        // 纯重排: 负载不变，不做产能检查
        if item.counts_toward_load() && item.is_in_slot(&target) {
            let placement =
                self.commit_relocation(&item, &target, request.position(), Resolution::Direct)?;
            return Ok(MoveOutcome::Moved(placement));
        }

        let pool = self.ledger.slot_load(&target)?;
        if pool.can_add(item.weight) {
            let placement =
                self.commit_relocation(&item, &target, request.position(), Resolution::Direct)?;
            return Ok(MoveOutcome::Moved(placement));
        }

        match request.policy {
            MovePolicy::Ask => {
                let report = pool.overflow_report(item.weight);
                info!(report = %report, "产能不足，等待调用方选择策略");
                Ok(MoveOutcome::Overflow(report))
            }
            MovePolicy::ForceMove => self.force_move(&item, request),
            MovePolicy::StrictNextDay => self.strict_next_day(&item, request),
            MovePolicy::Split { min_split } => {
                let minimum = min_split.unwrap_or(self.min_split);
                self.split_into_target(&item, request, &pool, minimum)
            }
        }
    }

    fn force_move(&self, item: &OrderItem, request: &MoveRequest) -> AllocationResult<MoveOutcome> {
        let mut loads = ProjectedLoads::new(&self.ledger);
        if let Some(source) = self.counted_slot(item) {
            loads.adjust(&source, -item.weight);
        }

        let found = self.finder.find_slot(
            &loads,
            &SlotRequest {
                weight: item.weight,
                quality: &item.quality,
                preferred_unit: &request.target_unit,
                start_date: request.target_date,
                plan_name: &request.plan_name,
                max_lookahead_days: None,
            },
        )?;
        let Some(slot) = found else {
            return Err(self.no_slot(item.weight, &item.quality, request.target_date));
        };

        let target = request.target_slot();
        let (position, resolution) = if slot == target {
            (request.position(), Resolution::Direct)
        } else {
            (SeqPosition::Append, Resolution::Relocated)
        };
        info!(found = %slot, "强制移动: 落位查找给出槽位");
        let placement = self.commit_relocation(item, &slot, position, resolution)?;
        Ok(MoveOutcome::Moved(placement))
    }

    fn strict_next_day(
        &self,
        item: &OrderItem,
        request: &MoveRequest,
    ) -> AllocationResult<MoveOutcome> {
        let next_date = request
            .target_date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AllocationError::InvalidRequest("目标日期越界".to_string()))?;
        let next = SlotKey::new(&request.target_unit, next_date, &request.plan_name);

        if item.counts_toward_load() && item.is_in_slot(&next) {
            let placement =
                self.commit_relocation(item, &next, SeqPosition::Append, Resolution::NextDay)?;
            return Ok(MoveOutcome::Moved(placement));
        }

        let pool = self.ledger.slot_load(&next)?;
        if pool.can_add(item.weight) {
            let placement =
                self.commit_relocation(item, &next, SeqPosition::Append, Resolution::NextDay)?;
            return Ok(MoveOutcome::Moved(placement));
        }

        let report = pool.overflow_report(item.weight);
        info!(report = %report, "严格次日: 次日同样产能不足");
        Ok(MoveOutcome::Overflow(report))
    }

    /// 目标槽位放入可用部分，余量新建拆分行经落位查找安置
    fn split_into_target(
        &self,
        item: &OrderItem,
        request: &MoveRequest,
        pool: &SlotLoad,
        minimum: Mass,
    ) -> AllocationResult<MoveOutcome> {
        let target = &pool.slot;
        let available = pool.remaining();
        if available < minimum || !available.is_positive() {
            return Err(AllocationError::SplitTooSmall {
                available: available.to_string(),
                minimum: minimum.to_string(),
            });
        }

        let kept_weight = available;
        let remainder = item.weight - kept_weight;

        let mut loads = ProjectedLoads::new(&self.ledger);
        if let Some(source) = self.counted_slot(item) {
            loads.adjust(&source, -item.weight);
        }
        loads.adjust(target, kept_weight);

        let found = self.finder.find_slot(
            &loads,
            &SlotRequest {
                weight: remainder,
                quality: &item.quality,
                preferred_unit: &request.target_unit,
                start_date: request.target_date,
                plan_name: &request.plan_name,
                max_lookahead_days: None,
            },
        )?;
        let Some(remainder_slot) = found else {
            return Err(self.no_slot(remainder, &item.quality, request.target_date));
        };

        let spawned_id = uuid::Uuid::new_v4().to_string();
        let mut changeset = ItemChangeSet::new();
        changeset
            .push(ItemChange::Resize {
                item_id: item.item_id.clone(),
                weight: kept_weight,
                mark_split: true,
            })
            .push(ItemChange::Relocate {
                item_id: item.item_id.clone(),
                target: target.clone(),
                position: request.position(),
            })
            .push(ItemChange::SpawnSplit {
                item_id: spawned_id.clone(),
                origin_id: item.item_id.clone(),
                weight: remainder,
                target: remainder_slot.clone(),
                position: SeqPosition::Append,
            })
            .guard(target.clone(), pool.hard_limit);
        let (remainder_hard, _) = self.unit_limits(&remainder_slot.unit_code)?;
        changeset.guard(remainder_slot.clone(), remainder_hard);

        let applied = self.items.apply_changeset(&changeset)?;

        let kept = self.placement(&item.item_id, target, kept_weight, &applied, Resolution::Direct)?;
        let spawned = self.placement(
            &spawned_id,
            &remainder_slot,
            remainder,
            &applied,
            Resolution::Relocated,
        )?;
        info!(
            kept = %kept.slot,
            kept_weight = %kept_weight,
            spawned_id = %spawned_id,
            spawned = %spawned.slot,
            remainder = %remainder,
            "拆分完成"
        );
        Ok(MoveOutcome::Split(SplitPlacement { kept, spawned }))
    }

    // ==========================================
    // 批量移动到日期
    // ==========================================

    /// 批量移动到指定日期（可选指定机组）
    ///
    /// 按最终机组汇总新增重量，任一槽位超过硬上限则整批拒绝；
    /// 未分配机组的订单行落到其质量的默认机组；落位后追加到槽位末尾
    #[instrument(skip(self, item_ids, date, unit, plan_name, overrides), fields(
        count = item_ids.len(),
        date = %date,
        unit = ?unit,
        plan = plan_name
    ))]
    pub fn move_items_to_date(
        &self,
        item_ids: &[String],
        date: NaiveDate,
        unit: Option<&str>,
        plan_name: &str,
        overrides: MoveOverrides,
    ) -> AllocationResult<Vec<Placement>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let plan_name = normalize_plan_name(Some(plan_name));
        self.with_retry(|| self.try_move_items_to_date(item_ids, date, unit, &plan_name, overrides))
    }

    fn try_move_items_to_date(
        &self,
        item_ids: &[String],
        date: NaiveDate,
        unit: Option<&str>,
        plan_name: &str,
        overrides: MoveOverrides,
    ) -> AllocationResult<Vec<Placement>> {
        let unit = unit.map(str::trim).filter(|u| !u.is_empty());
        if let Some(unit) = unit {
            self.unit_limits(unit)?;
        }

        // 重复 id 只计一次
        let mut seen = HashSet::new();
        let unique_ids: Vec<&String> = item_ids.iter().filter(|id| seen.insert(*id)).collect();

        let mut planned: Vec<(OrderItem, SlotKey)> = Vec::with_capacity(unique_ids.len());
        let mut added: BTreeMap<SlotKey, Mass> = BTreeMap::new();

        for item_id in unique_ids {
            let item = self.load_item(item_id)?;
            self.check_mutable(&item, overrides)?;

            let final_unit = match (unit, item.unit_code.as_deref()) {
                (Some(u), _) => u.to_string(),
                (None, Some(current)) => current.to_string(),
                (None, None) => self
                    .rules
                    .preferred_unit(&item.quality)
                    .map(str::to_string)
                    .ok_or_else(|| AllocationError::UnknownUnit(String::new()))?,
            };
            self.unit_limits(&final_unit)?;
            self.check_quality(&item, &final_unit, overrides)?;

            let slot = SlotKey::new(&final_unit, date, plan_name);
            if !(item.counts_toward_load() && item.is_in_slot(&slot)) {
                *added.entry(slot.clone()).or_insert(Mass::ZERO) += item.weight;
            }
            planned.push((item, slot));
        }

        let mut changeset = ItemChangeSet::new();
        for (slot, weight) in &added {
            let pool = self.ledger.slot_load(slot)?;
            if !pool.can_add(*weight) {
                let report = pool.overflow_report(*weight);
                warn!(report = %report, "批量移动超过硬上限，整批拒绝");
                return Err(AllocationError::CapacityExceeded(report));
            }
            changeset.guard(slot.clone(), pool.hard_limit);
        }

        for (item, slot) in &planned {
            changeset.push(ItemChange::Relocate {
                item_id: item.item_id.clone(),
                target: slot.clone(),
                position: SeqPosition::Append,
            });
        }

        let applied = self.items.apply_changeset(&changeset)?;
        let placements = planned
            .iter()
            .map(|(item, slot)| {
                self.placement(&item.item_id, slot, item.weight, &applied, Resolution::Direct)
            })
            .collect::<AllocationResult<Vec<_>>>()?;
        info!(moved = placements.len(), "批量移动完成");
        Ok(placements)
    }

    // ==========================================
    // 手工拆分
    // ==========================================

    /// 手工拆分: 从订单行分出 split_weight 到 target_unit（同一作用域），余量留在原处
    #[instrument(skip(self, split_weight, overrides), fields(split_weight = %split_weight))]
    pub fn split_item(
        &self,
        item_id: &str,
        split_weight: Mass,
        target_unit: &str,
        overrides: MoveOverrides,
    ) -> AllocationResult<SplitPlacement> {
        self.with_retry(|| self.try_split_item(item_id, split_weight, target_unit.trim(), overrides))
    }

    fn try_split_item(
        &self,
        item_id: &str,
        split_weight: Mass,
        target_unit: &str,
        overrides: MoveOverrides,
    ) -> AllocationResult<SplitPlacement> {
        let item = self.load_item(item_id)?;
        self.check_mutable(&item, overrides)?;
        let Some(source) = item.slot() else {
            return Err(AllocationError::InvalidRequest(format!(
                "订单行{}尚未分配机组，不能拆分",
                item_id
            )));
        };
        if !split_weight.is_positive() || split_weight >= item.weight {
            return Err(AllocationError::InvalidRequest(format!(
                "拆分量必须大于 0 且小于原重量: 拆分量={}, 原重量={}",
                split_weight, item.weight
            )));
        }
        self.unit_limits(target_unit)?;
        self.check_quality(&item, target_unit, overrides)?;

        let target = SlotKey::new(target_unit, item.plan_date, &item.plan_name);
        let mut changeset = ItemChangeSet::new();
        if target != source || !item.counts_toward_load() {
            let pool = self.ledger.slot_load(&target)?;
            if !pool.can_add(split_weight) {
                return Err(AllocationError::CapacityExceeded(
                    pool.overflow_report(split_weight),
                ));
            }
            changeset.guard(target.clone(), pool.hard_limit);
        }

        let kept_weight = item.weight - split_weight;
        let spawned_id = uuid::Uuid::new_v4().to_string();
        changeset
            .push(ItemChange::Resize {
                item_id: item.item_id.clone(),
                weight: kept_weight,
                mark_split: true,
            })
            .push(ItemChange::SpawnSplit {
                item_id: spawned_id.clone(),
                origin_id: item.item_id.clone(),
                weight: split_weight,
                target: target.clone(),
                position: SeqPosition::Append,
            });

        let applied = self.items.apply_changeset(&changeset)?;
        let kept = self.placement(&item.item_id, &source, kept_weight, &applied, Resolution::Direct)?;
        let spawned =
            self.placement(&spawned_id, &target, split_weight, &applied, Resolution::Direct)?;
        info!(spawned_id = %spawned_id, target = %target, "手工拆分完成");
        Ok(SplitPlacement { kept, spawned })
    }

    // ==========================================
    // 手工重排
    // ==========================================

    /// 按给定顺序重写槽位序号（必须覆盖槽位全部订单行）
    #[instrument(skip(self, slot, ordered_ids), fields(slot = %slot, count = ordered_ids.len()))]
    pub fn reorder_slot(
        &self,
        slot: &SlotKey,
        ordered_ids: &[String],
    ) -> AllocationResult<Vec<(String, i32)>> {
        self.unit_limits(&slot.unit_code)?;
        let mut changeset = ItemChangeSet::new();
        changeset.push(ItemChange::Reorder {
            slot: slot.clone(),
            ordered_ids: ordered_ids.to_vec(),
        });
        let applied = self.items.apply_changeset(&changeset)?;
        Ok(ordered_ids
            .iter()
            .map(|id| (id.clone(), applied.seq_no(id).unwrap_or_default()))
            .collect())
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn with_retry<T>(&self, mut op: impl FnMut() -> AllocationResult<T>) -> AllocationResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Err(err) if err.is_capacity_conflict() => {
                    if attempt >= self.commit_retries {
                        warn!(attempt, error = %err, "提交复核冲突，放弃重试");
                        return Err(AllocationError::ConcurrentModification {
                            attempts: attempt,
                            detail: err.to_string(),
                        });
                    }
                    warn!(attempt, error = %err, "提交复核冲突，基于最新负载重新评估");
                }
                other => return other,
            }
        }
    }

    fn load_item(&self, item_id: &str) -> AllocationResult<OrderItem> {
        self.items
            .find_by_id(item_id)?
            .ok_or_else(|| RepositoryError::not_found("OrderItem", item_id).into())
    }

    fn unit_limits(&self, unit: &str) -> AllocationResult<(Mass, Mass)> {
        self.rules
            .limits(unit)
            .ok_or_else(|| AllocationError::UnknownUnit(unit.to_string()))
    }

    fn check_mutable(&self, item: &OrderItem, overrides: MoveOverrides) -> AllocationResult<()> {
        if !overrides.allow_finalized && !item.sheet_status.is_mutable() {
            return Err(AllocationError::FinalizedRecord {
                item_id: item.item_id.clone(),
                status: item.sheet_status.to_string(),
            });
        }
        Ok(())
    }

    fn check_quality(
        &self,
        item: &OrderItem,
        unit: &str,
        overrides: MoveOverrides,
    ) -> AllocationResult<()> {
        if !overrides.ignore_quality && !self.rules.is_eligible(unit, &item.quality) {
            return Err(AllocationError::IneligibleQuality {
                item_id: item.item_id.clone(),
                unit: unit.to_string(),
                quality: item.quality.clone(),
            });
        }
        Ok(())
    }

    /// 订单行当前计入负载的槽位
    fn counted_slot(&self, item: &OrderItem) -> Option<SlotKey> {
        if item.counts_toward_load() {
            item.slot()
        } else {
            None
        }
    }

    fn no_slot(&self, weight: Mass, quality: &str, start: NaiveDate) -> AllocationError {
        warn!(weight = %weight, quality, start = %start, "前瞻窗口内无可用槽位");
        AllocationError::NoSlotAvailable {
            weight: weight.to_string(),
            quality: quality.to_string(),
            start_date: start.to_string(),
            lookahead_days: self.finder.default_lookahead_days(),
        }
    }

    fn placement(
        &self,
        item_id: &str,
        slot: &SlotKey,
        weight: Mass,
        applied: &AppliedChanges,
        resolution: Resolution,
    ) -> AllocationResult<Placement> {
        let (_, soft_limit) = self.unit_limits(&slot.unit_code)?;
        let load = self.ledger.load(slot)?;
        let soft_limit_exceeded = load > soft_limit;
        if soft_limit_exceeded {
            warn!(slot = %slot, load = %load, soft_limit = %soft_limit, "槽位负载超过软上限");
        }
        Ok(Placement {
            item_id: item_id.to_string(),
            slot: slot.clone(),
            weight,
            seq_no: applied.seq_no(item_id).unwrap_or_default(),
            resolution,
            soft_limit_exceeded,
        })
    }

    fn commit_relocation(
        &self,
        item: &OrderItem,
        slot: &SlotKey,
        position: SeqPosition,
        resolution: Resolution,
    ) -> AllocationResult<Placement> {
        let (hard_limit, _) = self.unit_limits(&slot.unit_code)?;
        let mut changeset = ItemChangeSet::new();
        changeset.push(ItemChange::Relocate {
            item_id: item.item_id.clone(),
            target: slot.clone(),
            position,
        });
        if !(item.counts_toward_load() && item.is_in_slot(slot)) {
            changeset.guard(slot.clone(), hard_limit);
        }
        let applied = self.items.apply_changeset(&changeset)?;
        let placement = self.placement(&item.item_id, slot, item.weight, &applied, resolution)?;
        info!(
            item_id = %item.item_id,
            slot = %placement.slot,
            seq_no = placement.seq_no,
            resolution = ?resolution,
            "订单行落位完成"
        );
        Ok(placement)
    }
}
