// ==========================================
// 产能落位引擎 - 落位查找
// ==========================================
// 职责: 为给定重量/质量寻找最近的可行槽位
// 顺序: 首选机组 → 同日其他适配机组（配置顺序）→ 次日 ... 直至前瞻窗口结束
// 红线: 贪心、不回溯、不做部分放入；不持锁，结果在提交时必须复核
// ==========================================

use crate::domain::capacity::{CapacityConstraint, SlotKey, SlotLoad};
use crate::domain::mass::Mass;
use crate::engine::eligibility::EligibilityRules;
use crate::engine::ledger::LoadQuery;
use crate::repository::error::RepositoryResult;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::{debug, instrument};

/// 落位查找请求
#[derive(Debug, Clone)]
pub struct SlotRequest<'a> {
    pub weight: Mass,
    pub quality: &'a str,
    pub preferred_unit: &'a str,
    pub start_date: NaiveDate,
    pub plan_name: &'a str,
    /// None 时使用配置的前瞻天数
    pub max_lookahead_days: Option<u32>,
}

// ==========================================
// SlotFinder - 落位查找
// ==========================================
pub struct SlotFinder {
    rules: Arc<EligibilityRules>,
    default_lookahead_days: u32,
}

impl SlotFinder {
    pub fn new(rules: Arc<EligibilityRules>, default_lookahead_days: u32) -> Self {
        Self {
            rules,
            default_lookahead_days,
        }
    }

    pub fn default_lookahead_days(&self) -> u32 {
        self.default_lookahead_days
    }

    /// 查找可行槽位
    ///
    /// 依次探测 start_date + 0 ..= start_date + max_lookahead_days；
    /// 找不到时返回 None
    #[instrument(skip(self, loads, request), fields(
        weight = %request.weight,
        quality = request.quality,
        preferred_unit = request.preferred_unit,
        start_date = %request.start_date,
        plan = request.plan_name
    ))]
    pub fn find_slot(
        &self,
        loads: &dyn LoadQuery,
        request: &SlotRequest<'_>,
    ) -> RepositoryResult<Option<SlotKey>> {
        let lookahead = request
            .max_lookahead_days
            .unwrap_or(self.default_lookahead_days);

        for offset in 0..=lookahead {
            let Some(date) = request.start_date.checked_add_days(Days::new(u64::from(offset)))
            else {
                break;
            };

            if self.rules.is_eligible(request.preferred_unit, request.quality) {
                let slot = SlotKey::new(request.preferred_unit, date, request.plan_name);
                if self.fits(loads, &slot, request.weight)? {
                    debug!(slot = %slot, offset, "首选机组可放入");
                    return Ok(Some(slot));
                }
            }

            for unit in self.rules.eligible_units(request.quality) {
                if unit == request.preferred_unit {
                    continue;
                }
                let slot = SlotKey::new(unit, date, request.plan_name);
                if self.fits(loads, &slot, request.weight)? {
                    debug!(slot = %slot, offset, "邻近机组可放入");
                    return Ok(Some(slot));
                }
            }
        }

        debug!(lookahead, "前瞻窗口内无可用槽位");
        Ok(None)
    }

    fn fits(&self, loads: &dyn LoadQuery, slot: &SlotKey, weight: Mass) -> RepositoryResult<bool> {
        let Some((hard_limit, soft_limit)) = self.rules.limits(&slot.unit_code) else {
            return Ok(false);
        };
        let pool = SlotLoad {
            slot: slot.clone(),
            load: loads.load(slot)?,
            hard_limit,
            soft_limit,
        };
        Ok(pool.can_add(weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::engine::ledger::LoadSnapshot;

    fn finder() -> SlotFinder {
        SlotFinder::new(Arc::new(EligibilityRules::new(&AllocatorConfig::default())), 30)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn request(weight_t: f64, quality: &'static str, unit: &'static str) -> SlotRequest<'static> {
        SlotRequest {
            weight: Mass::from_tons(weight_t),
            quality,
            preferred_unit: unit,
            start_date: day(2),
            plan_name: "Default",
            max_lookahead_days: None,
        }
    }

    #[test]
    fn test_preferred_unit_first() {
        let snapshot = LoadSnapshot::new();
        let found = finder()
            .find_slot(&snapshot, &request(1.0, "GOLD", "Unit 3"))
            .unwrap();
        assert_eq!(found, Some(SlotKey::new("Unit 3", day(2), "Default")));
    }

    #[test]
    fn test_neighbour_unit_same_day() {
        let mut snapshot = LoadSnapshot::new();
        snapshot.insert(SlotKey::new("Unit 1", day(2), "Default"), Mass::from_tons(4.4));
        let found = finder()
            .find_slot(&snapshot, &request(0.1, "PREMIUM", "Unit 1"))
            .unwrap();
        // PREMIUM: Unit 1 / Unit 3 / Unit 4，Unit 2 不适配
        assert_eq!(found, Some(SlotKey::new("Unit 3", day(2), "Default")));
    }

    #[test]
    fn test_ineligible_preferred_unit_is_skipped() {
        let snapshot = LoadSnapshot::new();
        let found = finder()
            .find_slot(&snapshot, &request(1.0, "DELUXE", "Unit 1"))
            .unwrap();
        assert_eq!(found, Some(SlotKey::new("Unit 2", day(2), "Default")));
    }

    #[test]
    fn test_advances_to_next_day() {
        let mut snapshot = LoadSnapshot::new();
        snapshot.insert(SlotKey::new("Unit 2", day(2), "Default"), Mass::from_tons(11.5));
        let found = finder()
            .find_slot(&snapshot, &request(1.0, "DELUXE", "Unit 2"))
            .unwrap();
        assert_eq!(found, Some(SlotKey::new("Unit 2", day(3), "Default")));
    }

    #[test]
    fn test_weight_above_every_limit_not_found() {
        let snapshot = LoadSnapshot::new();
        let found = finder()
            .find_slot(&snapshot, &request(13.0, "GOLD", "Unit 1"))
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_huge_weight_never_fits_loaded_slot() {
        let mut snapshot = LoadSnapshot::new();
        snapshot.insert(SlotKey::new("Unit 2", day(2), "Default"), Mass::from_tons(1.0));
        let mut req = request(0.0, "GOLD", "Unit 2");
        req.weight = Mass::from_kg(i64::MAX);
        req.max_lookahead_days = Some(1);
        assert_eq!(finder().find_slot(&snapshot, &req).unwrap(), None);
    }

    #[test]
    fn test_lookahead_bound_is_inclusive() {
        let mut snapshot = LoadSnapshot::new();
        for d in 2..=4 {
            snapshot.insert(SlotKey::new("Unit 2", day(d), "Default"), Mass::from_tons(12.0));
        }
        let finder = finder();
        let mut req = request(1.0, "DELUXE", "Unit 2");

        req.max_lookahead_days = Some(1);
        assert_eq!(finder.find_slot(&snapshot, &req).unwrap(), None);

        req.max_lookahead_days = Some(3);
        assert_eq!(
            finder.find_slot(&snapshot, &req).unwrap(),
            Some(SlotKey::new("Unit 2", day(5), "Default"))
        );
    }

    #[test]
    fn test_plans_do_not_interact() {
        let mut snapshot = LoadSnapshot::new();
        snapshot.insert(SlotKey::new("Unit 2", day(2), "Rush"), Mass::from_tons(12.0));
        let found = finder()
            .find_slot(&snapshot, &request(1.0, "DELUXE", "Unit 2"))
            .unwrap();
        assert_eq!(found, Some(SlotKey::new("Unit 2", day(2), "Default")));
    }
}
