// ==========================================
// 产能落位引擎 - 质量适配规则
// ==========================================
// 职责: 机组 → (硬上限, 软上限, 允许质量, 质量优先顺序) 静态查表
// 输入: 已校验的 AllocatorConfig
// 红线: 纯查表，不访问存储
// ==========================================

use crate::config::AllocatorConfig;
use crate::domain::mass::Mass;
use crate::domain::types::normalize_quality;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct UnitRule {
    code: String,
    hard_limit: Mass,
    soft_limit: Mass,
    qualities: HashSet<String>,
    priority: Vec<String>,
}

// ==========================================
// EligibilityRules - 质量适配规则表
// ==========================================
#[derive(Debug, Clone)]
pub struct EligibilityRules {
    units: Vec<UnitRule>, // 按配置顺序（落位查找的机组遍历顺序）
}

impl EligibilityRules {
    pub fn new(config: &AllocatorConfig) -> Self {
        let units = config
            .units
            .iter()
            .map(|u| UnitRule {
                code: u.code.clone(),
                hard_limit: u.hard_limit(),
                soft_limit: u.soft_limit(),
                qualities: u.qualities.iter().map(|q| normalize_quality(q)).collect(),
                priority: u
                    .priority_order()
                    .iter()
                    .map(|q| normalize_quality(q))
                    .collect(),
            })
            .collect();
        Self { units }
    }

    fn rule(&self, unit: &str) -> Option<&UnitRule> {
        self.units.iter().find(|u| u.code == unit)
    }

    /// 机组是否允许该质量（未知机组/空质量一律不适配）
    pub fn is_eligible(&self, unit: &str, quality: &str) -> bool {
        let quality = normalize_quality(quality);
        if quality.is_empty() {
            return false;
        }
        self.rule(unit)
            .map(|r| r.qualities.contains(&quality))
            .unwrap_or(false)
    }

    /// 机组产能上限 (硬上限, 软上限)
    pub fn limits(&self, unit: &str) -> Option<(Mass, Mass)> {
        self.rule(unit).map(|r| (r.hard_limit, r.soft_limit))
    }

    /// 全部机组代码（配置顺序）
    pub fn unit_codes(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|u| u.code.as_str())
    }

    /// 允许该质量的机组（配置顺序）
    pub fn eligible_units<'a>(&'a self, quality: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.unit_codes()
            .filter(move |code| self.is_eligible(code, quality))
    }

    /// 质量的默认机组: 第一个允许该质量的机组，否则第一个机组
    pub fn preferred_unit(&self, quality: &str) -> Option<&str> {
        self.units
            .iter()
            .find(|u| self.is_eligible(&u.code, quality))
            .or_else(|| self.units.first())
            .map(|u| u.code.as_str())
    }

    /// 机组的质量优先顺序（排序器使用）
    pub fn quality_priority(&self, unit: &str) -> Option<&[String]> {
        self.rule(unit).map(|r| r.priority.as_slice())
    }
}
