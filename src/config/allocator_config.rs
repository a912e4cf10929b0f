// ==========================================
// 产能落位引擎 - 分配配置
// ==========================================
// 职责: 机组产能上限/品质准入/品质优先级/颜色顺序等静态配置
// 来源: JSON 文件 或 config_kv 表 (见 ConfigManager)
// 约束: 启动时校验一次，之后显式传入各组件
// ==========================================

use crate::domain::mass::Mass;
use crate::domain::types::{normalize_color, normalize_quality};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置存储访问失败: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("配置锁获取失败: {0}")]
    Lock(String),

    #[error("配置无效: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ==========================================
// UnitProfile - 机组配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitProfile {
    pub code: String,
    pub hard_limit_t: f64,
    pub soft_limit_t: f64,
    /// 允许生产的品质
    pub qualities: Vec<String>,
    /// 排序用品质优先级；为空时沿用 qualities 的顺序
    #[serde(default)]
    pub quality_priority: Vec<String>,
}

impl UnitProfile {
    pub fn hard_limit(&self) -> Mass {
        Mass::from_tons(self.hard_limit_t)
    }

    pub fn soft_limit(&self) -> Mass {
        Mass::from_tons(self.soft_limit_t)
    }

    pub fn priority_order(&self) -> &[String] {
        if self.quality_priority.is_empty() {
            &self.qualities
        } else {
            &self.quality_priority
        }
    }
}

fn default_min_split_t() -> f64 {
    0.1
}

fn default_lookahead_days() -> u32 {
    30
}

fn default_commit_retries() -> u32 {
    3
}

// ==========================================
// AllocatorConfig - 分配配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// 机组表（顺序即邻近机组的探测顺序）
    pub units: Vec<UnitProfile>,
    /// 颜色顺序（浅 → 深）
    pub color_order: Vec<String>,
    /// 白色系
    pub white_colors: Vec<String>,
    /// 极深色（之后需要缓冲色）
    pub very_dark_colors: Vec<String>,
    /// 缓冲色（米色/奶油色系）
    pub buffer_colors: Vec<String>,
    #[serde(default = "default_min_split_t")]
    pub min_split_t: f64,
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
}

impl AllocatorConfig {
    /// 从 JSON 文件加载并校验
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 从 JSON 字符串加载并校验
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: AllocatorConfig = serde_json::from_str(raw)?;
        config.validated()
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn min_split(&self) -> Mass {
        Mass::from_tons(self.min_split_t)
    }

    pub fn unit(&self, code: &str) -> Option<&UnitProfile> {
        self.units.iter().find(|u| u.code == code)
    }

    /// 替换颜色顺序（自定义颜色顺序覆盖）
    pub fn with_color_order(mut self, order: Vec<String>) -> ConfigResult<Self> {
        self.color_order = order;
        self.validated()
    }

    /// 归一化 + 校验
    ///
    /// 品质/颜色统一为大写；priority 只能包含准入品质
    pub fn validated(mut self) -> ConfigResult<Self> {
        if self.units.is_empty() {
            return Err(ConfigError::Invalid("至少需要配置一个机组".to_string()));
        }

        let mut seen = HashSet::new();
        for unit in &mut self.units {
            unit.code = unit.code.trim().to_string();
            if unit.code.is_empty() {
                return Err(ConfigError::Invalid("机组代码不能为空".to_string()));
            }
            if !seen.insert(unit.code.clone()) {
                return Err(ConfigError::Invalid(format!("机组代码重复: {}", unit.code)));
            }
            if !(unit.hard_limit_t.is_finite() && unit.hard_limit_t > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "机组{}硬上限必须为正数: {}",
                    unit.code, unit.hard_limit_t
                )));
            }
            if !(unit.soft_limit_t.is_finite() && unit.soft_limit_t >= 0.0)
                || unit.soft_limit_t > unit.hard_limit_t
            {
                return Err(ConfigError::Invalid(format!(
                    "机组{}软上限({})必须在 0 与硬上限({})之间",
                    unit.code, unit.soft_limit_t, unit.hard_limit_t
                )));
            }
            unit.qualities = unit.qualities.iter().map(|q| normalize_quality(q)).collect();
            unit.quality_priority = unit
                .quality_priority
                .iter()
                .map(|q| normalize_quality(q))
                .collect();
            if unit.qualities.is_empty() {
                return Err(ConfigError::Invalid(format!("机组{}未配置准入品质", unit.code)));
            }
            if let Some(q) = unit
                .quality_priority
                .iter()
                .find(|q| !unit.qualities.contains(q))
            {
                return Err(ConfigError::Invalid(format!(
                    "机组{}的品质优先级包含未准入品质: {}",
                    unit.code, q
                )));
            }
        }

        self.color_order = dedup_colors(&self.color_order);
        self.white_colors = dedup_colors(&self.white_colors);
        self.very_dark_colors = dedup_colors(&self.very_dark_colors);
        self.buffer_colors = dedup_colors(&self.buffer_colors);

        if !(self.min_split_t.is_finite() && self.min_split_t > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "最小拆分量必须为正数: {}",
                self.min_split_t
            )));
        }
        if self.lookahead_days == 0 {
            return Err(ConfigError::Invalid("前瞻天数必须大于 0".to_string()));
        }
        if self.commit_retries == 0 {
            return Err(ConfigError::Invalid("提交重试次数必须大于 0".to_string()));
        }

        Ok(self)
    }
}

fn dedup_colors(colors: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    colors
        .iter()
        .map(|c| normalize_color(c))
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 全局品质优先级（各机组按自身准入品质过滤）
const QUALITY_MASTER_ORDER: &[&str] = &[
    "PREMIUM", "PLATINUM", "SUPER PLATINUM", "GOLD", "SILVER", "BRONZE", "CLASSIC",
    "SUPER CLASSIC", "LIFE STYLE", "ECO SPECIAL", "ECO GREEN", "SUPER ECO", "ULTRA", "DELUXE",
];

const COLOR_ORDER: &[&str] = &[
    "BRIGHT WHITE", "SUPER WHITE", "MILKY WHITE", "SUNSHINE WHITE",
    "BLEACH WHITE 1.0", "BLEACH WHITE 2.0", "BLEACH WHITE", "WHITE MIX", "WHITE",
    "CREAM 2.0", "CREAM 3.0", "CREAM 4.0", "CREAM 5.0",
    "GOLDEN YELLOW 4.0 SPL", "GOLDEN YELLOW 1.0", "GOLDEN YELLOW 2.0", "GOLDEN YELLOW 3.0", "GOLDEN YELLOW",
    "LEMON YELLOW 1.0", "LEMON YELLOW 3.0", "LEMON YELLOW",
    "BRIGHT ORANGE", "DARK ORANGE", "ORANGE 2.0",
    "PINK 7.0 DARK", "PINK 6.0 DARK", "DARK PINK", "BABY PINK", "PINK 1.0", "PINK 2.0", "PINK 3.0", "PINK 5.0",
    "CRIMSON RED", "RED", "LIGHT MAROON", "DARK MAROON", "MAROON 1.0", "MAROON 2.0",
    "BLUE 13.0 INK BLUE", "BLUE 12.0 SPL NAVY BLUE", "BLUE 11.0 NAVY BLUE",
    "BLUE 8.0 DARK ROYAL BLUE", "BLUE 7.0 DARK BLUE", "BLUE 6.0 ROYAL BLUE",
    "LIGHT PEACOCK BLUE", "PEACOCK BLUE", "LIGHT MEDICAL BLUE", "MEDICAL BLUE",
    "ROYAL BLUE", "NAVY BLUE", "SKY BLUE", "LIGHT BLUE",
    "BLUE 9.0", "BLUE 4.0", "BLUE 2.0", "BLUE 1.0", "BLUE",
    "PURPLE 4.0 BLACKBERRY", "PURPLE 1.0", "PURPLE 2.0", "PURPLE 3.0", "VOILET",
    "GREEN 13.0 ARMY GREEN", "GREEN 12.0 OLIVE GREEN", "GREEN 11.0 DARK GREEN",
    "GREEN 10.0", "GREEN 9.0 BOTTLE GREEN", "GREEN 8.0 APPLE GREEN",
    "GREEN 7.0", "GREEN 6.0", "GREEN 5.0 GRASS GREEN", "GREEN 4.0",
    "GREEN 3.0 RELIANCE GREEN", "GREEN 2.0 TORQUISE GREEN", "GREEN 1.0 MINT",
    "MEDICAL GREEN", "RELIANCE GREEN", "PARROT GREEN", "GREEN",
    "SILVER 1.0", "SILVER 2.0", "LIGHT GREY", "DARK GREY", "GREY 1.0",
    "CHOCOLATE BROWN 2.0", "CHOCOLATE BROWN", "CHOCOLATE BLACK",
    "BROWN 3.0 DARK COFFEE", "BROWN 2.0 DARK", "BROWN 1.0",
    "CHIKOO 1.0", "CHIKOO 2.0",
    "BEIGE 1.0", "BEIGE 2.0", "BEIGE 3.0", "BEIGE 4.0", "BEIGE 5.0",
    "LIGHT BEIGE", "DARK BEIGE", "BEIGE MIX", "BLACK MIX", "COLOR MIX", "BLACK",
];

fn unit_profile(code: &str, hard: f64, soft: f64, qualities: &[&str]) -> UnitProfile {
    let priority = QUALITY_MASTER_ORDER
        .iter()
        .filter(|q| qualities.contains(q))
        .map(|q| q.to_string())
        .collect();
    UnitProfile {
        code: code.to_string(),
        hard_limit_t: hard,
        soft_limit_t: soft,
        qualities: strings(qualities),
        quality_priority: priority,
    }
}

impl Default for AllocatorConfig {
    /// 现场四机组配置
    fn default() -> Self {
        Self {
            units: vec![
                unit_profile(
                    "Unit 1",
                    4.4,
                    4.0,
                    &["PREMIUM", "PLATINUM", "SUPER PLATINUM", "GOLD", "SILVER"],
                ),
                unit_profile(
                    "Unit 2",
                    12.0,
                    9.0,
                    &[
                        "GOLD", "SILVER", "BRONZE", "CLASSIC", "SUPER CLASSIC", "LIFE STYLE",
                        "ECO SPECIAL", "ECO GREEN", "SUPER ECO", "ULTRA", "DELUXE",
                    ],
                ),
                unit_profile(
                    "Unit 3",
                    9.0,
                    7.8,
                    &["PREMIUM", "PLATINUM", "SUPER PLATINUM", "GOLD", "SILVER", "BRONZE"],
                ),
                unit_profile("Unit 4", 5.5, 4.0, &["PREMIUM", "GOLD", "SILVER", "BRONZE"]),
            ],
            color_order: strings(COLOR_ORDER),
            white_colors: strings(&COLOR_ORDER[..9]),
            very_dark_colors: strings(&[
                "BLACK", "BLACK MIX", "CHOCOLATE BLACK", "CRIMSON RED", "DARK MAROON",
                "MAROON 1.0", "MAROON 2.0",
            ]),
            buffer_colors: strings(&[
                "CREAM 2.0", "CREAM 3.0", "CREAM 4.0", "CREAM 5.0", "BEIGE 1.0", "BEIGE 2.0",
                "BEIGE 3.0", "BEIGE 4.0", "BEIGE 5.0", "LIGHT BEIGE", "DARK BEIGE", "BEIGE MIX",
            ]),
            min_split_t: default_min_split_t(),
            lookahead_days: default_lookahead_days(),
            commit_retries: default_commit_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AllocatorConfig::default().validated().unwrap();
        assert_eq!(config.units.len(), 4);
        assert_eq!(config.unit("Unit 1").unwrap().hard_limit(), Mass::from_kg(4400));
        assert_eq!(config.white_colors.last().map(String::as_str), Some("WHITE"));
        assert_eq!(config.min_split(), Mass::from_kg(100));
    }

    #[test]
    fn test_priority_follows_master_order() {
        let config = AllocatorConfig::default();
        let unit4 = config.unit("Unit 4").unwrap();
        assert_eq!(unit4.priority_order(), &["PREMIUM", "GOLD", "SILVER", "BRONZE"]);
    }

    #[test]
    fn test_soft_above_hard_rejected() {
        let mut config = AllocatorConfig::default();
        config.units[0].soft_limit_t = 5.0;
        let err = config.validated().unwrap_err();
        assert!(err.to_string().contains("软上限"));
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let mut config = AllocatorConfig::default();
        config.units[1].code = "Unit 1".to_string();
        assert!(matches!(config.validated(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_priority_outside_eligibility_rejected() {
        let mut config = AllocatorConfig::default();
        config.units[0].quality_priority.push("DELUXE".to_string());
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_normalizes_names() {
        let mut config = AllocatorConfig::default();
        config.units[0].qualities.push(" classic ".to_string());
        config.color_order.push(" sky blue ".to_string());
        let config = config.validated().unwrap();
        assert!(config.units[0].qualities.contains(&"CLASSIC".to_string()));
        // 重复颜色只保留首次出现的位置
        let sky = config.color_order.iter().filter(|c| *c == "SKY BLUE").count();
        assert_eq!(sky, 1);
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let raw = r#"{
            "units": [
                {"code": "L1", "hard_limit_t": 2.0, "soft_limit_t": 1.5, "qualities": ["gold"]}
            ],
            "color_order": ["white", "red"],
            "white_colors": ["white"],
            "very_dark_colors": [],
            "buffer_colors": []
        }"#;
        let config = AllocatorConfig::from_json_str(raw).unwrap();
        assert_eq!(config.lookahead_days, 30);
        assert_eq!(config.commit_retries, 3);
        assert_eq!(config.units[0].priority_order(), &["GOLD"]);
        assert_eq!(config.color_order, vec!["WHITE", "RED"]);
    }
}
