// ==========================================
// 产能落位引擎 - 上机排序
// ==========================================
// 职责: 对即将下发到机组的一批订单行排序，减少换色/换品质
// 规则:
// 1) 白色系先行，按机组品质优先级（可按种子品质旋转），同品质克重大者优先
// 2) 彩色阶段: 同品质内取最浅颜色，同色跨品质整批连排
// 3) 极深色之后若有米色/奶油色可用，优先插入最深的缓冲色
// 4) 无法归类（未知机组/非适配品质）的订单行按输入顺序追加到末尾
// 红线: 纯函数，不访问存储；相同输入与种子结果完全一致
// ==========================================

use crate::config::AllocatorConfig;
use crate::domain::item::OrderItem;
use crate::domain::types::{normalize_color, normalize_quality, BridgeReason, SequencePhase};
use crate::engine::eligibility::EligibilityRules;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// 排序种子（该机组上一次运行的最后品质/颜色）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSeed {
    pub quality: Option<String>,
    pub color: Option<String>,
}

impl SequenceSeed {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_item(item: &OrderItem) -> Self {
        Self {
            quality: Some(item.quality.clone()),
            color: Some(item.color.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quality.is_none() && self.color.is_none()
    }
}

/// 排序结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencedItem {
    pub seq_no: u32,
    pub item: OrderItem,
    pub phase: SequencePhase,
    /// 批次末尾过渡点
    pub bridge: Option<BridgeReason>,
}

struct Entry {
    idx: usize,
    quality: String,
    color: String,
    item: OrderItem,
}

// ==========================================
// Sequencer - 上机排序
// ==========================================
pub struct Sequencer {
    rules: EligibilityRules,
    color_rank: HashMap<String, usize>,
    white: HashSet<String>,
    very_dark: HashSet<String>,
    buffer: HashSet<String>,
}

impl Sequencer {
    pub fn new(config: &AllocatorConfig) -> Self {
        Self {
            rules: EligibilityRules::new(config),
            color_rank: config
                .color_order
                .iter()
                .enumerate()
                .map(|(i, c)| (normalize_color(c), i))
                .collect(),
            white: config.white_colors.iter().map(|c| normalize_color(c)).collect(),
            very_dark: config.very_dark_colors.iter().map(|c| normalize_color(c)).collect(),
            buffer: config.buffer_colors.iter().map(|c| normalize_color(c)).collect(),
        }
    }

    /// 排序一批订单行，返回带 1..N 序号的结果（输入的一个排列）
    #[instrument(skip(self, items, seed), fields(unit = unit, count = items.len()))]
    pub fn sequence(
        &self,
        items: Vec<OrderItem>,
        unit: &str,
        seed: &SequenceSeed,
    ) -> Vec<SequencedItem> {
        let priority: &[String] = self.rules.quality_priority(unit).unwrap_or(&[]);

        let entries = items.into_iter().enumerate().map(|(idx, item)| Entry {
            idx,
            quality: normalize_quality(&item.quality),
            color: normalize_color(&item.color),
            item,
        });
        let (classified, unassigned): (Vec<Entry>, Vec<Entry>) =
            entries.partition(|e| rank_of(priority, &e.quality).is_some());
        let (mut white, colored): (Vec<Entry>, Vec<Entry>) =
            classified.into_iter().partition(|e| self.white.contains(&e.color));

        let seed_quality = seed
            .quality
            .as_deref()
            .map(normalize_quality)
            .filter(|q| priority.contains(q));
        let seed_color = seed.color.as_deref().map(normalize_color);

        // ===== 白色阶段 =====
        let start = seed_quality
            .as_deref()
            .and_then(|q| rank_of(priority, q))
            .unwrap_or(0);
        let rotated = |q: &str| {
            rank_of(priority, q)
                .map(|r| (r + priority.len() - start) % priority.len())
                .unwrap_or(usize::MAX)
        };
        white.sort_by(|a, b| {
            rotated(&a.quality)
                .cmp(&rotated(&b.quality))
                .then_with(|| by_density(a, b))
        });

        let quality_anchor = white
            .last()
            .map(|e| e.quality.clone())
            .or(seed_quality);
        let color_anchor = if white.is_empty() { seed_color } else { None };

        // ===== 彩色阶段 =====
        let batches = self.color_batches(colored, priority, quality_anchor, color_anchor);

        // ===== 组装 =====
        let bridges: Vec<Option<BridgeReason>> = (0..batches.len())
            .map(|i| self.batch_bridge(&batches[i], batches.get(i + 1)))
            .collect();
        let has_color = !batches.is_empty();
        let white_count = white.len();
        let batch_count = batches.len();

        let mut out: Vec<SequencedItem> = Vec::new();
        let mut push = |entry: Entry, phase: SequencePhase, bridge: Option<BridgeReason>| {
            let seq_no = out.len() as u32 + 1;
            out.push(SequencedItem {
                seq_no,
                item: entry.item,
                phase,
                bridge,
            });
        };

        for (i, entry) in white.into_iter().enumerate() {
            let bridge = (i + 1 == white_count && has_color).then_some(BridgeReason::WhiteToColor);
            push(entry, SequencePhase::White, bridge);
        }
        for (batch, bridge) in batches.into_iter().zip(bridges) {
            let len = batch.len();
            for (i, entry) in batch.into_iter().enumerate() {
                push(entry, SequencePhase::Color, if i + 1 == len { bridge } else { None });
            }
        }
        let unassigned_count = unassigned.len();
        for entry in unassigned {
            push(entry, SequencePhase::Unassigned, None);
        }

        debug!(
            white = white_count,
            color_batches = batch_count,
            unassigned = unassigned_count,
            "排序完成"
        );
        out
    }

    /// 彩色阶段: 逐批取色，迭代上限约为两倍订单行数
    fn color_batches(
        &self,
        mut remaining: Vec<Entry>,
        priority: &[String],
        mut quality_anchor: Option<String>,
        mut color_anchor: Option<String>,
    ) -> Vec<Vec<Entry>> {
        let cap = remaining.len() * 2 + 5;
        let mut batches = Vec::new();
        let mut pending_buffer = false;
        let mut iterations = 0;

        while !remaining.is_empty() && iterations < cap {
            iterations += 1;
            let Some(chosen) = self.next_color(
                &remaining,
                priority,
                &mut quality_anchor,
                color_anchor.as_deref(),
                pending_buffer,
            ) else {
                break;
            };

            let (mut batch, rest): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut remaining)
                .into_iter()
                .partition(|e| e.color == chosen);
            remaining = rest;
            batch.sort_by(|a, b| {
                rank_of(priority, &a.quality)
                    .cmp(&rank_of(priority, &b.quality))
                    .then_with(|| by_density(a, b))
            });

            pending_buffer = self.very_dark.contains(&chosen);
            quality_anchor = batch.last().map(|e| e.quality.clone());
            color_anchor = Some(chosen);
            batches.push(batch);
        }

        if !remaining.is_empty() {
            remaining.sort_by_key(|e| e.idx);
            batches.push(remaining);
        }
        batches
    }

    fn next_color(
        &self,
        remaining: &[Entry],
        priority: &[String],
        quality_anchor: &mut Option<String>,
        color_anchor: Option<&str>,
        pending_buffer: bool,
    ) -> Option<String> {
        if let Some(color) = color_anchor {
            if remaining.iter().any(|e| e.color == color) {
                return Some(color.to_string());
            }
        }

        // 极深色之后: 最深的缓冲色
        if pending_buffer {
            if let Some(buffer) = remaining
                .iter()
                .filter(|e| self.buffer.contains(&e.color))
                .max_by(|a, b| self.color_cmp(&a.color, &b.color))
            {
                return Some(buffer.color.clone());
            }
        }

        // 同品质内从锚定颜色往深处推进，无更深颜色时回到最浅
        if let Some(quality) = quality_anchor.as_deref() {
            if let Some(color) = self.lightest_in_quality(remaining, quality, color_anchor) {
                return Some(color);
            }
        }

        // 当前品质已排完，按优先级（循环）推进到下一个仍有订单行的品质
        let start = quality_anchor
            .as_deref()
            .and_then(|q| rank_of(priority, q))
            .map(|r| r + 1)
            .unwrap_or(0);
        for step in 0..priority.len() {
            let quality = &priority[(start + step) % priority.len()];
            if let Some(color) = self.lightest_in_quality(remaining, quality, None) {
                *quality_anchor = Some(quality.clone());
                return Some(color);
            }
        }

        let first = remaining.first()?;
        *quality_anchor = Some(first.quality.clone());
        Some(first.color.clone())
    }

    /// 品质内最浅颜色；给定 floor 时优先取不浅于 floor 的颜色
    fn lightest_in_quality(
        &self,
        remaining: &[Entry],
        quality: &str,
        floor: Option<&str>,
    ) -> Option<String> {
        let lightest = |min_rank: usize| {
            remaining
                .iter()
                .filter(|e| e.quality == quality)
                .filter(|e| self.color_rank.get(&e.color).is_some_and(|r| *r >= min_rank))
                .min_by(|a, b| self.color_cmp(&a.color, &b.color))
                .map(|e| e.color.clone())
        };
        if let Some(min_rank) = floor.and_then(|c| self.color_rank.get(c).copied()) {
            if let Some(color) = lightest(min_rank) {
                return Some(color);
            }
        }
        remaining
            .iter()
            .filter(|e| e.quality == quality)
            .min_by(|a, b| self.color_cmp(&a.color, &b.color))
            .map(|e| e.color.clone())
    }

    /// 颜色由浅到深；未登记颜色排在所有已知颜色之后，按名称
    fn color_cmp(&self, a: &str, b: &str) -> Ordering {
        let rank = |c: &str| self.color_rank.get(c).copied().unwrap_or(usize::MAX);
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    }

    fn batch_bridge(&self, batch: &[Entry], next: Option<&Vec<Entry>>) -> Option<BridgeReason> {
        let last = batch.last()?;
        let next_first = next?.first()?;
        if self.very_dark.contains(&last.color) && self.buffer.contains(&next_first.color) {
            Some(BridgeReason::DarkBuffer)
        } else if last.quality != next_first.quality {
            Some(BridgeReason::QualityChange)
        } else {
            None
        }
    }
}

fn rank_of(priority: &[String], quality: &str) -> Option<usize> {
    priority.iter().position(|q| q == quality)
}

/// 克重大者优先，其次输入顺序
fn by_density(a: &Entry, b: &Entry) -> Ordering {
    b.item
        .gsm
        .total_cmp(&a.item.gsm)
        .then_with(|| a.idx.cmp(&b.idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mass::Mass;
    use crate::domain::types::SheetStatus;
    use chrono::NaiveDate;

    fn item(id: &str, color: &str, quality: &str, gsm: f64) -> OrderItem {
        OrderItem {
            item_id: id.to_string(),
            sheet_id: "S1".to_string(),
            unit_code: Some("Unit 2".to_string()),
            seq_no: 0,
            weight: Mass::from_tons(1.0),
            quality: quality.to_string(),
            color: color.to_string(),
            gsm,
            is_split: false,
            split_from: None,
            created_seq: 0,
            plan_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            plan_name: "Default".to_string(),
            sheet_status: SheetStatus::Draft,
        }
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(&AllocatorConfig::default())
    }

    fn ids(result: &[SequencedItem]) -> Vec<&str> {
        result.iter().map(|s| s.item.item_id.as_str()).collect()
    }

    #[test]
    fn test_white_then_color_grouped_by_quality_order() {
        let items = vec![
            item("w1", "WHITE", "GOLD", 60.0),
            item("r3", "RED", "BRONZE", 60.0),
            item("r2", "RED", "SILVER", 60.0),
        ];
        let result = sequencer().sequence(items, "Unit 2", &SequenceSeed::none());

        assert_eq!(ids(&result), vec!["w1", "r2", "r3"]);
        assert_eq!(result.iter().map(|s| s.seq_no).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(result[0].phase, SequencePhase::White);
        assert_eq!(result[0].bridge, Some(BridgeReason::WhiteToColor));
        assert_eq!(result[1].phase, SequencePhase::Color);
        assert_eq!(result[1].bridge, None);
        assert_eq!(result[2].bridge, None);
    }

    #[test]
    fn test_white_phase_rotates_to_seed_quality() {
        let items = vec![
            item("gold", "WHITE", "GOLD", 60.0),
            item("bronze", "WHITE", "BRONZE", 60.0),
            item("silver", "BRIGHT WHITE", "SILVER", 60.0),
        ];
        let seed = SequenceSeed {
            quality: Some("silver".to_string()),
            color: None,
        };
        let result = sequencer().sequence(items, "Unit 2", &seed);
        assert_eq!(ids(&result), vec!["silver", "bronze", "gold"]);
        assert!(result.iter().all(|s| s.bridge.is_none()));
    }

    #[test]
    fn test_white_ties_prefer_heavier_gsm() {
        let items = vec![
            item("light", "WHITE", "GOLD", 60.0),
            item("heavy", "WHITE", "GOLD", 80.0),
        ];
        let result = sequencer().sequence(items, "Unit 2", &SequenceSeed::none());
        assert_eq!(ids(&result), vec!["heavy", "light"]);
    }

    #[test]
    fn test_color_kept_together_across_qualities() {
        let items = vec![
            item("red-gold", "RED", "GOLD", 60.0),
            item("sky-silver", "SKY BLUE", "SILVER", 60.0),
            item("red-bronze", "RED", "BRONZE", 60.0),
        ];
        let result = sequencer().sequence(items, "Unit 2", &SequenceSeed::none());
        assert_eq!(ids(&result), vec!["red-gold", "red-bronze", "sky-silver"]);
        assert_eq!(result[1].bridge, Some(BridgeReason::QualityChange));
        assert_eq!(result[2].bridge, None);
    }

    #[test]
    fn test_darkest_buffer_follows_very_dark() {
        let items = vec![
            item("black", "BLACK", "GOLD", 60.0),
            item("blue", "LIGHT BLUE", "SILVER", 60.0),
            item("beige1", "BEIGE 1.0", "SILVER", 60.0),
            item("beige5", "BEIGE 5.0", "SILVER", 60.0),
        ];
        let result = sequencer().sequence(items, "Unit 2", &SequenceSeed::none());
        assert_eq!(ids(&result), vec!["black", "beige5", "blue", "beige1"]);
        assert_eq!(result[0].bridge, Some(BridgeReason::DarkBuffer));
    }

    #[test]
    fn test_seed_color_is_continued() {
        let items = vec![
            item("sky", "SKY BLUE", "GOLD", 60.0),
            item("red", "RED", "SILVER", 60.0),
        ];
        let unseeded = sequencer().sequence(items.clone(), "Unit 2", &SequenceSeed::none());
        assert_eq!(ids(&unseeded), vec!["sky", "red"]);

        let seed = SequenceSeed {
            quality: None,
            color: Some("red".to_string()),
        };
        let seeded = sequencer().sequence(items, "Unit 2", &seed);
        assert_eq!(ids(&seeded), vec!["red", "sky"]);
    }

    #[test]
    fn test_color_progression_continues_from_seed_color() {
        let items = vec![
            item("gy", "GOLDEN YELLOW", "BRONZE", 60.0),
            item("red", "RED", "BRONZE", 60.0),
        ];
        let unseeded = sequencer().sequence(items.clone(), "Unit 2", &SequenceSeed::none());
        assert_eq!(ids(&unseeded), vec!["gy", "red"]);

        // 上一轮停在 PINK 3.0: 先排更深的 RED，再回到最浅
        let seed = SequenceSeed {
            quality: Some("BRONZE".to_string()),
            color: Some("PINK 3.0".to_string()),
        };
        let seeded = sequencer().sequence(items, "Unit 2", &seed);
        assert_eq!(ids(&seeded), vec!["red", "gy"]);
    }

    #[test]
    fn test_unclassified_items_appended_in_input_order() {
        let items = vec![
            item("x", "RED", "PREMIUM", 60.0), // Unit 2 不生产 PREMIUM
            item("r", "RED", "GOLD", 60.0),
            item("y", "", "", 60.0),
        ];
        let result = sequencer().sequence(items, "Unit 2", &SequenceSeed::none());
        assert_eq!(ids(&result), vec!["r", "x", "y"]);
        assert_eq!(result[1].phase, SequencePhase::Unassigned);
        assert_eq!(result[2].phase, SequencePhase::Unassigned);

        let unknown = sequencer().sequence(
            vec![item("a", "RED", "GOLD", 60.0), item("b", "WHITE", "GOLD", 60.0)],
            "Unit 9",
            &SequenceSeed::none(),
        );
        assert_eq!(ids(&unknown), vec!["a", "b"]);
        assert!(unknown.iter().all(|s| s.phase == SequencePhase::Unassigned));
    }

    #[test]
    fn test_deterministic_permutation() {
        let colors = ["RED", "WHITE", "BLACK", "BEIGE 3.0", "SKY BLUE", "CREAM 2.0", "NAVY BLUE"];
        let qualities = ["GOLD", "SILVER", "BRONZE", "CLASSIC", "DELUXE"];
        let items: Vec<OrderItem> = (0..40)
            .map(|i| {
                item(
                    &format!("i{}", i),
                    colors[i % colors.len()],
                    qualities[(i * 3) % qualities.len()],
                    50.0 + (i % 4) as f64 * 10.0,
                )
            })
            .collect();
        let seed = SequenceSeed {
            quality: Some("CLASSIC".to_string()),
            color: Some("BLACK".to_string()),
        };

        let first = sequencer().sequence(items.clone(), "Unit 2", &seed);
        let second = sequencer().sequence(items.clone(), "Unit 2", &seed);
        assert_eq!(first, second);

        let mut out_ids: Vec<String> = first.iter().map(|s| s.item.item_id.clone()).collect();
        let mut in_ids: Vec<String> = items.iter().map(|i| i.item_id.clone()).collect();
        out_ids.sort();
        in_ids.sort();
        assert_eq!(out_ids, in_ids);
        assert_eq!(
            first.iter().map(|s| s.seq_no).collect::<Vec<_>>(),
            (1..=40).collect::<Vec<u32>>()
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(sequencer()
            .sequence(Vec::new(), "Unit 2", &SequenceSeed::none())
            .is_empty());
    }
}
