// ==========================================
// 产能落位引擎 - 重量值对象
// ==========================================
// 存储口径: 整数公斤 (与上游订单 qty 一致)
// 展示口径: 吨 (产能上限/报告)
// ==========================================
// 拆分守恒要求 "拆分量 + 余量 == 原重量" 精确成立,
// 因此内部不使用浮点吨位做加减
// 加减饱和到 i64 边界，不回绕
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// 重量（公斤，整数）
///
/// 允许为负，仅用于表达负载增量（例如移出原槽位）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mass(i64);

impl Mass {
    pub const ZERO: Mass = Mass(0);

    pub const fn from_kg(kg: i64) -> Self {
        Mass(kg)
    }

    /// 吨 → 公斤，四舍五入到整公斤
    pub fn from_tons(tons: f64) -> Self {
        Mass((tons * 1000.0).round() as i64)
    }

    pub const fn kg(self) -> i64 {
        self.0
    }

    pub fn tons(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// 下限截断为 0
    pub fn clamp_non_negative(self) -> Self {
        Mass(self.0.max(0))
    }
}

impl fmt::Display for Mass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}t", self.tons())
    }
}

impl Add for Mass {
    type Output = Mass;

    fn add(self, rhs: Mass) -> Mass {
        Mass(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Mass {
    fn add_assign(&mut self, rhs: Mass) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Mass {
    type Output = Mass;

    fn sub(self, rhs: Mass) -> Mass {
        Mass(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Mass {
    fn sub_assign(&mut self, rhs: Mass) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Neg for Mass {
    type Output = Mass;

    fn neg(self) -> Mass {
        Mass(self.0.saturating_neg())
    }
}

impl Sum for Mass {
    fn sum<I: Iterator<Item = Mass>>(iter: I) -> Mass {
        iter.fold(Mass::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Mass> for Mass {
    fn sum<I: Iterator<Item = &'a Mass>>(iter: I) -> Mass {
        iter.copied().sum()
    }
}
