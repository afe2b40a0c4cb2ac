//! 关节向量与关节使能位向量
//!
//! PSM 的关节数随器械类型变化（运动学侧 6 或 8 个，PID 侧固定 7 个），
//! 因此这里使用变长向量，内部以 `SmallVec` 内联存储，避免控制循环中的堆分配。
//!
//! # 示例
//!
//! ```rust
//! use psm_protocol::{JointVector, ENGAGE_JOINTS, NUM_PID_JOINTS};
//!
//! let mut goal = JointVector::zeros(NUM_PID_JOINTS);
//! goal.fill(ENGAGE_JOINTS, -1.0);
//! goal.negate(ENGAGE_JOINTS);
//! assert_eq!(goal[3], 1.0);
//! assert_eq!(goal[2], 0.0);
//! ```

use smallvec::SmallVec;
use std::fmt;
use std::ops::{Deref, DerefMut, Range};

/// PID 关节数（含夹爪）
pub const NUM_PID_JOINTS: usize = 7;

/// 执行器数量（耦合矩阵维度）
pub const NUM_ACTUATORS: usize = 7;

/// 插入关节索引
pub const INSERTION_INDEX: usize = 2;

/// 夹爪关节索引
pub const JAW_INDEX: usize = 6;

/// 耦合切换期间保持使能的关节数（前 3 个）
pub const HELD_JOINTS: usize = 3;

/// 接合（engage）时来回摆动的最后 4 个关节
pub const ENGAGE_JOINTS: Range<usize> = HELD_JOINTS..NUM_PID_JOINTS;

/// 关节向量
///
/// 位置、速度、力矩、容差、限位等都使用此类型。
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointVector(SmallVec<[f64; 8]>);

impl JointVector {
    /// 创建全零向量
    pub fn zeros(len: usize) -> Self {
        Self::from_elem(0.0, len)
    }

    /// 创建所有元素相同的向量
    pub fn from_elem(value: f64, len: usize) -> Self {
        JointVector(SmallVec::from_elem(value, len))
    }

    /// 从切片创建
    pub fn from_slice(values: &[f64]) -> Self {
        JointVector(SmallVec::from_slice(values))
    }

    /// 获取切片
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// 将 `range` 内的元素设置为 `value`
    ///
    /// # Panics
    ///
    /// `range` 越界时 panic（与切片索引一致）。
    pub fn fill(&mut self, range: Range<usize>, value: f64) {
        self.0[range].fill(value);
    }

    /// 从 `other` 的同一区间拷贝元素
    ///
    /// # Panics
    ///
    /// `range` 对任一向量越界时 panic。
    pub fn copy_range_from(&mut self, range: Range<usize>, other: &JointVector) {
        self.0[range.clone()].copy_from_slice(&other.0[range]);
    }

    /// 将 `range` 内的元素取反
    pub fn negate(&mut self, range: Range<usize>) {
        for v in &mut self.0[range] {
            *v = -*v;
        }
    }

    /// 所有元素都是有限值
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// 与另一个向量的最大绝对差（长度不同时返回 `None`）
    pub fn max_abs_diff(&self, other: &JointVector) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max),
        )
    }

    /// 每个元素与 `other` 的差都不超过 `tolerance` 的对应元素
    ///
    /// 三个向量长度不同时返回 `false`。
    pub fn within(&self, other: &JointVector, tolerance: &JointVector) -> bool {
        self.len() == other.len()
            && self.len() == tolerance.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .zip(tolerance.0.iter())
                .all(|((a, b), tol)| (a - b).abs() <= *tol)
    }
}

impl Deref for JointVector {
    type Target = [f64];

    #[inline]
    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for JointVector {
    #[inline]
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl From<Vec<f64>> for JointVector {
    fn from(values: Vec<f64>) -> Self {
        JointVector(SmallVec::from_vec(values))
    }
}

impl<const N: usize> From<[f64; N]> for JointVector {
    fn from(values: [f64; N]) -> Self {
        Self::from_slice(&values)
    }
}

impl FromIterator<f64> for JointVector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        JointVector(iter.into_iter().collect())
    }
}

impl fmt::Display for JointVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", v)?;
        }
        write!(f, "]")
    }
}

/// 关节使能位向量
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointMask(SmallVec<[bool; 8]>);

impl JointMask {
    /// 所有关节使用同一使能值
    pub fn all(enabled: bool, len: usize) -> Self {
        JointMask(SmallVec::from_elem(enabled, len))
    }

    /// 耦合切换使用的使能集合：前 3 个关节使能，最后 4 个失能
    pub fn engage_disabled() -> Self {
        (0..NUM_PID_JOINTS).map(|i| i < HELD_JOINTS).collect()
    }

    /// 从切片创建
    pub fn from_slice(values: &[bool]) -> Self {
        JointMask(SmallVec::from_slice(values))
    }

    /// 指定关节是否使能（越界视为未使能）
    pub fn is_enabled(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// 使能关节数量
    pub fn count_enabled(&self) -> usize {
        self.0.iter().filter(|&&e| e).count()
    }
}

impl Deref for JointMask {
    type Target = [bool];

    #[inline]
    fn deref(&self) -> &[bool] {
        &self.0
    }
}

impl FromIterator<bool> for JointMask {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        JointMask(iter.into_iter().collect())
    }
}

impl fmt::Display for JointMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &e in self.0.iter() {
            write!(f, "{}", if e { '1' } else { '0' })?;
        }
        Ok(())
    }
}
