//! 单位转换
//!
//! 配置文件使用便于人阅读的单位（角度：度，插入深度：毫米），
//! 控制器内部统一使用 SI 单位（弧度、米）。

use crate::joints::NUM_PID_JOINTS;

/// 毫米到米
pub const MM: f64 = 0.001;

/// 关节类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    /// 旋转关节（度 ↔ 弧度）
    Revolute,
    /// 平移关节（毫米 ↔ 米）
    Prismatic,
}

/// PSM 的 7 个 PID 关节类型（第 3 个关节为插入关节）
pub const PSM_JOINT_KINDS: [JointKind; NUM_PID_JOINTS] = [
    JointKind::Revolute,
    JointKind::Revolute,
    JointKind::Prismatic,
    JointKind::Revolute,
    JointKind::Revolute,
    JointKind::Revolute,
    JointKind::Revolute,
];

impl JointKind {
    /// 配置单位 → SI 单位
    #[inline]
    pub fn to_si(self, value: f64) -> f64 {
        match self {
            JointKind::Revolute => value.to_radians(),
            JointKind::Prismatic => value * MM,
        }
    }

    /// SI 单位 → 配置单位
    #[inline]
    pub fn from_si(self, value: f64) -> f64 {
        match self {
            JointKind::Revolute => value.to_degrees(),
            JointKind::Prismatic => value / MM,
        }
    }

    /// 配置单位的显示后缀
    pub const fn unit(self) -> &'static str {
        match self {
            JointKind::Revolute => "deg",
            JointKind::Prismatic => "mm",
        }
    }
}

/// 按 PSM 关节约定将一组配置值转换为 SI 单位
///
/// 超出 7 个的元素按旋转关节处理。
pub fn psm_to_si(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            PSM_JOINT_KINDS
                .get(i)
                .copied()
                .unwrap_or(JointKind::Revolute)
                .to_si(v)
        })
        .collect()
}
