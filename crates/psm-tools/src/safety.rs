//! # 安全配置
//!
//! 关节限位、力矩限位与跟踪误差容差档位。
//!
//! 所有数值均为 SI 单位（弧度、米、N·m）。限位集合加载后只读，
//! 由客户端的安全包络管理器在耦合切换完成后下发到 PID 控制器。

use psm_protocol::units::MM;
use psm_protocol::{JointVector, NUM_PID_JOINTS};
use serde::{Deserialize, Serialize};

/// 力矩限位
#[derive(Debug, Clone, PartialEq)]
pub struct TorqueLimits {
    /// 力矩下限（N·m）
    pub lower: JointVector,
    /// 力矩上限（N·m）
    pub upper: JointVector,
}

/// 限位集合（每种耦合配置一份）
///
/// 无器械配置不设置力矩限位（使用控制器默认值），因此 `torque` 为 `None`。
#[derive(Debug, Clone, PartialEq)]
pub struct LimitSet {
    /// 关节位置下限
    pub joint_lower: JointVector,
    /// 关节位置上限
    pub joint_upper: JointVector,
    /// 力矩限位（仅器械配置）
    pub torque: Option<TorqueLimits>,
}

impl LimitSet {
    /// 无器械时的默认关节限位
    ///
    /// 下限 `[-91°, -53°, 0 mm, -175°, -175°, -175°, -175°]`，
    /// 上限 `[91°, 53°, 240 mm, 175°, 175°, 175°, 175°]`。
    pub fn no_tool_default() -> Self {
        let lower = [-91.0, -53.0, 0.0, -175.0, -175.0, -175.0, -175.0];
        let upper = [91.0, 53.0, 240.0, 175.0, 175.0, 175.0, 175.0];
        Self {
            joint_lower: psm_protocol::units::psm_to_si(&lower).into(),
            joint_upper: psm_protocol::units::psm_to_si(&upper).into(),
            torque: None,
        }
    }
}

/// 跟踪误差容差档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToleranceProfile {
    /// 归零/空闲
    #[default]
    Default,
    /// 接合中（收紧容差，关闭关节限位检查）
    Engaging,
    /// 就绪（重新开启关节限位检查）
    Ready,
}

/// 一次下发给 PID 的完整容差配置
///
/// 容差与关节限位检查开关总是成对下发，避免接合期间误报故障。
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingProfile {
    /// 档位
    pub profile: ToleranceProfile,
    /// 跟踪误差容差（7 个 PID 关节）
    pub tolerance: JointVector,
    /// 是否开启关节限位检查
    pub check_joint_limit: bool,
    /// 电位器/编码器一致性容差（`None` 表示保持不变）
    pub pots_to_encoders: Option<JointVector>,
}

impl ToleranceProfile {
    /// 展开为完整容差配置
    pub fn tracking(self) -> TrackingProfile {
        let deg = f64::to_radians;
        match self {
            ToleranceProfile::Default => TrackingProfile {
                profile: self,
                tolerance: psm_vector(
                    deg(20.0),
                    20.0 * MM,
                    [deg(35.0), deg(35.0), deg(35.0), deg(90.0)],
                ),
                check_joint_limit: true,
                pots_to_encoders: Some(psm_vector(deg(15.0), 5.0 * MM, [deg(15.0); 4])),
            },
            ToleranceProfile::Engaging => TrackingProfile {
                profile: self,
                tolerance: psm_vector(deg(10.0), 10.0 * MM, [deg(45.0); 4]),
                check_joint_limit: false,
                pots_to_encoders: None,
            },
            // 器械轴旋转放宽到 120°
            ToleranceProfile::Ready => TrackingProfile {
                profile: self,
                tolerance: psm_vector(
                    deg(20.0),
                    20.0 * MM,
                    [deg(120.0), deg(35.0), deg(35.0), deg(90.0)],
                ),
                check_joint_limit: true,
                pots_to_encoders: Some(psm_vector(deg(20.0), 20.0 * MM, [deg(20.0); 4])),
            },
        }
    }
}

/// 前两个旋转关节共用 `base`，插入关节 `insertion`，最后 4 个关节单独给出
fn psm_vector(base: f64, insertion: f64, last: [f64; 4]) -> JointVector {
    let mut v = JointVector::zeros(NUM_PID_JOINTS);
    v[0] = base;
    v[1] = base;
    v[2] = insertion;
    v[3..].copy_from_slice(&last);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_tool_default_limits() {
        let limits = LimitSet::no_tool_default();
        assert_eq!(limits.joint_lower.len(), NUM_PID_JOINTS);
        assert!(limits.torque.is_none());
        assert!((limits.joint_upper[2] - 0.24).abs() < 1e-12);
        assert!((limits.joint_lower[3] + 175.0_f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_engaging_profile_disables_limit_check() {
        let engaging = ToleranceProfile::Engaging.tracking();
        assert!(!engaging.check_joint_limit);
        assert!((engaging.tolerance[0] - 10.0_f64.to_radians()).abs() < 1e-12);
        assert!((engaging.tolerance[2] - 0.01).abs() < 1e-12);
        for i in 3..7 {
            assert!((engaging.tolerance[i] - 45.0_f64.to_radians()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ready_and_default_enable_limit_check() {
        let ready = ToleranceProfile::Ready.tracking();
        assert!(ready.check_joint_limit);
        assert!((ready.tolerance[3] - 120.0_f64.to_radians()).abs() < 1e-12);
        assert!((ready.tolerance[4] - 35.0_f64.to_radians()).abs() < 1e-12);
        let pots = ready.pots_to_encoders.unwrap();
        assert!((pots[2] - 0.02).abs() < 1e-12);

        let default = ToleranceProfile::Default.tracking();
        assert!(default.check_joint_limit);
        assert_eq!(default.profile, ToleranceProfile::Default);
        assert!((default.tolerance[6] - 90.0_f64.to_radians()).abs() < 1e-12);
    }
}
