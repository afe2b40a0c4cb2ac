//! 轨迹生成器接口
//!
//! 调用方持有当前设定值（位置/速度），每个控制周期调用一次 [`TrajectoryGenerator::evaluate`]，
//! 生成器就地推进设定值。目标变化时由生成器自行重新规划。

use std::fmt;
use std::time::Duration;

use psm_protocol::JointVector;

/// 单步求值结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryStatus {
    /// 仍在运动
    Working,
    /// 已到达目标
    FinalStateReached,
    /// 求值失败（维度错误、非有限值等）
    Error,
}

impl fmt::Display for TrajectoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectoryStatus::Working => write!(f, "working"),
            TrajectoryStatus::FinalStateReached => write!(f, "final state reached"),
            TrajectoryStatus::Error => write!(f, "error"),
        }
    }
}

/// 轨迹生成器
pub trait TrajectoryGenerator: Send {
    /// 推进一个控制周期
    ///
    /// `position`/`velocity` 为当前设定值，返回时更新为下一周期的设定值。
    fn evaluate(
        &mut self,
        position: &mut JointVector,
        velocity: &mut JointVector,
        goal: &JointVector,
        goal_velocity: &JointVector,
    ) -> TrajectoryStatus;

    /// 当前规划轨迹的剩余时长
    fn duration(&self) -> Duration;

    /// 丢弃已规划的轨迹段
    ///
    /// 下一次 `evaluate` 从调用方传入的设定值重新规划，即使目标与上一段相同。
    fn reset(&mut self);
}
