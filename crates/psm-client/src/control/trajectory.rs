//! 三次样条关节轨迹生成器
//!
//! 接合动作使用的 [`TrajectoryGenerator`] 实现。每段轨迹使用三次多项式插值：
//!
//! ```text
//! p(t) = a0 + a1*t + a2*t² + a3*t³
//! v(t) = a1 + 2*a2*t + 3*a3*t²
//! ```
//!
//! 边界条件：起止速度为 0，此时归一化峰值速度为 `1.5 * Δ`，
//! 因此每段时长取 `max_i(1.5 * |Δ_i| / v_max_i)`，保证所有关节都不超过最大速度。
//!
//! 目标改变时从当前设定值重新规划；距离目标小于到位容差时直接到位。

use std::time::Duration;

use psm_driver::{TrajectoryGenerator, TrajectoryStatus};
use psm_protocol::JointVector;
use psm_tools::ArmConfig;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::error::PsmError;

/// 三次样条系数
///
/// 表示 `p(t) = a0 + a1*t + a2*t² + a3*t³`
#[derive(Debug, Clone, Copy)]
struct CubicCoeffs {
    a0: f64,
    a1: f64,
    a2: f64,
    a3: f64,
}

impl CubicCoeffs {
    /// 给定 `p(0) = p0`, `p(1) = p1`，起止速度为 0
    fn rest_to_rest(p0: f64, p1: f64) -> Self {
        Self {
            a0: p0,
            a1: 0.0,
            a2: 3.0 * (p1 - p0),
            a3: -2.0 * (p1 - p0),
        }
    }

    /// 在归一化时间 t ∈ [0, 1] 处计算位置
    fn position(&self, t: f64) -> f64 {
        self.a0 + self.a1 * t + self.a2 * t * t + self.a3 * t * t * t
    }

    /// 对归一化时间的导数，需要除以实际时长
    fn velocity(&self, t: f64) -> f64 {
        self.a1 + 2.0 * self.a2 * t + 3.0 * self.a3 * t * t
    }
}

/// 一段已规划的轨迹
#[derive(Debug, Clone)]
struct Segment {
    goal: JointVector,
    coeffs: SmallVec<[CubicCoeffs; 8]>,
    duration_sec: f64,
    elapsed_sec: f64,
}

/// 三次样条轨迹生成器
#[derive(Debug, Clone)]
pub struct CubicTrajectory {
    max_velocity: JointVector,
    period: Duration,
    goal_tolerance: JointVector,
    segment: Option<Segment>,
}

impl CubicTrajectory {
    /// 创建轨迹生成器
    ///
    /// # 错误
    ///
    /// `period` 为 0、最大速度不是正有限值，或到达容差与速度长度不一致/为负时
    /// 返回 `PsmError::InvalidLoopConfig`。
    pub fn new(
        max_velocity: JointVector,
        period: Duration,
        goal_tolerance: JointVector,
    ) -> Result<Self, PsmError> {
        // ✅ 输入验证
        if period.is_zero() {
            return Err(PsmError::InvalidLoopConfig(
                "trajectory period must be positive".to_string(),
            ));
        }
        if max_velocity.is_empty() || !max_velocity.iter().all(|v| v.is_finite() && *v > 0.0) {
            return Err(PsmError::InvalidLoopConfig(format!(
                "max velocity must be positive and finite, got {}",
                max_velocity
            )));
        }
        if goal_tolerance.len() != max_velocity.len()
            || !goal_tolerance.iter().all(|t| t.is_finite() && *t >= 0.0)
        {
            return Err(PsmError::InvalidLoopConfig(format!(
                "goal tolerance must have {} non-negative values, got {}",
                max_velocity.len(),
                goal_tolerance
            )));
        }
        Ok(Self {
            max_velocity,
            period,
            goal_tolerance,
            segment: None,
        })
    }

    /// 使用臂配置中的速度与容差
    pub fn from_config(config: &ArmConfig, period: Duration) -> Result<Self, PsmError> {
        Self::new(
            config.trajectory_max_velocity.clone(),
            period,
            config.trajectory_goal_tolerance.clone(),
        )
    }

    fn plan(&self, start: &JointVector, goal: &JointVector) -> Segment {
        let duration_sec = start
            .iter()
            .zip(goal.iter())
            .zip(self.max_velocity.iter())
            .map(|((s, g), vmax)| 1.5 * (g - s).abs() / vmax)
            .fold(0.0_f64, f64::max);
        let coeffs = start
            .iter()
            .zip(goal.iter())
            .map(|(&s, &g)| CubicCoeffs::rest_to_rest(s, g))
            .collect();
        Segment {
            goal: goal.clone(),
            coeffs,
            duration_sec,
            elapsed_sec: 0.0,
        }
    }
}

impl TrajectoryGenerator for CubicTrajectory {
    fn evaluate(
        &mut self,
        position: &mut JointVector,
        velocity: &mut JointVector,
        goal: &JointVector,
        goal_velocity: &JointVector,
    ) -> TrajectoryStatus {
        let n = self.max_velocity.len();
        if position.len() != n || goal.len() != n || goal_velocity.len() != n {
            warn!(
                expected = n,
                position = position.len(),
                goal = goal.len(),
                "Trajectory dimension mismatch"
            );
            self.segment = None;
            return TrajectoryStatus::Error;
        }
        if !position.is_finite() || !goal.is_finite() {
            warn!(goal = %goal, "Non-finite trajectory input");
            self.segment = None;
            return TrajectoryStatus::Error;
        }

        let replan = self.segment.as_ref().is_none_or(|s| s.goal != *goal);
        if replan {
            if position.within(goal, &self.goal_tolerance) {
                *position = goal.clone();
                *velocity = goal_velocity.clone();
                self.segment = None;
                return TrajectoryStatus::FinalStateReached;
            }
            let segment = self.plan(position, goal);
            trace!(goal = %goal, duration = segment.duration_sec, "Trajectory planned");
            self.segment = Some(segment);
        }

        let period = self.period.as_secs_f64();
        let Some(segment) = self.segment.as_mut() else {
            return TrajectoryStatus::Error;
        };
        segment.elapsed_sec += period;

        if segment.elapsed_sec >= segment.duration_sec {
            *position = goal.clone();
            *velocity = goal_velocity.clone();
            self.segment = None;
            return TrajectoryStatus::FinalStateReached;
        }

        let t = segment.elapsed_sec / segment.duration_sec;
        for (i, coeff) in segment.coeffs.iter().enumerate() {
            position[i] = coeff.position(t);
            velocity[i] = coeff.velocity(t) / segment.duration_sec;
        }
        TrajectoryStatus::Working
    }

    /// 当前段剩余时间
    fn duration(&self) -> Duration {
        self.segment
            .as_ref()
            .map(|s| Duration::from_secs_f64((s.duration_sec - s.elapsed_sec).max(0.0)))
            .unwrap_or(Duration::ZERO)
    }

    fn reset(&mut self) {
        self.segment = None;
    }
}
