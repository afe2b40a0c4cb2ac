//! 接合动作
//!
//! 耦合切换后，最后 4 个关节在两个极限之间来回摆动，使无菌适配器/器械的齿轮对齐入位。
//!
//! # 阶段
//!
//! - 阶段 1（准备）：切换到接合容差档位（同时关闭限位检查），用最佳估计预置 PID 设定值
//!   （前 3 个关节一直保持使能，取期望位置；最后 4 个关节刚重新使能，取测量位置），
//!   使能全部关节并开启跟踪误差检查，设置第一个目标。
//! - 阶段 ≥2（摆动）：每个周期推进轨迹。到达目标后，若 `stage > last_stage` 则接合完成；
//!   否则翻转目标（最后一次翻转改为回到 0），`stage` 加 1。
//!
//! 适配器与器械的翻转方式不同：适配器对称取反（±175°），器械在配置的下/上摆位置之间切换。

use std::time::Duration;

use psm_driver::{PidInterface, RunMode, TrajectoryGenerator, TrajectoryStatus};
use psm_protocol::{
    ENGAGE_JOINTS, INSERTION_INDEX, JointMask, JointVector, NUM_PID_JOINTS, ProtocolError,
};
use psm_tools::{ArmConfig, ToleranceProfile};
use tracing::{debug, info};

use crate::control::envelope::SafetyEnvelope;
use crate::error::PsmError;
use crate::messages::OperatorMessages;

/// 适配器摆动极限（度）
const ADAPTER_ENGAGE_EXTREME_DEG: f64 = 175.0;

/// 接合对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngageTarget {
    Adapter,
    Tool,
}

impl EngageTarget {
    /// 最后一个阶段编号
    pub const fn last_stage(self) -> u32 {
        match self {
            EngageTarget::Adapter => 5,
            EngageTarget::Tool => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            EngageTarget::Adapter => "adapter",
            EngageTarget::Tool => "tool",
        }
    }
}

/// 接合过程数据（每次进入接合状态时重置）
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSequence {
    pub stage: u32,
    pub last_stage: u32,
    pub goal: JointVector,
    pub goal_velocity: JointVector,
    /// 当前段预计完成时间（`None` 表示本段尚未规划）
    pub end_time: Option<Duration>,
}

impl Default for EngagementSequence {
    fn default() -> Self {
        Self {
            stage: 0,
            last_stage: 0,
            goal: JointVector::zeros(NUM_PID_JOINTS),
            goal_velocity: JointVector::zeros(NUM_PID_JOINTS),
            end_time: None,
        }
    }
}

/// 轨迹设定值（位置/速度）
#[derive(Debug, Clone, PartialEq)]
pub struct JointSetpoint {
    pub position: JointVector,
    pub velocity: JointVector,
}

impl Default for JointSetpoint {
    fn default() -> Self {
        Self {
            position: JointVector::zeros(NUM_PID_JOINTS),
            velocity: JointVector::zeros(NUM_PID_JOINTS),
        }
    }
}

/// 单步结果
#[derive(Debug)]
pub enum EngageStep {
    InProgress,
    /// 接合完成
    Engaged,
    /// 器械已插过耦合点，无需接合
    SkippedInsertedTool { insertion: f64 },
    /// 轨迹失败或超时，应回退
    Failed(PsmError),
}

/// 单步所需的协作方
pub struct EngageContext<'a> {
    pub pid: &'a dyn PidInterface,
    pub trajectory: &'a mut dyn TrajectoryGenerator,
    pub envelope: &'a mut SafetyEnvelope,
    pub config: &'a ArmConfig,
    pub messages: &'a OperatorMessages,
    pub setpoint: &'a mut JointSetpoint,
    pub mode: RunMode,
    pub now: Duration,
}

/// 接合动作执行器
#[derive(Debug, Clone, Default)]
pub struct EngagementSequencer {
    target: Option<EngageTarget>,
    sequence: EngagementSequence,
    overrun: Option<Duration>,
}

impl EngagementSequencer {
    /// `overrun` 为 `None` 时不限制单段轨迹时长
    pub fn new(overrun: Option<Duration>) -> Self {
        Self {
            overrun,
            ..Self::default()
        }
    }

    /// 开始新的一次接合（阶段回到 1）
    pub fn begin(&mut self, target: EngageTarget) {
        self.target = Some(target);
        self.sequence = EngagementSequence {
            stage: 1,
            last_stage: target.last_stage(),
            ..EngagementSequence::default()
        };
        debug!(target = target.name(), "Engagement armed");
    }

    /// 清除进行中的接合
    pub fn reset(&mut self) {
        self.target = None;
        self.sequence = EngagementSequence::default();
    }

    pub fn target(&self) -> Option<EngageTarget> {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn stage(&self) -> u32 {
        self.sequence.stage
    }

    pub fn sequence(&self) -> &EngagementSequence {
        &self.sequence
    }

    /// 推进一个控制周期
    pub fn step(&mut self, ctx: EngageContext<'_>) -> Result<EngageStep, PsmError> {
        let target = self.target.ok_or(PsmError::SequenceNotStarted)?;

        // 仿真模式没有齿轮需要对齐
        if ctx.mode.is_simulated() {
            self.target = None;
            return Ok(EngageStep::Engaged);
        }

        if self.sequence.stage == 1 {
            return self.setup(target, ctx);
        }

        let status = ctx.trajectory.evaluate(
            &mut ctx.setpoint.position,
            &mut ctx.setpoint.velocity,
            &self.sequence.goal,
            &self.sequence.goal_velocity,
        );
        ctx.pid.set_position_joint(&ctx.setpoint.position)?;

        match status {
            TrajectoryStatus::Working => {
                match self.sequence.end_time {
                    None => self.sequence.end_time = Some(ctx.now + ctx.trajectory.duration()),
                    Some(end_time) => {
                        if let Some(overrun) = self.overrun
                            && ctx.now > end_time + overrun
                        {
                            self.target = None;
                            return Ok(EngageStep::Failed(PsmError::TrajectoryOverrun {
                                target: target.name(),
                                overrun: ctx.now - end_time,
                            }));
                        }
                    },
                }
                Ok(EngageStep::InProgress)
            },
            TrajectoryStatus::FinalStateReached => {
                let seq = &mut self.sequence;
                if seq.stage > seq.last_stage {
                    self.target = None;
                    info!(target = target.name(), "Engagement complete");
                    return Ok(EngageStep::Engaged);
                }

                if seq.stage != seq.last_stage {
                    match target {
                        EngageTarget::Adapter => seq.goal.negate(ENGAGE_JOINTS),
                        EngageTarget::Tool => {
                            let extreme = if seq.stage % 2 == 0 {
                                &ctx.config.tool_engage_upper
                            } else {
                                &ctx.config.tool_engage_lower
                            };
                            seq.goal.copy_range_from(ENGAGE_JOINTS, extreme);
                        },
                    }
                } else {
                    seq.goal.fill(ENGAGE_JOINTS, 0.0);
                }
                seq.end_time = None;
                ctx.messages.status(format!(
                    "engaging {} {} of {}",
                    target.name(),
                    seq.stage - 1,
                    seq.last_stage - 1
                ));
                seq.stage += 1;
                Ok(EngageStep::InProgress)
            },
            TrajectoryStatus::Error => {
                self.target = None;
                Ok(EngageStep::Failed(PsmError::TrajectoryFailed {
                    target: target.name(),
                }))
            },
        }
    }

    fn setup(&mut self, target: EngageTarget, ctx: EngageContext<'_>) -> Result<EngageStep, PsmError> {
        // 上一次接合可能在半途被打断，旧的轨迹段不能沿用
        ctx.trajectory.reset();
        ctx.envelope
            .set_tracking_tolerance(ctx.pid, ToleranceProfile::Engaging)?;

        let feedback = ctx.pid.feedback()?;
        for actual in [
            feedback.position.len(),
            feedback.velocity.len(),
            feedback.desired_position.len(),
        ] {
            if actual != NUM_PID_JOINTS {
                return Err(ProtocolError::DimensionMismatch {
                    expected: NUM_PID_JOINTS,
                    actual,
                }
                .into());
            }
        }

        let mut initial = feedback.desired_position.clone();
        initial.copy_range_from(ENGAGE_JOINTS, &feedback.position);
        ctx.pid.set_position_joint(&initial)?;
        ctx.pid.enable_joints(&JointMask::all(true, NUM_PID_JOINTS))?;
        ctx.pid.enable_tracking_error(true)?;

        ctx.setpoint.position = initial.clone();
        ctx.setpoint.velocity = feedback.velocity.clone();

        if target == EngageTarget::Tool {
            let insertion = feedback.position[INSERTION_INDEX];
            if insertion > ctx.config.tool_insertion_threshold {
                ctx.messages.status(
                    "tool tip is outside the cannula, assuming it doesn't need to \"engage\". \
                     If the tool is not engaged properly, move sterile adapter all the way up and re-insert tool.",
                );
                self.target = None;
                return Ok(EngageStep::SkippedInsertedTool { insertion });
            }
        }

        let seq = &mut self.sequence;
        seq.goal = initial;
        match target {
            EngageTarget::Adapter => {
                // 适配器抬到最高
                seq.goal[INSERTION_INDEX] = 0.0;
                seq.goal
                    .fill(ENGAGE_JOINTS, -ADAPTER_ENGAGE_EXTREME_DEG.to_radians());
            },
            EngageTarget::Tool => {
                seq.goal
                    .copy_range_from(ENGAGE_JOINTS, &ctx.config.tool_engage_lower);
            },
        }
        seq.goal_velocity = JointVector::zeros(NUM_PID_JOINTS);
        seq.end_time = None;
        seq.stage = 2;
        debug!(target = target.name(), goal = %seq.goal, "Engagement started");
        Ok(EngageStep::InProgress)
    }
}
