//! 耦合切换协议
//!
//! 附件变化时更换执行器到关节的耦合矩阵：
//!
//! ```text
//! Idle ──提交使能位向量(前3使能/后4失能)──► AwaitingEnabledJoints
//!      ──确认一致，提交耦合矩阵──────────► AwaitingCoupling
//!      ──确认一致，下发限位─────────────► Done（跳转到 next）
//! ```
//!
//! 确认由事件邮箱送达（[`CouplingSequencer::on_enabled_joints`] /
//! [`CouplingSequencer::on_coupling`]），每次提交前清除旧的确认，
//! 因此提交之前到达的陈旧确认不会被误用。回报不一致时流程失败，由调用方回退。
//!
//! 仿真模式下没有硬件确认，协议整体短路：第一次 `step` 直接完成，不调用 PID。

use std::time::Duration;

use psm_driver::{PidInterface, RunMode};
use psm_protocol::{CouplingMatrix, JointMask, NUM_ACTUATORS};
use tracing::{debug, info, warn};

use crate::control::envelope::SafetyEnvelope;
use crate::error::PsmError;
use crate::state::ArmState;

/// 协议阶段
#[derive(Debug, Clone, PartialEq)]
pub enum CouplingPhase {
    /// 尚未开始
    Idle,
    /// 已提交使能位向量，等待确认
    AwaitingEnabledJoints { requested: JointMask, since: Duration },
    /// 已提交耦合矩阵，等待确认
    AwaitingCoupling {
        requested: CouplingMatrix,
        since: Duration,
    },
    /// 已完成
    Done,
}

impl CouplingPhase {
    pub fn name(&self) -> &'static str {
        match self {
            CouplingPhase::Idle => "idle",
            CouplingPhase::AwaitingEnabledJoints { .. } => "awaiting enabled joints",
            CouplingPhase::AwaitingCoupling { .. } => "awaiting coupling",
            CouplingPhase::Done => "done",
        }
    }
}

/// 单步结果
#[derive(Debug)]
pub enum CouplingStep {
    /// 等待中，下一周期再调用
    Pending,
    /// 已完成，应跳转到该状态
    Completed(ArmState),
    /// 协议失败（不一致或超时），应回退
    Failed(PsmError),
}

/// 耦合切换协议执行器
#[derive(Debug, Clone)]
pub struct CouplingSequencer {
    phase: CouplingPhase,
    for_tool: bool,
    next: ArmState,
    tool_coupling: CouplingMatrix,
    last_enabled: Option<JointMask>,
    last_coupling: Option<CouplingMatrix>,
    ack_timeout: Option<Duration>,
}

impl CouplingSequencer {
    /// `ack_timeout` 为 `None` 时无限等待确认
    pub fn new(tool_coupling: CouplingMatrix, ack_timeout: Option<Duration>) -> Self {
        Self {
            phase: CouplingPhase::Idle,
            for_tool: false,
            next: ArmState::Fault,
            tool_coupling,
            last_enabled: None,
            last_coupling: None,
            ack_timeout,
        }
    }

    /// 开始一次切换（进入"切换耦合"状态时调用）
    pub fn begin(&mut self, for_tool: bool, next: ArmState) {
        debug!(for_tool, ?next, "Coupling change requested");
        self.phase = CouplingPhase::Idle;
        self.for_tool = for_tool;
        self.next = next;
        self.last_enabled = None;
        self.last_coupling = None;
    }

    /// 放弃进行中的切换，返回放弃前是否在等待确认
    pub fn abort(&mut self) -> bool {
        let in_flight = self.is_in_flight();
        if in_flight {
            warn!(phase = self.phase.name(), "Coupling change aborted");
        }
        self.phase = CouplingPhase::Idle;
        self.last_enabled = None;
        self.last_coupling = None;
        in_flight
    }

    /// 硬件回报关节使能位向量
    pub fn on_enabled_joints(&mut self, reported: JointMask) {
        self.last_enabled = Some(reported);
    }

    /// 硬件回报耦合矩阵
    pub fn on_coupling(&mut self, reported: CouplingMatrix) {
        self.last_coupling = Some(reported);
    }

    pub fn phase(&self) -> &CouplingPhase {
        &self.phase
    }

    pub fn for_tool(&self) -> bool {
        self.for_tool
    }

    pub fn next_state(&self) -> ArmState {
        self.next
    }

    /// 已提交请求、正在等待确认
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.phase,
            CouplingPhase::AwaitingEnabledJoints { .. } | CouplingPhase::AwaitingCoupling { .. }
        )
    }

    /// 本次切换的目标耦合矩阵
    pub fn target_coupling(&self) -> CouplingMatrix {
        if self.for_tool {
            self.tool_coupling.clone()
        } else {
            CouplingMatrix::identity(NUM_ACTUATORS)
        }
    }

    /// 推进协议（每个控制周期调用一次，不阻塞）
    pub fn step(
        &mut self,
        pid: &dyn PidInterface,
        envelope: &mut SafetyEnvelope,
        mode: RunMode,
        now: Duration,
    ) -> Result<CouplingStep, PsmError> {
        if mode.is_simulated() {
            self.phase = CouplingPhase::Done;
            return Ok(CouplingStep::Completed(self.next));
        }

        match &self.phase {
            CouplingPhase::Idle => {
                let requested = JointMask::engage_disabled();
                self.last_enabled = None;
                pid.enable_joints(&requested)?;
                debug!(%requested, "Disabling last four joints");
                self.phase = CouplingPhase::AwaitingEnabledJoints {
                    requested,
                    since: now,
                };
                Ok(CouplingStep::Pending)
            },
            CouplingPhase::AwaitingEnabledJoints { requested, since } => {
                let since = *since;
                let Some(reported) = self.last_enabled.take() else {
                    return Ok(self.check_timeout("enabled joints", since, now));
                };
                if reported != *requested {
                    let requested = requested.clone();
                    self.phase = CouplingPhase::Idle;
                    return Ok(CouplingStep::Failed(PsmError::EnabledJointsMismatch {
                        requested,
                        reported,
                    }));
                }

                let requested = self.target_coupling();
                self.last_coupling = None;
                pid.set_coupling(&requested)?;
                debug!(for_tool = self.for_tool, "Coupling submitted");
                self.phase = CouplingPhase::AwaitingCoupling {
                    requested,
                    since: now,
                };
                Ok(CouplingStep::Pending)
            },
            CouplingPhase::AwaitingCoupling { requested, since } => {
                let since = *since;
                let Some(reported) = self.last_coupling.take() else {
                    return Ok(self.check_timeout("coupling", since, now));
                };
                if reported != *requested {
                    self.phase = CouplingPhase::Idle;
                    return Ok(CouplingStep::Failed(PsmError::CouplingMismatch { reported }));
                }

                envelope.activate(pid, self.for_tool)?;
                self.phase = CouplingPhase::Done;
                info!(for_tool = self.for_tool, next = ?self.next, "Coupling changed");
                Ok(CouplingStep::Completed(self.next))
            },
            CouplingPhase::Done => Ok(CouplingStep::Completed(self.next)),
        }
    }

    fn check_timeout(&mut self, waiting_for: &'static str, since: Duration, now: Duration) -> CouplingStep {
        let elapsed = now.saturating_sub(since);
        match self.ack_timeout {
            Some(timeout) if elapsed > timeout => {
                self.phase = CouplingPhase::Idle;
                CouplingStep::Failed(PsmError::AckTimeout {
                    waiting_for,
                    elapsed,
                })
            },
            _ => CouplingStep::Pending,
        }
    }
}
