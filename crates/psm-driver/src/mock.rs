//! Mock 硬件接口
//!
//! 用于测试与仿真的内存 PID 控制器、到位按钮和脚本化轨迹生成器。
//! 所有 mock 都可克隆，克隆体共享内部状态，测试可以在把一份交给被测对象后继续观察/注入。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use psm_protocol::{CouplingMatrix, JointMask, JointVector, NUM_ACTUATORS, NUM_PID_JOINTS};
use tracing::{trace, warn};

use crate::buttons::{ButtonEvent, PresenceButton};
use crate::error::DriverError;
use crate::events::{EventReceiver, EventSender, HardwareEvent, event_channel};
use crate::pid::{JointFeedback, PidInterface};
use crate::trajectory::{TrajectoryGenerator, TrajectoryStatus};

// ==================== PID ====================

/// 记录的 PID 调用
#[derive(Debug, Clone, PartialEq)]
pub enum PidCall {
    EnableJoints(JointMask),
    SetCoupling(CouplingMatrix),
    SetJointLimits { lower: JointVector, upper: JointVector },
    SetTorqueLimits { lower: JointVector, upper: JointVector },
    SetTrackingErrorTolerance(JointVector),
    EnableTrackingError(bool),
    SetCheckJointLimit(bool),
    SetPotsToEncodersTolerance(JointVector),
    SetPositionJoint(JointVector),
}

impl PidCall {
    /// 是否属于耦合切换协议（使能位向量或耦合矩阵）
    pub fn is_coupling_protocol(&self) -> bool {
        matches!(self, PidCall::EnableJoints(_) | PidCall::SetCoupling(_))
    }
}

/// 硬件确认策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// 原样回报请求值
    #[default]
    Echo,
    /// 回报与请求不同的值
    Mismatch,
    /// 不回报
    Silent,
}

/// Mock PID 内部状态
#[derive(Debug, Clone)]
pub struct MockPidState {
    pub enabled: JointMask,
    pub coupling: CouplingMatrix,
    pub joint_lower: JointVector,
    pub joint_upper: JointVector,
    pub torque_limits: Option<(JointVector, JointVector)>,
    pub tracking_tolerance: JointVector,
    pub tracking_error_enabled: bool,
    pub check_joint_limit: bool,
    pub pots_to_encoders_tolerance: JointVector,
    /// 测量位置
    pub position: JointVector,
    /// 测量速度
    pub velocity: JointVector,
    /// 期望位置
    pub desired_position: JointVector,
    /// 调用记录
    pub calls: Vec<PidCall>,
    pub enable_ack: AckPolicy,
    pub coupling_ack: AckPolicy,
    /// 为 true 时所有写操作返回 `DriverError::Hardware`
    pub fail_writes: bool,
}

impl Default for MockPidState {
    fn default() -> Self {
        Self {
            enabled: JointMask::all(true, NUM_PID_JOINTS),
            coupling: CouplingMatrix::identity(NUM_ACTUATORS),
            joint_lower: JointVector::zeros(NUM_PID_JOINTS),
            joint_upper: JointVector::zeros(NUM_PID_JOINTS),
            torque_limits: None,
            tracking_tolerance: JointVector::zeros(NUM_PID_JOINTS),
            tracking_error_enabled: false,
            check_joint_limit: true,
            pots_to_encoders_tolerance: JointVector::zeros(NUM_PID_JOINTS),
            position: JointVector::zeros(NUM_PID_JOINTS),
            velocity: JointVector::zeros(NUM_PID_JOINTS),
            desired_position: JointVector::zeros(NUM_PID_JOINTS),
            calls: Vec::new(),
            enable_ack: AckPolicy::Echo,
            coupling_ack: AckPolicy::Echo,
            fail_writes: false,
        }
    }
}

/// Mock PID 控制器
///
/// 位置跟踪是理想的：下发的设定值立即成为测量位置。
/// 使能与耦合请求按 [`AckPolicy`] 通过事件邮箱回报。
#[derive(Debug, Clone)]
pub struct MockPid {
    state: Arc<Mutex<MockPidState>>,
    events: EventSender,
}

impl MockPid {
    pub fn new(events: EventSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockPidState::default())),
            events,
        }
    }

    /// 锁定内部状态
    pub fn state(&self) -> MutexGuard<'_, MockPidState> {
        self.state.lock()
    }

    pub fn set_enable_ack(&self, policy: AckPolicy) {
        self.state.lock().enable_ack = policy;
    }

    pub fn set_coupling_ack(&self, policy: AckPolicy) {
        self.state.lock().coupling_ack = policy;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// 设置测量位置（同时作为期望位置）
    pub fn set_measured_position(&self, position: JointVector) {
        let mut state = self.state.lock();
        state.desired_position = position.clone();
        state.position = position;
    }

    /// 调用记录快照
    pub fn calls(&self) -> Vec<PidCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// 满足条件的调用次数
    pub fn count_calls(&self, predicate: impl Fn(&PidCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: PidCall) -> Result<MutexGuard<'_, MockPidState>, DriverError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            warn!(?call, "Mock PID rejecting write");
            return Err(DriverError::Hardware(format!("mock write rejected: {:?}", call)));
        }
        trace!(?call, "Mock PID call");
        state.calls.push(call);
        Ok(state)
    }
}

impl PidInterface for MockPid {
    fn enable_joints(&self, enabled: &JointMask) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::EnableJoints(enabled.clone()))?;
        let reported = match state.enable_ack {
            AckPolicy::Echo => Some(enabled.clone()),
            AckPolicy::Mismatch => Some(enabled.iter().map(|e| !e).collect()),
            AckPolicy::Silent => None,
        };
        state.enabled = enabled.clone();
        drop(state);

        if let Some(reported) = reported {
            self.events.send(HardwareEvent::EnabledJointsChanged(reported))?;
        }
        Ok(())
    }

    fn set_coupling(&self, coupling: &CouplingMatrix) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::SetCoupling(coupling.clone()))?;
        let reported = match state.coupling_ack {
            AckPolicy::Echo => Some(coupling.clone()),
            AckPolicy::Mismatch => {
                let mut rows = coupling.to_rows();
                rows[0][0] = -rows[0][0] - 1.0;
                Some(CouplingMatrix::from_rows(&rows)?)
            },
            AckPolicy::Silent => None,
        };
        state.coupling = coupling.clone();
        drop(state);

        if let Some(reported) = reported {
            self.events.send(HardwareEvent::CouplingChanged(reported))?;
        }
        Ok(())
    }

    fn set_joint_limits(&self, lower: &JointVector, upper: &JointVector) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::SetJointLimits {
            lower: lower.clone(),
            upper: upper.clone(),
        })?;
        state.joint_lower = lower.clone();
        state.joint_upper = upper.clone();
        Ok(())
    }

    fn set_torque_limits(&self, lower: &JointVector, upper: &JointVector) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::SetTorqueLimits {
            lower: lower.clone(),
            upper: upper.clone(),
        })?;
        state.torque_limits = Some((lower.clone(), upper.clone()));
        Ok(())
    }

    fn set_tracking_error_tolerance(&self, tolerance: &JointVector) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::SetTrackingErrorTolerance(tolerance.clone()))?;
        state.tracking_tolerance = tolerance.clone();
        Ok(())
    }

    fn enable_tracking_error(&self, enabled: bool) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::EnableTrackingError(enabled))?;
        state.tracking_error_enabled = enabled;
        Ok(())
    }

    fn set_check_joint_limit(&self, enabled: bool) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::SetCheckJointLimit(enabled))?;
        state.check_joint_limit = enabled;
        Ok(())
    }

    fn set_pots_to_encoders_tolerance(&self, tolerance: &JointVector) -> Result<(), DriverError> {
        let mut state = self.record(PidCall::SetPotsToEncodersTolerance(tolerance.clone()))?;
        state.pots_to_encoders_tolerance = tolerance.clone();
        Ok(())
    }

    fn set_position_joint(&self, position: &JointVector) -> Result<(), DriverError> {
        if position.len() != NUM_PID_JOINTS {
            return Err(DriverError::InvalidInput(format!(
                "position must have {} joints, got {}",
                NUM_PID_JOINTS,
                position.len()
            )));
        }
        let mut state = self.record(PidCall::SetPositionJoint(position.clone()))?;
        state.desired_position = position.clone();
        state.position = position.clone();
        state.velocity = JointVector::zeros(NUM_PID_JOINTS);
        Ok(())
    }

    fn feedback(&self) -> Result<JointFeedback, DriverError> {
        let state = self.state.lock();
        Ok(JointFeedback {
            position: state.position.clone(),
            velocity: state.velocity.clone(),
            desired_position: state.desired_position.clone(),
        })
    }
}

// ==================== 按钮 ====================

/// 按钮来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonSource {
    Adapter,
    Tool,
}

/// Mock 到位按钮
///
/// `press()`/`release()` 同时改变电平并投递边沿事件；`set_level()` 只改变电平
/// （模拟上电前就已安装的附件）。
#[derive(Debug, Clone)]
pub struct MockButton {
    pressed: Arc<AtomicBool>,
    source: ButtonSource,
    events: EventSender,
}

impl MockButton {
    pub fn new(source: ButtonSource, events: EventSender) -> Self {
        Self {
            pressed: Arc::new(AtomicBool::new(false)),
            source,
            events,
        }
    }

    pub fn press(&self) -> Result<(), DriverError> {
        self.edge(ButtonEvent::Pressed)
    }

    pub fn release(&self) -> Result<(), DriverError> {
        self.edge(ButtonEvent::Released)
    }

    /// 只设置电平，不产生事件
    pub fn set_level(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::Release);
    }

    fn edge(&self, event: ButtonEvent) -> Result<(), DriverError> {
        self.set_level(event == ButtonEvent::Pressed);
        let event = match self.source {
            ButtonSource::Adapter => HardwareEvent::AdapterButton(event),
            ButtonSource::Tool => HardwareEvent::ToolButton(event),
        };
        self.events.send(event)
    }
}

impl PresenceButton for MockButton {
    fn is_pressed(&self) -> Result<bool, DriverError> {
        Ok(self.pressed.load(Ordering::Acquire))
    }
}

// ==================== 轨迹 ====================

#[derive(Debug)]
struct Script {
    steps: VecDeque<TrajectoryStatus>,
    fallback: TrajectoryStatus,
    evaluations: usize,
    resets: usize,
    duration: Duration,
}

/// 脚本化轨迹生成器
///
/// 按顺序返回预设状态，脚本耗尽后返回 `fallback`。
/// 返回 `FinalStateReached` 时把设定值直接置为目标。
#[derive(Debug, Clone)]
pub struct ScriptedTrajectory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTrajectory {
    pub fn new(steps: impl IntoIterator<Item = TrajectoryStatus>, fallback: TrajectoryStatus) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                steps: steps.into_iter().collect(),
                fallback,
                evaluations: 0,
                resets: 0,
                duration: Duration::from_millis(500),
            })),
        }
    }

    /// 每次求值都到达目标
    pub fn always_reached() -> Self {
        Self::new([], TrajectoryStatus::FinalStateReached)
    }

    /// 追加脚本
    pub fn push(&self, status: TrajectoryStatus) {
        self.script.lock().steps.push_back(status);
    }

    pub fn set_fallback(&self, status: TrajectoryStatus) {
        self.script.lock().fallback = status;
    }

    pub fn set_duration(&self, duration: Duration) {
        self.script.lock().duration = duration;
    }

    /// 累计求值次数
    pub fn evaluations(&self) -> usize {
        self.script.lock().evaluations
    }

    /// 累计重置次数
    pub fn resets(&self) -> usize {
        self.script.lock().resets
    }
}

impl TrajectoryGenerator for ScriptedTrajectory {
    fn evaluate(
        &mut self,
        position: &mut JointVector,
        velocity: &mut JointVector,
        goal: &JointVector,
        goal_velocity: &JointVector,
    ) -> TrajectoryStatus {
        let mut script = self.script.lock();
        script.evaluations += 1;
        let status = script.steps.pop_front().unwrap_or(script.fallback);
        if status == TrajectoryStatus::FinalStateReached {
            *position = goal.clone();
            *velocity = goal_velocity.clone();
        }
        status
    }

    fn duration(&self) -> Duration {
        self.script.lock().duration
    }

    /// 只计数，不影响剩余脚本
    fn reset(&mut self) {
        self.script.lock().resets += 1;
    }
}

// ==================== 组合 ====================

/// 一整套 mock 硬件
#[derive(Debug, Clone)]
pub struct MockHardware {
    pub pid: MockPid,
    pub adapter: MockButton,
    pub tool: MockButton,
    pub events: EventSender,
}

impl MockHardware {
    /// 创建 mock 硬件与对应的事件接收端
    pub fn new() -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let hardware = Self {
            pid: MockPid::new(events.clone()),
            adapter: MockButton::new(ButtonSource::Adapter, events.clone()),
            tool: MockButton::new(ButtonSource::Tool, events.clone()),
            events,
        };
        (hardware, receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_ack() {
        let (hw, rx) = MockHardware::new();
        hw.pid.enable_joints(&JointMask::engage_disabled()).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Some(HardwareEvent::EnabledJointsChanged(JointMask::engage_disabled()))
        );
        assert_eq!(hw.pid.state().enabled.count_enabled(), 3);
    }

    #[test]
    fn test_mismatch_and_silent_ack() {
        let (hw, rx) = MockHardware::new();
        hw.pid.set_enable_ack(AckPolicy::Mismatch);
        hw.pid.enable_joints(&JointMask::engage_disabled()).unwrap();
        match rx.try_recv().unwrap() {
            Some(HardwareEvent::EnabledJointsChanged(mask)) => {
                assert_ne!(mask, JointMask::engage_disabled())
            },
            other => panic!("unexpected event: {:?}", other),
        }

        hw.pid.set_coupling_ack(AckPolicy::Silent);
        hw.pid.set_coupling(&CouplingMatrix::identity(7)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), None);
        assert_eq!(hw.pid.count_calls(PidCall::is_coupling_protocol), 2);
    }

    #[test]
    fn test_coupling_mismatch_differs() {
        let (hw, rx) = MockHardware::new();
        hw.pid.set_coupling_ack(AckPolicy::Mismatch);
        let identity = CouplingMatrix::identity(7);
        hw.pid.set_coupling(&identity).unwrap();
        match rx.try_recv().unwrap() {
            Some(HardwareEvent::CouplingChanged(m)) => assert_ne!(m, identity),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_fail_writes() {
        let (hw, _rx) = MockHardware::new();
        hw.pid.set_fail_writes(true);
        assert!(matches!(
            hw.pid.set_check_joint_limit(false),
            Err(DriverError::Hardware(_))
        ));
        assert!(hw.pid.calls().is_empty());
    }

    #[test]
    fn test_ideal_position_tracking() {
        let (hw, _rx) = MockHardware::new();
        let goal = JointVector::from([0.1, 0.2, 0.03, 0.4, 0.5, 0.6, 0.7]);
        hw.pid.set_position_joint(&goal).unwrap();
        let feedback = hw.pid.feedback().unwrap();
        assert_eq!(feedback.position, goal);
        assert_eq!(feedback.desired_position, goal);
        assert!(hw.pid.set_position_joint(&JointVector::zeros(6)).is_err());
    }

    #[test]
    fn test_button_edges() {
        let (hw, rx) = MockHardware::new();
        hw.tool.set_level(true);
        assert!(hw.tool.is_pressed().unwrap());
        assert!(rx.is_empty());

        hw.adapter.press().unwrap();
        hw.adapter.release().unwrap();
        let events: Vec<_> = rx.drain().collect();
        assert_eq!(
            events,
            vec![
                HardwareEvent::AdapterButton(ButtonEvent::Pressed),
                HardwareEvent::AdapterButton(ButtonEvent::Released),
            ]
        );
        assert!(!hw.adapter.is_pressed().unwrap());
    }

    #[test]
    fn test_scripted_trajectory() {
        let mut trajectory = ScriptedTrajectory::new(
            [TrajectoryStatus::Working, TrajectoryStatus::FinalStateReached],
            TrajectoryStatus::Error,
        );
        let handle = trajectory.clone();
        let mut position = JointVector::zeros(7);
        let mut velocity = JointVector::zeros(7);
        let goal = JointVector::from_elem(1.0, 7);
        let goal_velocity = JointVector::zeros(7);

        assert_eq!(
            trajectory.evaluate(&mut position, &mut velocity, &goal, &goal_velocity),
            TrajectoryStatus::Working
        );
        assert_eq!(position, JointVector::zeros(7));
        assert_eq!(
            trajectory.evaluate(&mut position, &mut velocity, &goal, &goal_velocity),
            TrajectoryStatus::FinalStateReached
        );
        assert_eq!(position, goal);
        assert_eq!(
            trajectory.evaluate(&mut position, &mut velocity, &goal, &goal_velocity),
            TrajectoryStatus::Error
        );
        assert_eq!(handle.evaluations(), 3);
    }
}
