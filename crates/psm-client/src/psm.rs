//! PSM 接合状态机
//!
//! 把耦合切换、接合动作、安全包络组合成一张状态表，由单线程控制周期驱动：
//!
//! ```text
//! UNINITIALIZED → ARM_HOMED → CHANGING_COUPLING_ADAPTER → ENGAGING_ADAPTER → ADAPTER_ENGAGED
//!   → CHANGING_COUPLING_TOOL → ENGAGING_TOOL → TOOL_ENGAGED → READY
//! ```
//!
//! 硬件确认与按钮边沿通过事件邮箱到达，在每个周期开头统一处理。
//! 附件松开会强制跳回 `ARM_HOMED`（不经过期望状态），进入 `ARM_HOMED` 时清理所有进行中的流程。
//!
//! # 示例
//!
//! ```rust,ignore
//! use psm_client::{Psm, PsmHardware, PsmOptions};
//! use psm_tools::ArmConfig;
//! use std::time::Duration;
//!
//! let config = ArmConfig::load_from_file("psm-tool.toml")?;
//! let mut psm = Psm::new(config, hardware, PsmOptions::new("PSM1"))?;
//! psm.mark_homed()?;
//! psm.set_desired_state(ArmState::Ready)?;
//! let mut now = Duration::ZERO;
//! while psm.current_state() != ArmState::Ready {
//!     now += Duration::from_millis(1);
//!     psm.tick(now)?;
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use psm_driver::{
    AtomicRunMode, ButtonEvent, EventReceiver, HardwareEvent, PidInterface, PresenceButton,
    RunMode, TrajectoryGenerator,
};
use psm_protocol::{
    JAW_INDEX, JointMapper, JointMask, JointVector, NUM_PID_JOINTS, SNAKE_CONSTRAINT_TOLERANCE,
};
use psm_tools::{ArmConfig, ToleranceProfile};
use tracing::{debug, info, warn};

use crate::control::coupling::{CouplingSequencer, CouplingStep};
use crate::control::engagement::{
    EngageContext, EngageStep, EngageTarget, EngagementSequencer, JointSetpoint,
};
use crate::control::envelope::{LimitConfiguration, SafetyEnvelope};
use crate::error::PsmError;
use crate::messages::OperatorMessages;
use crate::observer::{PsmStatus, StatusObserver};
use crate::state::{
    ArmState, NeedEngageFlags, PresenceFlags, StateCallbacks, StateControl, StateMachine,
};

/// 创建选项
#[derive(Debug, Clone)]
pub struct PsmOptions {
    /// 手臂名（日志与操作员消息前缀）
    pub name: String,
    /// 初始运行模式
    pub mode: RunMode,
    /// 操作员消息发送端（`None` 时只写日志）
    pub messages: Option<OperatorMessages>,
}

impl PsmOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: RunMode::Hardware,
            messages: None,
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_messages(mut self, messages: OperatorMessages) -> Self {
        self.messages = Some(messages);
        self
    }
}

impl Default for PsmOptions {
    fn default() -> Self {
        Self::new("PSM1")
    }
}

/// 外部协作方
///
/// 没有按钮的手臂由操作员通知器械到位（[`Psm::set_tool_present`]）；
/// 有按钮时，按钮电平在按需采样时覆盖通知值。
pub struct PsmHardware {
    pub pid: Box<dyn PidInterface>,
    pub trajectory: Box<dyn TrajectoryGenerator>,
    pub adapter_button: Option<Box<dyn PresenceButton>>,
    pub tool_button: Option<Box<dyn PresenceButton>>,
    pub events: EventReceiver,
}

impl PsmHardware {
    pub fn new(
        pid: Box<dyn PidInterface>,
        trajectory: Box<dyn TrajectoryGenerator>,
        events: EventReceiver,
    ) -> Self {
        Self {
            pid,
            trajectory,
            adapter_button: None,
            tool_button: None,
            events,
        }
    }

    pub fn with_adapter_button(mut self, button: Box<dyn PresenceButton>) -> Self {
        self.adapter_button = Some(button);
        self
    }

    pub fn with_tool_button(mut self, button: Box<dyn PresenceButton>) -> Self {
        self.tool_button = Some(button);
        self
    }
}

#[cfg(feature = "mock")]
impl PsmHardware {
    /// 使用一整套 mock 硬件（克隆体与 `hardware` 共享状态）
    pub fn from_mock(
        hardware: &psm_driver::mock::MockHardware,
        events: EventReceiver,
        trajectory: Box<dyn TrajectoryGenerator>,
    ) -> Self {
        Self::new(Box::new(hardware.pid.clone()), trajectory, events)
            .with_adapter_button(Box::new(hardware.adapter.clone()))
            .with_tool_button(Box::new(hardware.tool.clone()))
    }
}

/// 状态回调共享的上下文
struct PsmCore {
    config: ArmConfig,
    hw: PsmHardware,
    envelope: SafetyEnvelope,
    coupling: CouplingSequencer,
    engagement: EngagementSequencer,
    presence: PresenceFlags,
    need_engage: NeedEngageFlags,
    mapper: JointMapper,
    messages: OperatorMessages,
    mode: Arc<AtomicRunMode>,
    now: Duration,
    setpoint: JointSetpoint,
    /// 夹爪目标（PID 关节 6）
    jaw_goal: f64,
    /// 最近一次运动学关节目标
    kinematic_goal: JointVector,
    /// 最后 4 个关节已被耦合切换失能
    joints_released: bool,
    last_failure: Option<String>,
}

impl PsmCore {
    fn run_mode(&self) -> RunMode {
        self.mode.get(Ordering::Acquire)
    }

    fn pid(&self) -> &dyn PidInterface {
        self.hw.pid.as_ref()
    }

    /// 按需采样适配器到位
    fn sample_adapter(&mut self) -> bool {
        if let Some(button) = &self.hw.adapter_button {
            match button.is_pressed() {
                Ok(pressed) => self.presence.adapter = pressed,
                Err(e) => warn!("Failed to read adapter button, keeping last value: {}", e),
            }
        }
        self.presence.adapter
    }

    /// 按需采样器械到位
    fn sample_tool(&mut self) -> bool {
        if let Some(button) = &self.hw.tool_button {
            match button.is_pressed() {
                Ok(pressed) => self.presence.tool = pressed,
                Err(e) => warn!("Failed to read tool button, keeping last value: {}", e),
            }
        }
        self.presence.tool
    }

    /// 重新使能被耦合切换失能的关节
    fn restore_joints(&mut self) -> Result<(), PsmError> {
        if self.joints_released && !self.run_mode().is_simulated() {
            self.pid()
                .enable_joints(&JointMask::all(true, NUM_PID_JOINTS))?;
            debug!("All joints re-enabled");
        }
        self.joints_released = false;
        Ok(())
    }

    fn record_failure(&mut self, error: &PsmError) {
        self.last_failure = Some(error.to_string());
    }

    fn status(&self, tick: u64, current: ArmState, desired: ArmState) -> PsmStatus {
        PsmStatus {
            tick,
            current_state: current,
            desired_state: desired,
            adapter_present: self.presence.adapter,
            tool_present: self.presence.tool,
            adapter_need_engage: self.need_engage.adapter,
            tool_need_engage: self.need_engage.tool,
            engaging_stage: self
                .engagement
                .is_active()
                .then(|| self.engagement.stage()),
            tolerance_profile: self.envelope.profile(),
            check_joint_limit: self.envelope.check_joint_limit(),
            tool_limits_active: self.envelope.active() == Some(LimitConfiguration::Tool),
            last_failure: self.last_failure.clone(),
        }
    }
}

type Control = StateControl<ArmState>;
type Callbacks = StateCallbacks<ArmState, PsmCore, PsmError>;

// ==================== 状态回调 ====================

fn enter_uninitialized(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    core.envelope.activate(core.hw.pid.as_ref(), false)?;
    core.envelope
        .set_tracking_tolerance(core.hw.pid.as_ref(), ToleranceProfile::Default)?;
    Ok(())
}

/// 所有强制跳转都落在这里，清理进行中的流程
fn enter_arm_homed(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    core.coupling.abort();
    core.restore_joints()?;
    core.engagement.reset();
    core.hw.trajectory.reset();
    core.envelope
        .set_tracking_tolerance(core.hw.pid.as_ref(), ToleranceProfile::Default)?;
    Ok(())
}

fn transition_arm_homed(core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    if ctl.desired_is_not_current() && core.sample_adapter() {
        ctl.set_current_state(ArmState::ChangingCouplingAdapter);
    }
    Ok(())
}

fn enter_changing_coupling_adapter(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    core.coupling.begin(false, ArmState::EngagingAdapter);
    Ok(())
}

fn enter_changing_coupling_tool(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    let next = if core.need_engage.tool {
        ArmState::EngagingTool
    } else {
        ArmState::ToolEngaged
    };
    core.coupling.begin(true, next);
    Ok(())
}

fn run_changing_coupling(core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    let mode = core.run_mode();
    let step = core
        .coupling
        .step(core.hw.pid.as_ref(), &mut core.envelope, mode, core.now)?;
    match step {
        CouplingStep::Pending => {
            if core.coupling.is_in_flight() {
                core.joints_released = true;
            }
        },
        CouplingStep::Completed(next) => ctl.set_current_state(next),
        CouplingStep::Failed(e) => {
            core.messages.warning(e.to_string());
            core.record_failure(&e);
            ctl.fall_back();
        },
    }
    Ok(())
}

fn enter_engaging_adapter(core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    // 器械已经装好，说明适配器在归零前就已接合
    if core.sample_tool() {
        info!("Tool already present, skipping adapter engagement");
        core.need_engage.tool = false;
        ctl.set_current_state(ArmState::AdapterEngaged);
        return Ok(());
    }
    if !core.need_engage.adapter {
        info!("Adapter engaged before homing, skipping adapter engagement");
        ctl.set_current_state(ArmState::AdapterEngaged);
        return Ok(());
    }
    core.engagement.begin(EngageTarget::Adapter);
    Ok(())
}

fn enter_engaging_tool(core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    core.envelope.apply_joint_limits(core.hw.pid.as_ref(), true)?;
    if !core.need_engage.tool {
        info!("Tool engaged before homing, skipping tool engagement");
        ctl.set_current_state(ArmState::ToolEngaged);
        return Ok(());
    }
    core.engagement.begin(EngageTarget::Tool);
    Ok(())
}

fn run_engaging(core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    let engaged = if ctl.current() == ArmState::EngagingAdapter {
        ArmState::AdapterEngaged
    } else {
        ArmState::ToolEngaged
    };
    let mode = core.run_mode();
    let step = core.engagement.step(EngageContext {
        pid: core.hw.pid.as_ref(),
        trajectory: core.hw.trajectory.as_mut(),
        envelope: &mut core.envelope,
        config: &core.config,
        messages: &core.messages,
        setpoint: &mut core.setpoint,
        mode,
        now: core.now,
    })?;

    match step {
        EngageStep::InProgress => {
            // 阶段 1 已使能全部关节
            core.joints_released = false;
        },
        EngageStep::Engaged | EngageStep::SkippedInsertedTool { .. } => {
            if !mode.is_simulated() {
                core.joints_released = false;
            }
            ctl.set_current_state(engaged);
        },
        EngageStep::Failed(e) => {
            core.messages.error(e.to_string());
            core.record_failure(&e);
            ctl.fall_back();
        },
    }
    Ok(())
}

fn enter_adapter_engaged(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    core.need_engage.adapter = false;
    core.restore_joints()
}

fn transition_adapter_engaged(core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    if ctl.desired_is_not_current() && core.sample_tool() {
        ctl.set_current_state(ArmState::ChangingCouplingTool);
    }
    Ok(())
}

fn enter_tool_engaged(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    core.need_engage.tool = false;
    core.restore_joints()
}

fn transition_tool_engaged(_core: &mut PsmCore, ctl: &mut Control) -> Result<(), PsmError> {
    if ctl.desired_is_not_current() {
        ctl.set_current_state(ArmState::Ready);
    }
    Ok(())
}

fn enter_ready(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    let pid = core.hw.pid.as_ref();
    core.envelope
        .set_tracking_tolerance(pid, ToleranceProfile::Ready)?;

    // 从测量位置开始，避免跳变
    let feedback = pid.feedback()?;
    let kinematic = core.mapper.to_joints_kinematics(&feedback.position)?;
    pid.set_position_joint(&feedback.position)?;
    pid.enable_joints(&JointMask::all(true, NUM_PID_JOINTS))?;
    pid.enable_tracking_error(true)?;

    core.joints_released = false;
    core.jaw_goal = feedback.position[JAW_INDEX];
    core.kinematic_goal = kinematic;
    core.messages.status("ready");
    Ok(())
}

fn enter_fault(core: &mut PsmCore, _ctl: &mut Control) -> Result<(), PsmError> {
    core.coupling.abort();
    core.engagement.reset();
    core.hw.trajectory.reset();
    warn!(
        reason = core.last_failure.as_deref().unwrap_or("unknown"),
        "Arm entered fault state"
    );
    Ok(())
}

fn state_table() -> Vec<(ArmState, Callbacks)> {
    vec![
        (
            ArmState::Uninitialized,
            Callbacks::new().on_enter(enter_uninitialized),
        ),
        (
            ArmState::ArmHomed,
            Callbacks::new()
                .on_enter(enter_arm_homed)
                .on_transition(transition_arm_homed),
        ),
        (
            ArmState::ChangingCouplingAdapter,
            Callbacks::new()
                .on_enter(enter_changing_coupling_adapter)
                .on_run(run_changing_coupling),
        ),
        (
            ArmState::EngagingAdapter,
            Callbacks::new()
                .on_enter(enter_engaging_adapter)
                .on_run(run_engaging),
        ),
        (
            ArmState::AdapterEngaged,
            Callbacks::new()
                .on_enter(enter_adapter_engaged)
                .on_transition(transition_adapter_engaged),
        ),
        (
            ArmState::ChangingCouplingTool,
            Callbacks::new()
                .on_enter(enter_changing_coupling_tool)
                .on_run(run_changing_coupling),
        ),
        (
            ArmState::EngagingTool,
            Callbacks::new()
                .on_enter(enter_engaging_tool)
                .on_run(run_engaging),
        ),
        (
            ArmState::ToolEngaged,
            Callbacks::new()
                .on_enter(enter_tool_engaged)
                .on_transition(transition_tool_engaged),
        ),
        (ArmState::Ready, Callbacks::new().on_enter(enter_ready)),
        (ArmState::Fault, Callbacks::new().on_enter(enter_fault)),
    ]
}

// ==================== Psm ====================

/// PSM 接合子系统
pub struct Psm {
    machine: StateMachine<ArmState, PsmCore, PsmError>,
    core: PsmCore,
    observer: StatusObserver,
    ticks: u64,
}

impl Psm {
    /// 创建并进入 `UNINITIALIZED`（下发无器械限位与默认容差）
    ///
    /// # 错误
    ///
    /// 初始限位下发失败时返回错误，手臂不能继续启动。
    pub fn new(config: ArmConfig, hardware: PsmHardware, options: PsmOptions) -> Result<Self, PsmError> {
        let messages = options
            .messages
            .unwrap_or_else(|| OperatorMessages::new(options.name.clone()));
        let core = PsmCore {
            envelope: SafetyEnvelope::new(config.no_tool_limits.clone(), config.tool_limits.clone()),
            coupling: CouplingSequencer::new(config.tool_coupling.clone(), config.ack_timeout),
            engagement: EngagementSequencer::new(config.trajectory_overrun),
            mapper: JointMapper::new(config.tool),
            kinematic_goal: JointVector::zeros(config.tool.kinematic_joints()),
            config,
            hw: hardware,
            presence: PresenceFlags::default(),
            need_engage: NeedEngageFlags::default(),
            messages,
            mode: Arc::new(AtomicRunMode::new(options.mode)),
            now: Duration::ZERO,
            setpoint: JointSetpoint::default(),
            jaw_goal: 0.0,
            joints_released: false,
            last_failure: None,
        };

        let mut machine = StateMachine::new(options.name, ArmState::Uninitialized, ArmState::Fault);
        for (state, callbacks) in state_table() {
            machine.register(state, callbacks);
        }

        let mut psm = Self {
            machine,
            core,
            observer: StatusObserver::new(),
            ticks: 0,
        };
        psm.machine.start(&mut psm.core)?;
        psm.core.sample_adapter();
        psm.core.sample_tool();
        psm.publish();
        Ok(psm)
    }

    /// 一个控制周期
    ///
    /// 先处理硬件事件（确认、按钮边沿），再驱动状态机，最后发布状态快照。
    pub fn tick(&mut self, now: Duration) -> Result<(), PsmError> {
        self.core.now = now;
        let mut result = self.dispatch_events();
        if result.is_ok() {
            result = self.machine.tick(&mut self.core);
        }
        self.ticks += 1;
        if let Err(e) = &result {
            self.core.record_failure(e);
            self.core.messages.error(e.to_string());
        }
        self.publish();
        result
    }

    /// 外部归零流程完成，交给接合状态机
    pub fn mark_homed(&mut self) -> Result<(), PsmError> {
        self.machine.set_desired_state(ArmState::ArmHomed);
        let result = self.machine.set_current_state(ArmState::ArmHomed, &mut self.core);
        self.publish();
        result
    }

    /// 设置期望状态（只接受停留状态）
    pub fn set_desired_state(&mut self, state: ArmState) -> Result<(), PsmError> {
        if !state.is_resting() {
            return Err(PsmError::InvalidDesiredState(state));
        }
        self.machine.set_desired_state(state);
        self.publish();
        Ok(())
    }

    /// 器械到位通知
    ///
    /// 到位时置位待接合标志，由正常的转换链推进；不到位时强制跳回 `ARM_HOMED`。
    pub fn set_tool_present(&mut self, present: bool) -> Result<(), PsmError> {
        self.core.presence.tool = present;
        let result = if present {
            self.core.need_engage.tool = true;
            Ok(())
        } else {
            self.force_homed("tool removed")
        };
        self.publish();
        result
    }

    /// 设置夹爪位置（仅 `READY`）
    pub fn set_jaw_position(&mut self, jaw: f64) -> Result<(), PsmError> {
        self.require_ready("set_jaw_position")?;
        if !jaw.is_finite() {
            return Err(PsmError::InvalidCommand(format!("jaw position {} is not finite", jaw)));
        }
        let mut position = self.core.mapper.to_joints_pid(&self.core.kinematic_goal)?;
        position[JAW_INDEX] = jaw;
        self.core.pid().set_position_joint(&position)?;
        self.core.jaw_goal = jaw;
        Ok(())
    }

    /// 设置运动学关节目标（仅 `READY`，夹爪保持当前目标）
    ///
    /// 蛇形器械的冗余关节对不相等时发出警告，目标仍按合并后的值下发。
    pub fn set_position_joint(&mut self, kinematic: &[f64]) -> Result<(), PsmError> {
        self.require_ready("set_position_joint")?;
        let mut position = self.core.mapper.to_joints_pid(kinematic)?;
        if let Some(deviation) = self.core.mapper.snake_constraint_error(kinematic)
            && deviation > SNAKE_CONSTRAINT_TOLERANCE
        {
            self.core
                .messages
                .warning("set_position_joint, equality constraint violated");
            debug!(deviation, "Snake joint pairs differ");
        }
        if !position.is_finite() {
            return Err(PsmError::InvalidCommand(
                "joint position contains non-finite values".to_string(),
            ));
        }
        position[JAW_INDEX] = self.core.jaw_goal;
        self.core.pid().set_position_joint(&position)?;
        self.core.kinematic_goal = JointVector::from_slice(kinematic);
        Ok(())
    }

    pub fn current_state(&self) -> ArmState {
        self.machine.current_state()
    }

    pub fn desired_state(&self) -> ArmState {
        self.machine.desired_state()
    }

    /// 最近一次 `tick` 的时间戳
    pub fn now(&self) -> Duration {
        self.core.now
    }

    /// 最新状态快照
    pub fn status(&self) -> Arc<PsmStatus> {
        self.observer.snapshot()
    }

    /// 可跨线程读取的观察器
    pub fn observer(&self) -> StatusObserver {
        self.observer.clone()
    }

    /// 运行模式句柄（可在其他线程切换仿真模式）
    pub fn mode_handle(&self) -> Arc<AtomicRunMode> {
        Arc::clone(&self.core.mode)
    }

    pub fn config(&self) -> &ArmConfig {
        &self.core.config
    }

    fn require_ready(&self, command: &'static str) -> Result<(), PsmError> {
        let state = self.machine.current_state();
        if state != ArmState::Ready {
            self.core
                .messages
                .warning(format!("{} not allowed in state {}", command, state));
            return Err(PsmError::InvalidState { command, state });
        }
        Ok(())
    }

    fn dispatch_events(&mut self) -> Result<(), PsmError> {
        let events: Vec<HardwareEvent> = self.core.hw.events.drain().collect();
        for event in events {
            match event {
                HardwareEvent::EnabledJointsChanged(reported) => {
                    self.core.coupling.on_enabled_joints(reported);
                },
                HardwareEvent::CouplingChanged(reported) => {
                    self.core.coupling.on_coupling(reported);
                },
                HardwareEvent::AdapterButton(ButtonEvent::Pressed) => {
                    info!("Adapter attached");
                    self.core.presence.adapter = true;
                    self.core.need_engage.adapter = true;
                },
                HardwareEvent::AdapterButton(ButtonEvent::Released) => {
                    info!("Adapter removed");
                    self.core.presence.adapter = false;
                    self.force_homed("adapter removed")?;
                },
                HardwareEvent::ToolButton(ButtonEvent::Pressed) => {
                    info!("Tool attached");
                    self.core.presence.tool = true;
                    self.core.need_engage.tool = true;
                },
                HardwareEvent::ToolButton(ButtonEvent::Released) => {
                    info!("Tool removed");
                    self.core.presence.tool = false;
                    self.force_homed("tool removed")?;
                },
            }
        }
        Ok(())
    }

    /// 立即跳回 `ARM_HOMED`（仅在已归零时）
    fn force_homed(&mut self, reason: &str) -> Result<(), PsmError> {
        let state = self.machine.current_state();
        if !state.is_homed() {
            debug!(%state, reason, "Not homed yet, ignoring forced jump");
            return Ok(());
        }
        info!(from = %state, reason, "Forcing arm back to ARM_HOMED");
        self.machine.set_current_state(ArmState::ArmHomed, &mut self.core)
    }

    fn publish(&self) {
        self.observer.publish(self.core.status(
            self.ticks,
            self.machine.current_state(),
            self.machine.desired_state(),
        ));
    }
}

impl std::fmt::Debug for Psm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Psm")
            .field("name", &self.core.messages.name())
            .field("current_state", &self.machine.current_state())
            .field("desired_state", &self.machine.desired_state())
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psm_driver::mock::{MockHardware, MockPid, PidCall, ScriptedTrajectory};

    fn psm_with(mode: RunMode) -> (Psm, MockHardware, ScriptedTrajectory) {
        let (hw, rx) = MockHardware::new();
        let trajectory = ScriptedTrajectory::always_reached();
        let hardware = PsmHardware::new(Box::new(hw.pid.clone()), Box::new(trajectory.clone()), rx)
            .with_adapter_button(Box::new(hw.adapter.clone()));
        let config = ArmConfig::example().unwrap();
        let psm = Psm::new(config, hardware, PsmOptions::new("PSM1").with_mode(mode)).unwrap();
        (psm, hw, trajectory)
    }

    fn run_until(psm: &mut Psm, state: ArmState, max_ticks: u64) -> bool {
        for i in 1..=max_ticks {
            psm.tick(Duration::from_millis(i)).unwrap();
            if psm.current_state() == state {
                return true;
            }
        }
        false
    }

    fn tool_limits_pushed(pid: &MockPid) -> bool {
        pid.count_calls(|c| matches!(c, PidCall::SetTorqueLimits { .. })) > 0
    }

    #[test]
    fn test_starts_uninitialized_with_no_tool_limits() {
        let (psm, hw, _) = psm_with(RunMode::Hardware);
        assert_eq!(psm.current_state(), ArmState::Uninitialized);
        assert_eq!(psm.status().tolerance_profile, ToleranceProfile::Default);
        assert!(!tool_limits_pushed(&hw.pid));
        assert_eq!(hw.pid.count_calls(|c| matches!(c, PidCall::SetJointLimits { .. })), 1);
    }

    #[test]
    fn test_desired_state_must_be_resting() {
        let (mut psm, _, _) = psm_with(RunMode::Hardware);
        assert!(matches!(
            psm.set_desired_state(ArmState::EngagingTool),
            Err(PsmError::InvalidDesiredState(ArmState::EngagingTool))
        ));
        psm.set_desired_state(ArmState::Ready).unwrap();
        assert_eq!(psm.desired_state(), ArmState::Ready);
    }

    #[test]
    fn test_homed_without_adapter_waits() {
        let (mut psm, _, _) = psm_with(RunMode::Hardware);
        psm.mark_homed().unwrap();
        psm.set_desired_state(ArmState::Ready).unwrap();
        assert!(!run_until(&mut psm, ArmState::ChangingCouplingAdapter, 20));
        assert_eq!(psm.current_state(), ArmState::ArmHomed);
    }

    #[test]
    fn test_adapter_press_engages_adapter() {
        let (mut psm, hw, trajectory) = psm_with(RunMode::Hardware);
        psm.mark_homed().unwrap();
        psm.set_desired_state(ArmState::Ready).unwrap();
        hw.adapter.press().unwrap();

        assert!(run_until(&mut psm, ArmState::AdapterEngaged, 50));
        assert_eq!(trajectory.evaluations(), 5);
        // 归零与准备阶段都丢弃旧轨迹
        assert!(trajectory.resets() >= 2);
        let status = psm.status();
        assert!(!status.adapter_need_engage);
        assert!(status.adapter_present);
        assert_eq!(status.engaging_stage, None);
        assert_eq!(hw.pid.state().enabled, JointMask::all(true, 7));
    }

    #[test]
    fn test_simulated_skips_hardware_protocol() {
        let (mut psm, hw, trajectory) = psm_with(RunMode::Simulated);
        psm.mark_homed().unwrap();
        psm.set_desired_state(ArmState::Ready).unwrap();
        hw.adapter.press().unwrap();
        psm.set_tool_present(true).unwrap();

        assert!(run_until(&mut psm, ArmState::Ready, 10));
        assert_eq!(hw.pid.count_calls(|c| matches!(c, PidCall::SetCoupling(_))), 0);
        assert_eq!(
            hw.pid
                .count_calls(|c| *c == PidCall::EnableJoints(JointMask::engage_disabled())),
            0
        );
        assert_eq!(trajectory.evaluations(), 0);
    }

    #[test]
    fn test_commands_rejected_outside_ready() {
        let (mut psm, _, _) = psm_with(RunMode::Hardware);
        psm.mark_homed().unwrap();
        assert!(matches!(
            psm.set_jaw_position(0.3),
            Err(PsmError::InvalidState {
                command: "set_jaw_position",
                state: ArmState::ArmHomed
            })
        ));
        assert!(matches!(
            psm.set_position_joint(&[0.0; 6]),
            Err(PsmError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_released_before_homing_is_ignored() {
        let (mut psm, hw, _) = psm_with(RunMode::Hardware);
        hw.adapter.press().unwrap();
        hw.adapter.release().unwrap();
        psm.tick(Duration::from_millis(1)).unwrap();
        assert_eq!(psm.current_state(), ArmState::Uninitialized);
        assert!(!psm.status().adapter_present);
    }

    #[test]
    fn test_mode_handle_switches_to_simulated() {
        let (psm, _, _) = psm_with(RunMode::Hardware);
        let handle = psm.mode_handle();
        handle.set(RunMode::Simulated, Ordering::Release);
        assert!(psm.core.run_mode().is_simulated());
    }
}
