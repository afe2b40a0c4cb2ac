//! 安全包络管理器
//!
//! 持有无器械/器械两份限位集合（加载后不再修改），负责把当前生效的一份下发到 PID，
//! 并按阶段切换跟踪误差容差档位。
//!
//! 容差档位与关节限位检查开关总是在同一次调用中一起下发：
//! 收紧（接合）时先关闭限位检查再设置容差，恢复时先设置容差再开启限位检查。

use psm_driver::{DriverError, PidInterface};
use psm_tools::{LimitSet, ToleranceProfile};
use tracing::{debug, info};

/// 限位配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitConfiguration {
    NoTool,
    Tool,
}

impl LimitConfiguration {
    pub fn from_tool(tool: bool) -> Self {
        if tool {
            LimitConfiguration::Tool
        } else {
            LimitConfiguration::NoTool
        }
    }
}

/// 安全包络管理器
#[derive(Debug, Clone)]
pub struct SafetyEnvelope {
    no_tool: LimitSet,
    tool: LimitSet,
    active: Option<LimitConfiguration>,
    profile: ToleranceProfile,
    check_joint_limit: bool,
}

impl SafetyEnvelope {
    pub fn new(no_tool: LimitSet, tool: LimitSet) -> Self {
        Self {
            no_tool,
            tool,
            active: None,
            profile: ToleranceProfile::Default,
            check_joint_limit: true,
        }
    }

    pub fn limits(&self, configuration: LimitConfiguration) -> &LimitSet {
        match configuration {
            LimitConfiguration::NoTool => &self.no_tool,
            LimitConfiguration::Tool => &self.tool,
        }
    }

    /// 最近一次下发的限位配置
    pub fn active(&self) -> Option<LimitConfiguration> {
        self.active
    }

    /// 当前容差档位
    pub fn profile(&self) -> ToleranceProfile {
        self.profile
    }

    /// 当前关节限位检查开关
    pub fn check_joint_limit(&self) -> bool {
        self.check_joint_limit
    }

    /// 下发限位
    ///
    /// 器械配置同时下发力矩限位；无器械配置不设置力矩限位（保持控制器默认值）。
    pub fn activate(&mut self, pid: &dyn PidInterface, tool: bool) -> Result<(), DriverError> {
        let configuration = LimitConfiguration::from_tool(tool);
        self.apply_joint_limits(pid, tool)?;
        if configuration == LimitConfiguration::Tool
            && let Some(torque) = &self.tool.torque
        {
            pid.set_torque_limits(&torque.lower, &torque.upper)?;
        }
        info!(?configuration, "Safety limits activated");
        Ok(())
    }

    /// 只下发关节位置限位
    pub fn apply_joint_limits(&mut self, pid: &dyn PidInterface, tool: bool) -> Result<(), DriverError> {
        let configuration = LimitConfiguration::from_tool(tool);
        let limits = self.limits(configuration);
        pid.set_joint_limits(&limits.joint_lower, &limits.joint_upper)?;
        self.active = Some(configuration);
        Ok(())
    }

    /// 切换跟踪误差容差档位（连同关节限位检查开关）
    pub fn set_tracking_tolerance(
        &mut self,
        pid: &dyn PidInterface,
        profile: ToleranceProfile,
    ) -> Result<(), DriverError> {
        let tracking = profile.tracking();
        if tracking.check_joint_limit {
            pid.set_tracking_error_tolerance(&tracking.tolerance)?;
            pid.set_check_joint_limit(true)?;
        } else {
            pid.set_check_joint_limit(false)?;
            pid.set_tracking_error_tolerance(&tracking.tolerance)?;
        }
        if let Some(pots) = &tracking.pots_to_encoders {
            pid.set_pots_to_encoders_tolerance(pots)?;
        }
        self.profile = profile;
        self.check_joint_limit = tracking.check_joint_limit;
        debug!(?profile, check_joint_limit = tracking.check_joint_limit, "Tracking tolerance set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psm_driver::mock::{MockHardware, PidCall};
    use psm_tools::ArmConfig;

    fn envelope() -> SafetyEnvelope {
        let config = ArmConfig::example().unwrap();
        SafetyEnvelope::new(config.no_tool_limits, config.tool_limits)
    }

    #[test]
    fn test_no_tool_does_not_set_torque() {
        let (hw, _rx) = MockHardware::new();
        let mut envelope = envelope();
        envelope.activate(&hw.pid, false).unwrap();

        assert_eq!(hw.pid.count_calls(|c| matches!(c, PidCall::SetTorqueLimits { .. })), 0);
        assert_eq!(hw.pid.count_calls(|c| matches!(c, PidCall::SetJointLimits { .. })), 1);
        assert_eq!(envelope.active(), Some(LimitConfiguration::NoTool));
        assert_eq!(hw.pid.state().joint_upper, LimitSet::no_tool_default().joint_upper);
    }

    #[test]
    fn test_tool_sets_joint_and_torque() {
        let (hw, _rx) = MockHardware::new();
        let mut envelope = envelope();
        envelope.activate(&hw.pid, true).unwrap();

        let state = hw.pid.state();
        assert!(state.torque_limits.is_some());
        assert_eq!(&state.joint_upper, &envelope.limits(LimitConfiguration::Tool).joint_upper);
        assert_eq!(envelope.active(), Some(LimitConfiguration::Tool));
    }

    #[test]
    fn test_engaging_disables_limit_check_first() {
        let (hw, _rx) = MockHardware::new();
        let mut envelope = envelope();
        envelope
            .set_tracking_tolerance(&hw.pid, ToleranceProfile::Engaging)
            .unwrap();

        let calls = hw.pid.calls();
        assert_eq!(calls[0], PidCall::SetCheckJointLimit(false));
        assert!(matches!(calls[1], PidCall::SetTrackingErrorTolerance(_)));
        assert!(!hw.pid.state().check_joint_limit);
        assert!(!envelope.check_joint_limit());
        assert_eq!(envelope.profile(), ToleranceProfile::Engaging);
    }

    #[test]
    fn test_ready_restores_limit_check_last() {
        let (hw, _rx) = MockHardware::new();
        let mut envelope = envelope();
        envelope
            .set_tracking_tolerance(&hw.pid, ToleranceProfile::Engaging)
            .unwrap();
        hw.pid.clear_calls();
        envelope
            .set_tracking_tolerance(&hw.pid, ToleranceProfile::Ready)
            .unwrap();

        let calls = hw.pid.calls();
        assert!(matches!(calls[0], PidCall::SetTrackingErrorTolerance(_)));
        assert_eq!(calls[1], PidCall::SetCheckJointLimit(true));
        assert!(matches!(calls[2], PidCall::SetPotsToEncodersTolerance(_)));
        assert!(hw.pid.state().check_joint_limit);
        assert_eq!(
            hw.pid.state().tracking_tolerance,
            ToleranceProfile::Ready.tracking().tolerance
        );
    }

    #[test]
    fn test_failed_write_keeps_previous_profile() {
        let (hw, _rx) = MockHardware::new();
        let mut envelope = envelope();
        hw.pid.set_fail_writes(true);
        assert!(
            envelope
                .set_tracking_tolerance(&hw.pid, ToleranceProfile::Engaging)
                .is_err()
        );
        assert_eq!(envelope.profile(), ToleranceProfile::Default);
        assert!(envelope.check_joint_limit());
    }
}
