//! 客户端错误类型

use std::time::Duration;

use psm_driver::DriverError;
use psm_protocol::{CouplingMatrix, JointMask, ProtocolError};
use psm_tools::ConfigError;
use thiserror::Error;

use crate::state::ArmState;

/// 客户端错误类型
#[derive(Error, Debug)]
pub enum PsmError {
    /// 驱动层错误（硬件写入失败等）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 维度错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 硬件回报的关节使能位向量与请求不一致
    #[error("can't disable last four axes to change coupling (requested {requested}, reported {reported})")]
    EnabledJointsMismatch {
        requested: JointMask,
        reported: JointMask,
    },

    /// 硬件回报的耦合矩阵与请求不一致
    #[error("can't set coupling, hardware reported a different matrix:\n{reported}")]
    CouplingMismatch { reported: CouplingMatrix },

    /// 等待硬件确认超时
    #[error("no acknowledgment for {waiting_for} after {elapsed:?}")]
    AckTimeout {
        waiting_for: &'static str,
        elapsed: Duration,
    },

    /// 轨迹生成器报告错误
    #[error("error while evaluating trajectory (engaging {target})")]
    TrajectoryFailed { target: &'static str },

    /// 轨迹超过预计完成时间
    #[error("trajectory for engaging {target} overran its expected end by {overrun:?}")]
    TrajectoryOverrun {
        target: &'static str,
        overrun: Duration,
    },

    /// 当前状态不接受该命令
    #[error("{command} rejected in state {state}")]
    InvalidState {
        command: &'static str,
        state: ArmState,
    },

    /// 不能作为期望状态
    #[error("{0} can't be requested as desired state")]
    InvalidDesiredState(ArmState),

    /// 命令参数无效
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// 接合流程未开始就被驱动
    #[error("engagement sequence was stepped before it was started")]
    SequenceNotStarted,

    /// 控制循环配置无效
    #[error("Invalid loop configuration: {0}")]
    InvalidLoopConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psm_error_display() {
        let err = PsmError::EnabledJointsMismatch {
            requested: JointMask::engage_disabled(),
            reported: JointMask::all(true, 7),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1110000") && msg.contains("1111111"), "{}", msg);

        let err = PsmError::InvalidState {
            command: "set_jaw_position",
            state: ArmState::ArmHomed,
        };
        assert_eq!(format!("{}", err), "set_jaw_position rejected in state ARM_HOMED");

        let err = PsmError::TrajectoryFailed { target: "tool" };
        assert!(format!("{}", err).contains("engaging tool"));
    }

    #[test]
    fn test_from_conversions() {
        let err: PsmError = DriverError::Timeout.into();
        assert!(matches!(err, PsmError::Driver(DriverError::Timeout)));

        let err: PsmError = ProtocolError::DimensionMismatch {
            expected: 6,
            actual: 8,
        }
        .into();
        assert!(format!("{}", err).contains("expected 6"));
    }
}
