//! PID 控制器接口
//!
//! 底层执行器/编码器 IO 不在本 crate 内实现，这里只定义上层需要调用的命令集合。
//! 所有命令都是非阻塞的"提交"，硬件对 [`PidInterface::enable_joints`] 与
//! [`PidInterface::set_coupling`] 的确认通过 [`crate::events`] 异步送回。
//!
//! # 线程安全
//!
//! 方法接收 `&self`，实现方自行处理内部同步，可以在多个线程间共享。

use crate::error::DriverError;
use psm_protocol::{CouplingMatrix, JointMask, JointVector};

/// PID 关节反馈
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointFeedback {
    /// 测量位置（编码器）
    pub position: JointVector,
    /// 测量速度
    pub velocity: JointVector,
    /// PID 当前期望位置（最近一次下发的设定值）
    pub desired_position: JointVector,
}

/// PID 控制器命令接口
pub trait PidInterface: Send {
    /// 设置关节使能位向量（异步确认：`EnabledJointsChanged`）
    fn enable_joints(&self, enabled: &JointMask) -> Result<(), DriverError>;

    /// 设置执行器到关节耦合矩阵（异步确认：`CouplingChanged`）
    fn set_coupling(&self, coupling: &CouplingMatrix) -> Result<(), DriverError>;

    /// 设置关节位置限位
    fn set_joint_limits(&self, lower: &JointVector, upper: &JointVector) -> Result<(), DriverError>;

    /// 设置力矩限位
    fn set_torque_limits(&self, lower: &JointVector, upper: &JointVector) -> Result<(), DriverError>;

    /// 设置跟踪误差容差
    fn set_tracking_error_tolerance(&self, tolerance: &JointVector) -> Result<(), DriverError>;

    /// 开启/关闭跟踪误差检查
    fn enable_tracking_error(&self, enabled: bool) -> Result<(), DriverError>;

    /// 开启/关闭关节限位检查
    fn set_check_joint_limit(&self, enabled: bool) -> Result<(), DriverError>;

    /// 设置电位器/编码器一致性容差
    fn set_pots_to_encoders_tolerance(&self, tolerance: &JointVector) -> Result<(), DriverError>;

    /// 下发关节位置设定值（7 个 PID 关节）
    fn set_position_joint(&self, position: &JointVector) -> Result<(), DriverError>;

    /// 读取最新关节反馈
    fn feedback(&self) -> Result<JointFeedback, DriverError>;
}
