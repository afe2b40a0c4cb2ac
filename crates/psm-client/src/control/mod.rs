//! 控制模块
//!
//! - `envelope` - 安全包络管理器（限位与跟踪误差容差）
//! - `coupling` - 耦合切换协议
//! - `engagement` - 接合动作
//! - `trajectory` - 三次样条轨迹生成器
//! - `loop_runner` - 控制循环包装器

pub mod coupling;
pub mod engagement;
pub mod envelope;
pub mod loop_runner;
pub mod trajectory;

// 重新导出常用类型
pub use coupling::{CouplingPhase, CouplingSequencer, CouplingStep};
pub use engagement::{
    EngageContext, EngageStep, EngageTarget, EngagementSequence, EngagementSequencer, JointSetpoint,
};
pub use envelope::{LimitConfiguration, SafetyEnvelope};
pub use loop_runner::{LoopConfig, LoopOutcome, StopReason, run_loop};
pub use trajectory::CubicTrajectory;
