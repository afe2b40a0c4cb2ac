//! # PSM Driver
//!
//! 外部协作方（PID 控制器、轨迹生成器、到位按钮）的接口定义与硬件事件邮箱。
//!
//! ## 模块
//!
//! - `pid`: PID 控制器命令接口与关节反馈
//! - `trajectory`: 轨迹生成器接口
//! - `buttons`: 到位按钮接口与边沿事件
//! - `events`: 硬件异步事件邮箱（`crossbeam-channel`）
//! - `mode`: 运行模式（真实硬件 / 仿真）
//! - `mock`: 内存 mock 硬件（`mock` feature 或测试）

pub mod buttons;
pub mod error;
pub mod events;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod mode;
pub mod pid;
pub mod trajectory;

// 重新导出常用类型
pub use buttons::{ButtonEvent, PresenceButton};
pub use error::DriverError;
pub use events::{EventReceiver, EventSender, HardwareEvent, event_channel};
pub use mode::{AtomicRunMode, RunMode};
pub use pid::{JointFeedback, PidInterface};
pub use trajectory::{TrajectoryGenerator, TrajectoryStatus};
