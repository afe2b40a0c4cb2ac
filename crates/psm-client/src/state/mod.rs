//! 状态机
//!
//! - `machine`：通用的表驱动状态机（enter/run/transition 回调）
//! - `arm`：手臂状态枚举与附件标志

pub mod arm;
pub mod machine;

pub use arm::{ArmState, NeedEngageFlags, PresenceFlags};
pub use machine::{StateCallbacks, StateControl, StateMachine};
