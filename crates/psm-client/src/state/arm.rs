//! 手臂状态与附件标志

use std::fmt;

/// 手臂状态
///
/// 接合子系统的状态按正常推进顺序排列：
///
/// ```text
/// UNINITIALIZED → ARM_HOMED → CHANGING_COUPLING_ADAPTER → ENGAGING_ADAPTER → ADAPTER_ENGAGED
///   → CHANGING_COUPLING_TOOL → ENGAGING_TOOL → TOOL_ENGAGED → READY
/// ```
///
/// `FAULT` 是协议失败后的回退状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ArmState {
    Uninitialized,
    ArmHomed,
    ChangingCouplingAdapter,
    EngagingAdapter,
    AdapterEngaged,
    ChangingCouplingTool,
    EngagingTool,
    ToolEngaged,
    Ready,
    Fault,
}

impl ArmState {
    /// 所有状态
    pub const ALL: [ArmState; 10] = [
        ArmState::Uninitialized,
        ArmState::ArmHomed,
        ArmState::ChangingCouplingAdapter,
        ArmState::EngagingAdapter,
        ArmState::AdapterEngaged,
        ArmState::ChangingCouplingTool,
        ArmState::EngagingTool,
        ArmState::ToolEngaged,
        ArmState::Ready,
        ArmState::Fault,
    ];

    /// 状态名
    pub const fn as_str(self) -> &'static str {
        match self {
            ArmState::Uninitialized => "UNINITIALIZED",
            ArmState::ArmHomed => "ARM_HOMED",
            ArmState::ChangingCouplingAdapter => "CHANGING_COUPLING_ADAPTER",
            ArmState::EngagingAdapter => "ENGAGING_ADAPTER",
            ArmState::AdapterEngaged => "ADAPTER_ENGAGED",
            ArmState::ChangingCouplingTool => "CHANGING_COUPLING_TOOL",
            ArmState::EngagingTool => "ENGAGING_TOOL",
            ArmState::ToolEngaged => "TOOL_ENGAGED",
            ArmState::Ready => "READY",
            ArmState::Fault => "FAULT",
        }
    }

    /// 已完成归零（`ARM_HOMED` 及之后的正常状态）
    pub fn is_homed(self) -> bool {
        self >= ArmState::ArmHomed && self != ArmState::Fault
    }

    /// 可以作为期望状态的停留状态
    ///
    /// 耦合切换与接合是中间过程，只能由状态机自己进入。
    pub fn is_resting(self) -> bool {
        matches!(
            self,
            ArmState::ArmHomed | ArmState::AdapterEngaged | ArmState::ToolEngaged | ArmState::Ready
        )
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArmState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ArmState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown arm state: {}", s))
    }
}

/// 附件到位标志
///
/// 有按钮时按需从按钮重新采样，否则保持最近一次事件/通知的值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceFlags {
    pub adapter: bool,
    pub tool: bool,
}

/// 附件待接合标志
///
/// 按钮按下（或器械到位通知）时置位，接合完成或判定无需接合时清除。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeedEngageFlags {
    pub adapter: bool,
    pub tool: bool,
}
