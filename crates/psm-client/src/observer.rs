//! 状态观察器
//!
//! 控制线程每个周期结束时发布一份完整快照，其他线程无锁读取。
//! 读到的快照总是某一个周期结束时的状态，容差档位与限位检查开关不会出现不一致的组合。

use std::sync::Arc;

use arc_swap::ArcSwap;
use psm_tools::ToleranceProfile;

use crate::state::ArmState;

/// 一个控制周期结束时的状态快照
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PsmStatus {
    /// 已执行的控制周期数
    pub tick: u64,
    pub current_state: ArmState,
    pub desired_state: ArmState,
    pub adapter_present: bool,
    pub tool_present: bool,
    pub adapter_need_engage: bool,
    pub tool_need_engage: bool,
    /// 接合阶段（未在接合时为 `None`）
    pub engaging_stage: Option<u32>,
    /// 当前跟踪误差容差档位
    pub tolerance_profile: ToleranceProfile,
    /// PID 关节限位检查是否开启
    pub check_joint_limit: bool,
    /// 是否已下发器械限位
    pub tool_limits_active: bool,
    /// 最近一次导致回退的原因
    pub last_failure: Option<String>,
}

impl Default for PsmStatus {
    fn default() -> Self {
        Self {
            tick: 0,
            current_state: ArmState::Uninitialized,
            desired_state: ArmState::Uninitialized,
            adapter_present: false,
            tool_present: false,
            adapter_need_engage: false,
            tool_need_engage: false,
            engaging_stage: None,
            tolerance_profile: ToleranceProfile::Default,
            check_joint_limit: true,
            tool_limits_active: false,
            last_failure: None,
        }
    }
}

/// 状态观察器（可克隆，跨线程只读）
#[derive(Debug, Clone, Default)]
pub struct StatusObserver {
    inner: Arc<ArcSwap<PsmStatus>>,
}

impl StatusObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最新快照
    pub fn snapshot(&self) -> Arc<PsmStatus> {
        self.inner.load_full()
    }

    pub fn current_state(&self) -> ArmState {
        self.inner.load().current_state
    }

    pub(crate) fn publish(&self, status: PsmStatus) {
        self.inner.store(Arc::new(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_read_from_other_thread() {
        let observer = StatusObserver::new();
        assert_eq!(observer.current_state(), ArmState::Uninitialized);

        let reader = observer.clone();
        observer.publish(PsmStatus {
            tick: 3,
            current_state: ArmState::Ready,
            ..PsmStatus::default()
        });

        let handle = std::thread::spawn(move || reader.snapshot());
        let snapshot = handle.join().unwrap();
        assert_eq!(snapshot.tick, 3);
        assert_eq!(snapshot.current_state, ArmState::Ready);
    }
}
