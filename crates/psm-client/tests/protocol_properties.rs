//! 耦合切换与接合阶段的属性测试
//!
//! 任意的周期/确认到达交错下：
//! - `SetCoupling` 之前一定收到过与请求一致的使能确认
//! - 接合阶段单调，恰好在 `LastStage` 次到位后完成

use std::time::Duration;

use proptest::prelude::*;
use psm_client::{ArmState, Psm, PsmHardware, PsmOptions};
use psm_driver::mock::{AckPolicy, MockHardware, PidCall, ScriptedTrajectory};
use psm_driver::{HardwareEvent, TrajectoryStatus};
use psm_protocol::{CouplingMatrix, JointMask};
use psm_tools::ArmConfig;

#[derive(Debug, Clone)]
enum Action {
    Tick,
    /// 注入使能确认（`true` 为与请求一致的位向量）
    AckEnabled(bool),
    /// 注入耦合确认（`true` 为单位矩阵）
    AckCoupling(bool),
    /// 重新归零并请求就绪
    Rehome,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => Just(Action::Tick),
        2 => any::<bool>().prop_map(Action::AckEnabled),
        2 => any::<bool>().prop_map(Action::AckCoupling),
        1 => Just(Action::Rehome),
    ]
}

fn rig(trajectory: ScriptedTrajectory, adapter_at_boot: bool) -> (Psm, MockHardware) {
    let (hw, events) = MockHardware::new();
    hw.adapter.set_level(adapter_at_boot);
    let hardware = PsmHardware::new(Box::new(hw.pid.clone()), Box::new(trajectory), events)
        .with_adapter_button(Box::new(hw.adapter.clone()));
    let psm = Psm::new(ArmConfig::example().unwrap(), hardware, PsmOptions::new("PSM1")).unwrap();
    (psm, hw)
}

proptest! {
    #[test]
    fn set_coupling_follows_matching_enable_ack(actions in prop::collection::vec(action(), 1..200)) {
        let (mut psm, hw) = rig(ScriptedTrajectory::always_reached(), true);
        hw.pid.set_enable_ack(AckPolicy::Silent);
        hw.pid.set_coupling_ack(AckPolicy::Silent);
        psm.mark_homed().unwrap();
        psm.set_desired_state(ArmState::Ready).unwrap();

        // 每个一致的使能确认注入时的调用日志长度
        let mut matching_acks: Vec<usize> = Vec::new();
        let mut now = Duration::ZERO;

        for action in actions {
            match action {
                Action::Tick => {
                    now += Duration::from_millis(1);
                    let _ = psm.tick(now);
                },
                Action::AckEnabled(matching) => {
                    let mask = if matching {
                        JointMask::engage_disabled()
                    } else {
                        JointMask::all(false, 7)
                    };
                    if matching {
                        matching_acks.push(hw.pid.calls().len());
                    }
                    hw.events.send(HardwareEvent::EnabledJointsChanged(mask)).unwrap();
                },
                Action::AckCoupling(matching) => {
                    let coupling = if matching {
                        CouplingMatrix::identity(7)
                    } else {
                        let mut rows = CouplingMatrix::identity(7).to_rows();
                        rows[3][3] = -1.0;
                        CouplingMatrix::from_rows(&rows).unwrap()
                    };
                    hw.events.send(HardwareEvent::CouplingChanged(coupling)).unwrap();
                },
                Action::Rehome => {
                    psm.mark_homed().unwrap();
                    psm.set_desired_state(ArmState::Ready).unwrap();
                },
            }
        }

        let calls = hw.pid.calls();
        for (k, call) in calls.iter().enumerate() {
            if !matches!(call, PidCall::SetCoupling(_)) {
                continue;
            }
            let release = calls[..k]
                .iter()
                .rposition(|c| *c == PidCall::EnableJoints(JointMask::engage_disabled()));
            prop_assert!(release.is_some(), "SetCoupling at {} without releasing joints", k);
            let j = release.unwrap_or_default();
            prop_assert!(
                matching_acks.iter().any(|&at| at > j && at <= k),
                "SetCoupling at {} without a matching ack after release at {}",
                k,
                j
            );
        }
    }

    #[test]
    fn engagement_completes_after_last_stage_finals(
        working in prop::collection::vec(0usize..6, 5)
    ) {
        let mut script = Vec::new();
        for &n in &working {
            script.extend(std::iter::repeat_n(TrajectoryStatus::Working, n));
            script.push(TrajectoryStatus::FinalStateReached);
        }
        // 脚本耗尽后出错：多要一次到位就会失败
        let trajectory = ScriptedTrajectory::new(script, TrajectoryStatus::Error);
        let (mut psm, hw) = rig(trajectory.clone(), false);
        psm.mark_homed().unwrap();
        psm.set_desired_state(ArmState::AdapterEngaged).unwrap();
        hw.adapter.press().unwrap();

        let mut now = Duration::ZERO;
        let mut last_stage = 0;
        let mut entered = false;
        for _ in 0..200 {
            now += Duration::from_millis(1);
            psm.tick(now).unwrap();
            let status = psm.status();
            if let Some(stage) = status.engaging_stage {
                if !entered {
                    prop_assert_eq!(stage, 1);
                    entered = true;
                }
                prop_assert!(stage >= last_stage);
                prop_assert!(stage <= 6);
                last_stage = stage;
            }
            if status.current_state == ArmState::AdapterEngaged {
                break;
            }
        }

        prop_assert_eq!(psm.current_state(), ArmState::AdapterEngaged);
        prop_assert_eq!(last_stage, 6);
        prop_assert_eq!(trajectory.evaluations(), working.iter().sum::<usize>() + 5);
    }
}
