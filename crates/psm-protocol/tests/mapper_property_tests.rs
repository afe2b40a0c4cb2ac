//! 关节映射的属性测试
//!
//! 使用 proptest 验证运动学 ↔ PID 映射的往返性质。

use proptest::prelude::*;
use psm_protocol::{JointMapper, NUM_PID_JOINTS, ToolKind};

proptest! {
    /// 标准器械：运动学 → PID → 运动学 精确还原
    #[test]
    fn standard_kinematic_roundtrip(k in prop::collection::vec(-10.0..10.0f64, 6)) {
        let mapper = JointMapper::new(ToolKind::Standard);
        let pid = mapper.to_joints_pid(&k).unwrap();
        prop_assert_eq!(pid.len(), NUM_PID_JOINTS);
        let back = mapper.to_joints_kinematics(&pid).unwrap();
        prop_assert_eq!(back.as_slice(), k.as_slice());
    }

    /// 蛇形器械：PID → 运动学 → PID 精确还原（拆分/合并互逆）
    #[test]
    fn snake_pid_roundtrip(p in prop::collection::vec(-10.0..10.0f64, 6)) {
        let mapper = JointMapper::new(ToolKind::SnakeLike);
        let mut pid = p.clone();
        pid.push(0.0); // 夹爪不参与映射
        let kinematic = mapper.to_joints_kinematics(&pid).unwrap();
        prop_assert_eq!(kinematic.len(), 8);
        let back = mapper.to_joints_pid(&kinematic).unwrap();
        prop_assert_eq!(back.as_slice(), pid.as_slice());
    }

    /// 蛇形器械：由合并方向产生的运动学向量满足等式约束
    #[test]
    fn snake_split_satisfies_constraint(p in prop::collection::vec(-10.0..10.0f64, 7)) {
        let mapper = JointMapper::new(ToolKind::SnakeLike);
        let kinematic = mapper.to_joints_kinematics(&p).unwrap();
        prop_assert_eq!(mapper.snake_constraint_error(&kinematic), Some(0.0));
    }

    /// 长度不符总是返回错误
    #[test]
    fn wrong_length_is_rejected(len in 0usize..12) {
        prop_assume!(len != 6);
        let mapper = JointMapper::new(ToolKind::Standard);
        prop_assert!(mapper.to_joints_pid(&vec![0.0; len]).is_err());
    }
}
