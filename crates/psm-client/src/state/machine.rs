//! 表驱动的分层状态机
//!
//! 每个状态最多注册三个回调：
//!
//! - `enter`：状态改变时执行一次
//! - `run`：状态为当前状态时每个控制周期执行
//! - `transition`：期望状态不等于当前状态时每个控制周期执行，决定是否自动推进
//!
//! 回调通过 [`StateControl`] 请求立即跳转（`set_current_state`）或修改期望状态。
//! 跳转在回调返回后生效，新状态的 `enter` 随即执行；`enter` 中再次跳转会继续链式执行。
//!
//! # 示例
//!
//! ```rust
//! use psm_client::state::machine::{StateCallbacks, StateControl, StateMachine};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Light { Off, On }
//!
//! fn turn_on(count: &mut u32, ctl: &mut StateControl<Light>) -> Result<(), String> {
//!     *count += 1;
//!     ctl.set_current_state(Light::On);
//!     Ok(())
//! }
//!
//! let mut count = 0;
//! let mut machine = StateMachine::new("light", Light::Off, Light::Off);
//! machine.register(Light::Off, StateCallbacks::new().on_transition(turn_on));
//! machine.start(&mut count).unwrap();
//!
//! machine.set_desired_state(Light::On);
//! machine.tick(&mut count).unwrap();
//! assert_eq!(machine.current_state(), Light::On);
//! assert_eq!(count, 1);
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use tracing::{debug, error, info};

/// 单次 `settle` 允许的最大链式跳转次数
const MAX_CHAINED_ENTERS: usize = 32;

/// 回调签名
pub type Callback<S, C, E> = fn(&mut C, &mut StateControl<S>) -> Result<(), E>;

/// 单个状态的回调三元组
pub struct StateCallbacks<S, C, E> {
    pub enter: Option<Callback<S, C, E>>,
    pub run: Option<Callback<S, C, E>>,
    pub transition: Option<Callback<S, C, E>>,
}

impl<S, C, E> StateCallbacks<S, C, E> {
    pub fn new() -> Self {
        Self {
            enter: None,
            run: None,
            transition: None,
        }
    }

    pub fn on_enter(mut self, callback: Callback<S, C, E>) -> Self {
        self.enter = Some(callback);
        self
    }

    pub fn on_run(mut self, callback: Callback<S, C, E>) -> Self {
        self.run = Some(callback);
        self
    }

    pub fn on_transition(mut self, callback: Callback<S, C, E>) -> Self {
        self.transition = Some(callback);
        self
    }
}

impl<S, C, E> Default for StateCallbacks<S, C, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Enter,
    Run,
    Transition,
}

/// 回调可见的状态控制句柄
#[derive(Debug, Clone)]
pub struct StateControl<S> {
    current: S,
    desired: S,
    fallback: S,
    next: Option<S>,
}

impl<S: Copy + Eq> StateControl<S> {
    /// 当前状态
    pub fn current(&self) -> S {
        self.current
    }

    /// 期望状态
    pub fn desired(&self) -> S {
        self.desired
    }

    /// 回退状态
    pub fn fallback(&self) -> S {
        self.fallback
    }

    pub fn desired_is_not_current(&self) -> bool {
        self.desired != self.current
    }

    /// 请求立即跳转（回调返回后生效）
    pub fn set_current_state(&mut self, state: S) {
        self.next = Some(state);
    }

    pub fn set_desired_state(&mut self, state: S) {
        self.desired = state;
    }

    /// 放弃当前流程，当前状态与期望状态都切到回退状态
    pub fn fall_back(&mut self) {
        self.desired = self.fallback;
        self.next = Some(self.fallback);
    }
}

/// 表驱动状态机
pub struct StateMachine<S, C, E> {
    name: String,
    table: HashMap<S, StateCallbacks<S, C, E>>,
    control: StateControl<S>,
}

impl<S, C, E> StateMachine<S, C, E>
where
    S: Copy + Eq + Hash + Debug,
    E: Display,
{
    /// 创建状态机
    ///
    /// 初始状态的 `enter` 在 [`start`](Self::start) 或第一次 [`tick`](Self::tick) 时执行。
    pub fn new(name: impl Into<String>, initial: S, fallback: S) -> Self {
        Self {
            name: name.into(),
            table: HashMap::new(),
            control: StateControl {
                current: initial,
                desired: initial,
                fallback,
                next: Some(initial),
            },
        }
    }

    /// 注册（或替换）某个状态的回调
    pub fn register(&mut self, state: S, callbacks: StateCallbacks<S, C, E>) {
        self.table.insert(state, callbacks);
    }

    pub fn current_state(&self) -> S {
        self.control.current
    }

    pub fn desired_state(&self) -> S {
        self.control.desired
    }

    pub fn fallback_state(&self) -> S {
        self.control.fallback
    }

    pub fn set_desired_state(&mut self, state: S) {
        debug!(machine = %self.name, ?state, "Desired state set");
        self.control.desired = state;
    }

    /// 执行尚未执行的 `enter`（通常是初始状态）
    pub fn start(&mut self, ctx: &mut C) -> Result<(), E> {
        self.settle(ctx)
    }

    /// 立即跳转到 `state`，不经过期望状态
    pub fn set_current_state(&mut self, state: S, ctx: &mut C) -> Result<(), E> {
        self.control.next = Some(state);
        self.settle(ctx)
    }

    /// 一个控制周期：`run`，然后在期望状态不等于当前状态时执行 `transition`
    ///
    /// 回调返回错误时状态机切到回退状态，并把第一个错误返回给调用方。
    pub fn tick(&mut self, ctx: &mut C) -> Result<(), E> {
        self.settle(ctx)?;
        self.invoke(Hook::Run, ctx)?;
        if self.control.desired_is_not_current() {
            self.invoke(Hook::Transition, ctx)?;
        }
        Ok(())
    }

    fn callback(&self, state: S, hook: Hook) -> Option<Callback<S, C, E>> {
        let callbacks = self.table.get(&state)?;
        match hook {
            Hook::Enter => callbacks.enter,
            Hook::Run => callbacks.run,
            Hook::Transition => callbacks.transition,
        }
    }

    fn invoke(&mut self, hook: Hook, ctx: &mut C) -> Result<(), E> {
        let state = self.control.current;
        let outcome = match self.callback(state, hook) {
            Some(callback) => callback(ctx, &mut self.control),
            None => Ok(()),
        };
        if let Err(e) = &outcome {
            error!(machine = %self.name, ?state, ?hook, "Callback failed: {}", e);
            if state != self.control.fallback {
                self.control.fall_back();
            }
        }
        let settled = self.settle(ctx);
        outcome.and(settled)
    }

    fn settle(&mut self, ctx: &mut C) -> Result<(), E> {
        let mut result = Ok(());
        let mut entered = 0usize;

        while let Some(requested) = self.control.next.take() {
            entered += 1;
            let next = if entered > MAX_CHAINED_ENTERS {
                error!(
                    machine = %self.name,
                    ?requested,
                    "Too many chained state changes, falling back to {:?}",
                    self.control.fallback
                );
                self.control.desired = self.control.fallback;
                self.control.fallback
            } else {
                requested
            };

            let previous = self.control.current;
            self.control.current = next;
            if previous != next {
                info!(machine = %self.name, from = ?previous, to = ?next, "State changed");
            }

            if let Some(enter) = self.callback(next, Hook::Enter)
                && let Err(e) = enter(ctx, &mut self.control)
            {
                error!(machine = %self.name, state = ?next, "Enter callback failed: {}", e);
                if next != self.control.fallback {
                    self.control.fall_back();
                } else {
                    self.control.next = None;
                }
                if result.is_ok() {
                    result = Err(e);
                }
            }

            if entered > MAX_CHAINED_ENTERS {
                self.control.next = None;
            }
        }
        result
    }
}
