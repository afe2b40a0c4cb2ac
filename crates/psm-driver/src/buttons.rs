//! 附件到位按钮（无菌适配器、器械）

use crate::error::DriverError;

/// 按钮边沿事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// 按下（附件安装）
    Pressed,
    /// 释放（附件移除）
    Released,
}

impl ButtonEvent {
    /// 由电平构造
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            ButtonEvent::Pressed
        } else {
            ButtonEvent::Released
        }
    }
}

/// 可轮询的到位按钮
pub trait PresenceButton: Send {
    /// 当前电平
    fn is_pressed(&self) -> Result<bool, DriverError>;
}
