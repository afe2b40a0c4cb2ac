//! 命令定义和实现

pub mod check_config;
pub mod simulate;

pub use check_config::CheckConfigCommand;
pub use simulate::SimulateCommand;
