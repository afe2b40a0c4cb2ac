//! 协议层错误类型定义

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 关节向量长度不匹配
    #[error("Dimension mismatch: expected {expected} joints, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 耦合矩阵不是方阵（或行长度不一致）
    #[error("Coupling matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    /// 空矩阵
    #[error("Coupling matrix is empty")]
    EmptyMatrix,
}
