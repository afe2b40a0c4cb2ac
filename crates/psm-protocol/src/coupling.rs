//! 执行器 ↔ 关节耦合矩阵
//!
//! 线缆走线随附件（无器械 / 器械）变化，因此执行器位置到关节位置的线性映射也随之变化。
//! 无器械时使用单位矩阵，安装器械后使用器械配置文件中的矩阵。

use crate::error::ProtocolError;
use nalgebra::DMatrix;
use std::fmt;

/// 耦合矩阵（N×N 方阵）
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingMatrix(DMatrix<f64>);

impl CouplingMatrix {
    /// 单位耦合（无器械）
    pub fn identity(dim: usize) -> Self {
        CouplingMatrix(DMatrix::identity(dim, dim))
    }

    /// 从行数据创建
    ///
    /// # 错误
    ///
    /// - 空矩阵：`ProtocolError::EmptyMatrix`
    /// - 非方阵或行长度不一致：`ProtocolError::NotSquare`
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ProtocolError> {
        let dim = rows.len();
        if dim == 0 {
            return Err(ProtocolError::EmptyMatrix);
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != dim) {
            return Err(ProtocolError::NotSquare {
                rows: dim,
                cols: bad.len(),
            });
        }
        Ok(CouplingMatrix(DMatrix::from_fn(dim, dim, |r, c| rows[r][c])))
    }

    /// 矩阵维度
    #[inline]
    pub fn dim(&self) -> usize {
        self.0.nrows()
    }

    /// 是否为单位矩阵（精确比较）
    pub fn is_identity(&self) -> bool {
        self.0 == DMatrix::identity(self.dim(), self.dim())
    }

    /// 导出行数据
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.0
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect()
    }

    /// 底层 nalgebra 矩阵
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.0
    }
}

impl fmt::Display for CouplingMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.to_rows() {
            let cells: Vec<String> = row.iter().map(|v| format!("{:8.4}", v)).collect();
            writeln!(f, "[{}]", cells.join(", "))?;
        }
        Ok(())
    }
}
