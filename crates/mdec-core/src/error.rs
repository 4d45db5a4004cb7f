//! 统一错误类型定义.
//!
//! 所有 mdec crate 共用的错误类型, 支持跨模块传播.
//!
//! 错误分为三类:
//! - 探测失败 (`NotThisFormat`): 不是真正的错误, 调用方继续尝试下一个格式变体
//! - 解码期错误 (`EndOfStream`, `ReadCorruption`): 由解码器就地恢复 (补零), 仅记录警告
//! - 压缩期错误 (`TooMuchEnergyToCompress`, `CompressDoesNotFit` 等): 按帧上报给调用方

use thiserror::Error;

/// MDEC 框架统一错误类型
#[derive(Debug, Error)]
pub enum MdecError {
    /// 码流头部与当前格式变体不匹配
    #[error("不是该格式: {0}")]
    NotThisFormat(String),

    /// 比特流在帧中途耗尽 (输入被截断)
    #[error("码流提前结束")]
    EndOfStream,

    /// 结构上无效的码字
    #[error("码流损坏: {0}")]
    ReadCorruption(String),

    /// 单次压缩尝试失败, qscale 搜索应继续
    #[error("能量过高, 无法压缩: {0}")]
    TooMuchEnergyToCompress(String),

    /// 所有 qscale 都无法满足字节上限
    #[error("压缩结果超出字节上限 {budget} (最小输出 {smallest:?} 字节)")]
    CompressDoesNotFit {
        /// 原始帧的字节预算
        budget: usize,
        /// 搜索过程中得到的最小输出长度
        smallest: Option<usize>,
    },

    /// 压缩结果重新探测出的格式变体与原始帧不一致
    #[error("格式变体不一致: 原始 {expected}, 压缩结果 {actual}")]
    VariantMismatch {
        /// 原始帧的格式变体
        expected: String,
        /// 压缩结果的格式变体
        actual: String,
    },

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 扇区写回失败
    #[error("扇区写回失败: {0}")]
    Sink(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl MdecError {
    /// 是否为格式探测失败 (静默处理, 继续尝试下一个变体)
    pub fn is_probe_failure(&self) -> bool {
        matches!(self, MdecError::NotThisFormat(_))
    }

    /// 是否为解码期可就地恢复的错误
    pub fn is_recoverable_decode(&self) -> bool {
        matches!(self, MdecError::EndOfStream | MdecError::ReadCorruption(_))
    }
}

/// MDEC 框架统一 Result 类型
pub type MdecResult<T> = Result<T, MdecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MdecError::NotThisFormat("v1".into()).is_probe_failure());
        assert!(MdecError::EndOfStream.is_recoverable_decode());
        assert!(MdecError::ReadCorruption("run".into()).is_recoverable_decode());
        assert!(!MdecError::TooMuchEnergyToCompress("q".into()).is_recoverable_decode());
        assert!(
            !MdecError::CompressDoesNotFit {
                budget: 10,
                smallest: None
            }
            .is_probe_failure()
        );
    }

    #[test]
    fn test_error_display() {
        let err = MdecError::CompressDoesNotFit {
            budget: 2016,
            smallest: Some(2100),
        };
        let msg = err.to_string();
        assert!(msg.contains("2016"), "错误信息应包含字节上限: {msg}");
        assert!(msg.contains("2100"), "错误信息应包含最小输出: {msg}");
    }
}
