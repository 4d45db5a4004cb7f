//! # psxmdec
//!
//! 纯 Rust 实现的 PlayStation MDEC 视频码流解码与帧替换.
//!
//! - **扇区块重组**: 多通道扇区块 -> 每帧一段逻辑字节流
//! - **解码**: 帧头探测、变长码解析、反量化、IDCT、PS1 色彩转换
//! - **重编码**: 正向 DCT、量化、qscale 搜索, 保证不超过原始盘上字节数
//! - **帧替换**: 差异检测、局部或整帧重编码、格式变体校验、扇区写回
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use psxmdec::codec::{BitstreamDecoder, DecoderKind};
//!
//! # fn run(bytes: &[u8]) -> psxmdec::core::MdecResult<()> {
//! let stream = BitstreamDecoder::new().decode(bytes, 320, 240)?;
//! let mut decoder = DecoderKind::Float.create();
//! decoder.decode(&stream)?;
//! let mut rgb = vec![0u8; 320 * 240 * 3];
//! decoder.read_pixels(&mut rgb)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `mdec-core` | 错误类型、比特流读写、宏块布局 |
//! | `mdec-codec` | 码流解码、反变换、编码与压缩 |
//! | `mdec-sector` | 扇区块流、帧组装、通道分发 |

/// 核心类型与工具
pub use mdec_core as core;

/// 码流编解码
pub use mdec_codec as codec;

/// 扇区块重组
pub use mdec_sector as sector;

pub mod config;
pub mod logging;
pub mod replace;

pub use config::{MdecConfig, ReplaceConfig, ReplaceMode};
pub use replace::{
    DiffOptions, FrameReplacer, MemoryPatchSink, PatchSink, PixelMask, PixelRect,
    PreparedReplacement, ReplaceJob, ReplaceOutcome, SectorPatch, differing_macroblocks,
    split_for_sectors, verify_variant,
};

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 按配置创建帧分发器
pub fn dispatcher_from_config(config: &MdecConfig) -> sector::ChannelDispatcher {
    sector::ChannelDispatcher::new(config.assembler)
}

/// 按配置创建帧替换器
pub fn replacer_from_config(config: &MdecConfig) -> FrameReplacer {
    FrameReplacer::new(config.replace.clone())
}
