//! # mdec-codec
//!
//! PS1 MDEC 视频码流的解码与重编码.
//!
//! ## 解码
//!
//! 码流字节 -> [`BitstreamDecoder`] -> [`MdecCodeStream`] (系数码序列)
//! -> [`MdecTransform`] (定点或浮点) -> RGB24 像素.
//!
//! ## 编码
//!
//! [`PsxYCbCrImage`] -> [`FrameEncoder`] (每宏块一个 [`MacroblockEncoder`])
//! -> [`BitstreamCompressor`] 按 qscale 搜索满足字节预算的码流.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use mdec_codec::{BitstreamDecoder, DecoderKind};
//!
//! # fn run(bytes: &[u8]) -> mdec_core::MdecResult<()> {
//! let stream = BitstreamDecoder::new().decode(bytes, 320, 240)?;
//! let mut decoder = DecoderKind::Fixed.create();
//! decoder.decode(&stream)?;
//! let mut rgb = vec![0u8; 320 * 240 * 3];
//! decoder.read_pixels(&mut rgb)?;
//! # Ok(())
//! # }
//! ```

pub mod code;
pub mod color;
pub mod compressor;
pub mod dct;
pub mod decoder;
pub mod encoder;
pub mod image;
pub mod tables;
pub mod transform;
pub mod variant;

// 重导出常用类型
pub use code::{BlockRole, MdecCode};
pub use compressor::{BitstreamCompressor, CompressResult};
pub use decoder::{BitstreamDecoder, DecodeIssues, DecodeState, MdecCodeStream};
pub use encoder::{
    FrameEncoder, MacroblockEncoder, MacroblockSource, OriginalMacroblock, requantize_block,
};
pub use image::PsxYCbCrImage;
pub use transform::{
    CHROMA_LUMA_OFFSET, DecoderKind, FixedPointDecoder, FloatDecoder, MdecTransform,
};
pub use variant::{DEFAULT_PROBE_ORDER, FrameHeader, StrVariant, probe};
