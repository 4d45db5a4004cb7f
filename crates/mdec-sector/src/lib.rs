//! # mdec-sector
//!
//! 扇区块到逻辑帧字节流的重组.
//!
//! 扇区读取与扇区头解析由调用方完成, 本 crate 只消费 [`FrameChunk`] 接口:
//! [`ChannelDispatcher`] 按通道把块路由到 [`FrameAssembler`],
//! 结束的帧以 [`FinishedChunkSet`] 输出, 其 [`ChunkStream`] 即码流字节.

pub mod assembler;
pub mod chunk;
pub mod dispatcher;
pub mod stream;

// 重导出常用类型
pub use assembler::{AssemblerConfig, FinishedChunkSet, FrameAssembler, GapPolicy};
pub use chunk::{ChunkHeader, FrameChunk, MemoryChunk, SectorChunk};
pub use dispatcher::ChannelDispatcher;
pub use stream::{ChunkStream, ChunkStreamReader};
