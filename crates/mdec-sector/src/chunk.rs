//! 扇区块接口.
//!
//! 扇区读取与扇区头解析由外部负责, 这里只约定每个块能提供的信息:
//! 扇区号、有效字节数、按下标读字节与整体复制, 以及帧相关的
//! 块序号 / 块总数 / 帧号 / 通道 / 尺寸.

use bytes::Bytes;

/// 一个扇区中属于某帧的字节片段
pub trait SectorChunk: Send + Sync {
    /// 扇区号
    fn sector_number(&self) -> u32;

    /// 有效字节数
    fn len(&self) -> usize;

    /// 是否不含数据
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取第 `index` 个字节
    fn byte_at(&self, index: usize) -> Option<u8>;

    /// 从 `offset` 开始复制到 `dst`, 返回复制的字节数
    fn copy_into(&self, offset: usize, dst: &mut [u8]) -> usize;
}

/// 带帧信息的扇区块
pub trait FrameChunk: SectorChunk {
    /// 块在帧中的序号
    fn chunk_index(&self) -> u16;

    /// 帧声明的块总数
    fn chunk_count(&self) -> u16;

    /// 帧号 (随游戏递增或递减)
    fn frame_number(&self) -> u32;

    /// 通道
    fn channel(&self) -> u8;

    /// 帧宽度 (像素)
    fn width(&self) -> u32;

    /// 帧高度 (像素)
    fn height(&self) -> u32;
}

/// 扇区头中与帧组装相关的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
    /// 块序号
    pub chunk_index: u16,
    /// 块总数
    pub chunk_count: u16,
    /// 帧号
    pub frame_number: u32,
    /// 通道
    pub channel: u8,
    /// 帧宽度
    pub width: u32,
    /// 帧高度
    pub height: u32,
}

/// 内存中的扇区块
#[derive(Debug, Clone)]
pub struct MemoryChunk {
    header: ChunkHeader,
    sector: u32,
    data: Bytes,
}

impl MemoryChunk {
    /// 创建扇区块
    pub fn new(header: ChunkHeader, sector: u32, data: impl Into<Bytes>) -> Self {
        Self {
            header,
            sector,
            data: data.into(),
        }
    }

    /// 扇区头字段
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// 有效字节
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl SectorChunk for MemoryChunk {
    fn sector_number(&self) -> u32 {
        self.sector
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    fn copy_into(&self, offset: usize, dst: &mut [u8]) -> usize {
        let Some(src) = self.data.get(offset..) else {
            return 0;
        };
        let n = src.len().min(dst.len());
        dst[..n].copy_from_slice(&src[..n]);
        n
    }
}

impl FrameChunk for MemoryChunk {
    fn chunk_index(&self) -> u16 {
        self.header.chunk_index
    }

    fn chunk_count(&self) -> u16 {
        self.header.chunk_count
    }

    fn frame_number(&self) -> u32 {
        self.header.frame_number
    }

    fn channel(&self) -> u8 {
        self.header.channel
    }

    fn width(&self) -> u32 {
        self.header.width
    }

    fn height(&self) -> u32 {
        self.header.height
    }
}
