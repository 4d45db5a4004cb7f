//! 块流: 把按序号排列的扇区块拼成一段连续、可截短的逻辑字节区间.
//!
//! 遇到第一个缺失的块即停止, 之后的字节视为不存在;
//! 解码器读到末尾时按码流截断处理 (剩余宏块补零).

use std::io;
use std::sync::Arc;

use log::debug;

use crate::chunk::SectorChunk;

/// 扇区块组成的逻辑字节流
pub struct ChunkStream<'a, C: SectorChunk + ?Sized> {
    chunks: &'a [Option<Arc<C>>],
    /// 第一个缺失块之前的块数
    contiguous: usize,
    /// 逻辑长度 (已截短)
    len: usize,
}

impl<'a, C: SectorChunk + ?Sized> ChunkStream<'a, C> {
    /// 由按序号排列的块槽创建
    pub fn new(chunks: &'a [Option<Arc<C>>]) -> Self {
        let contiguous = chunks.iter().take_while(|c| c.is_some()).count();
        if contiguous < chunks.len() {
            debug!(
                "块流在第 {} 块处缺失, 之后的 {} 个块槽被忽略",
                contiguous,
                chunks.len() - contiguous
            );
        }
        let len = chunks[..contiguous]
            .iter()
            .flatten()
            .map(|c| c.len())
            .sum();
        Self {
            chunks,
            contiguous,
            len,
        }
    }

    /// 逻辑字节数
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 第一个缺失块的序号
    pub fn first_gap(&self) -> Option<usize> {
        (self.contiguous < self.chunks.len()).then_some(self.contiguous)
    }

    /// 截短到最多 `max_len` 字节
    pub fn trim(&mut self, max_len: usize) {
        self.len = self.len.min(max_len);
    }

    /// 读取逻辑偏移处的字节
    pub fn byte_at(&self, mut offset: usize) -> Option<u8> {
        if offset >= self.len {
            return None;
        }
        for chunk in self.chunks[..self.contiguous].iter().flatten() {
            if offset < chunk.len() {
                return chunk.byte_at(offset);
            }
            offset -= chunk.len();
        }
        None
    }

    /// 从逻辑偏移 `offset` 开始复制, 返回复制的字节数
    pub fn copy_into(&self, offset: usize, dst: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let want = dst.len().min(self.len - offset);
        let mut copied = 0usize;
        let mut skip = offset;
        for chunk in self.chunks[..self.contiguous].iter().flatten() {
            if copied == want {
                break;
            }
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            copied += chunk.copy_into(skip, &mut dst[copied..want]);
            skip = 0;
        }
        copied
    }

    /// 复制全部逻辑字节
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        let n = self.copy_into(0, &mut out);
        out.truncate(n);
        out
    }

    /// 以 `io::Read` 方式顺序读取
    pub fn reader(&self) -> ChunkStreamReader<'_, 'a, C> {
        ChunkStreamReader {
            stream: self,
            position: 0,
        }
    }
}

/// [`ChunkStream`] 的顺序读取器
pub struct ChunkStreamReader<'s, 'a, C: SectorChunk + ?Sized> {
    stream: &'s ChunkStream<'a, C>,
    position: usize,
}

impl<C: SectorChunk + ?Sized> io::Read for ChunkStreamReader<'_, '_, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stream.copy_into(self.position, buf);
        self.position += n;
        Ok(n)
    }
}
