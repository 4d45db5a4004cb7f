//! 帧组装器: 收集同一帧 / 同一通道的扇区块, 判断完成或帧边界, 输出完成的块集合.
//!
//! 每个活动通道一个组装器实例. `try_add` 拒绝某个块时, 调用方应先 `finish`
//! 当前帧, 再用被拒绝的块 `seed` 新帧.

use std::sync::Arc;

use log::{debug, warn};
use mdec_core::{MdecError, MdecResult};

use crate::chunk::FrameChunk;
use crate::stream::ChunkStream;

/// 帧达到结束条件但仍有缺失块时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum GapPolicy {
    /// 记录警告并保留空槽, 解码时缺失部分补零
    #[default]
    WarnAndKeep,
    /// 丢弃整帧
    Discard,
}

/// 组装器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct AssemblerConfig {
    /// 缺块处理方式
    pub gap_policy: GapPolicy,
}

/// 组装中的一帧
pub struct FrameAssembler {
    chunks: Vec<Option<Arc<dyn FrameChunk>>>,
    accepted: usize,
    frame_number: u32,
    channel: u8,
    width: u32,
    height: u32,
    policy: GapPolicy,
}

impl FrameAssembler {
    /// 以一帧中见到的第一个块开始组装
    pub fn seed(first: Arc<dyn FrameChunk>, config: &AssemblerConfig) -> MdecResult<Self> {
        let count = first.chunk_count() as usize;
        if count == 0 || first.chunk_index() as usize >= count {
            return Err(MdecError::InvalidArgument(format!(
                "扇区 {} 的块序号 {} / 块总数 {} 无效",
                first.sector_number(),
                first.chunk_index(),
                first.chunk_count()
            )));
        }
        let mut assembler = Self {
            chunks: vec![None; count],
            accepted: 0,
            frame_number: first.frame_number(),
            channel: first.channel(),
            width: first.width(),
            height: first.height(),
            policy: config.gap_policy,
        };
        debug!(
            "通道 {} 开始组装帧 {}: {}x{}, {} 块",
            assembler.channel, assembler.frame_number, assembler.width, assembler.height, count
        );
        assembler.place(first);
        Ok(assembler)
    }

    /// 尝试加入一个块; 返回 false 表示它属于另一帧
    pub fn try_add(&mut self, chunk: Arc<dyn FrameChunk>) -> bool {
        let compatible = chunk.channel() == self.channel
            && chunk.frame_number() == self.frame_number
            && chunk.width() == self.width
            && chunk.height() == self.height
            && chunk.chunk_count() as usize == self.chunks.len()
            && (chunk.chunk_index() as usize) < self.chunks.len();
        if compatible {
            self.place(chunk);
        }
        compatible
    }

    fn place(&mut self, chunk: Arc<dyn FrameChunk>) {
        let index = chunk.chunk_index() as usize;
        if self.chunks[index].is_some() {
            warn!(
                "帧 {} 的第 {} 块重复 (扇区 {}), 忽略",
                self.frame_number,
                index,
                chunk.sector_number()
            );
            return;
        }
        self.chunks[index] = Some(chunk);
        self.accepted += 1;
    }

    /// 是否已收齐声明的块数
    pub fn is_complete(&self) -> bool {
        self.accepted == self.chunks.len()
    }

    /// 通道
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// 帧号
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// 结束组装
    ///
    /// 有缺失块时记录警告; `GapPolicy::Discard` 下返回 None.
    pub fn finish(self) -> Option<FinishedChunkSet> {
        let missing: Vec<usize> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.is_none().then_some(i))
            .collect();
        if !missing.is_empty() {
            match self.policy {
                GapPolicy::WarnAndKeep => warn!(
                    "通道 {} 帧 {} 缺少块 {:?}, 缺失部分将按零系数解码",
                    self.channel, self.frame_number, missing
                ),
                GapPolicy::Discard => {
                    warn!(
                        "通道 {} 帧 {} 缺少块 {:?}, 丢弃整帧",
                        self.channel, self.frame_number, missing
                    );
                    return None;
                }
            }
        }
        Some(FinishedChunkSet {
            chunks: self.chunks,
            frame_number: self.frame_number,
            channel: self.channel,
            width: self.width,
            height: self.height,
        })
    }
}

/// 完成的块集合: 一帧按序号排列的扇区块与帧信息, 构造后不可变
#[derive(Clone)]
pub struct FinishedChunkSet {
    chunks: Vec<Option<Arc<dyn FrameChunk>>>,
    frame_number: u32,
    channel: u8,
    width: u32,
    height: u32,
}

impl FinishedChunkSet {
    /// 第 `index` 个块, 缺失时为 None
    pub fn chunk(&self, index: usize) -> Option<&Arc<dyn FrameChunk>> {
        self.chunks.get(index).and_then(|c| c.as_ref())
    }

    /// 块槽数 (声明的块总数)
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// 是否没有块槽
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 缺失块的序号
    pub fn missing_indices(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.is_none().then_some(i))
            .collect()
    }

    /// 是否收齐
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Option::is_some)
    }

    /// 帧的逻辑字节流
    pub fn stream(&self) -> ChunkStream<'_, dyn FrameChunk> {
        ChunkStream::new(&self.chunks)
    }

    /// 已有块的字节总数, 即原始帧在盘上的字节预算
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().flatten().map(|c| c.len()).sum()
    }

    /// 已有块的扇区号
    pub fn sectors(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .flatten()
            .map(|c| c.sector_number())
            .collect()
    }

    /// 帧号
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// 通道
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// 帧宽度
    pub fn width(&self) -> u32 {
        self.width
    }

    /// 帧高度
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Debug for FinishedChunkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishedChunkSet")
            .field("frame_number", &self.frame_number)
            .field("channel", &self.channel)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("chunks", &self.len())
            .field("missing", &self.missing_indices())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkHeader, MemoryChunk};

    fn chunk(index: u16, count: u16, frame: u32, channel: u8) -> Arc<dyn FrameChunk> {
        let header = ChunkHeader {
            chunk_index: index,
            chunk_count: count,
            frame_number: frame,
            channel,
            width: 32,
            height: 16,
        };
        Arc::new(MemoryChunk::new(header, 200 + index as u32, vec![index as u8; 4]))
    }

    #[test]
    fn test_complete_frame() {
        let config = AssemblerConfig::default();
        let mut asm = FrameAssembler::seed(chunk(0, 3, 7, 0), &config).unwrap();
        assert!(!asm.is_complete());
        assert!(asm.try_add(chunk(2, 3, 7, 0)));
        assert!(asm.try_add(chunk(1, 3, 7, 0)));
        assert!(asm.is_complete());

        let set = asm.finish().unwrap();
        assert!(set.is_complete());
        assert_eq!(set.byte_len(), 12);
        assert_eq!(set.stream().to_vec(), vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(set.sectors(), vec![200, 201, 202]);
    }

    #[test]
    fn test_rejects_other_frames() {
        let config = AssemblerConfig::default();
        let mut asm = FrameAssembler::seed(chunk(0, 2, 7, 0), &config).unwrap();
        assert!(!asm.try_add(chunk(1, 2, 8, 0)), "帧号不同应拒绝");
        assert!(!asm.try_add(chunk(1, 2, 7, 1)), "通道不同应拒绝");
        assert!(!asm.try_add(chunk(1, 3, 7, 0)), "块总数不同应拒绝");
        assert!(asm.try_add(chunk(0, 2, 7, 0)), "重复块属于同一帧");
        assert!(!asm.is_complete(), "重复块不计数");
    }

    #[test]
    fn test_gap_policy() {
        let keep = AssemblerConfig::default();
        let mut asm = FrameAssembler::seed(chunk(0, 3, 1, 0), &keep).unwrap();
        asm.try_add(chunk(2, 3, 1, 0));
        assert!(!asm.is_complete());
        let set = asm.finish().unwrap();
        assert!(set.chunk(1).is_none());
        assert_eq!(set.missing_indices(), vec![1]);
        assert_eq!(set.len(), 3);

        let discard = AssemblerConfig {
            gap_policy: GapPolicy::Discard,
        };
        let mut asm = FrameAssembler::seed(chunk(0, 3, 1, 0), &discard).unwrap();
        asm.try_add(chunk(2, 3, 1, 0));
        assert!(asm.finish().is_none());
    }

    #[test]
    fn test_seed_validation() {
        let config = AssemblerConfig::default();
        assert!(FrameAssembler::seed(chunk(0, 0, 1, 0), &config).is_err());
        assert!(FrameAssembler::seed(chunk(3, 3, 1, 0), &config).is_err());
    }
}
