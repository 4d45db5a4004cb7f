//! 通道分发: 每个活动通道一个帧组装器, 按通道路由扇区块.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use mdec_core::MdecResult;

use crate::assembler::{AssemblerConfig, FinishedChunkSet, FrameAssembler};
use crate::chunk::FrameChunk;

/// 多通道帧分发器
pub struct ChannelDispatcher {
    config: AssemblerConfig,
    active: BTreeMap<u8, FrameAssembler>,
}

impl ChannelDispatcher {
    /// 创建分发器
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            active: BTreeMap::new(),
        }
    }

    /// 活动通道数
    pub fn active_channels(&self) -> usize {
        self.active.len()
    }

    /// 送入一个块, 返回因此结束的帧 (帧边界或收齐)
    ///
    /// 块头无效的块只记录警告并跳过, 不影响已结束的帧.
    pub fn feed(&mut self, chunk: Arc<dyn FrameChunk>) -> MdecResult<Vec<FinishedChunkSet>> {
        let channel = chunk.channel();
        let mut finished = Vec::new();
        trace!(
            "扇区 {} -> 通道 {} 帧 {} 块 {}/{}",
            chunk.sector_number(),
            channel,
            chunk.frame_number(),
            chunk.chunk_index(),
            chunk.chunk_count()
        );

        let pending = match self.active.get_mut(&channel) {
            Some(assembler) => {
                if assembler.try_add(Arc::clone(&chunk)) {
                    None
                } else {
                    debug!("通道 {} 遇到帧边界 (帧 {})", channel, chunk.frame_number());
                    if let Some(old) = self.active.remove(&channel) {
                        finished.extend(old.finish());
                    }
                    Some(chunk)
                }
            }
            None => Some(chunk),
        };

        if let Some(first) = pending {
            let sector = first.sector_number();
            match FrameAssembler::seed(first, &self.config) {
                Ok(assembler) => {
                    self.active.insert(channel, assembler);
                }
                Err(err) => warn!("通道 {} 跳过扇区 {}: {}", channel, sector, err),
            }
        }

        if self.active.get(&channel).is_some_and(FrameAssembler::is_complete) {
            if let Some(done) = self.active.remove(&channel) {
                finished.extend(done.finish());
            }
        }
        Ok(finished)
    }

    /// 输入结束: 结束全部进行中的帧 (按通道号顺序)
    pub fn flush(&mut self) -> Vec<FinishedChunkSet> {
        std::mem::take(&mut self.active)
            .into_values()
            .filter_map(FrameAssembler::finish)
            .collect()
    }
}
