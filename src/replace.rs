//! 帧替换.
//!
//! 流程: 解码原始帧 -> 与替换图像逐像素比较 -> 重新编码 (整帧或差异宏块)
//! -> 按 qscale 搜索满足原始字节预算的码流 -> 重新探测并解码确认格式变体
//! -> 交给扇区写回接口.
//!
//! 批量替换时各帧在 rayon 线程池中并行编码 (每个任务自带解码器与编码器实例),
//! 写回按输入顺序串行进行. 每帧独立返回结果, 单帧失败不影响其余帧.

use mdec_codec::{
    BitstreamCompressor, BitstreamDecoder, CompressResult, DEFAULT_PROBE_ORDER, DecodeIssues,
    FrameEncoder, MdecCodeStream, PsxYCbCrImage, StrVariant, probe,
};
use mdec_core::{MacroblockLayout, MdecError, MdecResult};
use mdec_sector::FinishedChunkSet;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{ReplaceConfig, ReplaceMode};

/// 像素矩形 (左上角 + 尺寸)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// 左上角 x
    pub x: u32,
    /// 左上角 y
    pub y: u32,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
}

impl PixelRect {
    /// 创建矩形
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 是否包含像素
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && py >= self.y && px - self.x < self.width && py - self.y < self.height
    }
}

/// 像素位图掩码, 置位的像素参与比较
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl PixelMask {
    /// 由行优先的位图构造
    pub fn new(width: u32, height: u32, bits: Vec<bool>) -> MdecResult<Self> {
        if bits.len() != width as usize * height as usize {
            return Err(MdecError::InvalidArgument(format!(
                "掩码尺寸 {}x{} 与位数 {} 不符",
                width,
                height,
                bits.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// 由函数生成
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let bits = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            bits,
        }
    }

    /// 像素是否置位 (超出掩码范围视为未置位)
    pub fn is_set(&self, px: u32, py: u32) -> bool {
        px < self.width && py < self.height && self.bits[(py * self.width + px) as usize]
    }
}

/// 差异判定选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// 每通道容差, 差值大于该值才算差异
    pub tolerance: u8,
    /// 只比较该矩形内的像素
    pub rect: Option<PixelRect>,
    /// 只比较掩码置位的像素
    pub mask: Option<PixelMask>,
}

/// 按宏块标记原始与替换图像之间的差异
///
/// 返回按码流 (列优先) 序号索引的标记; 没有任何合格差异像素的宏块为 false.
pub fn differing_macroblocks(
    original_rgb: &[u8],
    replacement_rgb: &[u8],
    layout: &MacroblockLayout,
    options: &DiffOptions,
) -> MdecResult<Vec<bool>> {
    let width = layout.width();
    let height = layout.height();
    let needed = width as usize * height as usize * 3;
    if original_rgb.len() < needed || replacement_rgb.len() < needed {
        return Err(MdecError::InvalidArgument(format!(
            "RGB 缓冲区过小: 需要 {} 字节, 原始 {}, 替换 {}",
            needed,
            original_rgb.len(),
            replacement_rgb.len()
        )));
    }

    let mut differing = vec![false; layout.macroblock_count()];
    for py in 0..height {
        for px in 0..width {
            let index = layout.index(px / 16, py / 16);
            if differing[index] {
                continue;
            }
            if options.rect.is_some_and(|r| !r.contains(px, py)) {
                continue;
            }
            if options.mask.as_ref().is_some_and(|m| !m.is_set(px, py)) {
                continue;
            }
            let off = (py as usize * width as usize + px as usize) * 3;
            let differs = original_rgb[off..off + 3]
                .iter()
                .zip(&replacement_rgb[off..off + 3])
                .any(|(&a, &b)| a.abs_diff(b) > options.tolerance);
            if differs {
                differing[index] = true;
            }
        }
    }
    Ok(differing)
}

/// 扇区写回接口
pub trait PatchSink {
    /// 用 `data` 替换 `frame` 的码流字节 (`data.len()` 不超过原始字节数)
    fn patch(&mut self, frame: &FinishedChunkSet, data: &[u8]) -> MdecResult<()>;
}

/// 一个扇区的写回内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorPatch {
    /// 扇区号
    pub sector: u32,
    /// 该扇区中帧数据区的新内容 (与原始块等长, 不足部分补零)
    pub data: Vec<u8>,
}

/// 把码流字节按原始块长度切分到各扇区
pub fn split_for_sectors(frame: &FinishedChunkSet, data: &[u8]) -> MdecResult<Vec<SectorPatch>> {
    if data.len() > frame.byte_len() {
        return Err(MdecError::Sink(format!(
            "帧 {} 的替换数据 {} 字节超过原始 {} 字节",
            frame.frame_number(),
            data.len(),
            frame.byte_len()
        )));
    }
    let mut patches = Vec::with_capacity(frame.len());
    let mut offset = 0usize;
    for index in 0..frame.len() {
        let Some(chunk) = frame.chunk(index) else {
            return Err(MdecError::Sink(format!(
                "帧 {} 缺少第 {} 块, 无法写回",
                frame.frame_number(),
                index
            )));
        };
        let mut piece = vec![0u8; chunk.len()];
        let end = (offset + chunk.len()).min(data.len());
        if offset < end {
            piece[..end - offset].copy_from_slice(&data[offset..end]);
        }
        offset += chunk.len();
        patches.push(SectorPatch {
            sector: chunk.sector_number(),
            data: piece,
        });
    }
    Ok(patches)
}

/// 收集写回内容的内存实现
#[derive(Debug, Default)]
pub struct MemoryPatchSink {
    patches: Vec<(u32, Vec<SectorPatch>)>,
}

impl MemoryPatchSink {
    /// 创建空的写回收集器
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写回的 `(帧号, 扇区内容)` 列表, 按写回顺序
    pub fn patches(&self) -> &[(u32, Vec<SectorPatch>)] {
        &self.patches
    }

    /// 某帧写回后的完整字节 (各扇区内容拼接)
    pub fn frame_bytes(&self, frame_number: u32) -> Option<Vec<u8>> {
        self.patches
            .iter()
            .rev()
            .find(|(n, _)| *n == frame_number)
            .map(|(_, sectors)| sectors.iter().flat_map(|s| s.data.iter().copied()).collect())
    }
}

impl PatchSink for MemoryPatchSink {
    fn patch(&mut self, frame: &FinishedChunkSet, data: &[u8]) -> MdecResult<()> {
        let sectors = split_for_sectors(frame, data)?;
        self.patches.push((frame.frame_number(), sectors));
        Ok(())
    }
}

/// 一帧替换任务
#[derive(Debug, Clone)]
pub struct ReplaceJob {
    /// 原始帧
    pub frame: FinishedChunkSet,
    /// 替换图像, RGB24 行优先, 尺寸与帧相同
    pub rgb: Vec<u8>,
    /// 只比较该矩形内的像素
    pub rect: Option<PixelRect>,
    /// 只比较掩码置位的像素
    pub mask: Option<PixelMask>,
}

impl ReplaceJob {
    /// 创建任务
    pub fn new(frame: FinishedChunkSet, rgb: Vec<u8>) -> Self {
        Self {
            frame,
            rgb,
            rect: None,
            mask: None,
        }
    }

    /// 限定比较区域
    pub fn with_rect(mut self, rect: PixelRect) -> Self {
        self.rect = Some(rect);
        self
    }

    /// 限定比较掩码
    pub fn with_mask(mut self, mask: PixelMask) -> Self {
        self.mask = Some(mask);
        self
    }
}

/// 一帧替换的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// 帧号
    pub frame_number: u32,
    /// 使用的 qscale
    pub qscale: u8,
    /// 格式变体
    pub variant: StrVariant,
    /// 原始帧字节预算
    pub budget: usize,
    /// 新码流字节数
    pub data_len: usize,
    /// 重新编码的宏块数
    pub reencoded_macroblocks: usize,
}

/// 已编码、尚未写回的替换
#[derive(Debug, Clone)]
pub struct PreparedReplacement {
    /// 结果摘要
    pub outcome: ReplaceOutcome,
    /// 新码流
    pub data: Vec<u8>,
}

/// 帧替换器
pub struct FrameReplacer {
    config: ReplaceConfig,
    variants: Vec<StrVariant>,
}

impl FrameReplacer {
    /// 使用默认探测顺序创建
    pub fn new(config: ReplaceConfig) -> Self {
        Self::with_variants(config, DEFAULT_PROBE_ORDER)
    }

    /// 使用指定探测顺序创建
    pub fn with_variants(config: ReplaceConfig, variants: &[StrVariant]) -> Self {
        Self {
            config,
            variants: variants.to_vec(),
        }
    }

    /// 配置
    pub fn config(&self) -> &ReplaceConfig {
        &self.config
    }

    /// 编码一帧替换数据, 不写回
    pub fn prepare(&self, job: &ReplaceJob) -> MdecResult<PreparedReplacement> {
        let frame = &job.frame;
        if !frame.is_complete() {
            return Err(MdecError::InvalidArgument(format!(
                "帧 {} 缺少块 {:?}, 无法替换",
                frame.frame_number(),
                frame.missing_indices()
            )));
        }
        let (width, height) = (frame.width(), frame.height());
        let budget = frame.byte_len();
        let bytes = frame.stream().to_vec();

        let original = BitstreamDecoder::with_variants(&self.variants).decode(&bytes, width, height)?;
        if original
            .issues()
            .intersects(DecodeIssues::CORRUPTION | DecodeIssues::END_OF_STREAM)
        {
            warn!(
                "帧 {} 原始码流已损坏 ({:?}), 从宏块 {:?} 起按零系数处理",
                frame.frame_number(),
                original.issues(),
                original.first_damaged_macroblock()
            );
        }

        let image = PsxYCbCrImage::from_rgb(width, height, &job.rgb)?;
        let compressor = BitstreamCompressor::new(original.variant())
            .with_energy_ceiling(self.config.energy_ceiling);

        let (encoder, result) = match self.config.mode {
            ReplaceMode::Full => {
                let encoder = FrameEncoder::full(&image);
                let result = compressor.compress_full(&encoder, budget)?;
                (encoder, result)
            }
            ReplaceMode::Partial => {
                let differing = self.differing(&original, job)?;
                let encoder = FrameEncoder::partial(&image, &original, &differing)?;
                let result = compressor.compress_partial(&original, &encoder, budget)?;
                (encoder, result)
            }
        };

        if self.config.verify_round_trip {
            self.verify(&original, &encoder, &result)?;
        }

        let outcome = ReplaceOutcome {
            frame_number: frame.frame_number(),
            qscale: result.qscale,
            variant: result.variant,
            budget,
            data_len: result.data.len(),
            reencoded_macroblocks: encoder.reencoded_count(),
        };
        debug!(
            "帧 {} 编码完成: qscale={}, {} / {} 字节, 重新编码 {} 个宏块",
            outcome.frame_number,
            outcome.qscale,
            outcome.data_len,
            outcome.budget,
            outcome.reencoded_macroblocks
        );
        Ok(PreparedReplacement {
            outcome,
            data: result.data,
        })
    }

    /// 替换一帧并写回
    pub fn replace(&self, job: &ReplaceJob, sink: &mut dyn PatchSink) -> MdecResult<ReplaceOutcome> {
        let prepared = self.prepare(job)?;
        sink.patch(&job.frame, &prepared.data)?;
        info!(
            "帧 {} 已替换: qscale={}, {} 字节",
            prepared.outcome.frame_number, prepared.outcome.qscale, prepared.outcome.data_len
        );
        Ok(prepared.outcome)
    }

    /// 批量替换: 并行编码, 按输入顺序串行写回
    pub fn replace_batch(
        &self,
        jobs: &[ReplaceJob],
        sink: &mut dyn PatchSink,
    ) -> Vec<MdecResult<ReplaceOutcome>> {
        let prepared: Vec<MdecResult<PreparedReplacement>> =
            jobs.par_iter().map(|job| self.prepare(job)).collect();

        let results: Vec<MdecResult<ReplaceOutcome>> = jobs
            .iter()
            .zip(prepared)
            .map(|(job, prepared)| {
                let prepared = prepared?;
                sink.patch(&job.frame, &prepared.data)?;
                Ok(prepared.outcome)
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        for (job, result) in jobs.iter().zip(&results) {
            if let Err(err) = result {
                warn!("帧 {} 替换失败: {}", job.frame.frame_number(), err);
            }
        }
        info!("批量替换完成: {} 帧, 失败 {} 帧", jobs.len(), failed);
        results
    }

    /// 解码原始帧并与替换图像比较
    fn differing(&self, original: &MdecCodeStream, job: &ReplaceJob) -> MdecResult<Vec<bool>> {
        let layout = original.layout();
        let mut transform = self.config.decoder.create();
        transform.decode(original)?;
        let mut original_rgb = vec![0u8; layout.width() as usize * layout.height() as usize * 3];
        transform.read_pixels(&mut original_rgb)?;

        let options = DiffOptions {
            tolerance: self.config.tolerance,
            rect: job.rect,
            mask: job.mask.clone(),
        };
        differing_macroblocks(&original_rgb, &job.rgb, layout, &options)
    }

    /// 重新探测并完整解码压缩结果
    fn verify(
        &self,
        original: &MdecCodeStream,
        encoder: &FrameEncoder,
        result: &CompressResult,
    ) -> MdecResult<()> {
        let layout = original.layout();
        let decoded = verify_variant(
            &result.data,
            original.variant(),
            &self.variants,
            layout.width(),
            layout.height(),
        )?;
        if decoded.codes() != encoder.codes(result.qscale).as_slice() {
            return Err(MdecError::ReadCorruption(
                "压缩结果重新解码后的系数码与编码器输出不一致".to_string(),
            ));
        }
        Ok(())
    }
}

/// 确认码流探测出的格式变体为 `expected`, 并完整解码
pub fn verify_variant(
    data: &[u8],
    expected: StrVariant,
    variants: &[StrVariant],
    width: u32,
    height: u32,
) -> MdecResult<MdecCodeStream> {
    let (actual, _) = probe(data, variants)?;
    if actual != expected {
        return Err(MdecError::VariantMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    let decoded = BitstreamDecoder::with_variants(variants).decode(data, width, height)?;
    if decoded
        .issues()
        .intersects(DecodeIssues::CORRUPTION | DecodeIssues::END_OF_STREAM)
    {
        return Err(MdecError::ReadCorruption(format!(
            "压缩结果重新解码时出现问题: {:?}",
            decoded.issues()
        )));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_and_mask() {
        let rect = PixelRect::new(4, 4, 8, 2);
        assert!(rect.contains(4, 4));
        assert!(rect.contains(11, 5));
        assert!(!rect.contains(12, 5));
        assert!(!rect.contains(3, 4));

        let mask = PixelMask::from_fn(4, 2, |x, y| x == y);
        assert!(mask.is_set(1, 1));
        assert!(!mask.is_set(2, 1));
        assert!(!mask.is_set(9, 9));
        assert!(PixelMask::new(2, 2, vec![true; 3]).is_err());
    }

    #[test]
    fn test_differing_macroblocks_column_major() {
        // 32x32: 宏块 (1, 0) 的序号为 1 * 2 + 0 = 2
        let layout = MacroblockLayout::new(32, 32).unwrap();
        let original = vec![100u8; 32 * 32 * 3];
        let mut replacement = original.clone();
        let off = (3 * 32 + 20) * 3;
        replacement[off] = 105;

        let flags =
            differing_macroblocks(&original, &replacement, &layout, &DiffOptions::default())
                .unwrap();
        assert_eq!(flags, vec![false, false, true, false]);

        let tolerant = DiffOptions {
            tolerance: 5,
            ..Default::default()
        };
        let flags = differing_macroblocks(&original, &replacement, &layout, &tolerant).unwrap();
        assert!(flags.iter().all(|&f| !f), "容差内的差异应忽略");

        let outside = DiffOptions {
            rect: Some(PixelRect::new(0, 0, 16, 32)),
            ..Default::default()
        };
        let flags = differing_macroblocks(&original, &replacement, &layout, &outside).unwrap();
        assert!(flags.iter().all(|&f| !f), "矩形外的差异应忽略");

        let masked = DiffOptions {
            mask: Some(PixelMask::from_fn(32, 32, |x, _| x >= 16)),
            ..Default::default()
        };
        let flags = differing_macroblocks(&original, &replacement, &layout, &masked).unwrap();
        assert_eq!(flags, vec![false, false, true, false]);

        assert!(differing_macroblocks(&original[..10], &replacement, &layout, &masked).is_err());
    }
}
