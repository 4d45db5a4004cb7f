//! 码流压缩器: MDEC 系数码 -> 码流字节.
//!
//! 表内 (run, level) 用变长码, 其余用转义形式. 输出为 8 字节帧头 + Little16 比特流 +
//! 11 位尾码, 末尾补零到整 16 位字.
//!
//! `compress_full` / `compress_partial` 按 qscale 递增线性搜索,
//! 返回第一个不超过字节预算的结果.

use log::{debug, trace};
use mdec_core::{BitOrder, BitWriter, MacroblockLayout, MdecError, MdecResult};

use crate::code::MdecCode;
use crate::decoder::MdecCodeStream;
use crate::encoder::FrameEncoder;
use crate::tables::{EOB_BITS, ESCAPE_BITS, TRAILER_BITS, encode_vlc};
use crate::variant::{FrameHeader, HEADER_SIZE, StrVariant};

/// 一次成功压缩的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressResult {
    /// 码流字节 (含帧头)
    pub data: Vec<u8>,
    /// 使用的 qscale
    pub qscale: u8,
    /// 写入的格式变体
    pub variant: StrVariant,
}

/// 码流压缩器
#[derive(Debug, Clone)]
pub struct BitstreamCompressor {
    variant: StrVariant,
    /// `亮度能量 / qscale²` 的上限, 超过时放弃该 qscale
    energy_ceiling: Option<f64>,
}

impl BitstreamCompressor {
    /// 创建写入指定变体的压缩器
    pub fn new(variant: StrVariant) -> Self {
        Self {
            variant,
            energy_ceiling: None,
        }
    }

    /// 设置能量上限, None 表示不限制
    pub fn with_energy_ceiling(mut self, ceiling: Option<f64>) -> Self {
        self.energy_ceiling = ceiling;
        self
    }

    /// 写入的格式变体
    pub fn variant(&self) -> StrVariant {
        self.variant
    }

    /// 序列化一帧系数码
    ///
    /// 所有块头的 qscale 必须一致且在 1..=63 内; 不一致或码无法表示时返回
    /// `TooMuchEnergyToCompress`, qscale 越界时返回 `InvalidArgument`.
    pub fn compress(&self, codes: &[MdecCode], width: u32, height: u32) -> MdecResult<Vec<u8>> {
        let layout = MacroblockLayout::new(width, height)?;
        let Some(first) = codes.first() else {
            return Err(MdecError::InvalidArgument("没有系数码".to_string()));
        };
        let qscale = first.qscale();
        if !(1..=63).contains(&qscale) {
            return Err(MdecError::InvalidArgument(format!(
                "帧 qscale {} 不在 1..=63 内",
                qscale
            )));
        }

        let mut bw = BitWriter::with_capacity(BitOrder::Little16, codes.len() * 2);
        let mut blocks = 0usize;
        let mut at_block_start = true;
        let mut pos = 0u32;

        for code in codes {
            if at_block_start {
                if code.is_eob() {
                    return Err(MdecError::TooMuchEnergyToCompress(format!(
                        "第 {} 块的块头与块结束码相同",
                        blocks
                    )));
                }
                if code.qscale() != qscale {
                    return Err(MdecError::TooMuchEnergyToCompress(format!(
                        "第 {} 块 qscale {} 与帧 qscale {} 不一致",
                        blocks,
                        code.qscale(),
                        qscale
                    )));
                }
                bw.write_bits_signed(code.level(), 10);
                at_block_start = false;
                pos = 0;
            } else if code.is_eob() {
                bw.write_bits(EOB_BITS.0, EOB_BITS.1);
                blocks += 1;
                at_block_start = true;
            } else {
                pos += u32::from(code.run()) + 1;
                if pos > 63 {
                    return Err(MdecError::InvalidArgument(format!(
                        "第 {} 块游程越界: 位置 {}",
                        blocks, pos
                    )));
                }
                write_body_code(&mut bw, *code);
            }
        }

        if !at_block_start || blocks != layout.block_count() {
            return Err(MdecError::InvalidArgument(format!(
                "块数不符: 期望 {}, 实际 {}",
                layout.block_count(),
                blocks
            )));
        }

        bw.write_bits(TRAILER_BITS.0, TRAILER_BITS.1);
        let payload = bw.finish();

        let header = FrameHeader::for_codes(codes.len(), qscale, self.variant.version);
        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&payload);
        trace!(
            "{} 压缩: {} 个码 -> {} 字节, qscale={}",
            self.variant,
            codes.len(),
            out.len(),
            qscale
        );
        Ok(out)
    }

    /// 整帧替换: qscale 从 1 搜索到 63
    pub fn compress_full(
        &self,
        encoder: &FrameEncoder,
        budget: usize,
    ) -> MdecResult<CompressResult> {
        self.search(encoder, 1, budget)
    }

    /// 局部替换: qscale 从原始帧的 qscale 搜索到 63
    ///
    /// 未标记差异的宏块在原始 qscale 下逐码复用, 因此无差异时输出与原始码流一致.
    pub fn compress_partial(
        &self,
        original: &MdecCodeStream,
        encoder: &FrameEncoder,
        budget: usize,
    ) -> MdecResult<CompressResult> {
        if original.layout() != encoder.layout() {
            return Err(MdecError::InvalidArgument(
                "编码器与原始帧的布局不同".to_string(),
            ));
        }
        self.search(encoder, original.qscale().max(1), budget)
    }

    fn search(
        &self,
        encoder: &FrameEncoder,
        start_qscale: u8,
        budget: usize,
    ) -> MdecResult<CompressResult> {
        let energy = encoder.luma_energy();
        let mut smallest: Option<usize> = None;

        for qscale in start_qscale..=63u8 {
            match self.attempt(encoder, qscale, energy) {
                Ok(data) => {
                    debug!(
                        "qscale {}: {} 字节 (预算 {})",
                        qscale,
                        data.len(),
                        budget
                    );
                    if data.len() <= budget {
                        return Ok(CompressResult {
                            data,
                            qscale,
                            variant: self.variant,
                        });
                    }
                    smallest = Some(smallest.map_or(data.len(), |s| s.min(data.len())));
                }
                Err(err @ MdecError::TooMuchEnergyToCompress(_)) => {
                    debug!("qscale {} 压缩失败: {}", qscale, err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(MdecError::CompressDoesNotFit { budget, smallest })
    }

    /// 以单个 qscale 尝试压缩; 能量超过上限时返回 `TooMuchEnergyToCompress`
    fn attempt(&self, encoder: &FrameEncoder, qscale: u8, energy: f64) -> MdecResult<Vec<u8>> {
        if let Some(ceiling) = self.energy_ceiling {
            let scaled = energy / f64::from(qscale).powi(2);
            if scaled > ceiling {
                return Err(MdecError::TooMuchEnergyToCompress(format!(
                    "能量 {:.1} 超过上限 {:.1}",
                    scaled, ceiling
                )));
            }
        }
        let layout = encoder.layout();
        self.compress(&encoder.codes(qscale), layout.width(), layout.height())
    }
}

/// 写一个块体码: 表内用变长码 + 符号位, 否则用转义
fn write_body_code(bw: &mut BitWriter, code: MdecCode) {
    let level = code.level();
    if let Some((bits, len)) = encode_vlc(code.run(), level.unsigned_abs()) {
        bw.write_bits(u32::from(bits), u32::from(len));
        bw.write_bit(u32::from(level < 0));
    } else {
        bw.write_bits(ESCAPE_BITS.0, ESCAPE_BITS.1);
        bw.write_bits(u32::from(code.run()), 6);
        bw.write_bits_signed(level, 10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::BitstreamDecoder;
    use crate::image::PsxYCbCrImage;

    fn dc_codes(qscale: u8, dc: i32, blocks: usize) -> Vec<MdecCode> {
        let mut codes = Vec::new();
        for _ in 0..blocks {
            codes.push(MdecCode::header(qscale, dc));
            codes.push(MdecCode::END_OF_BLOCK);
        }
        codes
    }

    #[test]
    fn test_uniform_macroblock_bytes() {
        let codes = dc_codes(4, 100, 6);
        let data = BitstreamCompressor::new(StrVariant::V2)
            .compress(&codes, 16, 16)
            .unwrap();
        assert_eq!(
            data,
            vec![
                0x20, 0x00, 0x00, 0x38, 0x04, 0x00, 0x02, 0x00, 0x21, 0x19, 0x19, 0x92, 0x92,
                0x21, 0x21, 0x19, 0x7F, 0x92, 0x00, 0xC0,
            ]
        );
    }

    #[test]
    fn test_round_trip_preserves_codes() {
        let codes = vec![
            MdecCode::header(5, -200),
            MdecCode::body(0, 1),
            MdecCode::body(0, -40),
            MdecCode::body(3, 300),
            MdecCode::body(31, 1),
            MdecCode::body(20, -512),
            MdecCode::body(2, 0),
            MdecCode::END_OF_BLOCK,
        ];
        let mut all = codes.clone();
        all.extend(dc_codes(5, 511, 5));
        all.extend(dc_codes(5, -512, 6));

        let data = BitstreamCompressor::new(StrVariant::V2)
            .compress(&all, 16, 32)
            .unwrap();
        let stream = BitstreamDecoder::new().decode(&data, 16, 32).unwrap();
        assert_eq!(stream.codes(), all.as_slice(), "往返后系数码应一致");
        assert_eq!(stream.qscale(), 5);
    }

    #[test]
    fn test_qscale_mismatch_rejected() {
        let mut codes = dc_codes(4, 1, 6);
        codes[4] = MdecCode::header(5, 1);
        let err = BitstreamCompressor::new(StrVariant::V2)
            .compress(&codes, 16, 16)
            .unwrap_err();
        assert!(matches!(err, MdecError::TooMuchEnergyToCompress(_)));

        let err = BitstreamCompressor::new(StrVariant::V2)
            .compress(&dc_codes(4, 1, 5), 16, 16)
            .unwrap_err();
        assert!(matches!(err, MdecError::InvalidArgument(_)));
    }

    fn noisy_image(width: u32, height: u32, seed: u32) -> PsxYCbCrImage {
        let mut state = seed;
        let rgb: Vec<u8> = (0..width * height * 3)
            .map(|i| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((state >> 16) as u8 / 2).wrapping_add((i % 97) as u8)
            })
            .collect();
        PsxYCbCrImage::from_rgb(width, height, &rgb).unwrap()
    }

    #[test]
    fn test_size_non_increasing_with_qscale() {
        for seed in [1u32, 7, 42] {
            let image = noisy_image(48, 32, seed);
            let encoder = FrameEncoder::full(&image);
            let compressor = BitstreamCompressor::new(StrVariant::V2);
            let sizes: Vec<usize> = [1u8, 2, 4, 8, 16, 32, 63]
                .iter()
                .map(|&q| compressor.compress(&encoder.codes(q), 48, 32).unwrap().len())
                .collect();
            for pair in sizes.windows(2) {
                assert!(pair[1] <= pair[0], "qscale 增大后长度不应增加: {:?}", sizes);
            }
        }
    }

    #[test]
    fn test_full_search_respects_budget() {
        let image = noisy_image(32, 32, 3);
        let encoder = FrameEncoder::full(&image);
        let compressor = BitstreamCompressor::new(StrVariant::V2);
        let at_one = compressor.compress(&encoder.codes(1), 32, 32).unwrap().len();
        let at_max = compressor.compress(&encoder.codes(63), 32, 32).unwrap().len();
        assert!(at_max < at_one);

        let budget = (at_one + at_max) / 2;
        let result = compressor.compress_full(&encoder, budget).unwrap();
        assert!(result.data.len() <= budget);
        assert!(result.qscale > 1);
        let prev = compressor
            .compress(&encoder.codes(result.qscale - 1), 32, 32)
            .unwrap();
        assert!(prev.len() > budget, "应返回第一个满足预算的 qscale");

        let err = compressor.compress_full(&encoder, 8).unwrap_err();
        match err {
            MdecError::CompressDoesNotFit { budget, smallest } => {
                assert_eq!(budget, 8);
                assert!(smallest.is_some_and(|s| s <= at_max && s > 8));
            }
            other => panic!("意外的错误: {:?}", other),
        }
    }

    #[test]
    fn test_energy_ceiling_skips_low_qscales() {
        let image = noisy_image(16, 16, 9);
        let encoder = FrameEncoder::full(&image);
        let energy = encoder.luma_energy();
        // 只有 qscale >= 10 满足 energy / q² <= ceiling
        let ceiling = energy / 100.0;
        let result = BitstreamCompressor::new(StrVariant::V2)
            .with_energy_ceiling(Some(ceiling))
            .compress_full(&encoder, usize::MAX)
            .unwrap();
        assert_eq!(result.qscale, 10);
    }

    #[test]
    fn test_energy_ceiling_fails_attempt() {
        let image = noisy_image(16, 16, 9);
        let encoder = FrameEncoder::full(&image);
        let energy = encoder.luma_energy();
        let compressor =
            BitstreamCompressor::new(StrVariant::V2).with_energy_ceiling(Some(energy / 100.0));
        let err = compressor.attempt(&encoder, 9, energy).unwrap_err();
        assert!(matches!(err, MdecError::TooMuchEnergyToCompress(_)), "{:?}", err);
        assert!(compressor.attempt(&encoder, 10, energy).is_ok());

        // 任何 qscale 都超过上限
        let err = BitstreamCompressor::new(StrVariant::V2)
            .with_energy_ceiling(Some(energy / 10_000.0))
            .compress_full(&encoder, usize::MAX)
            .unwrap_err();
        assert!(
            matches!(err, MdecError::CompressDoesNotFit { smallest: None, .. }),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_qscale_out_of_range_rejected() {
        let err = BitstreamCompressor::new(StrVariant::V2)
            .compress(&dc_codes(0, 1, 6), 16, 16)
            .unwrap_err();
        assert!(matches!(err, MdecError::InvalidArgument(_)), "{:?}", err);
    }

    #[test]
    fn test_partial_without_differences_is_identical() {
        let image = noisy_image(32, 16, 5);
        let compressor = BitstreamCompressor::new(StrVariant::V2);
        let original_bytes = compressor
            .compress(&FrameEncoder::full(&image).codes(6), 32, 16)
            .unwrap();
        let original = BitstreamDecoder::new().decode(&original_bytes, 32, 16).unwrap();

        let encoder = FrameEncoder::partial(&image, &original, &[false, false]).unwrap();
        let result = compressor
            .compress_partial(&original, &encoder, original_bytes.len())
            .unwrap();
        assert_eq!(result.qscale, 6);
        assert_eq!(result.data, original_bytes, "无差异时输出应与原始码流一致");
    }
}
