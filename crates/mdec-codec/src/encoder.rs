//! 宏块编码器: PS1 YCbCr 图像 -> MDEC 系数码序列.
//!
//! 每个宏块一个编码器实例, 构造时做一次双精度正向 DCT, 之后可按任意 qscale
//! 重复量化. 局部替换时未改动的宏块由 [`OriginalMacroblock`] 提供原始系数码,
//! qscale 不同时只做重量化, 不再经过正向变换.
//!
//! 输出码序与解码器读取顺序严格一致: 块头码, 各非零 AC 码 (含零游程), 块结束码.

use log::{debug, trace};
use mdec_core::{MacroblockLayout, MdecError, MdecResult};

use crate::code::{BlockRole, MdecCode};
use crate::dct::fdct_8x8_float;
use crate::decoder::MdecCodeStream;
use crate::image::PsxYCbCrImage;
use crate::tables::{PSX_QUANT, ZIGZAG};

/// 10 位有符号取值范围
const LEVEL_MIN: i32 = -512;
const LEVEL_MAX: i32 = 511;

/// 按 qscale 产出一个宏块系数码的来源
pub trait MacroblockSource: Send + Sync {
    /// 以 `qscale` 量化, 把 6 个块的码追加到 `out`
    fn write_codes(&self, qscale: u8, out: &mut Vec<MdecCode>);

    /// 亮度能量 (原始宏块为 0)
    fn luma_energy(&self) -> f64;
}

/// 单个宏块的编码器
#[derive(Debug, Clone)]
pub struct MacroblockEncoder {
    /// 6 个块的 DCT 系数 (自然序), 按码流块顺序
    coefficients: [[f64; 64]; 6],
    /// Σ(AC² × 之字形序号²), 仅亮度块
    luma_energy: f64,
}

impl MacroblockEncoder {
    /// 对图像中 `(mb_x, mb_y)` 处的宏块做正向变换
    pub fn new(image: &PsxYCbCrImage, mb_x: u32, mb_y: u32) -> Self {
        let mut coefficients = [[0.0f64; 64]; 6];
        let mut luma_energy = 0.0;
        for (role, dst) in BlockRole::ORDER.iter().zip(coefficients.iter_mut()) {
            let samples = image.block_samples(mb_x, mb_y, *role);
            fdct_8x8_float(&samples, dst);
            if role.is_luma() {
                luma_energy += (1..64)
                    .map(|zz| {
                        let c = dst[ZIGZAG[zz]];
                        c * c * (zz * zz) as f64
                    })
                    .sum::<f64>();
            }
        }
        Self {
            coefficients,
            luma_energy,
        }
    }

    /// 各块使用独立 qscale 量化, 返回 6 个块的码
    pub fn encode(&self, qscales: [u8; 6]) -> Vec<MdecCode> {
        let mut out = Vec::with_capacity(6 * 8);
        for (coefficients, &qscale) in self.coefficients.iter().zip(qscales.iter()) {
            quantize_block(coefficients, qscale, &mut out);
        }
        out
    }

    /// 亮度能量
    pub fn luma_energy(&self) -> f64 {
        self.luma_energy
    }
}

impl MacroblockSource for MacroblockEncoder {
    fn write_codes(&self, qscale: u8, out: &mut Vec<MdecCode>) {
        for coefficients in &self.coefficients {
            quantize_block(coefficients, qscale, out);
        }
    }

    fn luma_energy(&self) -> f64 {
        self.luma_energy
    }
}

/// 量化一个块, 追加 块头码 + AC 码 + 块结束码
fn quantize_block(coefficients: &[f64; 64], qscale: u8, out: &mut Vec<MdecCode>) {
    let qscale = qscale.clamp(1, 63);
    // 解码端: 系数 = dc * PSX_QUANT[0]
    let mut dc = (coefficients[0] / f64::from(PSX_QUANT[0]))
        .round()
        .clamp(LEVEL_MIN as f64, LEVEL_MAX as f64) as i32;
    if MdecCode::header(qscale, dc).is_eob() {
        dc += 1;
    }
    out.push(MdecCode::header(qscale, dc));

    let mut run = 0u8;
    for zz in 1..64 {
        // 解码端: 系数 = level * PSX_QUANT[zz] * qscale / 8
        let step = f64::from(PSX_QUANT[zz]) * f64::from(qscale) / 8.0;
        let level = (coefficients[ZIGZAG[zz]] / step)
            .round()
            .clamp(LEVEL_MIN as f64, LEVEL_MAX as f64) as i32;
        if level == 0 {
            run += 1;
        } else {
            out.push(MdecCode::body(run, level));
            run = 0;
        }
    }
    out.push(MdecCode::END_OF_BLOCK);
}

/// 把一个块 (块头 .. 块结束码) 从块头中的 qscale 重量化到 `target`
///
/// level `l` 变为 `round(l * s / t)`, 变为 0 的系数被丢弃, 其零游程并入下一个系数.
/// DC 与 qscale 无关, 原样保留 (与块结束码冲突时除外).
pub fn requantize_block(codes: &[MdecCode], target: u8, out: &mut Vec<MdecCode>) {
    let Some((header, body)) = codes.split_first() else {
        return;
    };
    let source = i32::from(header.qscale());
    let target = target.clamp(1, 63);
    let t = i32::from(target);
    let mut dc = header.level();
    if MdecCode::header(target, dc).is_eob() {
        dc += 1;
    }
    out.push(MdecCode::header(target, dc));

    let mut pending_run = 0u32;
    for code in body.iter().take_while(|c| !c.is_eob()) {
        pending_run += u32::from(code.run());
        let scaled = code.level() * source;
        let level = if scaled >= 0 {
            (2 * scaled + t) / (2 * t)
        } else {
            -((-2 * scaled + t) / (2 * t))
        };
        if level == 0 {
            pending_run += 1;
        } else {
            out.push(MdecCode::body(pending_run as u8, level.clamp(LEVEL_MIN, LEVEL_MAX)));
            pending_run = 0;
        }
    }
    out.push(MdecCode::END_OF_BLOCK);
}

/// 局部替换中未改动的宏块: 复用原始系数码
#[derive(Debug, Clone)]
pub struct OriginalMacroblock {
    codes: Vec<MdecCode>,
    qscale: u8,
}

impl OriginalMacroblock {
    /// 由原始码流中的一个宏块构造
    pub fn new(codes: &[MdecCode], qscale: u8) -> Self {
        Self {
            codes: codes.to_vec(),
            qscale,
        }
    }
}

impl MacroblockSource for OriginalMacroblock {
    fn write_codes(&self, qscale: u8, out: &mut Vec<MdecCode>) {
        if qscale == self.qscale {
            out.extend_from_slice(&self.codes);
            return;
        }
        for block in self.codes.split_inclusive(|c| c.is_eob()) {
            requantize_block(block, qscale, out);
        }
    }

    fn luma_energy(&self) -> f64 {
        0.0
    }
}

/// 整帧编码器: 按码流顺序排列的宏块来源
pub struct FrameEncoder {
    layout: MacroblockLayout,
    macroblocks: Vec<Box<dyn MacroblockSource>>,
    reencoded: usize,
}

impl FrameEncoder {
    /// 整帧编码: 所有宏块都重新变换
    pub fn full(image: &PsxYCbCrImage) -> Self {
        let layout = *image.layout();
        let macroblocks: Vec<Box<dyn MacroblockSource>> = layout
            .iter()
            .map(|(_, x, y)| Box::new(MacroblockEncoder::new(image, x, y)) as Box<dyn MacroblockSource>)
            .collect();
        let reencoded = macroblocks.len();
        debug!("整帧编码器: {}x{}, {} 个宏块", layout.width(), layout.height(), reencoded);
        Self {
            layout,
            macroblocks,
            reencoded,
        }
    }

    /// 局部编码: 只有 `differing` 中标记的宏块重新变换, 其余复用原始系数码
    pub fn partial(
        image: &PsxYCbCrImage,
        original: &MdecCodeStream,
        differing: &[bool],
    ) -> MdecResult<Self> {
        let layout = *image.layout();
        if layout != *original.layout() {
            return Err(MdecError::InvalidArgument(format!(
                "替换图像 {}x{} 与原始帧 {}x{} 尺寸不同",
                layout.width(),
                layout.height(),
                original.layout().width(),
                original.layout().height()
            )));
        }
        if differing.len() != layout.macroblock_count() {
            return Err(MdecError::InvalidArgument(format!(
                "差异标记数 {} 与宏块数 {} 不符",
                differing.len(),
                layout.macroblock_count()
            )));
        }

        let mut reencoded = 0;
        let macroblocks = layout
            .iter()
            .map(|(i, x, y)| -> Box<dyn MacroblockSource> {
                if differing[i] {
                    reencoded += 1;
                    trace!("宏块 {} ({}, {}) 重新编码", i, x, y);
                    Box::new(MacroblockEncoder::new(image, x, y))
                } else {
                    Box::new(OriginalMacroblock::new(
                        original.macroblock_codes(i),
                        original.qscale(),
                    ))
                }
            })
            .collect();
        debug!(
            "局部编码器: {} / {} 个宏块重新编码",
            reencoded,
            layout.macroblock_count()
        );
        Ok(Self {
            layout,
            macroblocks,
            reencoded,
        })
    }

    /// 宏块布局
    pub fn layout(&self) -> &MacroblockLayout {
        &self.layout
    }

    /// 重新变换的宏块数
    pub fn reencoded_count(&self) -> usize {
        self.reencoded
    }

    /// 全帧统一 qscale 的系数码
    pub fn codes(&self, qscale: u8) -> Vec<MdecCode> {
        let mut out = Vec::with_capacity(self.layout.block_count() * 8);
        for mb in &self.macroblocks {
            mb.write_codes(qscale, &mut out);
        }
        out
    }

    /// 全部重新编码宏块的亮度能量之和
    pub fn luma_energy(&self) -> f64 {
        self.macroblocks.iter().map(|mb| mb.luma_energy()).sum()
    }
}
