//! 浮点变换解码器.
//!
//! 平面保留双精度 IDCT 输出, 只在色彩转换之后取整.

use log::trace;
use mdec_core::{MacroblockLayout, MdecError, MdecResult};

use super::{
    BlockShape, CHROMA_PER_MB, LUMA_PER_MB, MdecTransform, block_destination, dequantize_block,
    emit_rgb, emit_ycbcr,
};
use crate::code::BlockRole;
use crate::color::ycbcr_to_rgb_float;
use crate::dct::{idct_8x8_float, single_coefficient_float};
use crate::decoder::MdecCodeStream;
use crate::image::PsxYCbCrImage;

/// 双精度 IDCT + 浮点色彩转换
pub struct FloatDecoder {
    layout: Option<MacroblockLayout>,
    cr: Vec<f64>,
    cb: Vec<f64>,
    luma: Vec<f64>,
    coefficients: [i32; 64],
    block: [f64; 64],
    output: [f64; 64],
}

impl FloatDecoder {
    /// 创建解码器
    pub fn new() -> Self {
        Self {
            layout: None,
            cr: Vec::new(),
            cb: Vec::new(),
            luma: Vec::new(),
            coefficients: [0; 64],
            block: [0.0; 64],
            output: [0.0; 64],
        }
    }

    fn decoded_layout(&self) -> MdecResult<&MacroblockLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| MdecError::InvalidArgument("尚未解码任何帧".to_string()))
    }
}

impl Default for FloatDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MdecTransform for FloatDecoder {
    fn name(&self) -> &str {
        "mdec-float"
    }

    fn decode(&mut self, stream: &MdecCodeStream) -> MdecResult<()> {
        let layout = *stream.layout();
        let mb_count = layout.macroblock_count();
        self.cr.resize(mb_count * CHROMA_PER_MB, 0.0);
        self.cb.resize(mb_count * CHROMA_PER_MB, 0.0);
        self.luma.resize(mb_count * LUMA_PER_MB, 0.0);
        self.layout = Some(layout);

        for (index, codes) in stream.blocks().enumerate() {
            let (role, offset) = block_destination(index);
            let shape = dequantize_block(codes, &mut self.coefficients)?;
            let plane = match role {
                BlockRole::Cr => &mut self.cr,
                BlockRole::Cb => &mut self.cb,
                _ => &mut self.luma,
            };
            let dst = &mut plane[offset..offset + 64];
            match shape {
                BlockShape::Empty => dst.fill(0.0),
                BlockShape::Single(natural) => {
                    single_coefficient_float(natural, f64::from(self.coefficients[natural]), dst)
                }
                BlockShape::General => {
                    for (f, &c) in self.block.iter_mut().zip(self.coefficients.iter()) {
                        *f = f64::from(c);
                    }
                    idct_8x8_float(&self.block, &mut self.output);
                    dst.copy_from_slice(&self.output);
                }
            }
        }
        trace!("浮点解码完成: {} 个块", layout.block_count());
        Ok(())
    }

    fn read_pixels(&self, rgb: &mut [u8]) -> MdecResult<()> {
        let layout = self.decoded_layout()?;
        emit_rgb(layout, &self.cr, &self.cb, &self.luma, rgb, ycbcr_to_rgb_float)
    }

    fn read_ycbcr(&self) -> MdecResult<PsxYCbCrImage> {
        let layout = self.decoded_layout()?;
        emit_ycbcr(layout, &self.cr, &self.cb, &self.luma, |v| v)
    }

    fn layout(&self) -> Option<&MacroblockLayout> {
        self.layout.as_ref()
    }
}
