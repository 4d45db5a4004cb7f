//! 定点变换解码器.

use log::trace;
use mdec_core::{MacroblockLayout, MdecError, MdecResult};

use super::{
    BlockShape, CHROMA_PER_MB, LUMA_PER_MB, MdecTransform, block_destination, dequantize_block,
    emit_rgb, emit_ycbcr,
};
use crate::code::BlockRole;
use crate::color::ycbcr_to_rgb_fixed;
use crate::dct::{idct_8x8_fixed, single_coefficient_fixed};
use crate::decoder::MdecCodeStream;
use crate::image::PsxYCbCrImage;

/// 整数 IDCT + 定点色彩转换
pub struct FixedPointDecoder {
    layout: Option<MacroblockLayout>,
    cr: Vec<i32>,
    cb: Vec<i32>,
    luma: Vec<i32>,
    /// 当前块的系数缓冲区
    block: [i32; 64],
}

impl FixedPointDecoder {
    /// 创建解码器
    pub fn new() -> Self {
        Self {
            layout: None,
            cr: Vec::new(),
            cb: Vec::new(),
            luma: Vec::new(),
            block: [0; 64],
        }
    }

    fn prepare(&mut self, layout: MacroblockLayout) {
        let mb_count = layout.macroblock_count();
        self.cr.resize(mb_count * CHROMA_PER_MB, 0);
        self.cb.resize(mb_count * CHROMA_PER_MB, 0);
        self.luma.resize(mb_count * LUMA_PER_MB, 0);
        self.layout = Some(layout);
    }

    fn decoded_layout(&self) -> MdecResult<&MacroblockLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| MdecError::InvalidArgument("尚未解码任何帧".to_string()))
    }
}

impl Default for FixedPointDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MdecTransform for FixedPointDecoder {
    fn name(&self) -> &str {
        "mdec-fixed"
    }

    fn decode(&mut self, stream: &MdecCodeStream) -> MdecResult<()> {
        self.prepare(*stream.layout());

        for (index, codes) in stream.blocks().enumerate() {
            let (role, offset) = block_destination(index);
            let shape = dequantize_block(codes, &mut self.block)?;
            let plane = match role {
                BlockRole::Cr => &mut self.cr,
                BlockRole::Cb => &mut self.cb,
                _ => &mut self.luma,
            };
            let dst = &mut plane[offset..offset + 64];
            match shape {
                BlockShape::Empty => dst.fill(0),
                BlockShape::Single(natural) => {
                    single_coefficient_fixed(natural, self.block[natural], dst)
                }
                BlockShape::General => {
                    idct_8x8_fixed(&mut self.block);
                    dst.copy_from_slice(&self.block);
                }
            }
        }
        trace!("定点解码完成: {} 个块", stream.layout().block_count());
        Ok(())
    }

    fn read_pixels(&self, rgb: &mut [u8]) -> MdecResult<()> {
        let layout = self.decoded_layout()?;
        emit_rgb(layout, &self.cr, &self.cb, &self.luma, rgb, ycbcr_to_rgb_fixed)
    }

    fn read_ycbcr(&self) -> MdecResult<PsxYCbCrImage> {
        let layout = self.decoded_layout()?;
        emit_ycbcr(layout, &self.cr, &self.cb, &self.luma, f64::from)
    }

    fn layout(&self) -> Option<&MacroblockLayout> {
        self.layout.as_ref()
    }
}
