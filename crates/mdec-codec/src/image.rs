//! PS1 色彩空间的 YCbCr 4:2:0 图像.
//!
//! 编码器的输入, 也是解码器 `read_ycbcr` 的输出. 平面按宏块网格对齐:
//! 亮度平面 `padded_width x padded_height`, 色度平面各为其四分之一.

use mdec_core::{MacroblockLayout, MdecError, MdecResult};

use crate::code::BlockRole;
use crate::color::rgb_to_ycbcr;

/// PS1 YCbCr 图像 (浮点平面)
#[derive(Debug, Clone, PartialEq)]
pub struct PsxYCbCrImage {
    /// 宏块布局
    layout: MacroblockLayout,
    /// 亮度, 范围 [0, 255]
    y: Vec<f64>,
    /// 蓝色差, 以 0 为中心
    cb: Vec<f64>,
    /// 红色差, 以 0 为中心
    cr: Vec<f64>,
}

impl PsxYCbCrImage {
    /// 创建中性灰图像
    pub fn new(width: u32, height: u32) -> MdecResult<Self> {
        let layout = MacroblockLayout::new(width, height)?;
        let luma_len = (layout.padded_width() * layout.padded_height()) as usize;
        Ok(Self {
            layout,
            y: vec![128.0; luma_len],
            cb: vec![0.0; luma_len / 4],
            cr: vec![0.0; luma_len / 4],
        })
    }

    /// 由 RGB24 像素转换
    ///
    /// 色度取 2x2 像素的平均值; 超出实际尺寸的对齐区域复制边缘像素.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> MdecResult<Self> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(MdecError::InvalidArgument(format!(
                "RGB 缓冲区过小: 需要 {} 字节, 实际 {}",
                expected,
                rgb.len()
            )));
        }
        let mut image = Self::new(width, height)?;
        let pw = image.layout.padded_width() as usize;
        let ph = image.layout.padded_height() as usize;
        let cw = pw / 2;

        for cy in 0..ph / 2 {
            for cx in 0..cw {
                let mut cb_sum = 0.0;
                let mut cr_sum = 0.0;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let px = cx * 2 + dx;
                    let py = cy * 2 + dy;
                    let sx = px.min(width as usize - 1);
                    let sy = py.min(height as usize - 1);
                    let off = (sy * width as usize + sx) * 3;
                    let (y, cb, cr) = rgb_to_ycbcr(
                        f64::from(rgb[off]),
                        f64::from(rgb[off + 1]),
                        f64::from(rgb[off + 2]),
                    );
                    image.y[py * pw + px] = y;
                    cb_sum += cb;
                    cr_sum += cr;
                }
                image.cb[cy * cw + cx] = cb_sum / 4.0;
                image.cr[cy * cw + cx] = cr_sum / 4.0;
            }
        }
        Ok(image)
    }

    /// 由平面数据构造, 平面尺寸须与对齐后的网格一致
    pub fn from_planes(
        width: u32,
        height: u32,
        y: Vec<f64>,
        cb: Vec<f64>,
        cr: Vec<f64>,
    ) -> MdecResult<Self> {
        let layout = MacroblockLayout::new(width, height)?;
        let luma_len = (layout.padded_width() * layout.padded_height()) as usize;
        if y.len() != luma_len || cb.len() != luma_len / 4 || cr.len() != luma_len / 4 {
            return Err(MdecError::InvalidArgument(format!(
                "平面尺寸不符: Y {} / Cb {} / Cr {}, 期望 {} / {}",
                y.len(),
                cb.len(),
                cr.len(),
                luma_len,
                luma_len / 4
            )));
        }
        Ok(Self { layout, y, cb, cr })
    }

    /// 宏块布局
    pub fn layout(&self) -> &MacroblockLayout {
        &self.layout
    }

    /// 实际宽度
    pub fn width(&self) -> u32 {
        self.layout.width()
    }

    /// 实际高度
    pub fn height(&self) -> u32 {
        self.layout.height()
    }

    /// 亮度平面
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// 蓝色差平面
    pub fn cb(&self) -> &[f64] {
        &self.cb
    }

    /// 红色差平面
    pub fn cr(&self) -> &[f64] {
        &self.cr
    }

    /// 取出一个块的 64 个采样 (行优先), 亮度减去 128
    pub fn block_samples(&self, mb_x: u32, mb_y: u32, role: BlockRole) -> [f64; 64] {
        let mut out = [0.0f64; 64];
        match role.luma_offset() {
            Some((ox, oy)) => {
                let stride = self.layout.padded_width() as usize;
                let x0 = (mb_x * 16 + ox) as usize;
                let y0 = (mb_y * 16 + oy) as usize;
                for row in 0..8 {
                    let src = (y0 + row) * stride + x0;
                    for col in 0..8 {
                        out[row * 8 + col] = self.y[src + col] - 128.0;
                    }
                }
            }
            None => {
                let plane = if role == BlockRole::Cr { &self.cr } else { &self.cb };
                let stride = (self.layout.padded_width() / 2) as usize;
                let x0 = (mb_x * 8) as usize;
                let y0 = (mb_y * 8) as usize;
                for row in 0..8 {
                    let src = (y0 + row) * stride + x0;
                    out[row * 8..row * 8 + 8].copy_from_slice(&plane[src..src + 8]);
                }
            }
        }
        out
    }
}
