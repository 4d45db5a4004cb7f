//! 变换解码: 系数码 -> 像素.
//!
//! 每个块反量化、反 zigzag 后做 8x8 IDCT, 写入 Cr / Cb / 亮度三个平面缓冲区.
//! 平面按宏块序号组织, 每个宏块占 64 个 Cr、64 个 Cb 与 256 个亮度采样
//! (Y1, Y2, Y3, Y4 四个 8x8 行优先块依次排列). 输出像素时通过
//! [`CHROMA_LUMA_OFFSET`] 把每个色度采样映射到它覆盖的 2x2 亮度单元.
//!
//! 定点实现 [`FixedPointDecoder`] 与浮点实现 [`FloatDecoder`] 共用 [`MdecTransform`] 接口,
//! 在非对抗输入上每通道最多相差 1.

mod fixed;
mod float;

pub use fixed::FixedPointDecoder;
pub use float::FloatDecoder;

use mdec_core::{MacroblockLayout, MdecError, MdecResult};

use crate::code::{BlockRole, MdecCode};
use crate::decoder::MdecCodeStream;
use crate::image::PsxYCbCrImage;
use crate::tables::{PSX_QUANT, ZIGZAG};

/// 每个宏块的色度采样数
pub(crate) const CHROMA_PER_MB: usize = 64;
/// 每个宏块的亮度采样数
pub(crate) const LUMA_PER_MB: usize = 256;

/// 变换解码器接口
///
/// 实例持有可复用的平面缓冲区, 不可跨线程共享同一实例.
pub trait MdecTransform: Send {
    /// 实现名称
    fn name(&self) -> &str;

    /// 解码一帧系数码到内部平面
    fn decode(&mut self, stream: &MdecCodeStream) -> MdecResult<()>;

    /// 输出 RGB24 像素 (按实际宽高裁剪, 行优先)
    fn read_pixels(&self, rgb: &mut [u8]) -> MdecResult<()>;

    /// 输出 PS1 YCbCr 平面
    fn read_ycbcr(&self) -> MdecResult<PsxYCbCrImage>;

    /// 最近一次解码的布局
    fn layout(&self) -> Option<&MacroblockLayout>;
}

/// 变换实现选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum DecoderKind {
    /// 整数 IDCT + 定点色彩转换
    #[default]
    Fixed,
    /// 双精度 IDCT + 浮点色彩转换
    Float,
}

impl DecoderKind {
    /// 创建对应的解码器实例
    pub fn create(self) -> Box<dyn MdecTransform> {
        match self {
            DecoderKind::Fixed => Box::new(FixedPointDecoder::new()),
            DecoderKind::Float => Box::new(FloatDecoder::new()),
        }
    }
}

/// 色度采样 -> 亮度存储中 2x2 单元左上角的偏移
///
/// 16x16 亮度区域被切分为 64 个 2x2 单元. 色度采样 `c` (列 `c % 8`, 行 `c / 8`)
/// 落在亮度块 `(行 / 4) * 2 + (列 / 4)` 中, 单元内四个亮度采样位于
/// `base`, `base + 1`, `base + 8`, `base + 9`.
pub const CHROMA_LUMA_OFFSET: [usize; 64] = build_chroma_luma_offset();

const fn build_chroma_luma_offset() -> [usize; 64] {
    let mut table = [0usize; 64];
    let mut c = 0;
    while c < 64 {
        let cx = c % 8;
        let cy = c / 8;
        let block = (cy / 4) * 2 + (cx / 4);
        table[c] = block * 64 + (cy % 4) * 2 * 8 + (cx % 4) * 2;
        c += 1;
    }
    table
}

/// 反量化后的块摘要, 用于选择快速路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockShape {
    /// 全零
    Empty,
    /// 只有一个非零系数 (自然序下标)
    Single(usize),
    /// 需要完整 IDCT
    General,
}

/// 把 `a / 8` 四舍五入 (远离零)
#[inline]
fn div_round8(v: i32) -> i32 {
    if v >= 0 { (v + 4) >> 3 } else { -((-v + 4) >> 3) }
}

/// 反量化一个块 (块头 .. 块结束码) 到自然序系数
///
/// DC 直接乘以 `PSX_QUANT[0]`; AC 为 `round(level * PSX_QUANT[zz] * qscale / 8)`.
pub(crate) fn dequantize_block(codes: &[MdecCode], out: &mut [i32; 64]) -> MdecResult<BlockShape> {
    out.fill(0);
    let Some((header, body)) = codes.split_first() else {
        return Err(MdecError::ReadCorruption("空块".to_string()));
    };
    let qscale = i32::from(header.qscale());

    let mut nonzero = 0usize;
    let mut last = 0usize;
    let dc = header.level() * i32::from(PSX_QUANT[0]);
    if dc != 0 {
        out[0] = dc;
        nonzero = 1;
    }

    let mut pos = 0usize;
    for code in body.iter().take_while(|c| !c.is_eob()) {
        pos += code.run() as usize + 1;
        if pos > 63 {
            return Err(MdecError::ReadCorruption(format!(
                "游程越界: 位置 {}",
                pos
            )));
        }
        let value = div_round8(code.level() * i32::from(PSX_QUANT[pos]) * qscale);
        if value != 0 {
            let natural = ZIGZAG[pos];
            out[natural] = value;
            nonzero += 1;
            last = natural;
        }
    }

    Ok(match nonzero {
        0 => BlockShape::Empty,
        1 if dc != 0 => BlockShape::Single(0),
        1 => BlockShape::Single(last),
        _ => BlockShape::General,
    })
}

/// 块在平面中的写入位置
#[inline]
pub(crate) fn block_destination(block_index: usize) -> (BlockRole, usize) {
    let mb = block_index / 6;
    let role = BlockRole::from_index(block_index);
    let offset = match role.luma_index() {
        Some(i) => mb * LUMA_PER_MB + i * 64,
        None => mb * CHROMA_PER_MB,
    };
    (role, offset)
}

/// 按宏块遍历全部 2x2 单元, 回调参数为 `(Cr, Cb, 四个亮度, 四个像素坐标)`
///
/// 像素坐标已映射到对齐网格, 由调用方负责裁剪.
pub(crate) fn for_each_cell<T: Copy>(
    layout: &MacroblockLayout,
    cr: &[T],
    cb: &[T],
    luma: &[T],
    mut f: impl FnMut(T, T, [T; 4], [(u32, u32); 4]),
) {
    for (mb, _, _) in layout.iter() {
        let (ox, oy) = layout.pixel_origin(mb);
        let chroma = mb * CHROMA_PER_MB;
        let luma_mb = mb * LUMA_PER_MB;
        for (c, &cell) in CHROMA_LUMA_OFFSET.iter().enumerate() {
            let base = luma_mb + cell;
            let px = ox + (c % 8) as u32 * 2;
            let py = oy + (c / 8) as u32 * 2;
            f(
                cr[chroma + c],
                cb[chroma + c],
                [luma[base], luma[base + 1], luma[base + 8], luma[base + 9]],
                [(px, py), (px + 1, py), (px, py + 1), (px + 1, py + 1)],
            );
        }
    }
}

/// 把平面转换为 RGB24, `convert(luma, cb, cr)`
pub(crate) fn emit_rgb<T: Copy>(
    layout: &MacroblockLayout,
    cr: &[T],
    cb: &[T],
    luma: &[T],
    rgb: &mut [u8],
    convert: impl Fn(T, T, T) -> [u8; 3],
) -> MdecResult<()> {
    let width = layout.width();
    let height = layout.height();
    let needed = width as usize * height as usize * 3;
    if rgb.len() < needed {
        return Err(MdecError::InvalidArgument(format!(
            "RGB 缓冲区过小: 需要 {} 字节, 实际 {}",
            needed,
            rgb.len()
        )));
    }
    for_each_cell(layout, cr, cb, luma, |cr, cb, ys, pixels| {
        for (y, (px, py)) in ys.into_iter().zip(pixels) {
            if px < width && py < height {
                let off = (py as usize * width as usize + px as usize) * 3;
                rgb[off..off + 3].copy_from_slice(&convert(y, cb, cr));
            }
        }
    });
    Ok(())
}

/// 把平面转换为 [`PsxYCbCrImage`], `to_f64` 把平面采样转为浮点
pub(crate) fn emit_ycbcr<T: Copy>(
    layout: &MacroblockLayout,
    cr: &[T],
    cb: &[T],
    luma: &[T],
    to_f64: impl Fn(T) -> f64,
) -> MdecResult<PsxYCbCrImage> {
    let pw = layout.padded_width() as usize;
    let cw = pw / 2;
    let luma_len = pw * layout.padded_height() as usize;
    let mut y_plane = vec![0.0f64; luma_len];
    let mut cb_plane = vec![0.0f64; luma_len / 4];
    let mut cr_plane = vec![0.0f64; luma_len / 4];

    for_each_cell(layout, cr, cb, luma, |cr, cb, ys, pixels| {
        for (y, (px, py)) in ys.into_iter().zip(pixels) {
            y_plane[py as usize * pw + px as usize] = to_f64(y) + 128.0;
        }
        let (px, py) = pixels[0];
        let chroma = (py as usize / 2) * cw + px as usize / 2;
        cb_plane[chroma] = to_f64(cb);
        cr_plane[chroma] = to_f64(cr);
    });

    PsxYCbCrImage::from_planes(layout.width(), layout.height(), y_plane, cb_plane, cr_plane)
}
