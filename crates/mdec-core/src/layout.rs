//! 宏块布局.
//!
//! MDEC 码流中的宏块按**列优先**顺序排列: 先遍历宏块列 x, 再遍历该列中的宏块行 y.
//! 解码器、编码器与色度上采样查找表共用这里的 `(x, y) <-> index` 映射,
//! 不在各处重复循环嵌套.

use crate::{MdecError, MdecResult};

/// 宏块边长 (像素)
pub const MACROBLOCK_SIZE: u32 = 16;

/// 帧的宏块网格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroblockLayout {
    /// 实际宽度 (像素)
    width: u32,
    /// 实际高度 (像素)
    height: u32,
    /// 宏块列数
    mb_width: u32,
    /// 宏块行数
    mb_height: u32,
}

impl MacroblockLayout {
    /// 按实际像素尺寸创建布局, 宽高向上取整到 16 的倍数
    pub fn new(width: u32, height: u32) -> MdecResult<Self> {
        if width == 0 || height == 0 {
            return Err(MdecError::InvalidArgument(format!(
                "帧尺寸不能为 0: {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            mb_width: width.div_ceil(MACROBLOCK_SIZE),
            mb_height: height.div_ceil(MACROBLOCK_SIZE),
        })
    }

    /// 实际宽度
    pub fn width(&self) -> u32 {
        self.width
    }

    /// 实际高度
    pub fn height(&self) -> u32 {
        self.height
    }

    /// 宏块列数
    pub fn mb_width(&self) -> u32 {
        self.mb_width
    }

    /// 宏块行数
    pub fn mb_height(&self) -> u32 {
        self.mb_height
    }

    /// 对齐到宏块网格后的宽度
    pub fn padded_width(&self) -> u32 {
        self.mb_width * MACROBLOCK_SIZE
    }

    /// 对齐到宏块网格后的高度
    pub fn padded_height(&self) -> u32 {
        self.mb_height * MACROBLOCK_SIZE
    }

    /// 宏块总数
    pub fn macroblock_count(&self) -> usize {
        (self.mb_width * self.mb_height) as usize
    }

    /// 块总数 (每宏块 6 块)
    pub fn block_count(&self) -> usize {
        self.macroblock_count() * 6
    }

    /// 宏块坐标 -> 码流中的序号 (列优先)
    #[inline]
    pub fn index(&self, mb_x: u32, mb_y: u32) -> usize {
        (mb_x * self.mb_height + mb_y) as usize
    }

    /// 码流中的序号 -> 宏块坐标 (列优先)
    #[inline]
    pub fn position(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        (index / self.mb_height, index % self.mb_height)
    }

    /// 码流序号对应宏块左上角的像素坐标
    #[inline]
    pub fn pixel_origin(&self, index: usize) -> (u32, u32) {
        let (x, y) = self.position(index);
        (x * MACROBLOCK_SIZE, y * MACROBLOCK_SIZE)
    }

    /// 按码流顺序遍历 `(序号, 宏块 x, 宏块 y)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32, u32)> + '_ {
        (0..self.macroblock_count()).map(move |i| {
            let (x, y) = self.position(i);
            (i, x, y)
        })
    }
}
