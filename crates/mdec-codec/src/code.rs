//! MDEC 系数码 (16 位) 与块角色定义.
//!
//! 每个块的码序列为: 一个块头码 `(qscale: 6 位, dc: 10 位有符号)`,
//! 若干个块体码 `(零游程: 6 位, level: 10 位有符号)`, 最后一个块结束码.

use std::fmt;

/// 16 位 MDEC 系数码
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MdecCode(u16);

impl MdecCode {
    /// 块结束码 (run=63, level=-512)
    pub const END_OF_BLOCK: MdecCode = MdecCode(0xFE00);

    /// 从原始 16 位值构造
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// 原始 16 位值
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// 构造块头码, dc 截断到 10 位
    pub fn header(qscale: u8, dc: i32) -> Self {
        Self::pack(qscale as u32, dc)
    }

    /// 构造块体码, level 截断到 10 位
    pub fn body(run: u8, level: i32) -> Self {
        Self::pack(run as u32, level)
    }

    fn pack(top: u32, bottom: i32) -> Self {
        Self((((top & 0x3F) << 10) | (bottom as u32 & 0x3FF)) as u16)
    }

    /// 高 6 位: 块头码中为 qscale, 块体码中为零游程
    pub const fn top6(self) -> u8 {
        (self.0 >> 10) as u8
    }

    /// 低 10 位 (有符号): 块头码中为 dc, 块体码中为 level
    pub const fn bottom10(self) -> i32 {
        ((self.0 as i32) << 22) >> 22
    }

    /// 块头码的 qscale
    pub const fn qscale(self) -> u8 {
        self.top6()
    }

    /// 块体码的零游程
    pub const fn run(self) -> u8 {
        self.top6()
    }

    /// 块体码的 level 或块头码的 dc
    pub const fn level(self) -> i32 {
        self.bottom10()
    }

    /// 是否为块结束码
    pub const fn is_eob(self) -> bool {
        self.0 == Self::END_OF_BLOCK.0
    }
}

impl fmt::Debug for MdecCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eob() {
            write!(f, "EOB")
        } else {
            write!(f, "({}, {})", self.top6(), self.bottom10())
        }
    }
}

/// 块在宏块中的角色, 码流中按 Cr, Cb, Y1, Y2, Y3, Y4 的固定顺序出现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRole {
    /// 红色差
    Cr,
    /// 蓝色差
    Cb,
    /// 左上亮度
    Y1,
    /// 右上亮度
    Y2,
    /// 左下亮度
    Y3,
    /// 右下亮度
    Y4,
}

impl BlockRole {
    /// 码流顺序
    pub const ORDER: [BlockRole; 6] = [
        BlockRole::Cr,
        BlockRole::Cb,
        BlockRole::Y1,
        BlockRole::Y2,
        BlockRole::Y3,
        BlockRole::Y4,
    ];

    /// 宏块内的块序号 (0-5)
    pub fn from_index(index: usize) -> BlockRole {
        Self::ORDER[index % 6]
    }

    /// 是否为亮度块
    pub fn is_luma(self) -> bool {
        !matches!(self, BlockRole::Cr | BlockRole::Cb)
    }

    /// 亮度块在 16x16 区域中的偏移 (像素); 色度块返回 None
    pub fn luma_offset(self) -> Option<(u32, u32)> {
        match self {
            BlockRole::Y1 => Some((0, 0)),
            BlockRole::Y2 => Some((8, 0)),
            BlockRole::Y3 => Some((0, 8)),
            BlockRole::Y4 => Some((8, 8)),
            BlockRole::Cr | BlockRole::Cb => None,
        }
    }

    /// 亮度块序号 (Y1=0 .. Y4=3)
    pub fn luma_index(self) -> Option<usize> {
        match self {
            BlockRole::Y1 => Some(0),
            BlockRole::Y2 => Some(1),
            BlockRole::Y3 => Some(2),
            BlockRole::Y4 => Some(3),
            BlockRole::Cr | BlockRole::Cb => None,
        }
    }
}
