//! 码表与常量: 之字形扫描序、PS1 量化矩阵、AC 变长码表.
//!
//! 解码与编码两条路径共用同一份常量.

use std::sync::OnceLock;

/// 之字形序号 -> 自然 (行优先) 序号
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// PS1 默认量化矩阵 (自然序)
const PSX_QUANT_NATURAL: [u16; 64] = [
    2, 16, 19, 22, 26, 27, 29, 34, //
    16, 16, 22, 24, 27, 29, 34, 37, //
    19, 22, 26, 27, 29, 34, 34, 38, //
    22, 22, 26, 27, 29, 34, 37, 40, //
    22, 26, 27, 29, 32, 35, 40, 48, //
    26, 27, 29, 32, 35, 40, 48, 58, //
    26, 27, 29, 34, 38, 46, 56, 69, //
    27, 29, 35, 38, 46, 56, 69, 83, //
];

const fn build_quant_zigzag() -> [u16; 64] {
    let mut out = [0u16; 64];
    let mut i = 0;
    while i < 64 {
        out[i] = PSX_QUANT_NATURAL[ZIGZAG[i]];
        i += 1;
    }
    out
}

/// PS1 默认量化矩阵 (之字形序)
pub const PSX_QUANT: [u16; 64] = build_quant_zigzag();

/// 块结束码: `10`
pub const EOB_BITS: (u32, u32) = (0b10, 2);

/// 转义前缀: `000001`, 其后为 6 位游程 + 10 位 level
pub const ESCAPE_BITS: (u32, u32) = (0b000001, 6);

/// 码流末尾的固定 11 位尾码
pub const TRAILER_BITS: (u32, u32) = (0b01111111110, 11);

/// AC 系数变长码表 (不含符号位)
/// 格式: (码长, 码字, run, |level|)
pub const AC_VLC: &[(u8, u16, u8, u16)] = &[
    (2, 0b11, 0, 1),
    (3, 0b011, 1, 1),
    (4, 0b0100, 0, 2),
    (4, 0b0101, 2, 1),
    (5, 0b00101, 0, 3),
    (5, 0b00111, 3, 1),
    (5, 0b00110, 4, 1),
    (6, 0b000110, 1, 2),
    (6, 0b000111, 5, 1),
    (6, 0b000101, 6, 1),
    (6, 0b000100, 7, 1),
    (7, 0b0000110, 0, 4),
    (7, 0b0000100, 2, 2),
    (7, 0b0000111, 8, 1),
    (7, 0b0000101, 9, 1),
    (8, 0b00100110, 0, 5),
    (8, 0b00100001, 0, 6),
    (8, 0b00100101, 1, 3),
    (8, 0b00100100, 3, 2),
    (8, 0b00100111, 10, 1),
    (8, 0b00100011, 11, 1),
    (8, 0b00100010, 12, 1),
    (8, 0b00100000, 13, 1),
    (10, 0b0000001010, 0, 7),
    (10, 0b0000001100, 1, 4),
    (10, 0b0000001011, 2, 3),
    (10, 0b0000001111, 4, 2),
    (10, 0b0000001001, 5, 2),
    (10, 0b0000001110, 14, 1),
    (10, 0b0000001101, 15, 1),
    (10, 0b0000001000, 16, 1),
    (12, 0b000000011101, 0, 8),
    (12, 0b000000011000, 0, 9),
    (12, 0b000000010011, 0, 10),
    (12, 0b000000010000, 0, 11),
    (12, 0b000000011011, 1, 5),
    (12, 0b000000010100, 2, 4),
    (12, 0b000000011100, 3, 3),
    (12, 0b000000010010, 4, 3),
    (12, 0b000000011110, 6, 2),
    (12, 0b000000010101, 7, 2),
    (12, 0b000000010001, 8, 2),
    (12, 0b000000011111, 17, 1),
    (12, 0b000000011010, 18, 1),
    (12, 0b000000011001, 19, 1),
    (12, 0b000000010111, 20, 1),
    (12, 0b000000010110, 21, 1),
    (13, 0b0000000011010, 0, 12),
    (13, 0b0000000011001, 0, 13),
    (13, 0b0000000011000, 0, 14),
    (13, 0b0000000010111, 0, 15),
    (13, 0b0000000010110, 1, 6),
    (13, 0b0000000010101, 1, 7),
    (13, 0b0000000010100, 2, 5),
    (13, 0b0000000010011, 3, 4),
    (13, 0b0000000010010, 5, 3),
    (13, 0b0000000010001, 9, 2),
    (13, 0b0000000010000, 10, 2),
    (13, 0b0000000011111, 22, 1),
    (13, 0b0000000011110, 23, 1),
    (13, 0b0000000011101, 24, 1),
    (13, 0b0000000011100, 25, 1),
    (13, 0b0000000011011, 26, 1),
    (14, 0b00000000011111, 0, 16),
    (14, 0b00000000011110, 0, 17),
    (14, 0b00000000011101, 0, 18),
    (14, 0b00000000011100, 0, 19),
    (14, 0b00000000011011, 0, 20),
    (14, 0b00000000011010, 0, 21),
    (14, 0b00000000011001, 0, 22),
    (14, 0b00000000011000, 0, 23),
    (14, 0b00000000010111, 0, 24),
    (14, 0b00000000010110, 0, 25),
    (14, 0b00000000010101, 0, 26),
    (14, 0b00000000010100, 0, 27),
    (14, 0b00000000010011, 0, 28),
    (14, 0b00000000010010, 0, 29),
    (14, 0b00000000010001, 0, 30),
    (14, 0b00000000010000, 0, 31),
    (15, 0b000000000011000, 0, 32),
    (15, 0b000000000010111, 0, 33),
    (15, 0b000000000010110, 0, 34),
    (15, 0b000000000010101, 0, 35),
    (15, 0b000000000010100, 0, 36),
    (15, 0b000000000010011, 0, 37),
    (15, 0b000000000010010, 0, 38),
    (15, 0b000000000010001, 0, 39),
    (15, 0b000000000010000, 0, 40),
    (15, 0b000000000011111, 1, 8),
    (15, 0b000000000011110, 1, 9),
    (15, 0b000000000011101, 1, 10),
    (15, 0b000000000011100, 1, 11),
    (15, 0b000000000011011, 1, 12),
    (15, 0b000000000011010, 1, 13),
    (15, 0b000000000011001, 1, 14),
    (16, 0b0000000000010011, 1, 15),
    (16, 0b0000000000010010, 1, 16),
    (16, 0b0000000000010001, 1, 17),
    (16, 0b0000000000010000, 1, 18),
    (16, 0b0000000000010100, 6, 3),
    (16, 0b0000000000011010, 11, 2),
    (16, 0b0000000000011001, 12, 2),
    (16, 0b0000000000011000, 13, 2),
    (16, 0b0000000000010111, 14, 2),
    (16, 0b0000000000010110, 15, 2),
    (16, 0b0000000000010101, 16, 2),
    (16, 0b0000000000011111, 27, 1),
    (16, 0b0000000000011110, 28, 1),
    (16, 0b0000000000011101, 29, 1),
    (16, 0b0000000000011100, 30, 1),
    (16, 0b0000000000011011, 31, 1),
];

/// 变长码表中最长的码 (不含符号位)
pub const MAX_VLC_BITS: u32 = 16;

/// 解码查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlcSymbol {
    /// 块结束
    EndOfBlock,
    /// 转义, 其后跟随原始游程与 level
    Escape,
    /// 表内 (run, |level|), 其后跟随 1 位符号
    RunLevel {
        /// 零游程
        run: u8,
        /// level 绝对值
        level: u16,
    },
}

/// 以 16 位前缀为索引的解码表: 每项为 (符号, 码长)
fn decode_table() -> &'static [Option<(VlcSymbol, u8)>] {
    static TABLE: OnceLock<Vec<Option<(VlcSymbol, u8)>>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = vec![None; 1 << MAX_VLC_BITS];
        let mut fill = |len: u32, code: u32, symbol: VlcSymbol| {
            let shift = MAX_VLC_BITS - len;
            let start = (code << shift) as usize;
            let end = ((code + 1) << shift) as usize;
            for slot in &mut table[start..end] {
                *slot = Some((symbol, len as u8));
            }
        };
        fill(EOB_BITS.1, EOB_BITS.0, VlcSymbol::EndOfBlock);
        fill(ESCAPE_BITS.1, ESCAPE_BITS.0, VlcSymbol::Escape);
        for &(len, code, run, level) in AC_VLC {
            fill(len as u32, code as u32, VlcSymbol::RunLevel { run, level });
        }
        table
    })
}

/// 按 16 位前缀查找变长码 (前缀高位对齐)
///
/// 返回 `(符号, 码长)`; 不匹配任何码字时返回 None.
pub fn lookup_vlc(prefix16: u32) -> Option<(VlcSymbol, u8)> {
    decode_table()[(prefix16 & 0xFFFF) as usize]
}

/// 表内 run 上限 (含)
const ENCODE_MAX_RUN: usize = 31;
/// 表内 |level| 上限 (含)
const ENCODE_MAX_LEVEL: usize = 40;

fn encode_table() -> &'static [[Option<(u16, u8)>; ENCODE_MAX_LEVEL + 1]; ENCODE_MAX_RUN + 1] {
    static TABLE: OnceLock<[[Option<(u16, u8)>; ENCODE_MAX_LEVEL + 1]; ENCODE_MAX_RUN + 1]> =
        OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[None; ENCODE_MAX_LEVEL + 1]; ENCODE_MAX_RUN + 1];
        for &(len, code, run, level) in AC_VLC {
            table[run as usize][level as usize] = Some((code, len));
        }
        table
    })
}

/// 查找 (run, |level|) 对应的变长码 `(码字, 码长)`, 不含符号位
pub fn encode_vlc(run: u8, abs_level: u32) -> Option<(u16, u8)> {
    let (run, level) = (run as usize, abs_level as usize);
    if run > ENCODE_MAX_RUN || level == 0 || level > ENCODE_MAX_LEVEL {
        return None;
    }
    encode_table()[run][level]
}
