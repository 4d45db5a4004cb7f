//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 MDEC 码流解码与格式探测的基础设施.
//!
//! 支持两种位序:
//! - `BigEndian`: 按字节顺序读取, 每字节高位在前
//! - `Little16`: 按小端 16 位字读取, 每个字高位在前 (PS1 MDEC 码流使用的位序)
//!
//! 读取位置由 [`BitCursor`] 值类型表示, 可以复制保存并在之后恢复,
//! 多个读取器可以安全地共享同一块不可变缓冲区.

use crate::{MdecError, MdecResult};

/// 位序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitOrder {
    /// 字节顺序, 每字节高位在前
    BigEndian,
    /// 小端 16 位字, 每个字高位在前
    #[default]
    Little16,
}

impl BitOrder {
    /// 逻辑字节索引映射到物理字节索引
    #[inline]
    fn physical(self, logical: usize) -> usize {
        match self {
            BitOrder::BigEndian => logical,
            BitOrder::Little16 => logical ^ 1,
        }
    }

    /// 缓冲区中按该位序可读的字节数 (Little16 只计完整的字)
    #[inline]
    fn readable_len(self, len: usize) -> usize {
        match self {
            BitOrder::BigEndian => len,
            BitOrder::Little16 => len & !1,
        }
    }
}

/// 比特流读取位置
///
/// 纯值类型: (逻辑字节索引, 字节内位位置). 复制即快照.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitCursor {
    /// 逻辑字节索引
    pub byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    pub bit_pos: u8,
}

impl BitCursor {
    /// 从起点算起的总位数
    pub fn bits(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    fn advanced(self, n: usize) -> Self {
        let total = self.bit_pos as usize + n;
        Self {
            byte_pos: self.byte_pos + total / 8,
            bit_pos: (total % 8) as u8,
        }
    }
}

/// 比特流读取器
///
/// # 示例
/// ```
/// use mdec_core::bitreader::{BitOrder, BitReader};
///
/// // 小端 16 位字 0x1921 -> 位序列 0001 1001 0010 0001
/// let data = [0x21, 0x19];
/// let mut br = BitReader::new(&data, BitOrder::Little16);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(12).unwrap(), 0x921);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 位序
    order: BitOrder,
    /// 可读的逻辑字节数
    readable: usize,
    /// 当前读取位置
    cursor: BitCursor,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8], order: BitOrder) -> Self {
        Self {
            data,
            order,
            readable: order.readable_len(data.len()),
            cursor: BitCursor::default(),
        }
    }

    /// 位序
    pub fn order(&self) -> BitOrder {
        self.order
    }

    /// 当前位置快照
    pub fn cursor(&self) -> BitCursor {
        self.cursor
    }

    /// 恢复到之前保存的位置
    pub fn restore(&mut self, cursor: BitCursor) {
        self.cursor = cursor;
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.cursor.bits()
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.readable * 8).saturating_sub(self.cursor.bits())
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    #[inline]
    fn logical_byte(&self, logical: usize) -> u8 {
        if logical < self.readable {
            self.data[self.order.physical(logical)]
        } else {
            0
        }
    }

    /// 从给定位置取 n 位 (n <= 32), 越界部分补 0
    fn fetch(&self, at: BitCursor, n: u32) -> u32 {
        let span = at.bit_pos as u32 + n;
        let bytes = span.div_ceil(8) as usize;
        let window = (0..bytes).fold(0u64, |acc, i| {
            (acc << 8) | u64::from(self.logical_byte(at.byte_pos + i))
        });
        let shift = bytes as u32 * 8 - span;
        ((window >> shift) & ((1u64 << n) - 1)) as u32
    }

    fn check_width(n: u32) -> MdecResult<()> {
        if n > 32 {
            return Err(MdecError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n
            )));
        }
        Ok(())
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> MdecResult<u32> {
        self.read_bits(1)
    }

    /// 读取 N 个位 (最多 32 位), 返回值的低 N 位有效
    pub fn read_bits(&mut self, n: u32) -> MdecResult<u32> {
        let value = self.peek_bits(n)?;
        self.cursor = self.cursor.advanced(n as usize);
        Ok(value)
    }

    /// 读取有符号整数 (二进制补码)
    pub fn read_bits_signed(&mut self, n: u32) -> MdecResult<i32> {
        let val = self.read_bits(n)?;
        if n == 0 || n >= 32 {
            return Ok(val as i32);
        }
        let unused = 32 - n;
        Ok(((val << unused) as i32) >> unused)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&self, n: u32) -> MdecResult<u32> {
        Self::check_width(n)?;
        if n == 0 {
            return Ok(0);
        }
        if (n as usize) > self.bits_left() {
            return Err(MdecError::EndOfStream);
        }
        Ok(self.fetch(self.cursor, n))
    }

    /// 窥视 N 个位, 超出末尾的部分按 0 补齐
    ///
    /// 变长码匹配时先按最大码长窥视, 再根据实际码长判断是否越界.
    pub fn peek_bits_padded(&self, n: u32) -> MdecResult<u32> {
        Self::check_width(n)?;
        if n == 0 {
            return Ok(0);
        }
        Ok(self.fetch(self.cursor, n))
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> MdecResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(MdecError::EndOfStream);
        }
        self.cursor = self.cursor.advanced(n as usize);
        Ok(())
    }

    /// 获取当前逻辑字节位置
    pub fn byte_position(&self) -> usize {
        self.cursor.byte_pos
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
