//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力, 是 MDEC 码流压缩器的基础设施.
//!
//! 位序与 [`BitReader`](crate::bitreader::BitReader) 对应: 先按高位在前生成逻辑字节流,
//! `Little16` 位序在完成时按 16 位字交换字节.

use crate::bitreader::BitOrder;

/// 比特流写入器
///
/// # 示例
/// ```
/// use mdec_core::bitreader::BitOrder;
/// use mdec_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new(BitOrder::Little16);
/// bw.write_bits(0x192, 12);
/// bw.write_bits(0x1, 4);
/// assert_eq!(bw.finish(), vec![0x21, 0x19]);
/// ```
pub struct BitWriter {
    /// 位序
    order: BitOrder,
    /// 逻辑字节流 (高位在前)
    data: Vec<u8>,
    /// 尚未凑满一个字节的位, 低 `pending` 位有效
    acc: u64,
    /// `acc` 中的有效位数 (0-7)
    pending: u32,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new(order: BitOrder) -> Self {
        Self::with_capacity(order, 0)
    }

    /// 以指定容量 (字节) 创建比特流写入器
    pub fn with_capacity(order: BitOrder, capacity: usize) -> Self {
        Self {
            order,
            data: Vec::with_capacity(capacity),
            acc: 0,
            pending: 0,
        }
    }

    /// 已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.pending as usize
    }

    /// 按当前位序补齐后将占用的字节数
    pub fn padded_len(&self) -> usize {
        let bytes = self.bits_written().div_ceil(8);
        match self.order {
            BitOrder::BigEndian => bytes,
            BitOrder::Little16 => bytes.div_ceil(2) * 2,
        }
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.write_bits(bit & 1, 1);
    }

    /// 写入 `value` 的低 `n` 位 (最多 32 位), 高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        if n == 0 {
            return;
        }
        let mask = (1u64 << n) - 1;
        self.acc = (self.acc << n) | (u64::from(value) & mask);
        self.pending += n;
        while self.pending >= 8 {
            self.pending -= 8;
            self.data.push((self.acc >> self.pending) as u8);
        }
        self.acc &= (1u64 << self.pending) - 1;
    }

    /// 写入有符号整数 (二进制补码, 取低 `n` 位)
    pub fn write_bits_signed(&mut self, value: i32, n: u32) {
        self.write_bits(value as u32, n);
    }

    /// 完成写入, 返回按位序排列的字节数据
    ///
    /// 不足一个字节 (Little16: 一个字) 的部分用 0 补齐.
    pub fn finish(mut self) -> Vec<u8> {
        if self.pending > 0 {
            self.data.push((self.acc << (8 - self.pending)) as u8);
        }
        if self.order == BitOrder::Little16 {
            if self.data.len() % 2 != 0 {
                self.data.push(0);
            }
            for word in self.data.chunks_exact_mut(2) {
                word.swap(0, 1);
            }
        }
        self.data
    }
}
