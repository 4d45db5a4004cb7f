//! 码流格式变体与帧头探测.
//!
//! 帧头 8 字节, 4 个小端 int16 字段:
//! `[halfCeiling32][0x3800][qscale][version]`.
//!
//! 各变体只在期望的版本号与尾码严格程度上不同, 因此用数据描述,
//! 由有序的探测列表逐个尝试, 第一个匹配者胜出.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use mdec_core::{MdecError, MdecResult};

/// 帧头字节数
pub const HEADER_SIZE: usize = 8;

/// 帧头魔数
pub const HEADER_MAGIC: u16 = 0x3800;

/// 码流格式变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrVariant {
    /// 变体名称
    pub name: &'static str,
    /// 帧头中期望的版本号
    pub version: u16,
    /// 是否校验末尾 11 位尾码 (不一致时记录警告)
    pub strict_trailer: bool,
}

impl StrVariant {
    /// STR v1
    pub const V1: StrVariant = StrVariant {
        name: "STRv1",
        version: 1,
        strict_trailer: false,
    };

    /// STR v2
    pub const V2: StrVariant = StrVariant {
        name: "STRv2",
        version: 2,
        strict_trailer: true,
    };

    /// 检查帧头是否属于该变体
    pub fn check_header(&self, bytes: &[u8]) -> bool {
        self.read_header(bytes).is_ok()
    }

    /// 读取并校验帧头
    pub fn read_header(&self, bytes: &[u8]) -> MdecResult<FrameHeader> {
        let header = FrameHeader::parse(bytes)?;
        if header.magic != HEADER_MAGIC {
            return Err(MdecError::NotThisFormat(format!(
                "{}: 魔数 0x{:04X} 不是 0x{:04X}",
                self.name, header.magic, HEADER_MAGIC
            )));
        }
        if header.qscale < 1 || header.qscale > 63 {
            return Err(MdecError::NotThisFormat(format!(
                "{}: qscale {} 超出 1..=63",
                self.name, header.qscale
            )));
        }
        if header.version != self.version {
            return Err(MdecError::NotThisFormat(format!(
                "{}: 版本号 {} 不是 {}",
                self.name, header.version, self.version
            )));
        }
        Ok(header)
    }
}

impl fmt::Display for StrVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 默认探测顺序
pub const DEFAULT_PROBE_ORDER: &[StrVariant] = &[StrVariant::V2, StrVariant::V1];

/// 解析后的帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 解压后 MDEC 码数的一半, 向上取整到 32 的倍数
    pub half_ceiling32: u16,
    /// 魔数
    pub magic: u16,
    /// 全帧 qscale
    pub qscale: u8,
    /// 版本号
    pub version: u16,
}

impl FrameHeader {
    /// 从字节解析帧头字段 (不做变体校验)
    pub fn parse(bytes: &[u8]) -> MdecResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(MdecError::NotThisFormat(format!(
                "帧头不足 {} 字节: {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let qscale = LittleEndian::read_i16(&bytes[4..6]);
        Ok(Self {
            half_ceiling32: LittleEndian::read_u16(&bytes[0..2]),
            magic: LittleEndian::read_u16(&bytes[2..4]),
            qscale: qscale.clamp(0, 255) as u8,
            version: LittleEndian::read_u16(&bytes[6..8]),
        })
    }

    /// 按码数构造帧头
    pub fn for_codes(code_count: usize, qscale: u8, version: u16) -> Self {
        Self {
            half_ceiling32: half_ceiling32(code_count),
            magic: HEADER_MAGIC,
            qscale,
            version,
        }
    }

    /// 序列化为 8 字节
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut out[0..2], self.half_ceiling32);
        LittleEndian::write_u16(&mut out[2..4], self.magic);
        LittleEndian::write_u16(&mut out[4..6], u16::from(self.qscale));
        LittleEndian::write_u16(&mut out[6..8], self.version);
        out
    }
}

/// `ceil(码数 / 2)` 向上取整到 32 的倍数
pub fn half_ceiling32(code_count: usize) -> u16 {
    let half = code_count.div_ceil(2);
    (((half + 31) & !31).min(u16::MAX as usize & !31)) as u16
}

/// 按顺序探测变体, 返回第一个匹配者
pub fn probe(bytes: &[u8], candidates: &[StrVariant]) -> MdecResult<(StrVariant, FrameHeader)> {
    for variant in candidates {
        match variant.read_header(bytes) {
            Ok(header) => {
                debug!("探测到码流变体 {}, qscale={}", variant, header.qscale);
                return Ok((*variant, header));
            }
            Err(err) if err.is_probe_failure() => continue,
            Err(err) => return Err(err),
        }
    }
    Err(MdecError::NotThisFormat(
        "没有匹配的 MDEC 码流变体".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_header_accepted_by_v2_only() {
        let bytes = [0x05, 0x00, 0x00, 0x38, 0x01, 0x00, 0x02, 0x00];
        assert!(StrVariant::V2.check_header(&bytes));
        assert!(!StrVariant::V1.check_header(&bytes));

        let header = StrVariant::V2.read_header(&bytes).unwrap();
        assert_eq!(header.half_ceiling32, 5);
        assert_eq!(header.qscale, 1);
        assert_eq!(header.version, 2);
    }

    #[test]
    fn test_probe_idempotence() {
        let samples: [[u8; 8]; 4] = [
            [0x20, 0x00, 0x00, 0x38, 0x04, 0x00, 0x02, 0x00],
            [0x40, 0x00, 0x00, 0x38, 0x3F, 0x00, 0x01, 0x00],
            [0x40, 0x00, 0x00, 0x37, 0x01, 0x00, 0x02, 0x00],
            [0x40, 0x00, 0x00, 0x38, 0x00, 0x00, 0x02, 0x00],
        ];
        for bytes in &samples {
            for variant in DEFAULT_PROBE_ORDER {
                if variant.check_header(bytes) {
                    let header = variant.read_header(bytes).unwrap();
                    assert_eq!(header.qscale, bytes[4]);
                }
            }
        }
    }

    #[test]
    fn test_probe_order_first_match() {
        let v1 = FrameHeader::for_codes(12, 8, 1).to_bytes();
        let (variant, header) = probe(&v1, DEFAULT_PROBE_ORDER).unwrap();
        assert_eq!(variant, StrVariant::V1);
        assert_eq!(header.qscale, 8);

        let bad = [0u8; 8];
        assert!(probe(&bad, DEFAULT_PROBE_ORDER).unwrap_err().is_probe_failure());
        assert!(probe(&bad[..4], DEFAULT_PROBE_ORDER).is_err());
    }

    #[test]
    fn test_half_ceiling32() {
        assert_eq!(half_ceiling32(0), 0);
        assert_eq!(half_ceiling32(1), 32);
        assert_eq!(half_ceiling32(12), 32);
        assert_eq!(half_ceiling32(64), 32);
        assert_eq!(half_ceiling32(65), 64);
    }
}
