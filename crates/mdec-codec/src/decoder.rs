//! 码流解码器: 帧头 + 变长码块流 -> MDEC 系数码序列.
//!
//! 每帧一个状态机:
//! `Header -> BlockHeader -> BlockBody (循环) -> Done`,
//! 码流截断或损坏时进入 `Failed`, 剩余宏块补零后以 `Recovered` 结束, 不中断整批处理.

use bitflags::bitflags;
use log::{debug, trace, warn};
use mdec_core::{BitOrder, BitReader, MacroblockLayout, MdecError, MdecResult};

use crate::code::MdecCode;
use crate::tables::{MAX_VLC_BITS, TRAILER_BITS, VlcSymbol, lookup_vlc};
use crate::variant::{DEFAULT_PROBE_ORDER, FrameHeader, HEADER_SIZE, StrVariant, probe};

bitflags! {
    /// 解码过程中遇到并已就地处理的问题
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DecodeIssues: u8 {
        /// 码流在帧中途耗尽, 剩余宏块已补零
        const END_OF_STREAM = 1 << 0;
        /// 遇到结构上无效的码字, 剩余宏块已补零
        const CORRUPTION = 1 << 1;
        /// 末尾尾码不一致
        const TRAILER_MISMATCH = 1 << 2;
        /// 出现 level 为 0 的转义码
        const ZERO_LEVEL_ESCAPE = 1 << 3;
    }
}

/// 解码状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// 等待帧头
    Header,
    /// 等待块头 (qscale + dc)
    BlockHeader,
    /// 读取块体码
    BlockBody,
    /// 全部宏块已读取
    Done,
    /// 码流截断或损坏
    Failed,
    /// 剩余宏块已补零
    Recovered,
}

/// 一帧解码后的系数码序列
#[derive(Debug, Clone)]
pub struct MdecCodeStream {
    /// 码流格式变体
    variant: StrVariant,
    /// 帧头
    header: FrameHeader,
    /// 宏块布局
    layout: MacroblockLayout,
    /// 全部系数码 (按宏块列优先、块角色顺序排列)
    codes: Vec<MdecCode>,
    /// 每个宏块第一个码的位置, 末尾附加总码数
    mb_offsets: Vec<usize>,
    /// 已处理的问题
    issues: DecodeIssues,
    /// 第一个被补零的宏块
    first_damaged_macroblock: Option<usize>,
}

impl MdecCodeStream {
    /// 由完整的系数码序列构造, 校验块结构
    pub fn from_codes(
        variant: StrVariant,
        layout: MacroblockLayout,
        qscale: u8,
        codes: Vec<MdecCode>,
    ) -> MdecResult<Self> {
        let mb_offsets = macroblock_offsets(&codes, layout.macroblock_count())?;
        Ok(Self {
            variant,
            header: FrameHeader::for_codes(codes.len(), qscale, variant.version),
            layout,
            codes,
            mb_offsets,
            issues: DecodeIssues::empty(),
            first_damaged_macroblock: None,
        })
    }

    /// 码流格式变体
    pub fn variant(&self) -> StrVariant {
        self.variant
    }

    /// 帧头
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// 帧头中的全帧 qscale
    pub fn qscale(&self) -> u8 {
        self.header.qscale
    }

    /// 宏块布局
    pub fn layout(&self) -> &MacroblockLayout {
        &self.layout
    }

    /// 全部系数码
    pub fn codes(&self) -> &[MdecCode] {
        &self.codes
    }

    /// 指定宏块的系数码 (6 个块, 含块头与块结束码)
    pub fn macroblock_codes(&self, index: usize) -> &[MdecCode] {
        &self.codes[self.mb_offsets[index]..self.mb_offsets[index + 1]]
    }

    /// 按码流顺序遍历各块的码 (块头 .. 块结束码)
    pub fn blocks(&self) -> impl Iterator<Item = &[MdecCode]> {
        self.codes.split_inclusive(|c| c.is_eob())
    }

    /// 已处理的问题
    pub fn issues(&self) -> DecodeIssues {
        self.issues
    }

    /// 第一个被补零的宏块
    pub fn first_damaged_macroblock(&self) -> Option<usize> {
        self.first_damaged_macroblock
    }
}

/// 校验码序列的块结构并计算每个宏块的起点
fn macroblock_offsets(codes: &[MdecCode], mb_count: usize) -> MdecResult<Vec<usize>> {
    let mut offsets = Vec::with_capacity(mb_count + 1);
    let mut blocks = 0usize;
    let mut at_block_start = true;
    let mut pos = 0u32;

    for (i, code) in codes.iter().enumerate() {
        if at_block_start {
            if code.is_eob() {
                return Err(MdecError::InvalidArgument(format!(
                    "第 {} 块的块头是块结束码",
                    blocks
                )));
            }
            if blocks % 6 == 0 {
                offsets.push(i);
            }
            at_block_start = false;
            pos = 0;
        } else if code.is_eob() {
            blocks += 1;
            at_block_start = true;
        } else {
            pos += code.run() as u32 + 1;
            if pos > 63 {
                return Err(MdecError::InvalidArgument(format!(
                    "第 {} 块游程越界: 位置 {}",
                    blocks, pos
                )));
            }
        }
    }

    if !at_block_start || blocks != mb_count * 6 {
        return Err(MdecError::InvalidArgument(format!(
            "块数不符: 期望 {}, 实际 {} (最后一块{}完整)",
            mb_count * 6,
            blocks,
            if at_block_start { "" } else { "不" }
        )));
    }
    offsets.push(codes.len());
    Ok(offsets)
}

/// 码流解码器
///
/// 实例持有解码状态, 不可在多个线程间共享同一实例;
/// 并行解码时每个工作线程各自创建一个.
pub struct BitstreamDecoder {
    /// 探测顺序
    candidates: Vec<StrVariant>,
    /// 当前状态
    state: DecodeState,
}

impl BitstreamDecoder {
    /// 使用默认探测顺序创建解码器
    pub fn new() -> Self {
        Self::with_variants(DEFAULT_PROBE_ORDER)
    }

    /// 使用指定探测顺序创建解码器
    pub fn with_variants(candidates: &[StrVariant]) -> Self {
        Self {
            candidates: candidates.to_vec(),
            state: DecodeState::Header,
        }
    }

    /// 最近一次解码结束时的状态
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// 解码一帧
    ///
    /// 帧头不匹配任何变体时返回 `NotThisFormat`; 码流截断或损坏不会返回错误,
    /// 而是补零后在结果的 [`DecodeIssues`] 中记录.
    pub fn decode(&mut self, data: &[u8], width: u32, height: u32) -> MdecResult<MdecCodeStream> {
        self.state = DecodeState::Header;
        let (variant, header) = probe(data, &self.candidates)?;
        let layout = MacroblockLayout::new(width, height)?;
        let qscale = header.qscale;

        let mut reader = BitReader::new(&data[HEADER_SIZE..], BitOrder::Little16);
        let mb_count = layout.macroblock_count();
        let mut codes = Vec::with_capacity(layout.block_count() * 8);
        let mut mb_offsets = Vec::with_capacity(mb_count + 1);
        let mut issues = DecodeIssues::empty();
        let mut first_damaged = None;

        for mb in 0..mb_count {
            mb_offsets.push(codes.len());
            let start = codes.len();
            if let Err(err) = self.read_macroblock(&mut reader, qscale, &mut codes, &mut issues) {
                self.state = DecodeState::Failed;
                let (x, y) = layout.position(mb);
                warn!(
                    "{}x{} 帧在宏块 {} ({}, {}) 处{}, 剩余 {} 个宏块补零",
                    width,
                    height,
                    mb,
                    x,
                    y,
                    err,
                    mb_count - mb
                );
                issues |= match err {
                    MdecError::EndOfStream => DecodeIssues::END_OF_STREAM,
                    _ => DecodeIssues::CORRUPTION,
                };
                first_damaged = Some(mb);
                codes.truncate(start);
                mb_offsets.truncate(mb);
                for _ in mb..mb_count {
                    mb_offsets.push(codes.len());
                    for _ in 0..6 {
                        codes.push(MdecCode::header(qscale, 0));
                        codes.push(MdecCode::END_OF_BLOCK);
                    }
                }
                self.state = DecodeState::Recovered;
                break;
            }
            trace!("宏块 {} 解码完成, 累计 {} 个码", mb, codes.len());
        }
        mb_offsets.push(codes.len());

        if self.state != DecodeState::Recovered {
            self.state = DecodeState::Done;
            if variant.strict_trailer && !check_trailer(&mut reader) {
                warn!(
                    "{} 码流尾码不一致, 位置 {} 位",
                    variant,
                    reader.bits_read()
                );
                issues |= DecodeIssues::TRAILER_MISMATCH;
            }
        }

        debug!(
            "{} 帧解码完成: {}x{}, qscale={}, {} 个码, 问题={:?}",
            variant,
            width,
            height,
            qscale,
            codes.len(),
            issues
        );

        Ok(MdecCodeStream {
            variant,
            header,
            layout,
            codes,
            mb_offsets,
            issues,
            first_damaged_macroblock: first_damaged,
        })
    }

    /// 读取一个宏块的 6 个块
    fn read_macroblock(
        &mut self,
        reader: &mut BitReader<'_>,
        qscale: u8,
        codes: &mut Vec<MdecCode>,
        issues: &mut DecodeIssues,
    ) -> MdecResult<()> {
        for _ in 0..6 {
            self.state = DecodeState::BlockHeader;
            let dc = reader.read_bits_signed(10)?;
            let header = MdecCode::header(qscale, dc);
            if header.is_eob() {
                return Err(MdecError::ReadCorruption(
                    "块头与块结束码相同".to_string(),
                ));
            }
            codes.push(header);

            self.state = DecodeState::BlockBody;
            let mut zigzag_pos = 0u32;
            loop {
                let code = read_body_code(reader, issues)?;
                if code.is_eob() {
                    codes.push(code);
                    break;
                }
                zigzag_pos += code.run() as u32 + 1;
                if zigzag_pos > 63 {
                    return Err(MdecError::ReadCorruption(format!(
                        "游程越界: 位置 {}",
                        zigzag_pos
                    )));
                }
                codes.push(code);
            }
        }
        Ok(())
    }
}

impl Default for BitstreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 读取一个块体码 (表内码、转义码或块结束码)
fn read_body_code(reader: &mut BitReader<'_>, issues: &mut DecodeIssues) -> MdecResult<MdecCode> {
    let prefix = reader.peek_bits_padded(MAX_VLC_BITS)?;
    let Some((symbol, len)) = lookup_vlc(prefix) else {
        if reader.bits_left() < MAX_VLC_BITS as usize {
            return Err(MdecError::EndOfStream);
        }
        return Err(MdecError::ReadCorruption(format!(
            "无效的变长码: {:016b}",
            prefix
        )));
    };

    reader.skip_bits(len as u32)?;
    match symbol {
        VlcSymbol::EndOfBlock => Ok(MdecCode::END_OF_BLOCK),
        VlcSymbol::Escape => {
            let run = reader.read_bits(6)? as u8;
            let level = reader.read_bits_signed(10)?;
            if level == 0 {
                warn!("转义码 level 为 0 (run={}), 按零系数处理", run);
                *issues |= DecodeIssues::ZERO_LEVEL_ESCAPE;
            }
            Ok(MdecCode::body(run, level))
        }
        VlcSymbol::RunLevel { run, level } => {
            let negative = reader.read_bit()? == 1;
            let level = i32::from(level);
            Ok(MdecCode::body(run, if negative { -level } else { level }))
        }
    }
}

/// 读取并校验末尾尾码
fn check_trailer(reader: &mut BitReader<'_>) -> bool {
    let (bits, len) = TRAILER_BITS;
    matches!(reader.read_bits(len), Ok(v) if v == bits)
}
