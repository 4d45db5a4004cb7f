//! # mdec-core
//!
//! PSX MDEC 框架核心库, 提供错误类型、比特流读写与宏块布局等基础设施.
//!
//! 编解码 (`mdec-codec`) 与扇区块重组 (`mdec-sector`) 均建立在本 crate 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod layout;

// 重导出常用类型
pub use bitreader::{BitCursor, BitOrder, BitReader};
pub use bitwriter::BitWriter;
pub use error::{MdecError, MdecResult};
pub use layout::MacroblockLayout;
