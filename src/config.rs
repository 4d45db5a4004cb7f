//! 运行配置.
//!
//! 所有字段均有默认值, JSON 中可只写需要覆盖的部分.

use anyhow::{Context, Result};
use mdec_codec::DecoderKind;
use mdec_sector::AssemblerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logging::LoggingConfig;

/// 替换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceMode {
    /// 整帧重新编码
    Full,
    /// 只重新编码有差异的宏块
    #[default]
    Partial,
}

/// 帧替换配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplaceConfig {
    /// 替换模式
    pub mode: ReplaceMode,
    /// 像素差异容差 (每通道), 不超过该值视为相同
    pub tolerance: u8,
    /// 比较差异时使用的解码实现
    pub decoder: DecoderKind,
    /// `亮度能量 / qscale²` 上限, 超过时跳过该 qscale
    pub energy_ceiling: Option<f64>,
    /// 压缩后重新探测并完整解码以确认格式变体
    pub verify_round_trip: bool,
}

impl Default for ReplaceConfig {
    fn default() -> Self {
        Self {
            mode: ReplaceMode::Partial,
            tolerance: 0,
            decoder: DecoderKind::Fixed,
            energy_ceiling: None,
            verify_round_trip: true,
        }
    }
}

/// 全局配置
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MdecConfig {
    /// 日志
    pub logging: LoggingConfig,
    /// 帧组装
    pub assembler: AssemblerConfig,
    /// 帧替换
    pub replace: ReplaceConfig,
}

impl MdecConfig {
    /// 从 JSON 文本解析
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("解析 MDEC 配置失败")
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("配置文件无效, path={}", path.display()))
    }

    /// 序列化为格式化的 JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("序列化 MDEC 配置失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdec_sector::GapPolicy;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MdecConfig::from_json_str(
            r#"{
                "assembler": { "gap_policy": "discard" },
                "replace": { "mode": "full", "tolerance": 3, "decoder": "float" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.assembler.gap_policy, GapPolicy::Discard);
        assert_eq!(config.replace.mode, ReplaceMode::Full);
        assert_eq!(config.replace.tolerance, 3);
        assert_eq!(config.replace.decoder, DecoderKind::Float);
        assert!(config.replace.verify_round_trip, "未指定时默认校验");
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = MdecConfig::default();
        config.replace.energy_ceiling = Some(1.5e6);
        let text = config.to_json_string().unwrap();
        assert_eq!(MdecConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdec.json");
        std::fs::write(&path, r#"{"replace":{"tolerance":9}}"#).unwrap();
        assert_eq!(MdecConfig::load(&path).unwrap().replace.tolerance, 9);
        assert!(MdecConfig::load(dir.path().join("missing.json")).is_err());
        assert!(MdecConfig::from_json_str("{ not json").is_err());
    }
}
