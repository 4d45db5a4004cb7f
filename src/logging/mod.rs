//! 日志初始化.
//!
//! 库 crate 通过 `log` 门面输出, 这里用 `tracing-subscriber` 统一收集:
//! 控制台层与文件层各自带 `EnvFilter`, 文件按日期命名 (`前缀.YYYY-MM-DD.log`),
//! 经 `tracing-appender` 的非阻塞写入器落盘. 环境变量 `MDEC_LOG` 覆盖文件层过滤规则.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod retention;

pub use retention::prune_old_logs;

/// 覆盖文件层过滤规则的环境变量
pub const LOG_ENV: &str = "MDEC_LOG";

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 文件层过滤规则, 例如 `info` 或 `mdec_codec=debug`
    pub level: String,
    /// 日志目录
    pub directory: String,
    /// 文件名前缀
    pub file_prefix: String,
    /// 保留天数
    pub retention_days: i64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "psxmdec".to_string(),
            retention_days: 30,
        }
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志, 进程内只能成功一次
pub fn init(config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let removed = prune_old_logs(config, Local::now().date_naive())?;

    let file_appender = DailyFileWriter::new(Path::new(&config.directory), &config.file_prefix)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter = EnvFilter::new("warn");
    let file_filter = match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(&config.level),
    };

    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .event_format(LineFormatter::CONSOLE)
        .with_filter(console_filter);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(LineFormatter::FILE)
        .with_filter(file_filter);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("全局日志已初始化")?;
    LOG_GUARD.set(guard).ok();

    if removed > 0 {
        tracing::info!("已清理 {} 个过期日志文件", removed);
    }
    Ok(())
}

/// 按日期切换文件的写入器
struct DailyFileWriter {
    directory: PathBuf,
    prefix: String,
    date: NaiveDate,
    file: File,
}

impl DailyFileWriter {
    fn new(directory: &Path, prefix: &str) -> Result<Self> {
        let date = Local::now().date_naive();
        let file = open_append_file(&build_log_path(directory, prefix, date))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            date,
            file,
        })
    }

    fn roll_if_needed(&mut self) -> std::io::Result<()> {
        let today = Local::now().date_naive();
        if today != self.date {
            let path = build_log_path(&self.directory, &self.prefix, today);
            self.file = open_append_file(&path).map_err(std::io::Error::other)?;
            self.date = today;
        }
        Ok(())
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.roll_if_needed()?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

/// 指定日期的日志文件路径
pub fn build_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 单行事件格式: `[时间] 级别 目标 > 字段`
///
/// 控制台只显示时分秒并按级别着色, 文件带月日且不着色.
#[derive(Debug, Clone, Copy)]
struct LineFormatter {
    console: bool,
}

impl LineFormatter {
    const CONSOLE: Self = Self { console: true };
    const FILE: Self = Self { console: false };

    fn level_color(level: &tracing::Level) -> &'static str {
        match *level {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        let clock = format!(
            "{:02}:{:02}:{:02}.{:03}",
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        );
        let level = meta.level().to_string();
        if self.console {
            write!(
                writer,
                "[{}] {}{:5}\x1b[0m {} > ",
                clock,
                Self::level_color(meta.level()),
                level,
                meta.target()
            )?;
        } else {
            write!(
                writer,
                "[{:02}-{:02} {}] {:5} {} > ",
                now.month(),
                now.day(),
                clock,
                level,
                meta.target()
            )?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
