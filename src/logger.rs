//! DNS 查询器专用日志系统
//!
//! 日志通过 [`DnsLogger`] 显式注入到传输层、缓存和解析器中，组件内部不依赖全局状态。
//! 默认实现 [`LogFacade`] 转发到 `log` 门面；[`init_dns_logger`] 可选地安装
//! 带 DNS 主题配色的 `env_logger` 后端。

use chrono::Local;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Once};

pub use log::{Level, LevelFilter};

/// 本库日志记录使用的 target
pub const LOG_TARGET: &str = "rat_quickdoh";

/// 确保日志器只初始化一次
static INIT: Once = Once::new();

/// 注入到各组件的日志协作者
pub trait DnsLogger: Send + Sync + fmt::Debug {
    /// 记录一条日志
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    /// 该级别是否会被输出
    fn enabled(&self, _level: Level) -> bool {
        true
    }
}

/// 共享的日志句柄
pub type SharedLogger = Arc<dyn DnsLogger>;

/// 转发到 `log` 门面的日志器
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl DnsLogger for LogFacade {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: LOG_TARGET, level, "{}", args);
    }

    fn enabled(&self, level: Level) -> bool {
        log::log_enabled!(target: LOG_TARGET, level)
    }
}

/// 丢弃所有日志
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentLogger;

impl DnsLogger for SilentLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}

    fn enabled(&self, _level: Level) -> bool {
        false
    }
}

/// 默认日志器
pub fn default_logger() -> SharedLogger {
    Arc::new(LogFacade)
}

/// DNS 查询专用日志格式化器
pub fn dns_format(buf: &mut dyn Write, record: &log::Record<'_>) -> std::io::Result<()> {
    let level = record.level();

    // DNS 主题配色方案
    let (level_color, level_bg, level_icon) = match level {
        Level::Error => ("\x1b[97m", "\x1b[41m", "🚫"),
        Level::Warn => ("\x1b[30m", "\x1b[43m", "⚠️ "),
        Level::Info => ("\x1b[97m", "\x1b[42m", "🌐"),
        Level::Debug => ("\x1b[30m", "\x1b[46m", "🔍"),
        Level::Trace => ("\x1b[97m", "\x1b[45m", "📡"),
    };

    let timestamp_color = "\x1b[90m";
    let message_color = "\x1b[37m";
    let reset = "\x1b[0m";

    let timestamp = Local::now().format("%H:%M:%S%.3f");

    writeln!(
        buf,
        "{}{} {}{}{:5}{} {} {}{}{}",
        timestamp_color, timestamp,
        level_color, level_bg, level, reset,
        level_icon,
        message_color, record.args(), reset
    )
}

/// 初始化 DNS 查询器日志后端（线程安全，防止重复初始化）
///
/// # Arguments
/// * `level` - 日志级别过滤器，传入 `LevelFilter::Off` 可禁用日志
///
/// # Example
/// ```
/// use rat_quickdoh::logger::{init_dns_logger, LevelFilter};
///
/// init_dns_logger(LevelFilter::Info).ok();
/// ```
pub fn init_dns_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut init_result = Ok(());

    INIT.call_once(|| {
        init_result = env_logger::Builder::new()
            .filter_level(level)
            .format(|buf, record| dns_format(buf, record))
            .try_init();
    });

    init_result
}

/// 安全的日志初始化函数，默认禁用日志输出
pub fn init_dns_logger_silent() -> Result<(), log::SetLoggerError> {
    init_dns_logger(LevelFilter::Off)
}

/// 级别未启用时不格式化参数
#[doc(hidden)]
#[macro_export]
macro_rules! dns_log {
    ($logger:expr, $level:expr, $($arg:tt)*) => {
        match &*$logger {
            logger => {
                if $crate::logger::DnsLogger::enabled(logger, $level) {
                    $crate::logger::DnsLogger::log(logger, $level, format_args!($($arg)*));
                }
            }
        }
    };
}

#[macro_export]
macro_rules! dns_error {
    ($logger:expr, $($arg:tt)*) => {
        $crate::dns_log!($logger, $crate::logger::Level::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! dns_warn {
    ($logger:expr, $($arg:tt)*) => {
        $crate::dns_log!($logger, $crate::logger::Level::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! dns_info {
    ($logger:expr, $($arg:tt)*) => {
        $crate::dns_log!($logger, $crate::logger::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! dns_debug {
    ($logger:expr, $($arg:tt)*) => {
        $crate::dns_log!($logger, $crate::logger::Level::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! dns_timeout {
    ($logger:expr, $domain:expr, $timeout:expr) => {
        $crate::dns_warn!($logger, "⏰ {} 查询超时: {}ms", $domain, $timeout.as_millis())
    };
}

#[macro_export]
macro_rules! dns_cache_hit {
    ($logger:expr, $domain:expr) => {
        $crate::dns_debug!($logger, "💾 缓存命中: {}", $domain)
    };
}

#[macro_export]
macro_rules! dns_cache_miss {
    ($logger:expr, $domain:expr) => {
        $crate::dns_debug!($logger, "🔄 缓存未命中: {}", $domain)
    };
}

#[macro_export]
macro_rules! dns_upstream {
    ($logger:expr, $server:expr, $domain:expr) => {
        $crate::dns_log!($logger, $crate::logger::Level::Trace, "📡 上游服务器 {} 查询: {}", $server, $domain)
    };
}
