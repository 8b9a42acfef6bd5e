use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// 诊断日志的级别，`-v` 时输出 debug
pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// 初始化日志，输出到 stderr，不干扰扫描结果
///
/// 重复初始化会被忽略。
pub fn init_logger(verbose: bool) {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Debug)
        .add_filter_ignore_str("trust_dns_proto")
        .add_filter_ignore_str("trust_dns_resolver")
        .build();

    let _ = TermLogger::init(level_for(verbose), config, TerminalMode::Stderr, ColorChoice::Auto);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(true), LevelFilter::Debug);
        assert_eq!(level_for(false), LevelFilter::Warn);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logger(false);
        init_logger(true);
    }
}
