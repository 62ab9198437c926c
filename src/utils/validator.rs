use regex::Regex;
use std::sync::OnceLock;
use url::Host;

fn resource_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").ok())
        .as_ref()
}

/// 资源名会被拼进 `/firmware/<name>.txt`，不允许出现路径分隔符和空白
pub fn is_valid_resource(name: &str) -> bool {
    !name.contains("..") && resource_pattern().is_some_and(|p| p.is_match(name))
}

/// 域名、IPv4 或带方括号的 IPv6
pub fn is_valid_host(host: &str) -> bool {
    !host.is_empty() && !host.contains(char::is_whitespace) && Host::parse(host).is_ok()
}

/// 支持的日志级别
pub fn is_valid_log_level(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "off" | "error" | "warn" | "info" | "debug" | "trace"
    )
}
