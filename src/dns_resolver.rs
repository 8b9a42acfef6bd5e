use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use itertools::Itertools;
use log::debug;
use thiserror::Error;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::error::ProtoErrorKind;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::Resolver;

/// 查询的记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    AAAA,
    NS,
    TXT,
    MX,
}

impl RecordKind {
    fn record_type(self) -> RecordType {
        match self {
            RecordKind::A => RecordType::A,
            RecordKind::AAAA => RecordType::AAAA,
            RecordKind::NS => RecordType::NS,
            RecordKind::TXT => RecordType::TXT,
            RecordKind::MX => RecordType::MX,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::A => "A",
            RecordKind::AAAA => "AAAA",
            RecordKind::NS => "NS",
            RecordKind::TXT => "TXT",
            RecordKind::MX => "MX",
        };
        f.write_str(name)
    }
}

/// DNS记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecord {
    A(Ipv4Addr),        // IPv4地址
    AAAA(Ipv6Addr),     // IPv6地址
    NS(String),         // 名称服务器
    MX(u16, String),    // 邮件交换器 (优先级, 主机名)
    TXT(String),        // 文本记录
    Other(String),      // CNAME 等其它应答
}

impl DnsRecord {
    /// A/AAAA 记录对应的地址
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            DnsRecord::A(ip) => Some(IpAddr::V4(*ip)),
            DnsRecord::AAAA(ip) => Some(IpAddr::V6(*ip)),
            _ => None,
        }
    }

    fn from_rdata(rdata: &RData) -> Self {
        match rdata {
            RData::A(a) => DnsRecord::A(a.0),
            RData::AAAA(aaaa) => DnsRecord::AAAA(aaaa.0),
            RData::NS(ns) => DnsRecord::NS(ns.0.to_string()),
            RData::MX(mx) => DnsRecord::MX(mx.preference(), mx.exchange().to_string()),
            RData::TXT(txt) => {
                let text = txt
                    .iter()
                    .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                    .collect::<Vec<_>>()
                    .join("");
                DnsRecord::TXT(text)
            }
            other => DnsRecord::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsRecord::A(ip) => write!(f, "{}", ip),
            DnsRecord::AAAA(ip) => write!(f, "{}", ip),
            DnsRecord::NS(ns) => write!(f, "{}", ns),
            DnsRecord::MX(priority, host) => write!(f, "{} {}", priority, host),
            DnsRecord::TXT(txt) => write!(f, "\"{}\"", txt),
            DnsRecord::Other(text) => write!(f, "{}", text),
        }
    }
}

/// 单次查询失败的原因
///
/// 扫描过程中这些错误全部按“无数据”处理，见 [`settle`]。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("NXDOMAIN")]
    NxDomain,
    #[error("no answer")]
    NoAnswer,
    #[error("timed out")]
    Timeout,
    #[error("server answered {0}")]
    Rcode(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl From<ResolveError> for DnsError {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
                ResponseCode::NXDomain => DnsError::NxDomain,
                ResponseCode::NoError => DnsError::NoAnswer,
                code => DnsError::Rcode(format!("{:?}", code)),
            },
            ResolveErrorKind::Timeout => DnsError::Timeout,
            ResolveErrorKind::Io(e) => DnsError::from(io::Error::new(e.kind(), e.to_string())),
            ResolveErrorKind::Proto(e) => match e.kind() {
                ProtoErrorKind::Timeout => DnsError::Timeout,
                _ => DnsError::Malformed(e.to_string()),
            },
            _ => DnsError::Other(err.to_string()),
        }
    }
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DnsError::Timeout,
            _ => DnsError::Io(err.to_string()),
        }
    }
}

/// 同步DNS查询接口
///
/// 实现必须可以在多个工作线程之间共享，查询本身会阻塞到超时为止。
pub trait Resolve: Send + Sync {
    fn resolve(&self, name: &str, kind: RecordKind) -> Result<Vec<DnsRecord>, DnsError>;

    /// 当前使用的解析服务器描述，用于状态输出
    fn describe(&self) -> String {
        "custom resolver".to_string()
    }
}

/// 统一的失败处理：记录日志并当作空结果
pub fn settle(name: &str, kind: RecordKind, result: Result<Vec<DnsRecord>, DnsError>) -> Vec<DnsRecord> {
    match result {
        Ok(records) => records,
        Err(e) => {
            debug!("{} {} lookup: {}", name, kind, e);
            Vec::new()
        }
    }
}

/// 启动前检查解析器是否可用
///
/// 查询根域的NS记录，只有超时才视为不可用。
pub fn check_resolver(resolver: &dyn Resolve) -> Result<(), DnsError> {
    match resolver.resolve(".", RecordKind::NS) {
        Err(DnsError::Timeout) => Err(DnsError::Timeout),
        _ => Ok(()),
    }
}

/// 去掉域名末尾的点
pub fn trim_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// 解析器配置，扫描开始前设置一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// 指定的解析服务器，None 时使用系统配置
    pub nameserver: Option<SocketAddr>,
    /// 单次查询超时
    pub timeout: Duration,
    /// 一次查询（含重试）的总时长
    pub lifetime: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            nameserver: None,
            timeout: Duration::from_secs(1),
            lifetime: Duration::from_secs(1),
        }
    }
}

impl ResolverSettings {
    /// 解析 `IP` 或 `IP:PORT` 形式的服务器地址
    pub fn parse_nameserver(value: &str) -> Option<SocketAddr> {
        let value = value.trim();
        if let Ok(ip) = value.parse::<IpAddr>() {
            return Some(SocketAddr::new(ip, 53));
        }
        value.parse::<SocketAddr>().ok()
    }

    fn attempts(&self) -> usize {
        let timeout = self.timeout.as_millis().max(1);
        ((self.lifetime.as_millis() / timeout) as usize).max(1)
    }
}

/// 基于 trust-dns 阻塞解析器的实现
pub struct SystemResolver {
    resolver: Resolver,
    nameservers: Vec<SocketAddr>,
    custom: bool,
}

impl SystemResolver {
    pub fn new(settings: &ResolverSettings) -> io::Result<Self> {
        let (config, mut opts) = match settings.nameserver {
            Some(addr) => {
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                (ResolverConfig::from_parts(None, vec![], group), ResolverOpts::default())
            }
            None => trust_dns_resolver::system_conf::read_system_conf()?,
        };
        opts.timeout = settings.timeout;
        opts.attempts = settings.attempts();
        opts.use_hosts_file = false;

        let nameservers = config
            .name_servers()
            .iter()
            .map(|ns| ns.socket_addr)
            .unique()
            .collect();
        let resolver = Resolver::new(config, opts)?;

        Ok(SystemResolver {
            resolver,
            nameservers,
            custom: settings.nameserver.is_some(),
        })
    }
}

impl Resolve for SystemResolver {
    fn resolve(&self, name: &str, kind: RecordKind) -> Result<Vec<DnsRecord>, DnsError> {
        let lookup = self.resolver.lookup(name, kind.record_type())?;
        Ok(lookup.iter().map(DnsRecord::from_rdata).collect())
    }

    fn describe(&self) -> String {
        let servers = self.nameservers.iter().map(|addr| addr.ip().to_string()).join(", ");
        if self.custom {
            format!("specified resolver {}", servers)
        } else {
            format!("system resolvers [{}]", servers)
        }
    }
}

/// 内存中的静态解析器
///
/// 按 (名称, 类型) 返回固定结果，未登记的名称返回 NXDOMAIN；
/// 可以为某个区域设置泛解析应答。所有查询都会被记录下来。
#[derive(Debug, Default)]
pub struct StaticResolver {
    answers: HashMap<(String, RecordKind), Result<Vec<DnsRecord>, DnsError>>,
    wildcards: Vec<(String, RecordKind, Vec<DnsRecord>)>,
    queries: Mutex<Vec<(String, RecordKind)>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, kind: RecordKind, records: Vec<DnsRecord>) -> Self {
        self.answers.insert((name.to_lowercase(), kind), Ok(records));
        self
    }

    pub fn with_a(self, name: &str, ips: &[Ipv4Addr]) -> Self {
        let records = ips.iter().copied().map(DnsRecord::A).collect();
        self.with(name, RecordKind::A, records)
    }

    pub fn with_error(mut self, name: &str, kind: RecordKind, error: DnsError) -> Self {
        self.answers.insert((name.to_lowercase(), kind), Err(error));
        self
    }

    /// `zone` 下任意未登记的子域名都返回 `records`
    pub fn with_wildcard(mut self, zone: &str, kind: RecordKind, records: Vec<DnsRecord>) -> Self {
        self.wildcards.push((zone.to_lowercase(), kind, records));
        self
    }

    /// 目前为止收到的所有查询
    pub fn queries(&self) -> Vec<(String, RecordKind)> {
        match self.queries.lock() {
            Ok(queries) => queries.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// 某个名称被查询的次数（不区分类型）
    pub fn query_count(&self, name: &str) -> usize {
        self.queries().iter().filter(|(n, _)| n == name).count()
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, name: &str, kind: RecordKind) -> Result<Vec<DnsRecord>, DnsError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((name.to_string(), kind));
        }

        let key = (name.to_lowercase(), kind);
        if let Some(answer) = self.answers.get(&key) {
            return answer.clone();
        }

        for (zone, wildcard_kind, records) in &self.wildcards {
            if *wildcard_kind == kind && key.0.ends_with(&format!(".{}", zone)) {
                return Ok(records.clone());
            }
        }

        Err(DnsError::NxDomain)
    }

    fn describe(&self) -> String {
        "static resolver".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_address() {
        let a = DnsRecord::A(Ipv4Addr::new(1, 2, 3, 4));
        let aaaa = DnsRecord::AAAA("2001:db8::1".parse().unwrap());
        let mx = DnsRecord::MX(10, "mail.example.com.".to_string());

        assert_eq!(a.address(), Some("1.2.3.4".parse().unwrap()));
        assert_eq!(aaaa.address(), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(mx.address(), None);
        assert_eq!(mx.to_string(), "10 mail.example.com.");
    }

    #[test]
    fn test_settle_discards_errors() {
        let ok = settle("www.example.com", RecordKind::A, Ok(vec![DnsRecord::A(Ipv4Addr::LOCALHOST)]));
        assert_eq!(ok.len(), 1);

        for error in [DnsError::NxDomain, DnsError::Timeout, DnsError::Rcode("ServFail".into())] {
            assert!(settle("www.example.com", RecordKind::A, Err(error)).is_empty());
        }
    }

    #[test]
    fn test_check_resolver_only_fails_on_timeout() {
        let healthy = StaticResolver::new();
        assert!(check_resolver(&healthy).is_ok());

        let no_answer = StaticResolver::new().with_error(".", RecordKind::NS, DnsError::NoAnswer);
        assert!(check_resolver(&no_answer).is_ok());

        let dead = StaticResolver::new().with_error(".", RecordKind::NS, DnsError::Timeout);
        assert_eq!(check_resolver(&dead), Err(DnsError::Timeout));
    }

    #[test]
    fn test_parse_nameserver() {
        assert_eq!(
            ResolverSettings::parse_nameserver("8.8.8.8"),
            Some("8.8.8.8:53".parse().unwrap())
        );
        assert_eq!(
            ResolverSettings::parse_nameserver("127.0.0.1:5353"),
            Some("127.0.0.1:5353".parse().unwrap())
        );
        assert_eq!(
            ResolverSettings::parse_nameserver("::1"),
            Some("[::1]:53".parse().unwrap())
        );
        assert_eq!(ResolverSettings::parse_nameserver("dns.example"), None);
    }

    #[test]
    fn test_attempts_follow_lifetime() {
        let settings = ResolverSettings::default();
        assert_eq!(settings.attempts(), 1);

        let settings = ResolverSettings {
            lifetime: Duration::from_secs(3),
            ..Default::default()
        };
        assert_eq!(settings.attempts(), 3);
    }

    #[test]
    fn test_static_resolver_wildcard_and_log() {
        let resolver = StaticResolver::new()
            .with_a("www.example.com", &[Ipv4Addr::new(1, 2, 3, 4)])
            .with_wildcard("example.com", RecordKind::A, vec![DnsRecord::A(Ipv4Addr::new(9, 9, 9, 9))]);

        assert_eq!(
            resolver.resolve("www.example.com", RecordKind::A).unwrap(),
            vec![DnsRecord::A(Ipv4Addr::new(1, 2, 3, 4))]
        );
        assert_eq!(
            resolver.resolve("nothing.example.com", RecordKind::A).unwrap(),
            vec![DnsRecord::A(Ipv4Addr::new(9, 9, 9, 9))]
        );
        assert_eq!(resolver.resolve("example.org", RecordKind::A), Err(DnsError::NxDomain));
        assert_eq!(resolver.query_count("www.example.com"), 1);
        assert_eq!(resolver.queries().len(), 3);
    }

    #[test]
    fn test_trim_root() {
        assert_eq!(trim_root("ns1.example.com."), "ns1.example.com");
        assert_eq!(trim_root("ns1.example.com"), "ns1.example.com");
    }
}
