use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use crate::dns_resolver::{settle, RecordKind, Resolve};

/// 泛解析地址集合
///
/// 扫描开始前计算一次，之后只读。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WildcardSet {
    addresses: HashSet<IpAddr>,
}

impl WildcardSet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addresses.contains(ip)
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// 按地址排序后的列表
    pub fn sorted(&self) -> Vec<IpAddr> {
        let mut addresses: Vec<IpAddr> = self.addresses.iter().copied().collect();
        addresses.sort();
        addresses
    }
}

impl FromIterator<IpAddr> for WildcardSet {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        WildcardSet {
            addresses: iter.into_iter().collect(),
        }
    }
}

/// 泛解析检测器
pub struct WildcardDetector {
    resolver: Arc<dyn Resolve>,
    kind: RecordKind,
}

impl WildcardDetector {
    pub fn new(resolver: Arc<dyn Resolve>, kind: RecordKind) -> Self {
        WildcardDetector { resolver, kind }
    }

    /// 用当前 unix 时间构造一个几乎不可能存在的子域名
    pub fn probe_name(target: &str) -> String {
        format!("a{}.{}", chrono::Utc::now().timestamp(), target)
    }

    /// 检测目标域名的泛解析地址
    ///
    /// 探测失败（超时、NXDOMAIN 等）一律视为没有泛解析。
    pub fn detect(&self, target: &str) -> WildcardSet {
        self.probe(&Self::probe_name(target))
    }

    pub fn probe(&self, name: &str) -> WildcardSet {
        settle(name, self.kind, self.resolver.resolve(name, self.kind))
            .iter()
            .filter_map(|record| record.address())
            .collect()
    }
}
