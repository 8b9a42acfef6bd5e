//! 线程安全的扫描状态
//!
//! 每个目标域名有一份独立的 [`ScanState`]，由所有工作线程共享；
//! [`CancelToken`] 用来在中断或超时时通知工作线程退出。

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 命中的应答内容
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Answer {
    /// 子域名扫描得到的地址
    Address(IpAddr),
    /// TLD 扫描得到的第一个名称服务器
    Nameserver(String),
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Address(ip) => write!(f, "{}", ip),
            Answer::Nameserver(ns) => write!(f, "{}", ns),
        }
    }
}

/// 一条发现结果
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hit {
    pub domain: String,
    pub answer: Answer,
}

impl Hit {
    pub fn address(domain: &str, ip: IpAddr) -> Self {
        Hit {
            domain: domain.to_string(),
            answer: Answer::Address(ip),
        }
    }

    pub fn nameserver(domain: &str, nameserver: &str) -> Self {
        Hit {
            domain: domain.to_string(),
            answer: Answer::Nameserver(nameserver.to_string()),
        }
    }
}

/// 单个目标的扫描状态
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    /// 发现的结果（按发现顺序）
    hits: Arc<Mutex<Vec<Hit>>>,
    /// 去重后的真实地址集合
    addresses: Arc<Mutex<BTreeSet<IpAddr>>>,
    /// 已完成解析的候选数量
    resolved: Arc<AtomicUsize>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加发现结果，地址类结果同时进入地址集合
    pub fn add_hit(&self, hit: Hit) {
        if let Answer::Address(ip) = hit.answer {
            if let Ok(mut addresses) = self.addresses.lock() {
                addresses.insert(ip);
            }
        }
        if let Ok(mut hits) = self.hits.lock() {
            hits.push(hit);
        }
    }

    pub fn hits(&self) -> Vec<Hit> {
        if let Ok(hits) = self.hits.lock() {
            hits.clone()
        } else {
            Vec::new()
        }
    }

    pub fn addresses(&self) -> BTreeSet<IpAddr> {
        if let Ok(addresses) = self.addresses.lock() {
            addresses.clone()
        } else {
            BTreeSet::new()
        }
    }

    pub fn mark_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }
}

/// 取消标记
///
/// 子标记在父标记被取消时同样视为已取消，但取消子标记不会影响父标记。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(self.flag.clone()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .map_or(false, |parent| parent.load(Ordering::SeqCst))
    }
}
