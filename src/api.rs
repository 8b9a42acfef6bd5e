use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::dns_resolver::{RecordKind, Resolve, ResolverSettings, SystemResolver};
use crate::error::ScanError;
use crate::harvest::Harvester;
use crate::output::Reporter;
use crate::queue::{Candidate, WorkQueue};
use crate::scanner::{self, PoolExit, RecursionPolicy, ScanContext, ScanMode, WorkerPool};
use crate::state::{CancelToken, Hit, ScanState};
use crate::subdata;
use crate::wildcard::{WildcardDetector, WildcardSet};
use crate::zone_transfer::{ProbeOutcome, TcpZoneTransfer, ZoneNode, ZoneTransfer, ZoneTransferProber};

/// 工作线程数的上下限
pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 32;

/// 扫描配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 工作线程数，实际使用时限制在 1..=32
    pub threads: usize,
    /// 扫描 AAAA 记录
    pub ipv6: bool,
    /// TLD 扫描模式
    pub tld: bool,
    /// 只做区域传送
    pub zone_transfer_only: bool,
    /// 命中后递归扫描子域名
    pub recursive: bool,
    /// 递归深度上限
    pub max_depth: Option<usize>,
    /// 输出时域名在前
    pub domain_first: bool,
    /// 工作线程取队列的等待时间
    pub idle_timeout: Duration,
    /// 等待每个工作线程结束的时间
    pub join_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            threads: 8,
            ipv6: false,
            tld: false,
            zone_transfer_only: false,
            recursive: false,
            max_depth: None,
            domain_first: false,
            idle_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(1024),
        }
    }
}

impl ScanConfig {
    pub fn worker_count(&self) -> usize {
        self.threads.clamp(MIN_THREADS, MAX_THREADS)
    }

    /// TLD 模式查 NS，`ipv6` 查 AAAA，否则查 A
    ///
    /// 两者同时设置时 TLD 优先，命令行上 `-6` 与 `-T` 互斥。
    pub fn record_kind(&self) -> RecordKind {
        if self.tld {
            RecordKind::NS
        } else if self.ipv6 {
            RecordKind::AAAA
        } else {
            RecordKind::A
        }
    }

    pub fn mode(&self) -> ScanMode {
        if self.tld {
            ScanMode::Tld
        } else {
            ScanMode::Subdomain
        }
    }
}

/// 单个目标的扫描结果
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub target: String,
    pub hits: Vec<Hit>,
    pub addresses: BTreeSet<IpAddr>,
    pub wildcard: WildcardSet,
    /// 实际解析过的候选数量
    pub resolved: usize,
}

impl ScanReport {
    /// 还没开始暴破时的空结果
    fn empty(target: &str, wildcard: WildcardSet) -> Self {
        ScanReport {
            target: target.to_string(),
            hits: Vec::new(),
            addresses: BTreeSet::new(),
            wildcard,
            resolved: 0,
        }
    }
}

/// 单个目标的处理结果
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    Scanned(ScanReport),
    ZoneTransferred {
        target: String,
        nameserver: String,
        address: IpAddr,
        nodes: Vec<ZoneNode>,
    },
    /// 仅区域传送模式下传送失败
    ZoneTransferFailed,
    Cancelled(ScanReport),
}

/// 整次运行的结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// 全部目标扫描完成，`addresses` 为所有目标的地址合集
    Completed {
        reports: Vec<ScanReport>,
        addresses: BTreeSet<IpAddr>,
    },
    /// 某个目标区域传送成功，运行到此结束
    ZoneTransferred {
        target: String,
        nameserver: String,
        address: IpAddr,
        nodes: Vec<ZoneNode>,
    },
    /// 仅区域传送模式下没有任何目标传送成功
    ZoneTransferFailed { targets: Vec<String> },
    Cancelled { addresses: BTreeSet<IpAddr> },
}

/// 枚举引擎
///
/// 对每个目标依次执行：区域传送探测、辅助记录收集、泛解析检测，
/// 然后用工作线程池跑完字典。
pub struct EnumerationEngine {
    config: ScanConfig,
    resolver: Arc<dyn Resolve>,
    transfer: Arc<dyn ZoneTransfer>,
    words: Arc<Vec<String>>,
    reporter: Arc<Reporter>,
    cancel: CancelToken,
}

impl EnumerationEngine {
    pub fn new(
        config: ScanConfig,
        resolver: Arc<dyn Resolve>,
        transfer: Arc<dyn ZoneTransfer>,
        words: Vec<String>,
        reporter: Arc<Reporter>,
    ) -> Self {
        EnumerationEngine {
            config,
            resolver,
            transfer,
            words: Arc::new(words),
            reporter,
            cancel: CancelToken::new(),
        }
    }

    /// 使用外部的取消标记（例如 Ctrl-C 处理函数持有的那个）
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// 依次扫描所有目标
    pub fn run(&self, targets: &[String]) -> RunOutcome {
        let mut reports = Vec::new();
        let mut addresses = BTreeSet::new();
        let mut failed_transfers = Vec::new();

        for target in targets {
            if self.cancel.is_cancelled() {
                return RunOutcome::Cancelled { addresses };
            }
            match self.scan_target(target) {
                TargetOutcome::Scanned(report) => {
                    addresses.extend(report.addresses.iter().copied());
                    reports.push(report);
                }
                TargetOutcome::ZoneTransferred {
                    target,
                    nameserver,
                    address,
                    nodes,
                } => {
                    return RunOutcome::ZoneTransferred {
                        target,
                        nameserver,
                        address,
                        nodes,
                    }
                }
                TargetOutcome::ZoneTransferFailed => failed_transfers.push(target.clone()),
                TargetOutcome::Cancelled(report) => {
                    addresses.extend(report.addresses.iter().copied());
                    return RunOutcome::Cancelled { addresses };
                }
            }
        }

        if self.config.zone_transfer_only {
            return RunOutcome::ZoneTransferFailed {
                targets: failed_transfers,
            };
        }
        RunOutcome::Completed { reports, addresses }
    }

    /// 扫描单个目标
    pub fn scan_target(&self, target: &str) -> TargetOutcome {
        let target = target.trim().trim_end_matches('.');
        let kind = self.config.record_kind();
        let queue = WorkQueue::new();
        let mut wildcard = WildcardSet::default();

        self.reporter.status(&format!("Processing domain {}", target));
        self.reporter.status(&format!("Using {}", self.resolver.describe()));

        if self.config.tld {
            if target.contains('.') {
                self.reporter
                    .warn("Warning: TLD scanning works best with just the domain root");
            }
            self.reporter.good("TLD Scan");
            queue.seed_suffixes(target, &self.words);
        } else {
            // 目标本身也要解析一次
            queue.push(Candidate::new(target, 0));

            let prober = ZoneTransferProber::new(
                self.resolver.as_ref(),
                self.transfer.as_ref(),
                &self.reporter,
                &self.cancel,
            );
            match prober.probe(target) {
                ProbeOutcome::Transferred {
                    nameserver,
                    address,
                    nodes,
                } => {
                    return TargetOutcome::ZoneTransferred {
                        target: target.to_string(),
                        nameserver,
                        address,
                        nodes,
                    }
                }
                ProbeOutcome::Cancelled => return TargetOutcome::Cancelled(ScanReport::empty(target, wildcard)),
                ProbeOutcome::Failed => {}
            }
            self.reporter.warn("Zone transfer failed");
            self.reporter.line("");
            if self.config.zone_transfer_only {
                return TargetOutcome::ZoneTransferFailed;
            }

            let harvester = Harvester::new(self.resolver.as_ref(), &self.reporter);
            harvester.ipv6(target);
            if self.cancel.is_cancelled() {
                return TargetOutcome::Cancelled(ScanReport::empty(target, wildcard));
            }
            harvester.txt(target);
            if self.cancel.is_cancelled() {
                return TargetOutcome::Cancelled(ScanReport::empty(target, wildcard));
            }
            harvester.mx(target, &self.words, &queue);
            if self.cancel.is_cancelled() {
                return TargetOutcome::Cancelled(ScanReport::empty(target, wildcard));
            }

            wildcard = WildcardDetector::new(self.resolver.clone(), kind).detect(target);
            if self.cancel.is_cancelled() {
                return TargetOutcome::Cancelled(ScanReport::empty(target, wildcard));
            }
            if wildcard.is_empty() {
                self.reporter.verbose("No wildcard domain found");
            } else {
                for address in wildcard.sorted() {
                    self.reporter.good(&format!("Wildcard domain found - {}", address));
                }
            }

            self.reporter
                .status(&format!("Scanning {} for {} records", target, kind));
            queue.seed_words(&self.words, target, 1);
        }

        let ctx = Arc::new(ScanContext {
            target: target.to_string(),
            kind,
            mode: self.config.mode(),
            resolver: self.resolver.clone(),
            wildcard: Arc::new(wildcard),
            words: self.words.clone(),
            recursion: RecursionPolicy {
                enabled: self.config.recursive && !self.config.tld,
                max_depth: self.config.max_depth,
            },
            domain_first: self.config.domain_first,
            state: ScanState::new(),
            reporter: self.reporter.clone(),
            cancel: self.cancel.child(),
            idle_timeout: self.config.idle_timeout,
        });

        let exit = match WorkerPool::spawn(ctx.clone(), queue.clone(), self.config.worker_count()) {
            Ok(pool) => pool.join(self.config.join_timeout),
            Err(e) => {
                warn!("could not start worker threads: {}, scanning on the current thread", e);
                scanner::run_worker(&ctx, &queue);
                if ctx.cancel.is_cancelled() {
                    PoolExit::Cancelled
                } else {
                    PoolExit::Drained
                }
            }
        };
        self.reporter.clear_progress();

        let report = ScanReport {
            target: target.to_string(),
            hits: ctx.state.hits(),
            addresses: ctx.state.addresses(),
            wildcard: ctx.wildcard.as_ref().clone(),
            resolved: ctx.state.resolved(),
        };
        info!(
            "{}: {} candidates resolved, {} hits ({:?})",
            report.target,
            report.resolved,
            report.hits.len(),
            exit
        );

        match exit {
            PoolExit::Cancelled => TargetOutcome::Cancelled(report),
            PoolExit::TimedOut if self.cancel.is_cancelled() => TargetOutcome::Cancelled(report),
            PoolExit::TimedOut | PoolExit::Drained => TargetOutcome::Scanned(report),
        }
    }
}

/// 使用系统解析器和内置字典扫描一组域名
///
/// 不输出任何内容，结果通过返回值获取。
pub fn enumerate_subdomains(domains: Vec<String>, words: Option<Vec<String>>) -> Result<RunOutcome, ScanError> {
    if domains.is_empty() {
        return Err(ScanError::NoTargets);
    }
    let resolver = SystemResolver::new(&ResolverSettings::default()).map_err(ScanError::ResolverSetup)?;
    let words = words.unwrap_or_else(subdata::default_subdomains);

    let engine = EnumerationEngine::new(
        ScanConfig::default(),
        Arc::new(resolver),
        Arc::new(TcpZoneTransfer::default()),
        words,
        Arc::new(Reporter::new(false, true)),
    );
    Ok(engine.run(&domains))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_clamped() {
        let mut config = ScanConfig::default();
        assert_eq!(config.worker_count(), 8);

        config.threads = 0;
        assert_eq!(config.worker_count(), 1);

        config.threads = 500;
        assert_eq!(config.worker_count(), 32);
    }

    #[test]
    fn test_record_kind_and_mode() {
        let mut config = ScanConfig::default();
        assert_eq!(config.record_kind(), RecordKind::A);
        assert_eq!(config.mode(), ScanMode::Subdomain);

        config.ipv6 = true;
        assert_eq!(config.record_kind(), RecordKind::AAAA);

        // TLD 模式优先
        config.tld = true;
        assert_eq!(config.record_kind(), RecordKind::NS);
        assert_eq!(config.mode(), ScanMode::Tld);
    }

    #[test]
    fn test_enumerate_requires_domains() {
        assert!(matches!(enumerate_subdomains(Vec::new(), None), Err(ScanError::NoTargets)));
    }
}
