use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use log::{debug, warn};

use crate::dns_resolver::{settle, trim_root, DnsRecord, RecordKind, Resolve};
use crate::output::Reporter;
use crate::queue::{Candidate, WorkQueue};
use crate::state::{CancelToken, Hit, ScanState};
use crate::wildcard::WildcardSet;

/// join 时检查取消标记的间隔
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// 扫描模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// 子域名暴破，A 或 AAAA
    Subdomain,
    /// 顶级域名扫描，NS
    Tld,
}

/// 递归策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecursionPolicy {
    pub enabled: bool,
    /// 候选深度上限，None 表示不限制
    pub max_depth: Option<usize>,
}

impl RecursionPolicy {
    /// 命中后的候选是否继续展开
    pub fn allows(&self, candidate: &Candidate, target: &str) -> bool {
        self.enabled
            && !candidate.name.eq_ignore_ascii_case(target)
            && self.max_depth.map_or(true, |max| candidate.depth < max)
    }
}

/// 一次目标扫描中所有工作线程共享的上下文
pub struct ScanContext {
    pub target: String,
    pub kind: RecordKind,
    pub mode: ScanMode,
    pub resolver: Arc<dyn Resolve>,
    pub wildcard: Arc<WildcardSet>,
    pub words: Arc<Vec<String>>,
    pub recursion: RecursionPolicy,
    pub domain_first: bool,
    pub state: ScanState,
    pub reporter: Arc<Reporter>,
    pub cancel: CancelToken,
    pub idle_timeout: Duration,
}

impl ScanContext {
    pub fn new(target: &str, resolver: Arc<dyn Resolve>, reporter: Arc<Reporter>) -> Self {
        ScanContext {
            target: target.to_string(),
            kind: RecordKind::A,
            mode: ScanMode::Subdomain,
            resolver,
            wildcard: Arc::new(WildcardSet::default()),
            words: Arc::new(Vec::new()),
            recursion: RecursionPolicy::default(),
            domain_first: false,
            state: ScanState::new(),
            reporter,
            cancel: CancelToken::new(),
            idle_timeout: Duration::from_secs(1),
        }
    }
}

/// 解析单个候选，返回新增的命中数
pub fn process_candidate(ctx: &ScanContext, queue: &WorkQueue, candidate: &Candidate) -> usize {
    if ctx.cancel.is_cancelled() {
        return 0;
    }
    ctx.reporter.progress(&candidate.name);

    let records = settle(
        &candidate.name,
        ctx.kind,
        ctx.resolver.resolve(&candidate.name, ctx.kind),
    );
    ctx.state.mark_resolved();

    match ctx.mode {
        ScanMode::Tld => tld_hit(ctx, candidate, records),
        ScanMode::Subdomain => {
            let mut hits = 0;
            for address in records.iter().filter_map(|record| record.address()) {
                // 泛解析地址直接丢弃
                if ctx.wildcard.contains(&address) {
                    continue;
                }
                let hit = Hit::address(&candidate.name, address);
                ctx.reporter.hit(&hit, ctx.domain_first);
                ctx.state.add_hit(hit);
                hits += 1;
            }

            if hits > 0 && ctx.recursion.allows(candidate, &ctx.target) {
                let added = queue.seed_words(&ctx.words, &candidate.name, candidate.depth + 1);
                debug!("recursing into {}: {} candidates", candidate.name, added);
            }
            hits
        }
    }
}

/// TLD 模式下取排序后的第一个名称服务器
fn tld_hit(ctx: &ScanContext, candidate: &Candidate, records: Vec<DnsRecord>) -> usize {
    let mut nameservers: Vec<String> = records
        .into_iter()
        .filter_map(|record| match record {
            DnsRecord::NS(ns) => Some(trim_root(&ns).to_string()),
            _ => None,
        })
        .collect();
    nameservers.sort();

    match nameservers.first() {
        Some(first) => {
            let hit = Hit::nameserver(&candidate.name, first);
            ctx.reporter.hit(&hit, ctx.domain_first);
            ctx.state.add_hit(hit);
            1
        }
        None => 0,
    }
}

/// 工作线程主循环：取候选、解析、标记完成，直到队列耗尽或被取消
///
/// 单个候选处理中的 panic 被就地吞掉，候选照常标记完成，线程继续工作。
pub fn run_worker(ctx: &ScanContext, queue: &WorkQueue) {
    while let Some(candidate) = queue.next(ctx.idle_timeout, &ctx.cancel) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| process_candidate(ctx, queue, &candidate)));
        if let Err(payload) = result {
            debug!("{} failed: {}", candidate.name, panic_message(payload.as_ref()));
        }
        queue.task_done();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "panic"
    }
}

/// 工作线程池的退出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExit {
    /// 队列耗尽，全部线程正常退出
    Drained,
    /// 某个线程超过等待时间，剩余线程被放弃
    TimedOut,
    /// 收到取消信号
    Cancelled,
}

/// 固定大小的工作线程池
pub struct WorkerPool {
    ctx: Arc<ScanContext>,
    done: Receiver<usize>,
    workers: usize,
}

impl WorkerPool {
    /// 启动 `threads` 个工作线程消费队列
    pub fn spawn(ctx: Arc<ScanContext>, queue: WorkQueue, threads: usize) -> io::Result<Self> {
        let (done_tx, done) = unbounded();
        let mut workers = 0;

        for id in 0..threads.max(1) {
            let worker_ctx = ctx.clone();
            let worker_queue = queue.clone();
            let worker_done = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("scan-worker-{}", id))
                .spawn(move || {
                    run_worker(&worker_ctx, &worker_queue);
                    let _ = worker_done.send(id);
                });

            match spawned {
                Ok(_) => workers += 1,
                Err(e) => {
                    if workers == 0 {
                        return Err(e);
                    }
                    warn!("could not spawn worker {}: {}, continuing with {}", id, e, workers);
                    break;
                }
            }
        }

        Ok(WorkerPool { ctx, done, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 逐个等待工作线程结束，每个线程最多等待 `per_worker`
    ///
    /// 超时后取消本次扫描并直接返回，未结束的线程被放弃。
    pub fn join(self, per_worker: Duration) -> PoolExit {
        let mut remaining = self.workers;
        while remaining > 0 {
            let deadline = Instant::now() + per_worker;
            loop {
                if self.ctx.cancel.is_cancelled() {
                    return PoolExit::Cancelled;
                }
                let now = Instant::now();
                if now >= deadline {
                    warn!("worker join timed out, abandoning {} worker(s)", remaining);
                    self.ctx.cancel.cancel();
                    return PoolExit::TimedOut;
                }
                match self.done.recv_timeout(CANCEL_POLL.min(deadline - now)) {
                    Ok(_) => {
                        remaining -= 1;
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    // 所有发送端都已释放（线程 panic 也会走到这里）
                    Err(RecvTimeoutError::Disconnected) => return PoolExit::Drained,
                }
            }
        }
        PoolExit::Drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_resolver::{DnsError, StaticResolver};
    use std::net::{IpAddr, Ipv4Addr};

    struct SlowResolver(Duration);

    impl Resolve for SlowResolver {
        fn resolve(&self, _name: &str, _kind: RecordKind) -> Result<Vec<DnsRecord>, DnsError> {
            thread::sleep(self.0);
            Err(DnsError::NxDomain)
        }
    }

    /// 对某个名称直接 panic，其余交给内层解析器
    struct PanickyResolver {
        bad: &'static str,
        inner: StaticResolver,
    }

    impl Resolve for PanickyResolver {
        fn resolve(&self, name: &str, kind: RecordKind) -> Result<Vec<DnsRecord>, DnsError> {
            if name == self.bad {
                panic!("resolver blew up on {}", name);
            }
            self.inner.resolve(name, kind)
        }
    }

    fn panicky(bad: &'static str) -> Arc<PanickyResolver> {
        Arc::new(PanickyResolver {
            bad,
            inner: StaticResolver::new().with_a("www.example.com", &[Ipv4Addr::new(1, 2, 3, 4)]),
        })
    }

    fn words(list: &[&str]) -> Arc<Vec<String>> {
        Arc::new(list.iter().map(|w| w.to_string()).collect())
    }

    fn reporter() -> Arc<Reporter> {
        Arc::new(Reporter::new(false, true))
    }

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn test_recursion_policy() {
        let policy = RecursionPolicy {
            enabled: true,
            max_depth: Some(2),
        };
        assert!(policy.allows(&Candidate::new("www.example.com", 1), "example.com"));
        assert!(!policy.allows(&Candidate::new("a.www.example.com", 2), "example.com"));
        assert!(!policy.allows(&Candidate::new("Example.com", 0), "example.com"));
        assert!(!RecursionPolicy::default().allows(&Candidate::new("www.example.com", 1), "example.com"));

        let unbounded = RecursionPolicy {
            enabled: true,
            max_depth: None,
        };
        assert!(unbounded.allows(&Candidate::new("x.y.z.example.com", 40), "example.com"));
    }

    #[test]
    fn test_wildcard_addresses_are_dropped() {
        let resolver = StaticResolver::new().with_a(
            "www.example.com",
            &[Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(1, 2, 3, 4)],
        );
        let mut ctx = ScanContext::new("example.com", Arc::new(resolver), reporter());
        ctx.wildcard = Arc::new([ip("10.0.0.1")].into_iter().collect());
        let queue = WorkQueue::new();

        let hits = process_candidate(&ctx, &queue, &Candidate::new("www.example.com", 1));

        assert_eq!(hits, 1);
        assert_eq!(ctx.state.hits(), vec![Hit::address("www.example.com", ip("1.2.3.4"))]);
        assert!(!ctx.state.addresses().contains(&ip("10.0.0.1")));
    }

    #[test]
    fn test_recursion_enqueues_one_candidate_per_word() {
        let resolver = StaticResolver::new().with_a("dev.example.com", &[Ipv4Addr::new(1, 2, 3, 4)]);
        let mut ctx = ScanContext::new("example.com", Arc::new(resolver), reporter());
        ctx.words = words(&["www", "mail", "dev"]);
        ctx.recursion.enabled = true;
        let queue = WorkQueue::new();

        process_candidate(&ctx, &queue, &Candidate::new("dev.example.com", 1));

        let queued = queue.drain();
        assert_eq!(queued.len(), 3);
        assert!(queued.iter().all(|c| c.depth == 2 && c.name.ends_with(".dev.example.com")));
    }

    #[test]
    fn test_no_recursion_without_flag_or_for_target() {
        let resolver = StaticResolver::new()
            .with_a("example.com", &[Ipv4Addr::new(1, 1, 1, 1)])
            .with_a("dev.example.com", &[Ipv4Addr::new(1, 2, 3, 4)]);
        let mut ctx = ScanContext::new("example.com", Arc::new(resolver), reporter());
        ctx.words = words(&["www", "mail"]);
        let queue = WorkQueue::new();

        process_candidate(&ctx, &queue, &Candidate::new("dev.example.com", 1));
        assert!(queue.is_empty());

        ctx.recursion.enabled = true;
        process_candidate(&ctx, &queue, &Candidate::new("example.com", 0));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_no_recursion_when_only_wildcard_answers() {
        let resolver = StaticResolver::new().with_a("dev.example.com", &[Ipv4Addr::new(10, 0, 0, 1)]);
        let mut ctx = ScanContext::new("example.com", Arc::new(resolver), reporter());
        ctx.words = words(&["www"]);
        ctx.recursion.enabled = true;
        ctx.wildcard = Arc::new([ip("10.0.0.1")].into_iter().collect());
        let queue = WorkQueue::new();

        assert_eq!(process_candidate(&ctx, &queue, &Candidate::new("dev.example.com", 1)), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_tld_mode_reports_first_nameserver() {
        let resolver = StaticResolver::new().with(
            "example.de",
            RecordKind::NS,
            vec![
                DnsRecord::NS("ns2.example.de.".to_string()),
                DnsRecord::NS("ns1.example.de.".to_string()),
            ],
        );
        let mut ctx = ScanContext::new("example", Arc::new(resolver), reporter());
        ctx.kind = RecordKind::NS;
        ctx.mode = ScanMode::Tld;
        let queue = WorkQueue::new();

        assert_eq!(process_candidate(&ctx, &queue, &Candidate::new("example.de", 1)), 1);
        assert_eq!(process_candidate(&ctx, &queue, &Candidate::new("example.fr", 1)), 0);
        assert_eq!(ctx.state.hits(), vec![Hit::nameserver("example.de", "ns1.example.de")]);
        assert!(ctx.state.addresses().is_empty());
    }

    #[test]
    fn test_pool_drains_queue() {
        let resolver = StaticResolver::new()
            .with_a("www.example.com", &[Ipv4Addr::new(1, 2, 3, 4)])
            .with_a("mail.example.com", &[Ipv4Addr::new(1, 2, 3, 5)]);
        let mut ctx = ScanContext::new("example.com", Arc::new(resolver), reporter());
        ctx.idle_timeout = Duration::from_millis(20);
        let ctx = Arc::new(ctx);
        let queue = WorkQueue::new();
        queue.seed_words(&words(&["www", "mail", "ftp", "dev"]), "example.com", 1);

        let pool = WorkerPool::spawn(ctx.clone(), queue.clone(), 4).unwrap();
        assert_eq!(pool.workers(), 4);
        assert_eq!(pool.join(Duration::from_secs(10)), PoolExit::Drained);

        assert_eq!(ctx.state.resolved(), 4);
        assert_eq!(ctx.state.addresses().len(), 2);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_pool_join_times_out() {
        let mut ctx = ScanContext::new(
            "example.com",
            Arc::new(SlowResolver(Duration::from_millis(500))),
            reporter(),
        );
        ctx.idle_timeout = Duration::from_millis(20);
        let ctx = Arc::new(ctx);
        let queue = WorkQueue::new();
        queue.push(Candidate::new("www.example.com", 1));

        let pool = WorkerPool::spawn(ctx.clone(), queue, 1).unwrap();
        assert_eq!(pool.join(Duration::from_millis(50)), PoolExit::TimedOut);
        assert!(ctx.cancel.is_cancelled());
    }

    #[test]
    fn test_pool_join_observes_cancel() {
        let parent = CancelToken::new();
        let mut ctx = ScanContext::new(
            "example.com",
            Arc::new(SlowResolver(Duration::from_millis(200))),
            reporter(),
        );
        ctx.cancel = parent.child();
        ctx.idle_timeout = Duration::from_millis(20);
        let queue = WorkQueue::new();
        queue.seed_words(&words(&["a", "b", "c", "d"]), "example.com", 1);

        let pool = WorkerPool::spawn(Arc::new(ctx), queue, 2).unwrap();
        parent.cancel();
        assert_eq!(pool.join(Duration::from_secs(10)), PoolExit::Cancelled);
    }

    #[test]
    fn test_panicking_candidate_does_not_stall_pool() {
        let mut ctx = ScanContext::new("example.com", panicky("bad.example.com"), reporter());
        ctx.idle_timeout = Duration::from_millis(20);
        let ctx = Arc::new(ctx);
        let queue = WorkQueue::new();
        queue.seed_words(&words(&["bad", "a", "b", "www"]), "example.com", 1);

        let started = Instant::now();
        let pool = WorkerPool::spawn(ctx.clone(), queue.clone(), 2).unwrap();
        assert_eq!(pool.join(Duration::from_secs(5)), PoolExit::Drained);

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(queue.outstanding(), 0);
        assert_eq!(ctx.state.hits(), vec![Hit::address("www.example.com", ip("1.2.3.4"))]);
    }

    #[test]
    fn test_single_worker_survives_panicking_candidate() {
        let mut ctx = ScanContext::new("example.com", panicky("bad.example.com"), reporter());
        ctx.idle_timeout = Duration::from_millis(20);
        let ctx = Arc::new(ctx);
        let queue = WorkQueue::new();
        queue.seed_words(&words(&["a", "bad", "b", "www"]), "example.com", 1);

        let pool = WorkerPool::spawn(ctx.clone(), queue.clone(), 1).unwrap();
        assert_eq!(pool.join(Duration::from_secs(5)), PoolExit::Drained);

        // bad 之后的 b 和 www 仍然被解析
        assert_eq!(ctx.state.resolved(), 3);
        assert_eq!(ctx.state.hits().len(), 1);
        assert_eq!(queue.outstanding(), 0);
    }
}
