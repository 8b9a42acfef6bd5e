//! # rdnscan
//!
//! 一个基于Rust实现的多线程DNS侦察工具库。
//!
//! ## 特性
//!
//! - 🔍 **子域名暴破**: 多线程解析字典，支持递归扫描
//! - 🃏 **泛解析过滤**: 自动检测泛解析地址并从结果中剔除
//! - 📦 **区域传送**: 对每个名称服务器尝试 AXFR，成功即输出整个区域
//! - 📬 **辅助记录**: 收集 AAAA、TXT、MX 记录，MX 中的子域名自动加入扫描
//! - 🌐 **TLD 扫描**: 查找同名域名在其它后缀下的注册情况
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use rdnscan::{enumerate_subdomains, RunOutcome};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let domains = vec!["example.com".to_string()];
//!     if let RunOutcome::Completed { reports, addresses } = enumerate_subdomains(domains, None)? {
//!         for report in &reports {
//!             println!("{}: {} 个结果", report.target, report.hits.len());
//!         }
//!         println!("共 {} 个地址", addresses.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## 高级配置
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rdnscan::{EnumerationEngine, Reporter, ResolverSettings, ScanConfig, SystemResolver, TcpZoneTransfer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig {
//!         threads: 16,
//!         recursive: true,     // 命中后递归扫描
//!         max_depth: Some(3),
//!         ..Default::default()
//!     };
//!
//!     let resolver = SystemResolver::new(&ResolverSettings::default())?;
//!     let engine = EnumerationEngine::new(
//!         config,
//!         Arc::new(resolver),
//!         Arc::new(TcpZoneTransfer::default()),
//!         vec!["www".to_string(), "mail".to_string()],
//!         Arc::new(Reporter::new(false, false)),
//!     );
//!     let outcome = engine.run(&["example.com".to_string()]);
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod dns_resolver;
pub mod error;
pub mod harvest;
pub mod input;
pub mod logger;
pub mod output;
pub mod queue;
pub mod scanner;
pub mod state;
pub mod subdata;
pub mod wildcard;
pub mod zone_transfer;

// 重新导出主要的公共API
pub use api::{enumerate_subdomains, EnumerationEngine, RunOutcome, ScanConfig, ScanReport, TargetOutcome};

// 导出其他有用的类型
pub use dns_resolver::{DnsError, DnsRecord, RecordKind, Resolve, ResolverSettings, StaticResolver, SystemResolver};
pub use error::ScanError;
pub use output::{AddressFile, Reporter};
pub use queue::{Candidate, WorkQueue};
pub use state::{Answer, CancelToken, Hit, ScanState};
pub use wildcard::{WildcardDetector, WildcardSet};
pub use zone_transfer::{StaticZoneTransfer, TcpZoneTransfer, ZoneNode, ZoneRecord, ZoneTransfer};
