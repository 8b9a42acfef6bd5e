use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};

use crate::api::ScanConfig;
use crate::dns_resolver::ResolverSettings;
use crate::error::ScanError;
use crate::subdata;

#[derive(Parser, Debug)]
#[command(name = "rdnscan")]
#[command(author = "o0x1024")]
#[command(version)]
#[command(about = "DNS reconnaissance: subdomain brute force, wildcard filtering and zone transfers", long_about = None, arg_required_else_help = true)]
#[command(group(ArgGroup::new("target").required(true).args(["domain", "list"])))]
pub struct Opts {
    /// Target domain
    #[arg(short, long)]
    pub domain: Option<String>,

    /// File containing list of target domains
    #[arg(short, long)]
    pub list: Option<PathBuf>,

    /// Wordlist (defaults to the built-in subdomain or TLD list)
    #[arg(short, long)]
    pub wordlist: Option<PathBuf>,

    /// Number of threads, clamped to 1..32
    #[arg(short, long, default_value_t = 8)]
    pub threads: usize,

    /// Scan for AAAA records
    #[arg(short = '6', long, conflicts_with = "tld")]
    pub ipv6: bool,

    /// Only perform zone transfers
    #[arg(short = 'z', long)]
    pub zonetransfer: bool,

    /// Recursively scan subdomains
    #[arg(short, long)]
    pub recursive: bool,

    /// Maximum recursion depth (unbounded when omitted)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Use the specified resolver instead of the system default (IP or IP:PORT)
    #[arg(short = 'R', long)]
    pub resolver: Option<String>,

    /// Scan for TLDs
    #[arg(short = 'T', long)]
    pub tld: bool,

    /// Write output to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write discovered IP addresses to a file
    #[arg(short = 'i', long = "output-ips")]
    pub output_ips: Option<PathBuf>,

    /// Output domain first, rather than IP address
    #[arg(short = 'D', long)]
    pub domain_first: bool,

    /// Verbose mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Only write results to the output files
    #[arg(short, long)]
    pub silent: bool,
}

impl Opts {
    /// 解析器配置，`-R` 地址无效时报错
    pub fn resolver_settings(&self) -> Result<ResolverSettings, ScanError> {
        let mut settings = ResolverSettings::default();
        if let Some(ref value) = self.resolver {
            let address = ResolverSettings::parse_nameserver(value)
                .ok_or_else(|| ScanError::ResolverAddress(value.clone()))?;
            settings.nameserver = Some(address);
        }
        Ok(settings)
    }
}

impl From<&Opts> for ScanConfig {
    fn from(opts: &Opts) -> Self {
        ScanConfig {
            threads: opts.threads,
            ipv6: opts.ipv6,
            tld: opts.tld,
            zone_transfer_only: opts.zonetransfer,
            recursive: opts.recursive,
            max_depth: opts.max_depth,
            domain_first: opts.domain_first,
            ..Default::default()
        }
    }
}

/// 按行拆分，去掉首尾空白并跳过空行
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// 读取字典，未指定时按模式使用内置字典
pub fn load_words(path: Option<&Path>, tld: bool) -> Result<Vec<String>, ScanError> {
    match path {
        Some(path) => fs::read_to_string(path)
            .map(|content| parse_lines(&content))
            .map_err(|source| ScanError::WordList {
                path: path.to_path_buf(),
                source,
            }),
        None if tld => Ok(subdata::default_tlds()),
        None => Ok(subdata::default_subdomains()),
    }
}

/// 读取目标域名列表
pub fn load_targets(path: &Path) -> Result<Vec<String>, ScanError> {
    if !path.is_file() {
        return Err(ScanError::DomainListMissing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ScanError::DomainList {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_lines(&content))
}

/// 命令行指定的全部目标
pub fn targets(opts: &Opts) -> Result<Vec<String>, ScanError> {
    let targets = match (&opts.domain, &opts.list) {
        (Some(domain), _) => parse_lines(domain),
        (None, Some(list)) => load_targets(list)?,
        (None, None) => Vec::new(),
    };
    if targets.is_empty() {
        return Err(ScanError::NoTargets);
    }
    Ok(targets)
}
