use std::net::Ipv6Addr;

use regex::RegexBuilder;

use crate::dns_resolver::{settle, DnsRecord, RecordKind, Resolve};
use crate::output::Reporter;
use crate::queue::{Candidate, WorkQueue};

/// 辅助记录收集：AAAA、TXT、MX
///
/// 全部尽力而为，查询失败只记日志，不影响后续扫描。
pub struct Harvester<'a> {
    resolver: &'a dyn Resolve,
    reporter: &'a Reporter,
}

impl<'a> Harvester<'a> {
    pub fn new(resolver: &'a dyn Resolve, reporter: &'a Reporter) -> Self {
        Harvester { resolver, reporter }
    }

    fn lookup(&self, target: &str, kind: RecordKind) -> Vec<DnsRecord> {
        settle(target, kind, self.resolver.resolve(target, kind))
    }

    /// 查询 AAAA 记录，有结果时提示使用 `-6` 扫描
    pub fn ipv6(&self, target: &str) -> Vec<Ipv6Addr> {
        self.reporter.verbose("Getting IPv6 (AAAA) records");
        let addresses: Vec<Ipv6Addr> = self
            .lookup(target, RecordKind::AAAA)
            .into_iter()
            .filter_map(|record| match record {
                DnsRecord::AAAA(ip) => Some(ip),
                _ => None,
            })
            .collect();

        if !addresses.is_empty() {
            self.reporter
                .good("IPv6 (AAAA) records found. Try running with the -6 option.");
            for address in &addresses {
                self.reporter.line(&address.to_string());
            }
            self.reporter.line("");
        }
        addresses
    }

    /// 查询并原样输出 TXT 记录
    pub fn txt(&self, target: &str) -> Vec<String> {
        self.reporter.verbose("Getting TXT records");
        let records: Vec<String> = self
            .lookup(target, RecordKind::TXT)
            .into_iter()
            .filter(|record| matches!(record, DnsRecord::TXT(_)))
            .map(|record| record.to_string())
            .collect();

        if !records.is_empty() {
            self.reporter.good("TXT records found");
            for record in &records {
                self.reporter.line(record);
            }
            self.reporter.line("");
        }
        records
    }

    /// 查询 MX 记录，目标下的邮件服务器子域名加入扫描队列
    ///
    /// 返回新入队的候选数量。
    pub fn mx(&self, target: &str, words: &[String], queue: &WorkQueue) -> usize {
        self.reporter.verbose("Getting MX records");
        let records = self.lookup(target, RecordKind::MX);
        if records.is_empty() {
            return 0;
        }

        self.reporter.good("MX records found, added to target list");
        let mut added = 0;
        for record in &records {
            let text = record.to_string();
            self.reporter.line(&text);
            if let Some(label) = mx_subdomain(&text, target) {
                if !words.iter().any(|word| *word == label) {
                    queue.push(Candidate::new(format!("{}.{}", label, target), 1));
                    added += 1;
                }
            }
        }
        self.reporter.line("");
        added
    }
}

/// 从 MX 文本中提取目标域名下的子域名部分
///
/// `10 mail.example.com.` 对 `example.com` 返回 `mail`，
/// 主机名不以 `.target` 结尾时返回 None。
pub fn mx_subdomain(mx_text: &str, target: &str) -> Option<String> {
    let pattern = format!(r"([a-z0-9.\-]+)\.{}\.?$", regex::escape(target));
    let regex = RegexBuilder::new(&pattern).case_insensitive(true).build().ok()?;
    regex
        .captures(mx_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_resolver::StaticResolver;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_mx_subdomain() {
        assert_eq!(mx_subdomain("10 mail.example.com.", "example.com"), Some("mail".to_string()));
        assert_eq!(mx_subdomain("5 MX1.Mail.Example.COM.", "example.com"), Some("MX1.Mail".to_string()));
        assert_eq!(mx_subdomain("10 aspmx.l.google.com.", "example.com"), None);
        assert_eq!(mx_subdomain("10 example.com.", "example.com"), None);
    }

    #[test]
    fn test_mx_target_is_escaped() {
        // `.` 不能当作任意字符匹配
        assert_eq!(mx_subdomain("10 mail.examplexcom.", "example.com"), None);
    }

    #[test]
    fn test_mx_target_must_end_the_host() {
        assert_eq!(mx_subdomain("10 mail.example.com.evil.net.", "example.com"), None);
        assert_eq!(mx_subdomain("10 mail.example.com", "example.com"), Some("mail".to_string()));
    }

    #[test]
    fn test_mx_feedback_enqueues_subdomain() {
        let resolver = StaticResolver::new().with(
            "example.com",
            RecordKind::MX,
            vec![DnsRecord::MX(10, "mail.example.com.".to_string())],
        );
        let reporter = Reporter::new(false, true);
        let queue = WorkQueue::new();

        let added = Harvester::new(&resolver, &reporter).mx("example.com", &words(&["www"]), &queue);

        assert_eq!(added, 1);
        let queued = queue.drain();
        assert_eq!(queued, vec![Candidate::new("mail.example.com", 1)]);
    }

    #[test]
    fn test_mx_feedback_skips_known_words_and_foreign_hosts() {
        let resolver = StaticResolver::new().with(
            "example.com",
            RecordKind::MX,
            vec![
                DnsRecord::MX(10, "mail.example.com.".to_string()),
                DnsRecord::MX(20, "aspmx.l.google.com.".to_string()),
            ],
        );
        let reporter = Reporter::new(false, true);
        let queue = WorkQueue::new();

        let added = Harvester::new(&resolver, &reporter).mx("example.com", &words(&["www", "mail"]), &queue);

        assert_eq!(added, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ipv6_and_txt() {
        let resolver = StaticResolver::new()
            .with(
                "example.com",
                RecordKind::AAAA,
                vec![DnsRecord::AAAA("2001:db8::1".parse().unwrap())],
            )
            .with(
                "example.com",
                RecordKind::TXT,
                vec![DnsRecord::TXT("v=spf1 -all".to_string())],
            );
        let reporter = Reporter::new(false, true);
        let harvester = Harvester::new(&resolver, &reporter);

        assert_eq!(harvester.ipv6("example.com"), vec!["2001:db8::1".parse::<Ipv6Addr>().unwrap()]);
        assert_eq!(harvester.txt("example.com"), vec!["\"v=spf1 -all\"".to_string()]);
        assert!(harvester.txt("example.org").is_empty());
    }
}
