//! 内置字典
//!
//! 未指定 `-w` 时使用：普通扫描用常见子域名，TLD 扫描用常见后缀。

static SUBDOMAINS: &[&str] = &[
    "www", "mail", "ftp", "localhost", "webmail", "smtp", "pop", "ns1", "webdisk", "ns2",
    "cpanel", "whm", "autodiscover", "autoconfig", "m", "imap", "test", "ns", "blog",
    "pop3", "dev", "www2", "admin", "forum", "news", "vpn", "ns3", "mail2", "new", "mysql",
    "old", "lists", "support", "mobile", "mx", "static", "docs", "beta", "shop", "sql",
    "secure", "demo", "cp", "calendar", "wiki", "web", "media", "email", "images", "img",
    "www1", "intranet", "portal", "video", "sip", "dns2", "api", "cdn", "stats", "dns1",
    "ns4", "www3", "dns", "search", "staging", "server", "mx1", "chat", "wap", "my", "svn",
    "mail1", "sites", "proxy", "ads", "host", "crm", "cms", "backup", "mx2",
    "lyncdiscover", "info", "apps", "download", "remote", "db", "forums", "store", "relay",
    "files", "newsletter", "app", "live", "owa", "en", "start", "sms", "office",
    "exchange", "ipv4", "git", "gitlab", "jenkins", "jira", "confluence", "grafana",
    "kibana", "prometheus", "vault", "auth", "sso", "login", "id", "accounts", "status",
    "monitor", "internal", "corp", "extranet", "partners", "dashboard", "assets",
    "uploads", "cloud", "s3", "origin", "edge", "gateway", "mq", "redis", "elastic", "k8s",
    "registry", "ci", "build", "qa", "uat", "preprod", "prod", "sandbox",
];

static TLDS: &[&str] = &[
    "com", "net", "org", "info", "biz", "edu", "gov", "mil", "int", "io", "co", "ai",
    "app", "dev", "me", "tv", "cc", "us", "uk", "co.uk", "org.uk", "ac.uk", "de", "fr",
    "it", "es", "nl", "be", "ch", "at", "se", "no", "dk", "fi", "pl", "cz", "sk", "hu",
    "ro", "bg", "gr", "pt", "ie", "ru", "ua", "by", "kz", "cn", "com.cn", "hk", "tw", "jp",
    "co.jp", "kr", "in", "sg", "my", "th", "vn", "id", "ph", "au", "com.au", "nz", "ca",
    "mx", "br", "com.br", "ar", "cl", "pe", "co.za", "za", "ng", "eg", "ae", "sa", "il",
    "tr", "ir", "pk", "bd", "lk",
];

pub fn get_default_sub_next_data() -> &'static [&'static str] {
    SUBDOMAINS
}

pub fn get_default_tld_data() -> &'static [&'static str] {
    TLDS
}

/// 内置子域名字典
pub fn default_subdomains() -> Vec<String> {
    SUBDOMAINS.iter().map(|&s| s.to_string()).collect()
}

/// 内置 TLD 字典
pub fn default_tlds() -> Vec<String> {
    TLDS.iter().map(|&s| s.to_string()).collect()
}
