//! 名称服务器探测与 AXFR 区域传送
//!
//! 区域传送成功即视为完整结果，后续的字典暴破不再需要。

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

use colored::*;
use itertools::Itertools;
use log::debug;
use trust_dns_resolver::proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_resolver::proto::rr::{Name, Record, RecordType};

use crate::dns_resolver::{settle, trim_root, DnsError, DnsRecord, RecordKind, Resolve};
use crate::output::Reporter;
use crate::state::CancelToken;

/// 区域中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneRecord {
    pub name: String,
    pub ttl: u32,
    pub class: String,
    pub rtype: String,
    pub data: String,
}

impl ZoneRecord {
    pub fn new(name: &str, ttl: u32, rtype: &str, data: &str) -> Self {
        ZoneRecord {
            name: name.to_string(),
            ttl,
            class: "IN".to_string(),
            rtype: rtype.to_string(),
            data: data.to_string(),
        }
    }
}

impl From<&Record> for ZoneRecord {
    fn from(record: &Record) -> Self {
        ZoneRecord {
            name: record.name().to_string(),
            ttl: record.ttl(),
            class: record.dns_class().to_string(),
            rtype: record.record_type().to_string(),
            data: record.data().map(|data| data.to_string()).unwrap_or_default(),
        }
    }
}

impl fmt::Display for ZoneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} {}", self.name, self.ttl, self.class, self.rtype, self.data)
    }
}

/// 同一个所有者名称下的全部记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneNode {
    pub name: String,
    pub records: Vec<ZoneRecord>,
}

impl fmt::Display for ZoneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.records.iter().map(|record| record.to_string()).join("\n");
        f.write_str(&text)
    }
}

/// 按名称分组并排序，去掉重复记录（AXFR 结尾会重复 SOA）
pub fn zone_nodes(records: Vec<ZoneRecord>) -> Vec<ZoneNode> {
    records
        .into_iter()
        .unique()
        .into_group_map_by(|record| record.name.to_lowercase())
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, records)| ZoneNode {
            name: records[0].name.clone(),
            records,
        })
        .collect()
}

/// 区域传送传输层
pub trait ZoneTransfer: Send + Sync {
    fn transfer(&self, server: IpAddr, zone: &str) -> Result<Vec<ZoneRecord>, DnsError>;
}

/// AXFR 应答流的收集器
///
/// 第一条记录必须是 SOA，再次遇到 SOA 表示传送结束。
#[derive(Debug, Default)]
pub struct AxfrCollector {
    records: Vec<ZoneRecord>,
    soa_count: usize,
}

impl AxfrCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一条应答消息，传送完成时返回 true
    pub fn push(&mut self, message: &Message) -> Result<bool, DnsError> {
        let code = message.response_code();
        if code != ResponseCode::NoError {
            return Err(DnsError::Rcode(format!("{:?}", code)));
        }
        if message.answers().is_empty() && self.records.is_empty() {
            return Err(DnsError::Malformed("empty zone transfer answer".to_string()));
        }

        for record in message.answers() {
            let is_soa = record.record_type() == RecordType::SOA;
            if self.records.is_empty() && !is_soa {
                return Err(DnsError::Malformed("zone transfer did not start with SOA".to_string()));
            }
            self.records.push(ZoneRecord::from(record));
            if is_soa {
                self.soa_count += 1;
                if self.soa_count == 2 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn finish(self) -> Vec<ZoneRecord> {
        self.records
    }
}

/// DNS over TCP 的 AXFR 实现
#[derive(Debug, Clone)]
pub struct TcpZoneTransfer {
    port: u16,
    timeout: Duration,
}

impl Default for TcpZoneTransfer {
    fn default() -> Self {
        TcpZoneTransfer {
            port: 53,
            timeout: Duration::from_secs(5),
        }
    }
}

impl TcpZoneTransfer {
    pub fn new(port: u16, timeout: Duration) -> Self {
        TcpZoneTransfer { port, timeout }
    }

    fn query(zone: &str) -> Result<Vec<u8>, DnsError> {
        let name = Name::from_ascii(zone).map_err(|e| DnsError::Malformed(e.to_string()))?;
        let mut message = Message::new();
        message
            .set_id(rand::random::<u16>())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(false)
            .add_query(Query::query(name, RecordType::AXFR));
        message.to_vec().map_err(|e| DnsError::Malformed(e.to_string()))
    }
}

impl ZoneTransfer for TcpZoneTransfer {
    fn transfer(&self, server: IpAddr, zone: &str) -> Result<Vec<ZoneRecord>, DnsError> {
        let query = Self::query(zone)?;
        let mut stream = TcpStream::connect_timeout(&SocketAddr::new(server, self.port), self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        write_frame(&mut stream, &query)?;

        let mut collector = AxfrCollector::new();
        loop {
            let frame = match read_frame(&mut stream) {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(DnsError::Malformed("connection closed before closing SOA".to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            let message = Message::from_vec(&frame).map_err(|e| DnsError::Malformed(e.to_string()))?;
            if collector.push(&message)? {
                return Ok(collector.finish());
            }
        }
    }
}

/// 写入带两字节长度前缀的消息
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u16::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "DNS message too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// 读取一条带两字节长度前缀的消息
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let mut frame = vec![0u8; u16::from_be_bytes(len_bytes) as usize];
    reader.read_exact(&mut frame)?;
    Ok(frame)
}

/// 区域传送探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Transferred {
        nameserver: String,
        address: IpAddr,
        nodes: Vec<ZoneNode>,
    },
    Failed,
    /// 取消标记在尝试之间被设置
    Cancelled,
}

/// 名称服务器探测器
pub struct ZoneTransferProber<'a> {
    resolver: &'a dyn Resolve,
    transfer: &'a dyn ZoneTransfer,
    reporter: &'a Reporter,
    cancel: &'a CancelToken,
}

impl<'a> ZoneTransferProber<'a> {
    pub fn new(
        resolver: &'a dyn Resolve,
        transfer: &'a dyn ZoneTransfer,
        reporter: &'a Reporter,
        cancel: &'a CancelToken,
    ) -> Self {
        ZoneTransferProber {
            resolver,
            transfer,
            reporter,
            cancel,
        }
    }

    /// 目标域名的名称服务器（去掉末尾的点）
    pub fn nameservers(&self, target: &str) -> Vec<String> {
        settle(target, RecordKind::NS, self.resolver.resolve(target, RecordKind::NS))
            .into_iter()
            .filter_map(|record| match record {
                DnsRecord::NS(ns) => Some(trim_root(&ns).to_string()),
                _ => None,
            })
            .collect()
    }

    /// 依次对每个名称服务器的每个地址尝试区域传送，第一次成功即返回
    ///
    /// 每次查询和传送前检查取消标记。
    pub fn probe(&self, target: &str) -> ProbeOutcome {
        let nameservers = self.nameservers(target);
        self.reporter.good("Getting nameservers");
        if nameservers.is_empty() {
            self.reporter.warn("Getting nameservers failed");
            return ProbeOutcome::Failed;
        }

        for nameserver in nameservers {
            if self.cancel.is_cancelled() {
                return ProbeOutcome::Cancelled;
            }
            let addresses: Vec<IpAddr> = settle(
                &nameserver,
                RecordKind::A,
                self.resolver.resolve(&nameserver, RecordKind::A),
            )
            .iter()
            .filter_map(|record| record.address())
            .collect();

            for address in addresses {
                if self.cancel.is_cancelled() {
                    return ProbeOutcome::Cancelled;
                }
                self.reporter.pair(
                    &format!("{} - {}", address, nameserver.yellow()),
                    &format!("{} - {}", address, nameserver),
                );
                self.reporter.verbose(&format!("Trying zone transfer against {}", nameserver));

                match self.transfer.transfer(address, target) {
                    Ok(records) => {
                        let nodes = zone_nodes(records);
                        self.reporter
                            .good(&format!("Zone transfer successful using nameserver {}", nameserver));
                        for node in &nodes {
                            self.reporter.line(&node.to_string());
                        }
                        return ProbeOutcome::Transferred {
                            nameserver,
                            address,
                            nodes,
                        };
                    }
                    Err(e) => debug!("zone transfer of {} from {} ({}) failed: {}", target, nameserver, address, e),
                }
            }
        }
        ProbeOutcome::Failed
    }
}

/// 内存中的区域传送实现
///
/// 只有登记过的服务器地址接受传送，其余返回 REFUSED。
#[derive(Debug, Default)]
pub struct StaticZoneTransfer {
    zones: HashMap<IpAddr, Vec<ZoneRecord>>,
    attempts: Mutex<Vec<IpAddr>>,
}

impl StaticZoneTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, server: IpAddr, records: Vec<ZoneRecord>) -> Self {
        self.zones.insert(server, records);
        self
    }

    /// 尝试过的服务器地址
    pub fn attempts(&self) -> Vec<IpAddr> {
        match self.attempts.lock() {
            Ok(attempts) => attempts.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl ZoneTransfer for StaticZoneTransfer {
    fn transfer(&self, server: IpAddr, _zone: &str) -> Result<Vec<ZoneRecord>, DnsError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(server);
        }
        self.zones
            .get(&server)
            .cloned()
            .ok_or_else(|| DnsError::Rcode("Refused".to_string()))
    }
}
