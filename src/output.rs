use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

use colored::*;
use log::warn;

use crate::error::ScanError;
use crate::state::{Answer, Hit};

/// 面向操作者的输出
///
/// 每一行同时写到终端和（可选的）输出文件，文件写入有锁保护，
/// 多个工作线程同时输出时不会出现半行交错。
pub struct Reporter {
    file: Mutex<Option<BufWriter<File>>>,
    verbose: bool,
    silent: bool,
    progress: bool,
}

impl Reporter {
    pub fn new(verbose: bool, silent: bool) -> Self {
        Reporter {
            file: Mutex::new(None),
            verbose,
            silent,
            progress: !silent && io::stdout().is_terminal(),
        }
    }

    /// 同时镜像到输出文件
    pub fn with_output_file(path: &Path, verbose: bool, silent: bool) -> Result<Self, ScanError> {
        let file = File::create(path).map_err(|source| ScanError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        let reporter = Reporter::new(verbose, silent);
        if let Ok(mut guard) = reporter.file.lock() {
            *guard = Some(BufWriter::new(file));
        }
        Ok(reporter)
    }

    pub fn status(&self, message: &str) {
        self.emit(&format!("{}{}", "[*] ".blue(), message), &format!("[*] {}", message));
    }

    pub fn good(&self, message: &str) {
        self.emit(&format!("{}{}", "[+] ".green(), message), &format!("[+] {}", message));
    }

    pub fn warn(&self, message: &str) {
        self.emit(&format!("{}{}", "[-] ".red(), message), &format!("[-] {}", message));
    }

    pub fn verbose(&self, message: &str) {
        if self.verbose {
            self.emit(&format!("{}{}", "[v] ".yellow(), message), &format!("[v] {}", message));
        }
    }

    /// 致命错误总是输出到 stderr
    pub fn fatal(&self, message: &str) {
        eprintln!("\n{}", format!("FATAL: {}", message).red());
        self.write_file(&format!("FATAL {}", message));
    }

    /// 原样输出一行
    pub fn line(&self, text: &str) {
        self.emit(text, text);
    }

    /// `plain` 写入文件，`colored` 打印到终端
    pub fn pair(&self, colored: &str, plain: &str) {
        self.emit(colored, plain);
    }

    pub fn hit(&self, hit: &Hit, domain_first: bool) {
        let colored = match &hit.answer {
            Answer::Address(ip) if !domain_first => {
                format!("{} - {}", ip, hit.domain.yellow())
            }
            answer => format!("{} - {}", hit.domain, answer.to_string().yellow()),
        };
        self.emit(&colored, &format_hit(hit, domain_first));
    }

    /// 终端上显示当前正在解析的域名（回车覆盖，不写文件）
    pub fn progress(&self, domain: &str) {
        if self.progress {
            let mut stdout = io::stdout().lock();
            let _ = write!(stdout, "{:<40}\r", domain);
            let _ = stdout.flush();
        }
    }

    pub fn clear_progress(&self) {
        if self.progress {
            let _ = writeln!(io::stdout().lock(), "{:<40}", "");
        }
    }

    /// 刷新并关闭输出文件
    pub fn close(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(mut file) = guard.take() {
                if let Err(e) = file.flush() {
                    warn!("flushing output file failed: {}", e);
                }
            }
        }
    }

    fn emit(&self, terminal: &str, plain: &str) {
        // 管道被关闭时 println! 会 panic，这里忽略写入错误
        if !self.silent {
            let _ = writeln!(io::stdout().lock(), "{}", terminal);
        }
        self.write_file(plain);
    }

    fn write_file(&self, plain: &str) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                if let Err(e) = writeln!(file, "{}", plain) {
                    warn!("writing output file failed: {}", e);
                }
            }
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.close();
    }
}

/// 命中结果的纯文本格式
///
/// 地址结果默认 `地址 - 域名`，`domain_first` 时反过来；
/// TLD 扫描结果总是 `域名 - 名称服务器`。
pub fn format_hit(hit: &Hit, domain_first: bool) -> String {
    match &hit.answer {
        Answer::Address(ip) if !domain_first => format!("{} - {}", ip, hit.domain),
        answer => format!("{} - {}", hit.domain, answer),
    }
}

/// 发现地址的输出文件，启动时创建，结束时写入排序后的地址
pub struct AddressFile {
    file: BufWriter<File>,
}

impl AddressFile {
    pub fn create(path: &Path) -> Result<Self, ScanError> {
        let file = File::create(path).map_err(|source| ScanError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(AddressFile {
            file: BufWriter::new(file),
        })
    }

    pub fn write(mut self, addresses: &BTreeSet<IpAddr>) -> io::Result<()> {
        write_addresses(&mut self.file, addresses)?;
        self.file.flush()
    }
}

/// 每行一个地址，按地址顺序
pub fn write_addresses<W: Write>(writer: &mut W, addresses: &BTreeSet<IpAddr>) -> io::Result<()> {
    for address in addresses {
        writeln!(writer, "{}", address)?;
    }
    Ok(())
}
