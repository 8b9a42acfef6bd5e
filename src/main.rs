use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::warn;
use rdnscan::api::{EnumerationEngine, RunOutcome, ScanConfig};
use rdnscan::dns_resolver::{check_resolver, SystemResolver};
use rdnscan::error::ScanError;
use rdnscan::input::{self, Opts};
use rdnscan::logger;
use rdnscan::output::{AddressFile, Reporter};
use rdnscan::state::CancelToken;
use rdnscan::zone_transfer::TcpZoneTransfer;

fn main() -> ExitCode {
    let opts = Opts::parse();
    logger::init_logger(opts.verbose);

    // 重定向输出时关闭颜色
    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let reporter = match opts.output {
        Some(ref path) => match Reporter::with_output_file(path, opts.verbose, opts.silent) {
            Ok(reporter) => reporter,
            Err(e) => {
                Reporter::new(opts.verbose, opts.silent).fatal(&e.to_string());
                return ExitCode::FAILURE;
            }
        },
        None => Reporter::new(opts.verbose, opts.silent),
    };
    let reporter = Arc::new(reporter);

    let code = match run(&opts, &reporter) {
        Ok(code) => code,
        Err(e) => {
            reporter.fatal(&e.to_string());
            ExitCode::FAILURE
        }
    };
    reporter.close();
    code
}

/// 执行扫描主逻辑
fn run(opts: &Opts, reporter: &Arc<Reporter>) -> Result<ExitCode, ScanError> {
    let words = input::load_words(opts.wordlist.as_deref(), opts.tld)?;
    let ip_file = opts.output_ips.as_deref().map(AddressFile::create).transpose()?;

    let settings = opts.resolver_settings()?;
    let resolver = SystemResolver::new(&settings).map_err(ScanError::ResolverSetup)?;
    if check_resolver(&resolver).is_err() {
        return Err(ScanError::NoResolver);
    }

    if let Some(ref list) = opts.list {
        reporter.verbose(&format!("Domain list provided, will parse {} for domains.", list.display()));
    }
    let targets = input::targets(opts)?;

    // Ctrl-C 只设置取消标记，由主线程负责收尾
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("could not install interrupt handler: {}", e);
    }

    let engine = EnumerationEngine::new(
        ScanConfig::from(opts),
        Arc::new(resolver),
        Arc::new(TcpZoneTransfer::default()),
        words,
        reporter.clone(),
    )
    .with_cancel_token(cancel);

    match engine.run(&targets) {
        RunOutcome::Completed { addresses, .. } => {
            if let Some(file) = ip_file {
                file.write(&addresses)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::ZoneTransferred { .. } => Ok(ExitCode::SUCCESS),
        RunOutcome::ZoneTransferFailed { .. } => Ok(ExitCode::FAILURE),
        RunOutcome::Cancelled { .. } => {
            reporter.fatal("Caught interrupt, quitting...");
            Ok(ExitCode::FAILURE)
        }
    }
}
