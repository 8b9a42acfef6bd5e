use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 启动阶段的致命错误
///
/// 这些错误会直接终止进程（退出码 1），不做重试。
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Could not open wordlist {path}: {source}")]
    WordList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Domain list {0} doesn't exist!")]
    DomainListMissing(PathBuf),

    #[error("Couldn't read {path}, {source}")]
    DomainList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not open output file: {path}: {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid resolver address {0}, expected IP or IP:PORT")]
    ResolverAddress(String),

    #[error("Could not initialise DNS resolver: {0}")]
    ResolverSetup(#[source] io::Error),

    #[error("No valid DNS resolver. Set a custom resolver with -R <resolver>")]
    NoResolver,

    #[error("Target list is empty")]
    NoTargets,

    #[error(transparent)]
    Io(#[from] io::Error),
}
