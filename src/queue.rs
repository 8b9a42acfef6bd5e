use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::state::CancelToken;

/// 待解析的候选域名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub name: String,
    /// 0 为目标本身，字典种子为 1，递归每层加 1
    pub depth: usize,
}

impl Candidate {
    pub fn new(name: impl Into<String>, depth: usize) -> Self {
        Candidate {
            name: name.into(),
            depth,
        }
    }
}

/// 共享的候选队列
///
/// 无界、先进先出、允许重复。`outstanding` 统计已入队但还没有
/// `task_done` 的候选数（包括正在解析的），队列为空且该计数为 0 时
/// 工作线程才会退出。
#[derive(Debug, Clone)]
pub struct WorkQueue {
    sender: Sender<Candidate>,
    receiver: Receiver<Candidate>,
    outstanding: Arc<AtomicUsize>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        WorkQueue {
            sender,
            receiver,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&self, candidate: Candidate) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(candidate).is_err() {
            // 接收端与发送端同属本结构，正常情况下不会断开
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// 以 `{word}.{root}` 形式入队整个字典，返回入队数量
    pub fn seed_words(&self, words: &[String], root: &str, depth: usize) -> usize {
        for word in words {
            self.push(Candidate::new(format!("{}.{}", word, root), depth));
        }
        words.len()
    }

    /// TLD 模式：以 `{root}.{tld}` 形式入队
    pub fn seed_suffixes(&self, root: &str, suffixes: &[String]) -> usize {
        for suffix in suffixes {
            self.push(Candidate::new(format!("{}.{}", root, suffix), 1));
        }
        suffixes.len()
    }

    /// 取出下一个候选
    ///
    /// 每次最多等待 `idle`；等待超时后如果没有未完成的工作则返回 None，
    /// 否则继续等待（其它线程可能正在递归入队）。取消后立即返回 None。
    pub fn next(&self, idle: Duration, cancel: &CancelToken) -> Option<Candidate> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.receiver.recv_timeout(idle) {
                Ok(candidate) => {
                    if cancel.is_cancelled() {
                        self.task_done();
                        return None;
                    }
                    return Some(candidate);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.outstanding.load(Ordering::SeqCst) == 0 {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// 标记一个取出的候选处理完成
    pub fn task_done(&self) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// 队列中等待的候选数
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// 已入队但未完成的候选数
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// 取出当前所有等待的候选（不计入完成）
    pub fn drain(&self) -> Vec<Candidate> {
        self.receiver.try_iter().collect()
    }
}
