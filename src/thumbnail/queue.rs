use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::path::PathBuf;

/// What a request wants back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Downscaled preview, served from the disk cache when possible
    Thumbnail,
    /// Full-size decode
    Full,
}

/// Dedup key: one piece of work per (normalised path, kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub path: String,
    pub kind: RequestKind,
}

/// A unit of decode work waiting for a worker
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub key: JobKey,
    pub path: PathBuf,
    /// Lower is more urgent
    pub priority: i32,
    seq: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    /// Max-heap order: lowest priority value first, then earliest arrival
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of decode jobs shared with the workers.
///
/// A key may be pushed again with a more urgent priority while it is still
/// waiting; whichever entry is popped first claims the key and the other
/// becomes a stale entry that `pop` skips.
#[derive(Debug, Default)]
pub struct LoadQueue {
    heap: BinaryHeap<QueuedJob>,
    waiting: HashSet<JobKey>,
    next_seq: u64,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: JobKey, path: PathBuf, priority: i32) {
        self.waiting.insert(key.clone());
        self.heap.push(QueuedJob {
            key,
            path,
            priority,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Most urgent job whose key is still unclaimed
    pub fn pop(&mut self) -> Option<QueuedJob> {
        while let Some(job) = self.heap.pop() {
            if self.waiting.remove(&job.key) {
                return Some(job);
            }
        }
        None
    }

    /// Withdraw a job nobody wants any more. Its heap entry is skipped by `pop`.
    pub fn forget(&mut self, key: &JobKey) -> bool {
        self.waiting.remove(key)
    }

    /// True while no worker has claimed `key`
    pub fn is_waiting(&self, key: &JobKey) -> bool {
        self.waiting.contains(key)
    }

    /// Jobs not yet claimed
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> JobKey {
        JobKey {
            path: path.to_string(),
            kind: RequestKind::Thumbnail,
        }
    }

    fn push(queue: &mut LoadQueue, path: &str, priority: i32) {
        queue.push(key(path), PathBuf::from(path), priority);
    }

    fn drain(queue: &mut LoadQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop()).map(|j| j.key.path).collect()
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = LoadQueue::new();
        push(&mut queue, "c", 5);
        push(&mut queue, "a", 1);
        push(&mut queue, "b", 1);
        push(&mut queue, "urgent", -3);

        assert_eq!(drain(&mut queue), vec!["urgent", "a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_raised_priority_claims_once() {
        let mut queue = LoadQueue::new();
        push(&mut queue, "a", 1);
        push(&mut queue, "slow", 10);
        push(&mut queue, "slow", 0);
        assert_eq!(queue.len(), 2);

        assert_eq!(drain(&mut queue), vec!["slow", "a"]);
    }

    #[test]
    fn test_forgotten_job_is_skipped() {
        let mut queue = LoadQueue::new();
        push(&mut queue, "old", 0);
        push(&mut queue, "new", 5);

        assert!(queue.forget(&key("old")));
        assert!(!queue.forget(&key("old")));
        assert_eq!(queue.len(), 1);
        assert_eq!(drain(&mut queue), vec!["new"]);
    }

    #[test]
    fn test_kinds_are_separate_keys() {
        let mut queue = LoadQueue::new();
        queue.push(key("p"), PathBuf::from("p"), 0);
        let full = JobKey {
            path: "p".to_string(),
            kind: RequestKind::Full,
        };
        queue.push(full.clone(), PathBuf::from("p"), 0);

        assert_eq!(queue.len(), 2);
        assert!(queue.is_waiting(&full));
        queue.pop();
        queue.pop();
        assert!(!queue.is_waiting(&full));
    }
}
