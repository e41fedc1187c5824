//! Bounded capture of sidecar output.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single line of console output from the sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Sequential ID for polling (`GET /api/sidecar/logs?since=<id>`).
    /// Starts at 1, so `since=0` returns everything.
    pub id: u64,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
    pub stream: LogStream,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Ring buffer that stores recent log lines with sequential IDs.
/// Oldest lines are evicted first once `max_size` is reached.
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    next_id: u64,
    max_size: usize,
}

impl LogBuffer {
    pub fn with_capacity(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            lines: VecDeque::with_capacity(max_size.min(1024)),
            next_id: 1,
            max_size,
        }
    }

    /// Push a new log line and return the created `LogLine`.
    pub fn push(&mut self, stream: LogStream, text: String) -> LogLine {
        let line = LogLine {
            id: self.next_id,
            timestamp: crate::utils::now_millis(),
            stream,
            text,
        };
        self.next_id += 1;

        while self.lines.len() >= self.max_size {
            self.lines.pop_front();
        }
        self.lines.push_back(line.clone());
        line
    }

    /// All retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    /// Get all lines with id > `since_id` (for polling).
    pub fn get_since(&self, since_id: u64) -> Vec<LogLine> {
        self.lines
            .iter()
            .filter(|l| l.id > since_id)
            .cloned()
            .collect()
    }

    /// Drop every line. Ids keep counting so pollers never see a reused id.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_query() {
        let mut buffer = LogBuffer::with_capacity(100);
        buffer.push(LogStream::Stdout, "line 0".into());
        buffer.push(LogStream::Stdout, "line 1".into());
        buffer.push(LogStream::Stderr, "err 0".into());

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get_since(0).len(), 3);
        assert_eq!(buffer.get_since(1).len(), 2);
        let all = buffer.snapshot();
        assert_eq!(all[0].text, "line 0");
        assert_eq!(all[2].stream, LogStream::Stderr);
    }

    #[test]
    fn ring_evicts_oldest_first() {
        let mut buffer = LogBuffer::with_capacity(10);
        for i in 0..250 {
            buffer.push(LogStream::Stdout, format!("line {}", i));
            assert!(buffer.len() <= 10);
        }
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines.first().unwrap().text, "line 240");
        assert_eq!(lines.last().unwrap().text, "line 249");
        assert!(lines.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn clear_keeps_id_sequence() {
        let mut buffer = LogBuffer::with_capacity(10);
        buffer.push(LogStream::Stdout, "a".into());
        buffer.push(LogStream::Stdout, "b".into());
        buffer.clear();
        assert!(buffer.is_empty());

        let next = buffer.push(LogStream::Stdout, "c".into());
        assert_eq!(next.id, 3);
    }

    #[test]
    fn zero_capacity_still_holds_one_line() {
        let mut buffer = LogBuffer::with_capacity(0);
        buffer.push(LogStream::Stdout, "a".into());
        buffer.push(LogStream::Stdout, "b".into());
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot()[0].text, "b");
    }
}
