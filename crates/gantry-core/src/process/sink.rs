use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const SINK_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives child output live, one line at a time, in arrival order.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write_line(&self, stream: OutputStream, line: &str);
}

/// Fans lines out to every sink through its own bounded queue. A full queue
/// drops the line for that sink only; readers never wait on a sink.
pub(crate) struct SinkFanout {
    queues: Vec<mpsc::Sender<(OutputStream, String)>>,
    forwarders: Vec<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl SinkFanout {
    pub(crate) fn start(sinks: &[Arc<dyn OutputSink>], capacity: usize) -> Self {
        let mut queues = Vec::with_capacity(sinks.len());
        let mut forwarders = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let (tx, mut rx) = mpsc::channel::<(OutputStream, String)>(capacity.max(1));
            let sink = Arc::clone(sink);
            forwarders.push(tokio::spawn(async move {
                while let Some((stream, line)) = rx.recv().await {
                    sink.write_line(stream, &line).await;
                }
            }));
            queues.push(tx);
        }

        Self {
            queues,
            forwarders,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn handle(&self) -> FanoutHandle {
        FanoutHandle {
            queues: self.queues.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Closes the queues and waits, at most `grace`, until every sink has
    /// seen what was queued. Returns the number of lines dropped.
    pub(crate) async fn finish(self, grace: Duration) -> u64 {
        drop(self.queues);
        let deadline = Instant::now() + grace;
        for forwarder in self.forwarders {
            let abort = forwarder.abort_handle();
            if tokio::time::timeout_at(deadline, forwarder).await.is_err() {
                abort.abort();
            }
        }
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub(crate) struct FanoutHandle {
    queues: Vec<mpsc::Sender<(OutputStream, String)>>,
    dropped: Arc<AtomicU64>,
}

impl FanoutHandle {
    pub(crate) fn send(&self, stream: OutputStream, line: &str) {
        for queue in &self.queues {
            if queue.try_send((stream, line.to_string())).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Collects lines in memory.
#[derive(Default)]
pub struct MemoryOutputSink {
    lines: std::sync::Mutex<Vec<(OutputStream, String)>>,
}

impl MemoryOutputSink {
    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl OutputSink for MemoryOutputSink {
    async fn write_line(&self, stream: OutputStream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledSink;

    #[async_trait]
    impl OutputSink for StalledSink {
        async fn write_line(&self, _stream: OutputStream, _line: &str) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    #[tokio::test]
    async fn delivers_lines_in_order() {
        let memory = Arc::new(MemoryOutputSink::default());
        let fanout = SinkFanout::start(&[memory.clone() as Arc<dyn OutputSink>], 16);
        let handle = fanout.handle();

        handle.send(OutputStream::Stdout, "one");
        handle.send(OutputStream::Stderr, "two");
        handle.send(OutputStream::Stdout, "three");
        drop(handle);

        assert_eq!(fanout.finish(Duration::from_secs(5)).await, 0);
        assert_eq!(memory.text(), "one\ntwo\nthree");
        assert_eq!(memory.lines()[1].0, OutputStream::Stderr);
    }

    #[tokio::test]
    async fn stalled_sink_drops_lines_without_blocking_sender() {
        let fanout = SinkFanout::start(&[Arc::new(StalledSink) as Arc<dyn OutputSink>], 2);
        let handle = fanout.handle();

        for i in 0..10 {
            handle.send(OutputStream::Stdout, &format!("line {i}"));
        }

        drop(handle);

        assert!(fanout.finish(Duration::from_millis(50)).await >= 7);
    }
}
