//! # Event Sinks
//!
//! Destinations for [`EscrowEvent`]s, with the same two-phase shape as the
//! ledger: `stage` does everything that can fail, `publish` and `discard`
//! cannot fail. A staged event that is discarded is never observed.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};

use parking_lot::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

use escrow_core::EscrowId;

use crate::error::EventSinkError;
use crate::event::EscrowEvent;

/// A staged, not yet published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEvent {
    id: Uuid,
    event: EscrowEvent,
}

impl StagedEvent {
    /// Issue a ticket for `event`.
    pub fn new(event: EscrowEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
        }
    }

    /// The ticket id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The staged event.
    pub fn event(&self) -> &EscrowEvent {
        &self.event
    }
}

/// An audit event destination with two-phase emission.
pub trait EventSink: Send + Sync {
    /// Check and reserve an event.
    ///
    /// # Errors
    ///
    /// Any reason the event cannot be guaranteed to publish.
    fn stage(&self, event: EscrowEvent) -> Result<StagedEvent, EventSinkError>;

    /// Make a staged event visible.
    fn publish(&self, staged: StagedEvent);

    /// Drop a staged event.
    fn discard(&self, staged: StagedEvent);
}

// ── In-memory log ───────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EventLog {
    published: Vec<EscrowEvent>,
    staged: HashMap<Uuid, EscrowEvent>,
    fail_next: Option<String>,
}

/// Append-only in-memory event log.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    log: Mutex<EventLog>,
}

impl MemoryEventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events in publication order.
    pub fn events(&self) -> Vec<EscrowEvent> {
        self.log.lock().published.clone()
    }

    /// Published events of one escrow, in order.
    pub fn events_for(&self, escrow_id: EscrowId) -> Vec<EscrowEvent> {
        self.log
            .lock()
            .published
            .iter()
            .filter(|e| e.escrow_id == escrow_id)
            .cloned()
            .collect()
    }

    /// Number of published events.
    pub fn len(&self) -> usize {
        self.log.lock().published.len()
    }

    /// Whether nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of staged, unsettled events.
    pub fn staged_count(&self) -> usize {
        self.log.lock().staged.len()
    }

    /// Make the next `stage` fail with [`EventSinkError::Unavailable`].
    pub fn fail_next_stage(&self, reason: impl Into<String>) {
        self.log.lock().fail_next = Some(reason.into());
    }
}

impl EventSink for MemoryEventLog {
    fn stage(&self, event: EscrowEvent) -> Result<StagedEvent, EventSinkError> {
        let mut log = self.log.lock();
        if let Some(reason) = log.fail_next.take() {
            return Err(EventSinkError::Unavailable(reason));
        }
        let staged = StagedEvent::new(event);
        log.staged.insert(staged.id, staged.event.clone());
        Ok(staged)
    }

    fn publish(&self, staged: StagedEvent) {
        let mut log = self.log.lock();
        match log.staged.remove(&staged.id) {
            Some(event) => log.published.push(event),
            None => warn!(ticket = %staged.id, "publish of unknown event ticket ignored"),
        }
    }

    fn discard(&self, staged: StagedEvent) {
        self.log.lock().staged.remove(&staged.id);
    }
}

// ── JSON lines ──────────────────────────────────────────────────────

#[derive(Debug)]
struct LineWriter<W> {
    writer: W,
    staged: HashMap<Uuid, String>,
    backlog: VecDeque<String>,
    /// Bytes of the backlog's front line already accepted by the writer.
    front_offset: usize,
    written: u64,
}

impl<W: Write> LineWriter<W> {
    fn drain_backlog(&mut self) -> io::Result<()> {
        while let Some(line) = self.backlog.front() {
            let len = line.len();
            match self.writer.write(&line.as_bytes()[self.front_offset..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "event writer accepted no bytes",
                    ));
                }
                Ok(n) => self.front_offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            if self.front_offset >= len {
                self.backlog.pop_front();
                self.front_offset = 0;
                self.written += 1;
            }
        }
        self.writer.flush()
    }
}

/// Writes one JSON object per line to `W`.
///
/// Serialization happens at `stage`. Published lines go through an
/// in-order backlog: if the writer fails, lines stay queued and the next
/// `stage` retries them first, failing (and so blocking further commits)
/// until the writer recovers. A line the writer took only part of resumes
/// at the first unwritten byte. No published event is dropped, duplicated,
/// or reordered.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    inner: Mutex<LineWriter<W>>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(LineWriter {
                writer,
                staged: HashMap::new(),
                backlog: VecDeque::new(),
                front_offset: 0,
                written: 0,
            }),
        }
    }

    /// Lines published but not yet written.
    pub fn backlog_len(&self) -> usize {
        self.inner.lock().backlog.len()
    }

    /// Lines successfully written.
    pub fn lines_written(&self) -> u64 {
        self.inner.lock().written
    }

    /// Unwrap the writer. Unwritten backlog lines are lost.
    pub fn into_inner(self) -> W {
        self.inner.into_inner().writer
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn stage(&self, event: EscrowEvent) -> Result<StagedEvent, EventSinkError> {
        let mut inner = self.inner.lock();
        inner.drain_backlog()?;
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let staged = StagedEvent::new(event);
        inner.staged.insert(staged.id, line);
        Ok(staged)
    }

    fn publish(&self, staged: StagedEvent) {
        let mut inner = self.inner.lock();
        let Some(line) = inner.staged.remove(&staged.id) else {
            warn!(ticket = %staged.id, "publish of unknown event ticket ignored");
            return;
        };
        inner.backlog.push_back(line);
        match inner.drain_backlog() {
            Ok(()) => debug!(escrow_id = %staged.event.escrow_id, event = staged.event.name(), "event written"),
            Err(e) => error!(
                error = %e,
                backlog = inner.backlog.len(),
                "event write failed; line kept in backlog"
            ),
        }
    }

    fn discard(&self, staged: StagedEvent) {
        self.inner.lock().staged.remove(&staged.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::created;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(id: u64) -> EscrowEvent {
        EscrowEvent::created(&created(id))
    }

    #[test]
    fn memory_log_publishes_in_order() {
        let log = MemoryEventLog::new();
        for id in 1..=3 {
            let staged = log.stage(event(id)).unwrap();
            log.publish(staged);
        }
        let ids: Vec<u64> = log.events().iter().map(|e| e.escrow_id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(log.events_for(EscrowId::new(2)).len(), 1);
    }

    #[test]
    fn discarded_event_is_never_visible() {
        let log = MemoryEventLog::new();
        let staged = log.stage(event(1)).unwrap();
        assert_eq!(log.staged_count(), 1);
        log.discard(staged);
        assert!(log.is_empty());
        assert_eq!(log.staged_count(), 0);
    }

    #[test]
    fn memory_log_failure_injection() {
        let log = MemoryEventLog::new();
        log.fail_next_stage("disk full");
        assert!(matches!(
            log.stage(event(1)),
            Err(EventSinkError::Unavailable(_))
        ));
        assert!(log.stage(event(1)).is_ok());
    }

    #[test]
    fn json_lines_one_object_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        for id in 1..=2 {
            let staged = sink.stage(event(id)).unwrap();
            sink.publish(staged);
        }
        let discarded = sink.stage(event(3)).unwrap();
        sink.discard(discarded);
        assert_eq!(sink.lines_written(), 2);
        let bytes = sink.into_inner();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: EscrowEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.escrow_id, EscrowId::new(1));
    }

    #[test]
    fn json_lines_to_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = JsonLinesSink::new(file.reopen().unwrap());
        let staged = sink.stage(event(9)).unwrap();
        sink.publish(staged);
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("\"event\":\"created\""));
        assert!(text.ends_with('\n'));
    }

    /// A writer that fails while `broken` is set.
    struct Flaky {
        broken: Arc<AtomicBool>,
        out: Vec<u8>,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "broken pipe"));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_keeps_backlog_and_blocks_staging() {
        let broken = Arc::new(AtomicBool::new(false));
        let sink = JsonLinesSink::new(Flaky {
            broken: Arc::clone(&broken),
            out: Vec::new(),
        });
        let staged = sink.stage(event(1)).unwrap();
        broken.store(true, Ordering::SeqCst);
        sink.publish(staged);
        assert_eq!(sink.backlog_len(), 1);
        assert!(matches!(sink.stage(event(2)), Err(EventSinkError::Io(_))));

        broken.store(false, Ordering::SeqCst);
        let staged = sink.stage(event(2)).unwrap();
        assert_eq!(sink.backlog_len(), 0);
        sink.publish(staged);
        let out = String::from_utf8(sink.into_inner().out).unwrap();
        let ids: Vec<u64> = out
            .lines()
            .map(|l| serde_json::from_str::<EscrowEvent>(l).unwrap().escrow_id.value())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    /// A writer that takes at most `budget` more bytes, then fails.
    struct Metered {
        budget: Arc<AtomicUsize>,
        out: Vec<u8>,
    }

    impl Write for Metered {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let budget = self.budget.load(Ordering::SeqCst);
            if budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "quota exhausted"));
            }
            let n = budget.min(buf.len());
            self.out.extend_from_slice(&buf[..n]);
            self.budget.fetch_sub(n, Ordering::SeqCst);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partially_written_line_resumes_without_duplication() {
        let budget = Arc::new(AtomicUsize::new(10));
        let sink = JsonLinesSink::new(Metered {
            budget: Arc::clone(&budget),
            out: Vec::new(),
        });
        let staged = sink.stage(event(1)).unwrap();
        sink.publish(staged);
        assert_eq!(sink.backlog_len(), 1);
        assert_eq!(sink.lines_written(), 0);
        assert!(matches!(sink.stage(event(2)), Err(EventSinkError::Io(_))));

        budget.store(1 << 20, Ordering::SeqCst);
        let staged = sink.stage(event(2)).unwrap();
        sink.publish(staged);
        assert_eq!(sink.backlog_len(), 0);
        assert_eq!(sink.lines_written(), 2);

        let out = String::from_utf8(sink.into_inner().out).unwrap();
        let ids: Vec<u64> = out
            .lines()
            .map(|l| serde_json::from_str::<EscrowEvent>(l).unwrap().escrow_id.value())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
