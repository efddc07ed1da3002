//! JSON-lines event log on disk.
//!
//! [`LogFileEventer`] appends one JSON object per line to a single log
//! file. When a maximum size is configured the log is rotated in place:
//! the newest half is kept and a `system log-rotation` event is appended
//! in the same atomic replace.
//!
//! # Following
//!
//! Streaming readers poll the file and remember the last line they
//! consumed. If that line is no longer where they left it, the file was
//! rotated; the reader re-reads it and resumes right after that line, or
//! at the last rotation event if the line was trimmed away, so kept
//! history is not delivered twice.

use std::ffi::OsString;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

use super::eventer::{deliver, wait_until};
use super::{Eventer, EventerKind, ReadOptions};
use crate::domain::{Event, EventType, Status};
use crate::error::EventsError;

/// Shortest interval used when following the log.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Event logger writing JSON lines to a file.
#[derive(Debug)]
pub struct LogFileEventer {
    path: PathBuf,
    max_size: u64,
    poll_interval: Duration,
    write_lock: Mutex<()>,
}

impl LogFileEventer {
    /// Creates a file eventer. Nothing is touched on disk until the first
    /// write.
    ///
    /// `max_size` of zero disables rotation.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_size: u64, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            max_size,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the rotation threshold in bytes (zero when disabled).
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    async fn append(&self, bytes: &[u8]) -> Result<(), EventsError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| EventsError::io(&self.path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| EventsError::io(&self.path, e))?;
        file.flush().await.map_err(|e| EventsError::io(&self.path, e))
    }

    /// Rotates the log if appending `incoming` bytes would exceed the
    /// size limit. Must be called with the write lock held.
    async fn rotate_if_needed(&self, incoming: u64) -> Result<bool, EventsError> {
        if self.max_size == 0 {
            return Ok(false);
        }
        let size = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(EventsError::io(&self.path, e)),
        };
        if size.saturating_add(incoming) <= self.max_size {
            return Ok(false);
        }

        let content = fs::read(&self.path)
            .await
            .map_err(|e| EventsError::io(&self.path, e))?;
        let kept = newest_half(&content);

        // The marker lands in the same rename as the truncation, so a
        // follower never observes the shrunken log without it.
        let marker = Event::new(EventType::System, Status::LogRotation)
            .with_name(self.path.display().to_string());
        let mut rotated = kept.to_vec();
        rotated.extend_from_slice(marker.to_json_string()?.as_bytes());
        rotated.push(b'\n');

        let tmp = rotation_temp_path(&self.path);
        fs::write(&tmp, &rotated)
            .await
            .map_err(|e| EventsError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EventsError::io(&self.path, e))?;

        tracing::debug!(
            path = %self.path.display(),
            before = size,
            after = rotated.len(),
            "rotated event log"
        );
        Ok(true)
    }
}

#[async_trait]
impl Eventer for LogFileEventer {
    fn kind(&self) -> EventerKind {
        EventerKind::File
    }

    async fn write(&self, event: Event) -> Result<(), EventsError> {
        let mut line = event.to_json_string()?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| EventsError::io(parent, e))?;
        }
        self.rotate_if_needed(line.len() as u64).await?;
        self.append(line.as_bytes()).await
    }

    async fn read(
        &self,
        options: ReadOptions,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EventsError> {
        let filter = options.compile()?;
        let mut tail = LogTail::default();

        if let Some(batch) = tail.poll(&self.path).await?
            && options.replays_history()
        {
            for event in batch.events {
                if filter.matches(&event) && !deliver(&sink, event).await {
                    return Ok(());
                }
            }
        }

        if !options.stream {
            return Ok(());
        }

        let deadline = wait_until(filter.until());
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = sink.closed() => return Ok(()),
                () = &mut deadline => return Ok(()),
                _ = ticker.tick() => {
                    let Some(batch) = tail.poll(&self.path).await? else {
                        continue;
                    };
                    for event in batch.resumed() {
                        if filter.matches(&event) && !deliver(&sink, event).await {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Events decoded by one poll of the log.
#[derive(Debug, Default)]
struct Batch {
    events: Vec<Event>,
    /// Index of the first event a follower has not seen yet.
    resume_at: usize,
}

impl Batch {
    /// Returns the events not yet seen by a follower.
    fn resumed(self) -> Vec<Event> {
        let mut events = self.events;
        events.drain(..self.resume_at.min(events.len()));
        events
    }
}

/// Read position within a log file that may be rotated underneath it.
#[derive(Debug, Default)]
struct LogTail {
    /// Bytes read so far, including `pending`.
    offset: u64,
    /// Trailing bytes without a newline yet.
    pending: Vec<u8>,
    /// The last complete line consumed, newline included.
    anchor: Vec<u8>,
    /// Lines consumed so far.
    line_no: usize,
}

impl LogTail {
    /// Reads whatever was appended since the last poll. Returns `None`
    /// if the file does not exist.
    async fn poll(&mut self, path: &Path) -> Result<Option<Batch>, EventsError> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EventsError::io(path, e)),
        };

        // After a rotation the last consumed line, if still present in the
        // kept half, marks where this reader left off.
        let rotated = !self.anchor_intact(&mut file, path).await?;
        let previous = if rotated {
            std::mem::take(self).anchor
        } else {
            Vec::new()
        };

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| EventsError::io(path, e))?;
        let mut buf = Vec::new();
        let read = file
            .read_to_end(&mut buf)
            .await
            .map_err(|e| EventsError::io(path, e))?;
        self.offset = self.offset.saturating_add(read as u64);
        self.pending.extend_from_slice(&buf);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(Some(Batch::default()));
        };
        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();

        let mut events = Vec::new();
        let mut after_previous = None;
        for raw in complete.split_inclusive(|b| *b == b'\n') {
            self.line_no += 1;
            self.anchor = raw.to_vec();
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let event = Event::from_json_str(text).map_err(|e| match e {
                EventsError::InvalidEvent { message, .. } => EventsError::InvalidEvent {
                    line: self.line_no,
                    message,
                },
                other => other,
            })?;
            events.push(event);
            if rotated && raw == previous.as_slice() {
                after_previous = Some(events.len());
            }
        }

        let resume_at = if rotated {
            after_previous
                .or_else(|| events.iter().rposition(is_rotation_marker))
                .unwrap_or(0)
        } else {
            0
        };
        Ok(Some(Batch { events, resume_at }))
    }

    /// Returns `true` if the file still holds the last consumed line at
    /// the position it was read from.
    async fn anchor_intact(&self, file: &mut File, path: &Path) -> Result<bool, EventsError> {
        let len = file
            .metadata()
            .await
            .map_err(|e| EventsError::io(path, e))?
            .len();
        if len < self.offset {
            return Ok(false);
        }
        if self.anchor.is_empty() {
            return Ok(true);
        }

        let consumed_end = self.offset.saturating_sub(self.pending.len() as u64);
        let anchor_start = consumed_end.saturating_sub(self.anchor.len() as u64);
        file.seek(SeekFrom::Start(anchor_start))
            .await
            .map_err(|e| EventsError::io(path, e))?;
        let mut current = vec![0u8; self.anchor.len()];
        match file.read_exact(&mut current).await {
            Ok(_) => Ok(current == self.anchor),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(EventsError::io(path, e)),
        }
    }
}

fn is_rotation_marker(event: &Event) -> bool {
    event.event_type == EventType::System && event.status == Status::LogRotation
}

/// Returns the newest half of `content`, starting at a line boundary.
fn newest_half(content: &[u8]) -> &[u8] {
    let mid = content.len() / 2;
    if mid == 0 {
        return &[];
    }
    if content.get(mid - 1) == Some(&b'\n') {
        return content.get(mid..).unwrap_or_default();
    }
    content
        .get(mid..)
        .and_then(|rest| rest.iter().position(|b| *b == b'\n'))
        .and_then(|pos| content.get(mid + pos + 1..))
        .unwrap_or_default()
}

fn rotation_temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| OsString::from("events.log"));
    name.push(".rotate");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn container(name: &str, status: Status) -> Event {
        Event::new(EventType::Container, status)
            .with_id(format!("{name}0123456789abcdef"))
            .with_name(name)
            .with_image("alpine")
    }

    fn eventer_in(dir: &Path, max_size: u64) -> LogFileEventer {
        LogFileEventer::new(
            dir.join("events").join("events.log"),
            max_size,
            Duration::from_millis(10),
        )
    }

    async fn collect(
        eventer: &LogFileEventer,
        options: ReadOptions,
    ) -> Result<Vec<Event>, EventsError> {
        let (tx, mut rx) = mpsc::channel(256);
        eventer.read(options, tx).await?;
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn write_creates_parent_and_appends_json_lines() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = eventer_in(dir.path(), 0);
        let _ = eventer.write(container("web", Status::Create)).await;
        let _ = eventer.write(container("web", Status::Start)).await;

        let Ok(content) = std::fs::read_to_string(eventer.path()) else {
            panic!("log should exist");
        };
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with('{') && l.contains("\"Name\":\"web\"")));
    }

    #[tokio::test]
    async fn read_missing_file_is_empty() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = eventer_in(dir.path(), 0);
        let events = collect(&eventer, ReadOptions::history()).await;
        assert!(matches!(events, Ok(e) if e.is_empty()));
    }

    #[tokio::test]
    async fn read_applies_filters_in_order() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = eventer_in(dir.path(), 0);
        for (name, status) in [
            ("web", Status::Create),
            ("db", Status::Create),
            ("web", Status::Start),
            ("web", Status::Died),
        ] {
            let _ = eventer.write(container(name, status)).await;
        }

        let options = ReadOptions::history().with_filter("container=web");
        let Ok(events) = collect(&eventer, options).await else {
            panic!("read failed");
        };
        let statuses: Vec<Status> = events.iter().map(|e| e.status).collect();
        assert_eq!(statuses, [Status::Create, Status::Start, Status::Died]);
    }

    #[tokio::test]
    async fn corrupt_line_reports_line_number() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = eventer_in(dir.path(), 0);
        let _ = eventer.write(container("web", Status::Create)).await;
        let Ok(()) = std::fs::OpenOptions::new()
            .append(true)
            .open(eventer.path())
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"not json\n"))
        else {
            panic!("append garbage");
        };

        let result = collect(&eventer, ReadOptions::history()).await;
        assert!(matches!(result, Err(EventsError::InvalidEvent { line: 2, .. })));
    }

    #[tokio::test]
    async fn rotation_keeps_newest_half_and_marks_it() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = eventer_in(dir.path(), 2_000);
        for i in 0..40 {
            let _ = eventer.write(container(&format!("c{i:02}"), Status::Start)).await;
        }

        let Ok(meta) = std::fs::metadata(eventer.path()) else {
            panic!("log should exist");
        };
        assert!(meta.len() <= 2_000 + 512);

        let Ok(events) = collect(&eventer, ReadOptions::history()).await else {
            panic!("read failed");
        };
        assert!(events.iter().any(|e| e.status == Status::LogRotation));
        assert_eq!(events.last().map(|e| e.name.as_str()), Some("c39"));
        assert!(!events.iter().any(|e| e.name == "c00"));
    }

    #[tokio::test]
    async fn follow_skips_history_and_sees_new_events() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = Arc::new(eventer_in(dir.path(), 0));
        let _ = eventer.write(container("old", Status::Create)).await;

        let (tx, mut rx) = mpsc::channel(16);
        let reader = {
            let eventer = Arc::clone(&eventer);
            tokio::spawn(async move { eventer.read(ReadOptions::follow(), tx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = eventer.write(container("new", Status::Start)).await;

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        let Ok(Some(event)) = received else {
            panic!("expected followed event");
        };
        assert_eq!(event.name, "new");

        drop(rx);
        let finished = tokio::time::timeout(Duration::from_secs(5), reader).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn follow_from_start_replays_then_streams() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = eventer_in(dir.path(), 0);
        let _ = eventer.write(container("old", Status::Create)).await;

        let options = ReadOptions {
            from_start: true,
            until: Some((chrono::Utc::now() + chrono::Duration::milliseconds(100)).to_rfc3339()),
            ..ReadOptions::follow()
        };
        let result = tokio::time::timeout(Duration::from_secs(5), collect(&eventer, options)).await;
        let Ok(Ok(events)) = result else {
            panic!("stream should end at until");
        };
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn newest_half_cuts_at_line_boundary() {
        assert_eq!(newest_half(b"aaaa\nbbbb\ncccc\n"), b"cccc\n");
        assert_eq!(newest_half(b"aa\nbb\n"), b"bb\n");
        assert_eq!(newest_half(b""), b"");
        assert_eq!(newest_half(b"abcdef"), b"");
    }

    fn container_names(events: &[Event]) -> Vec<&str> {
        events
            .iter()
            .filter(|e| e.event_type == EventType::Container)
            .map(|e| e.name.as_str())
            .collect()
    }

    async fn write_all(eventer: &LogFileEventer, names: &[String]) {
        for name in names {
            let Ok(()) = eventer.write(container(name, Status::Start)).await else {
                panic!("write {name}");
            };
        }
    }

    async fn poll_events(tail: &mut LogTail, path: &Path) -> Vec<Event> {
        let Ok(Some(batch)) = tail.poll(path).await else {
            panic!("poll failed");
        };
        batch.resumed()
    }

    fn numbered(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{prefix}{i:02}")).collect()
    }

    #[tokio::test]
    async fn rotation_between_polls_does_not_redeliver_kept_lines() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let plain = eventer_in(dir.path(), 0);
        write_all(&plain, &numbered("c", 10)).await;

        let mut tail = LogTail::default();
        let first = poll_events(&mut tail, plain.path()).await;
        assert_eq!(first.len(), 10);

        let rotating = eventer_in(dir.path(), 1);
        assert!(matches!(rotating.rotate_if_needed(1).await, Ok(true)));

        let after = poll_events(&mut tail, plain.path()).await;
        assert!(container_names(&after).is_empty());
        assert_eq!(after.len(), 1);
        assert!(after.iter().all(is_rotation_marker));
    }

    #[tokio::test]
    async fn rotation_keeps_lines_written_since_last_poll() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let plain = eventer_in(dir.path(), 0);
        write_all(&plain, &numbered("c", 10)).await;

        let mut tail = LogTail::default();
        let _ = poll_events(&mut tail, plain.path()).await;

        write_all(&plain, &["unread".to_string()]).await;
        let rotating = eventer_in(dir.path(), 1);
        assert!(matches!(rotating.rotate_if_needed(1).await, Ok(true)));
        write_all(&plain, &["after".to_string()]).await;

        let resumed = poll_events(&mut tail, plain.path()).await;
        assert_eq!(container_names(&resumed), ["unread", "after"]);
        assert_eq!(resumed.iter().filter(|e| is_rotation_marker(e)).count(), 1);
    }

    #[tokio::test]
    async fn rotation_past_last_seen_line_resumes_at_marker() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let plain = eventer_in(dir.path(), 0);
        write_all(&plain, &numbered("c", 10)).await;

        let mut tail = LogTail::default();
        let _ = poll_events(&mut tail, plain.path()).await;

        write_all(&plain, &numbered("d", 30)).await;
        let rotating = eventer_in(dir.path(), 1);
        assert!(matches!(rotating.rotate_if_needed(1).await, Ok(true)));
        write_all(&plain, &["after".to_string()]).await;

        let resumed = poll_events(&mut tail, plain.path()).await;
        assert!(resumed.first().is_some_and(is_rotation_marker));
        assert_eq!(container_names(&resumed), ["after"]);
    }

    #[tokio::test]
    async fn follow_across_rotations_delivers_each_event_once() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let eventer = Arc::new(LogFileEventer::new(
            dir.path().join("events.log"),
            3_000,
            Duration::from_millis(5),
        ));
        write_all(&eventer, &["before".to_string()]).await;

        let (tx, mut rx) = mpsc::channel(1024);
        let reader = {
            let eventer = Arc::clone(&eventer);
            tokio::spawn(async move { eventer.read(ReadOptions::follow(), tx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let expected = numbered("e", 60);
        for name in &expected {
            write_all(&eventer, std::slice::from_ref(name)).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut received = Vec::new();
        let last = expected.last().cloned().unwrap_or_default();
        while !received.iter().any(|e: &Event| e.name == last) {
            let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
            let Ok(Some(event)) = next else {
                panic!("follower stalled after {} events", received.len());
            };
            received.push(event);
        }

        assert!(received.iter().any(is_rotation_marker));
        assert_eq!(container_names(&received), expected);

        drop(rx);
        let finished = tokio::time::timeout(Duration::from_secs(5), reader).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));
    }

    #[test]
    fn temp_path_is_sibling() {
        let tmp = rotation_temp_path(Path::new("/run/events/events.log"));
        assert_eq!(tmp, PathBuf::from("/run/events/events.log.rotate"));
    }
}
