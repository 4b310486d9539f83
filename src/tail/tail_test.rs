use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;
use tracing_test::traced_test;

use super::*;

fn append(
    path: &Path,
    bytes: &[u8],
) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
}

fn tailer_for(
    path: &Path,
    max_chunk_bytes: usize,
) -> FileTailer {
    tailer_of(ServiceId::ApiServer, path, max_chunk_bytes)
}

fn tailer_of(
    service: ServiceId,
    path: &Path,
    max_chunk_bytes: usize,
) -> FileTailer {
    FileTailer::new(
        LogFileDescriptor {
            path: path.to_path_buf(),
            service,
        },
        max_chunk_bytes,
    )
}

fn resets_of(service: ServiceId) -> u64 {
    TAIL_RESETS.with_label_values(&[service.as_str()]).get()
}

#[tokio::test]
async fn read_new_should_emit_only_newly_appended_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.log");
    let mut tailer = tailer_for(&path, 1024);

    append(&path, b"line1\nline2\n");
    let chunk = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(chunk.content, "line1\nline2\n");
    assert_eq!(chunk.bytes_read, 12);
    assert!(!chunk.has_more);
    assert_eq!(tailer.cursor().offset(), 12);

    assert_eq!(tailer.read_new().await.unwrap(), None);

    append(&path, b"line3\n");
    let chunk = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(chunk.content, "line3\n");
    assert_eq!(tailer.cursor().offset(), 18);
}

#[tokio::test]
#[traced_test]
async fn read_new_should_treat_missing_file_as_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-yet.log");
    let mut tailer = tailer_for(&path, 1024);

    assert_eq!(tailer.read_new().await.unwrap(), None);
    assert_eq!(tailer.cursor().offset(), 0);
    assert!(logs_contain("not found yet"));

    append(&path, b"started\n");
    let chunk = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(chunk.content, "started\n");
}

#[tokio::test]
#[traced_test]
async fn read_new_should_restart_from_zero_after_truncation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.log");
    let mut tailer = tailer_of(ServiceId::ApiServer, &path, 1024);
    let resets_before = resets_of(ServiceId::ApiServer);

    append(&path, b"old content that is long\n");
    tailer.read_new().await.unwrap().unwrap();
    assert_eq!(tailer.cursor().offset(), 25);

    std::fs::write(&path, b"new\n").unwrap();
    let chunk = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(chunk.content, "new\n");
    assert_eq!(tailer.cursor().offset(), 4);

    assert!(logs_contain("restarting from the beginning"));
    assert_eq!(resets_of(ServiceId::ApiServer), resets_before + 1);
}

#[cfg(unix)]
#[tokio::test]
#[traced_test]
async fn read_new_should_restart_when_file_is_replaced_by_a_longer_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotated.log");
    let mut tailer = tailer_of(ServiceId::Redis, &path, 1024);
    let resets_before = resets_of(ServiceId::Redis);

    append(&path, b"old content that is long\n");
    tailer.read_new().await.unwrap().unwrap();
    assert_eq!(tailer.cursor().offset(), 25);

    // rename rotation; the new file outgrows the old offset before the next read
    std::fs::rename(&path, dir.path().join("rotated.log.1")).unwrap();
    let fresh = b"fresh file after rotation, longer than the old one\n";
    append(&path, fresh);

    let chunk = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(chunk.content.as_bytes(), fresh);
    assert_eq!(tailer.cursor().offset(), fresh.len() as u64);

    assert!(logs_contain("was replaced, restarting from the beginning"));
    assert_eq!(resets_of(ServiceId::Redis), resets_before + 1);

    // appends to the new file continue from its own offset
    append(&path, b"next\n");
    let chunk = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(chunk.content, "next\n");
    assert_eq!(resets_of(ServiceId::Redis), resets_before + 1);
}

#[tokio::test]
async fn read_new_should_split_large_files_into_bounded_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.log");
    let mut tailer = tailer_for(&path, 8);

    append(&path, b"0123456789abcdef0123");
    let mut collected = String::new();
    let mut reads = 0;
    while let Some(chunk) = tailer.read_new().await.unwrap() {
        assert!(chunk.bytes_read <= 8);
        collected.push_str(&chunk.content);
        reads += 1;
        if !chunk.has_more {
            break;
        }
    }

    assert_eq!(collected, "0123456789abcdef0123");
    assert_eq!(reads, 3);
    assert_eq!(tailer.cursor().offset(), 20);
}

#[tokio::test]
async fn read_new_should_not_split_multibyte_characters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("utf8.log");
    let mut tailer = tailer_for(&path, 1024);

    let text = "héllo→✓\n".as_bytes();
    // stop in the middle of the 3-byte arrow
    let cut = text.len() - 5;
    append(&path, &text[..cut]);
    let first = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(first.content, "héllo");

    append(&path, &text[cut..]);
    let second = tailer.read_new().await.unwrap().unwrap();
    assert_eq!(second.content, "→✓\n");
    assert_eq!(tailer.cursor().offset(), text.len() as u64);
}

#[test]
fn complete_utf8_len_should_strip_only_incomplete_tail() {
    assert_eq!(complete_utf8_len(b"abc"), 3);
    assert_eq!(complete_utf8_len("a→".as_bytes()), 4);
    assert_eq!(complete_utf8_len(&"a→".as_bytes()[..3]), 1);
    assert_eq!(complete_utf8_len(&"✓".as_bytes()[..1]), 0);
    assert_eq!(complete_utf8_len(&[]), 0);
}

#[tokio::test]
async fn run_tailer_should_deliver_appends_once_and_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tail.log");
    append(&path, b"W1\n");

    let (sink, mut rx) = EventSink::channel(16);
    let changed = Arc::new(Notify::new());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_tailer(
        tailer_for(&path, 1024),
        changed.clone(),
        sink,
        cancel.clone(),
    ));

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, StreamEvent::log_update(ServiceId::ApiServer, "W1\n"));

    append(&path, b"W2\n");
    // several notifications for one append coalesce into reads of distinct bytes
    changed.notify_one();
    changed.notify_one();
    changed.notify_one();

    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second, StreamEvent::log_update(ServiceId::ApiServer, "W2\n"));

    // no duplicate delivery from the extra notifications
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());

    cancel.cancel();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn run_tailer_should_stop_when_sink_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.log");
    append(&path, b"data\n");

    let (sink, rx) = EventSink::channel(1);
    drop(rx);

    let handle = tokio::spawn(run_tailer(
        tailer_for(&path, 1024),
        Arc::new(Notify::new()),
        sink,
        CancellationToken::new(),
    ));

    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
