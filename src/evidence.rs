use crate::models::{EventRecord, PayloadMeta, SessionMeta};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Hard cap on a captured payload blob. Truncation is a policy, not an
/// error — the hash is always computed over the bytes actually written.
pub const MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Writes `value` to `path` atomically: serialize to a sibling temp file,
/// fsync it, then rename over the destination. A reader opening `path`
/// concurrently always sees either the old or the new contents, never a
/// torn write, because rename is atomic within one filesystem.
fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(value).context("serializing meta.json")?;

    {
        let mut tmp = File::create(&tmp_path).context("creating meta.json.tmp")?;
        tmp.write_all(body.as_bytes())
            .context("writing meta.json.tmp")?;
        tmp.sync_all().ok();
    }

    fs::rename(&tmp_path, path).context("renaming meta.json.tmp over meta.json")?;
    Ok(())
}

fn meta_path(session_dir: &Path) -> std::path::PathBuf {
    session_dir.join("meta.json")
}

pub fn read_meta(session_dir: &Path) -> Result<SessionMeta> {
    let path = meta_path(session_dir);
    let content = fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {path:?}"))
}

pub fn write_meta(session_dir: &Path, meta: &SessionMeta) -> Result<()> {
    atomic_write_json(&meta_path(session_dir), meta)
}

/// Appends one event to `session_dir/meta.json`, read-modify-write, atomic.
pub fn append_event(session_dir: &Path, record: EventRecord) -> Result<()> {
    let mut meta = read_meta(session_dir)?;
    meta.events.push(record);
    write_meta(session_dir, &meta)
}

/// Sets `end_time` to a human-readable local timestamp. Idempotent in the
/// sense that calling it twice just overwrites the value; callers are
/// expected to call it exactly once, at close.
pub fn close_session(session_dir: &Path) -> Result<()> {
    let mut meta = read_meta(session_dir)?;
    meta.end_time = Some(chrono::Local::now().to_rfc2822());
    write_meta(session_dir, &meta)
}

/// Truncates `data` to [`MAX_PAYLOAD_BYTES`], writes it into `session_dir`
/// under `name` (auto-generated from the current time if absent), and
/// returns metadata describing exactly what was written. Re-running with
/// the same name overwrites deterministically.
pub fn save_payload(
    session_dir: &Path,
    data: &[u8],
    name: Option<&str>,
) -> Result<PayloadMeta> {
    fs::create_dir_all(session_dir).context("creating session directory")?;

    let owned_name;
    let name: &str = match name {
        Some(n) => n,
        None => {
            owned_name = format!("payload_{}.bin", crate::models::now_ts() as u64);
            &owned_name
        }
    };

    let content = &data[..data.len().min(MAX_PAYLOAD_BYTES)];
    let path = session_dir.join(name);

    let mut file = File::create(&path).with_context(|| format!("creating {path:?}"))?;
    file.write_all(content)
        .with_context(|| format!("writing {path:?}"))?;
    file.sync_all().ok();

    Ok(PayloadMeta {
        file: name.to_string(),
        path: path
            .canonicalize()
            .unwrap_or(path)
            .to_string_lossy()
            .to_string(),
        sha256: sha256_hex(content),
        size: content.len() as u64,
        saved_ts: crate::models::now_ts(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventBody;
    use std::sync::Arc;
    use std::thread;

    fn new_test_session(dir: &Path) {
        let meta = SessionMeta {
            session_id: "S-test".into(),
            src_ip: "127.0.0.1".into(),
            src_port: 1234,
            start_ts: crate::models::now_ts(),
            instance: "test".into(),
            events: vec![],
            end_time: None,
        };
        fs::create_dir_all(dir).unwrap();
        write_meta(dir, &meta).unwrap();
    }

    #[test]
    fn save_payload_truncates_to_cap_and_hashes_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![b'x'; MAX_PAYLOAD_BYTES * 2];
        let meta = save_payload(dir.path(), &data, None).unwrap();

        assert_eq!(meta.size, MAX_PAYLOAD_BYTES as u64);
        let on_disk = fs::read(dir.path().join(&meta.file)).unwrap();
        assert_eq!(on_disk.len(), MAX_PAYLOAD_BYTES);
        assert_eq!(sha256_hex(&on_disk), meta.sha256);
        assert_eq!(sha256_hex(&data[..MAX_PAYLOAD_BYTES]), meta.sha256);
    }

    #[test]
    fn save_payload_same_name_overwrites_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let m1 = save_payload(dir.path(), b"first", Some("p.bin")).unwrap();
        let m2 = save_payload(dir.path(), b"second-value", Some("p.bin")).unwrap();
        assert_eq!(m1.file, m2.file);
        assert_ne!(m1.sha256, m2.sha256);
        let on_disk = fs::read(dir.path().join("p.bin")).unwrap();
        assert_eq!(on_disk, b"second-value");
    }

    #[test]
    fn append_event_is_all_or_nothing_under_concurrent_readers() {
        let dir = tempfile::tempdir().unwrap();
        new_test_session(dir.path());
        let dir_path: Arc<std::path::PathBuf> = Arc::new(dir.path().to_path_buf());

        let writer_dir = dir_path.clone();
        let writer = thread::spawn(move || {
            for i in 0..1000 {
                append_event(&writer_dir, EventRecord::new(EventBody::Raw(format!("line {i}"))))
                    .unwrap();
            }
        });

        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader_dir = dir_path.clone();
            readers.push(thread::spawn(move || {
                for _ in 0..200 {
                    if let Ok(content) = fs::read_to_string(reader_dir.join("meta.json")) {
                        let parsed: Result<SessionMeta, _> = serde_json::from_str(&content);
                        assert!(parsed.is_ok(), "reader observed a torn meta.json");
                    }
                }
            }));
        }

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }

        let meta = read_meta(&dir_path).unwrap();
        assert_eq!(meta.events.len(), 1000);
    }

    #[test]
    fn close_session_sets_end_time_once() {
        let dir = tempfile::tempdir().unwrap();
        new_test_session(dir.path());
        close_session(dir.path()).unwrap();
        let meta = read_meta(dir.path()).unwrap();
        assert!(meta.end_time.is_some());
    }

    #[test]
    fn appended_event_timestamps_are_non_decreasing() {
        let dir = tempfile::tempdir().unwrap();
        new_test_session(dir.path());
        for i in 0..20 {
            append_event(dir.path(), EventRecord::new(EventBody::Raw(format!("line {i}")))).unwrap();
        }
        let meta = read_meta(dir.path()).unwrap();
        let timestamps: Vec<f64> = meta.events.iter().map(|e| e.ts).collect();
        for pair in timestamps.windows(2) {
            assert!(pair[1] >= pair[0], "event timestamps went backwards: {timestamps:?}");
        }
    }
}
