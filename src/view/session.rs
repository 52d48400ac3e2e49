//! The session inspector: a thin, local, read-only viewer over the
//! evidence directory. Not the external dashboard — just enough for an
//! operator to see what a node captured without leaving the terminal.

use super::fmt::{cprintln, engagement_badge, short_id, trunc, BOLD, CYAN, DIM, GREEN, RESET};
use crate::evidence;
use crate::models::SessionMeta;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

fn list_session_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("reading sessions root {root:?}"))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Highest engagement tier mentioned by any legacy `[CLASS]=...|ENG=...`
/// event in the session, or "LOW" if none classified yet.
fn highest_engagement(meta: &SessionMeta) -> &'static str {
    let mut best = "LOW";
    for event in &meta.events {
        if let Some(idx) = event.text.find("ENG=") {
            let tier = &event.text[idx + 4..];
            if tier.starts_with("HIGH") {
                return "HIGH";
            } else if tier.starts_with("MEDIUM") && best == "LOW" {
                best = "MEDIUM";
            }
        }
    }
    best
}

fn payload_count(meta: &SessionMeta) -> usize {
    meta.events
        .iter()
        .filter(|e| e.text.starts_with("[PAYLOAD_SAVED]="))
        .count()
}

/// `decoyd sessions [--last N]` — one line per captured session.
pub fn sessions(sessions_root: &Path, last: Option<usize>) -> Result<()> {
    let mut dirs = list_session_dirs(sessions_root)?;
    if let Some(n) = last {
        let skip = dirs.len().saturating_sub(n);
        dirs.drain(..skip);
    }

    if dirs.is_empty() {
        cprintln!();
        cprintln!("  {DIM}no sessions captured yet.{RESET}");
        cprintln!();
        return Ok(());
    }

    cprintln!();
    cprintln!(
        "{DIM}── {} session(s) ──────────────────────────────{RESET}",
        dirs.len()
    );
    cprintln!();

    for dir in &dirs {
        match evidence::read_meta(dir) {
            Ok(meta) => print_session_row(&meta),
            Err(e) => cprintln!(
                "  {DIM}{}{RESET}  unreadable: {e}",
                dir.file_name().and_then(|n| n.to_str()).unwrap_or("?"),
            ),
        }
    }
    cprintln!();
    Ok(())
}

fn print_session_row(meta: &SessionMeta) {
    let id = short_id(&meta.session_id);
    let source = format!("{}:{}", meta.src_ip, meta.src_port);
    let start = crate::models::format_ts(meta.start_ts);
    let engagement = engagement_badge(highest_engagement(meta));
    let payloads = payload_count(meta);
    let payload_str = if payloads > 0 {
        format!("  {GREEN}{payloads} payload(s){RESET}")
    } else {
        String::new()
    };

    cprintln!(
        "  {BOLD}{id:<14}{RESET}  {CYAN}{:<21}{RESET}  {DIM}{start}{RESET}  {engagement}  {} events{payload_str}",
        trunc(&source, 21),
        meta.events.len()
    );
}

/// `decoyd show <session-id>` — full decoded event log and payload manifest.
pub fn show(sessions_root: &Path, session_id: &str) -> Result<()> {
    let dir = resolve_session_dir(sessions_root, session_id)?;
    let meta = evidence::read_meta(&dir)?;

    cprintln!();
    cprintln!(
        "{BOLD}{}{RESET}  {DIM}{}:{}{RESET}",
        meta.session_id, meta.src_ip, meta.src_port
    );
    cprintln!(
        "{DIM}started {}  instance={}{}{RESET}",
        crate::models::format_ts(meta.start_ts),
        meta.instance,
        meta.end_time
            .as_deref()
            .map(|t| format!("  ended {t}"))
            .unwrap_or_default()
    );
    cprintln!();

    for event in &meta.events {
        cprintln!("  {DIM}{:>14.3}{RESET}  {}", event.ts, event.text);
    }

    let manifest = payload_manifest(&dir)?;
    if !manifest.is_empty() {
        cprintln!();
        cprintln!("{DIM}── payload manifest ──{RESET}");
        for (name, size) in manifest {
            cprintln!("  {GREEN}{name}{RESET}  {size} bytes");
        }
    }
    cprintln!();
    Ok(())
}

fn resolve_session_dir(sessions_root: &Path, session_id: &str) -> Result<PathBuf> {
    let direct = sessions_root.join(session_id);
    if direct.is_dir() {
        return Ok(direct);
    }
    for dir in list_session_dirs(sessions_root)? {
        if dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(session_id))
        {
            return Ok(dir);
        }
    }
    anyhow::bail!("no session matching '{session_id}' under {sessions_root:?}")
}

fn payload_manifest(dir: &Path) -> Result<Vec<(String, u64)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {dir:?}"))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".bin") {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            out.push((name, size));
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence;
    use crate::models::{EventBody, EventRecord};

    fn write_session(root: &Path, id: &str, events: Vec<EventRecord>) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        let meta = SessionMeta {
            session_id: id.to_string(),
            src_ip: "10.0.0.1".into(),
            src_port: 4444,
            start_ts: 1.0,
            instance: "node-a".into(),
            events,
            end_time: None,
        };
        evidence::write_meta(&dir, &meta).unwrap();
    }

    #[test]
    fn sessions_lists_nothing_for_empty_root() {
        let root = tempfile::tempdir().unwrap();
        sessions(root.path(), None).unwrap();
    }

    #[test]
    fn highest_engagement_prefers_high_over_medium() {
        let meta = SessionMeta {
            session_id: "S-1".into(),
            src_ip: "a".into(),
            src_port: 1,
            start_ts: 0.0,
            instance: "n".into(),
            events: vec![
                EventRecord::at(
                    0.0,
                    EventBody::Classification(crate::models::Classification {
                        label: crate::models::Label::Recon,
                        confidence: 0.6,
                        vector: crate::models::Vector::Command,
                        engagement: crate::models::Engagement::Medium,
                    }),
                ),
                EventRecord::at(
                    1.0,
                    EventBody::Classification(crate::models::Classification {
                        label: crate::models::Label::Exploit,
                        confidence: 0.9,
                        vector: crate::models::Vector::Download,
                        engagement: crate::models::Engagement::High,
                    }),
                ),
            ],
            end_time: None,
        };
        assert_eq!(highest_engagement(&meta), "HIGH");
    }

    #[test]
    fn show_resolves_by_id_prefix() {
        let root = tempfile::tempdir().unwrap();
        write_session(root.path(), "S-1700000000", vec![EventRecord::at(0.0, EventBody::Raw("hi".into()))]);
        show(root.path(), "S-1700000000").unwrap();
        show(root.path(), "S-17000000").unwrap();
    }

    #[test]
    fn show_missing_session_errors() {
        let root = tempfile::tempdir().unwrap();
        assert!(show(root.path(), "S-missing").is_err());
    }
}
