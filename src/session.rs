use crate::evidence;
use crate::models::{now_ts, SessionMeta};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Owns session-ID allocation and session-directory creation. This is the
/// only component that picks identifiers, so it is the only place that has
/// to guard against two accepts landing in the same epoch second.
pub struct SessionManager {
    root: PathBuf,
    instance: String,
    last_alloc: Mutex<(u64, u32)>,
}

impl SessionManager {
    pub fn new(root: PathBuf, instance: String) -> Self {
        SessionManager {
            root,
            instance,
            last_alloc: Mutex::new((0, 0)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Epoch-seconds-based ID, disambiguated with a numeric suffix for any
    /// further allocation within the same second.
    fn allocate_id(&self) -> String {
        let now = now_ts() as u64;
        let mut last = self.last_alloc.lock().unwrap_or_else(|e| e.into_inner());
        if last.0 == now {
            last.1 += 1;
            format!("S-{now}-{}", last.1)
        } else {
            *last = (now, 0);
            format!("S-{now}")
        }
    }

    /// Creates a fresh session directory and initializes `meta.json` with
    /// the mandatory keys. Returns the session ID and its directory.
    pub fn new_session(&self, src_ip: &str, src_port: u16) -> Result<(String, PathBuf)> {
        let id = self.allocate_id();
        let dir = self.root.join(&id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating session directory {dir:?}"))?;

        let meta = SessionMeta {
            session_id: id.clone(),
            src_ip: src_ip.to_string(),
            src_port,
            start_ts: now_ts(),
            instance: self.instance.clone(),
            events: Vec::new(),
            end_time: None,
        };
        evidence::write_meta(&dir, &meta)?;

        Ok((id, dir))
    }
}
