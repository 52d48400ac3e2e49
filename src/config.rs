use std::collections::HashMap;
use std::path::PathBuf;

/// Returns the user's home directory as a `PathBuf`.
pub fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
}

/// Returns `~/.decoyd`.
pub fn decoyd_dir() -> PathBuf {
    home_dir().join(".decoyd")
}

/// Returns `~/.decoyd/<subpath>`.
pub fn decoyd_path(subpath: &str) -> PathBuf {
    decoyd_dir().join(subpath)
}

/// Tiny `key=value` dotfile, one setting per line, `#` starts a comment.
/// Same format the reference CLI uses for its own config file.
fn load_dotfile(path: &std::path::Path) -> HashMap<String, String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    content
        .lines()
        .filter(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
        .filter_map(|l| {
            let (k, v) = l.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Resolved runtime configuration: env vars take precedence over the
/// `~/.decoyd/config` dotfile, which takes precedence over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub sessions_dir: PathBuf,
    pub instance: String,
    pub model_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let file = load_dotfile(&decoyd_path("config"));

        let host = std::env::var("HONEYPOT_HOST")
            .ok()
            .or_else(|| file.get("HOST").cloned())
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let port: u16 = std::env::var("HONEYPOT_PORT")
            .ok()
            .or_else(|| file.get("PORT").cloned())
            .and_then(|s| s.parse().ok())
            .unwrap_or(2222);

        let sessions_dir = std::env::var("HONEYPOT_SESSIONS_DIR")
            .ok()
            .or_else(|| file.get("SESSIONS_DIR").cloned())
            .map(PathBuf::from)
            .unwrap_or_else(|| decoyd_path("sessions"));

        let instance = std::env::var("HONEYPOT_INSTANCE")
            .ok()
            .or_else(|| file.get("INSTANCE").cloned())
            .unwrap_or_else(default_instance_label);

        let model_path = std::env::var("HONEYPOT_MODEL_PATH")
            .ok()
            .or_else(|| file.get("MODEL_PATH").cloned())
            .map(PathBuf::from)
            .unwrap_or_else(|| decoyd_path("model.json"));

        Config {
            host,
            port,
            sessions_dir,
            instance,
            model_path,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reads the machine's hostname via `gethostname(2)`. `HOSTNAME` is a
/// shell variable, not something the kernel exports into every process's
/// environment, so it's unset under systemd units, cron, containers, and
/// plain invocations — the syscall is the only reliable source.
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let hostname = String::from_utf8_lossy(&buf[..end]).into_owned();
    if hostname.is_empty() {
        None
    } else {
        Some(hostname)
    }
}

fn default_instance_label() -> String {
    system_hostname().unwrap_or_else(|| "decoyd".to_string())
}
