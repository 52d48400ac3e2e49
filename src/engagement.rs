//! The fake interactive shell entered on handoff to HIGH engagement.
//!
//! Grounded on `high_engagement.py`'s `start_fake_shell`/`chunked_send`:
//! the engine takes sole ownership of the socket, streams output in
//! small randomly-delayed chunks to feel like a slow real terminal, and
//! dispatches a handful of canned commands against the [`crate::vfs`]
//! virtual filesystem.

use crate::evidence;
use crate::models::EventBody;
use crate::vfs;
use anyhow::Result;
use rand::Rng;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

const CHUNK_SIZE: usize = 240;
const CHUNK_DELAY_MIN_MS: u64 = 20;
const CHUNK_DELAY_MAX_MS: u64 = 120;
const READ_TIMEOUT: Duration = Duration::from_secs(1);
const READ_BUF_SIZE: usize = 4096;

const WELCOME_BANNER: &str = "Welcome to Ubuntu 16.04.7 LTS (GNU/Linux 4.15.0-99)\n";
const PROMPT: &str = "root@fakehost:~# ";
const UNAME_OUTPUT: &str =
    "Linux fakehost 4.15.0-99-generic #100~16.04.1 SMP Tue Nov 2 12:34:56 UTC 2021 x86_64 GNU/Linux\n";
const PS_OUTPUT: &str = "USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND\n\
root         1  0.0  0.1  22568  4100 ?        Ss   Nov01   0:01 /sbin/init\n\
root      2345  0.1  0.3 123456 10344 ?        Ssl  Nov01   0:12 /usr/bin/fake-service\n";

/// Hard and soft deadlines for one fake-shell session. Production uses
/// [`EngagementLimits::default`]; tests shrink both so the timeout paths
/// run in milliseconds instead of minutes.
#[derive(Debug, Clone, Copy)]
pub struct EngagementLimits {
    pub max_session: Duration,
    pub inactivity: Duration,
}

impl Default for EngagementLimits {
    fn default() -> Self {
        EngagementLimits {
            max_session: Duration::from_secs(20 * 60),
            inactivity: Duration::from_secs(3 * 60),
        }
    }
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(https?://[^\s]+)").expect("static regex is valid"))
}

/// Extracts the first `http(s)://…` URL from `text`, if any.
pub fn extract_url(text: &str) -> Option<&str> {
    url_re().find(text).map(|m| m.as_str())
}

/// Writes `bytes` in chunks of at most [`CHUNK_SIZE`], sleeping a
/// uniform random interval between each. Returns `false` on write
/// failure — a closed peer is an expected terminal state here, not an
/// error to propagate.
async fn chunked_send(stream: &mut TcpStream, bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return true;
    }
    for chunk in bytes.chunks(CHUNK_SIZE) {
        if stream.write_all(chunk).await.is_err() {
            return false;
        }
        let delay_ms = rand::thread_rng().gen_range(CHUNK_DELAY_MIN_MS..=CHUNK_DELAY_MAX_MS);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    true
}

async fn send_str(stream: &mut TcpStream, text: &str) -> bool {
    chunked_send(stream, text.as_bytes()).await
}

fn log(session_dir: &Path, body: EventBody) {
    if let Err(e) = evidence::append_event(session_dir, crate::models::EventRecord::new(body)) {
        eprintln!("[decoyd] failed to append high-engagement event: {e}");
    }
}

/// Handles `wget`/`curl` lines: extracts the URL, saves a placeholder
/// payload whose content is the URL bytes, and reports both detection
/// and save.
async fn handle_download(stream: &mut TcpStream, session_dir: &Path, command_text: &str) -> bool {
    let url = extract_url(command_text).unwrap_or("");
    log(session_dir, EventBody::PayloadDetected(url.to_string()));

    let name = format!("payload_{}.bin", crate::models::now_ts() as u64);
    match evidence::save_payload(session_dir, url.as_bytes(), Some(&name)) {
        Ok(meta) => log(session_dir, EventBody::PayloadSaved(meta)),
        Err(e) => log(
            session_dir,
            EventBody::Error(format!("PAYLOAD_SAVE_FAILED|{e}")),
        ),
    }

    send_str(
        stream,
        &format!("Attempted download from {url} (placeholder saved)\n"),
    )
    .await
}

fn handle_ls(cwd: &str) -> String {
    vfs::list_dir(cwd).join("\n") + "\n"
}

fn handle_cat(cwd: &str, arg: &str) -> String {
    let target = vfs::resolve(cwd, arg);
    match vfs::read(&target) {
        Some(content) => content.to_string(),
        None => format!("cat: {target}: No such file or directory\n"),
    }
}

/// Dispatches one complete attacker line and returns the response text
/// to send, or `None` for the `exit`/`logout` terminal command (handled
/// by the caller so it can close the connection).
fn dispatch_line(cwd: &str, line: &str) -> Option<String> {
    let lower = line.to_lowercase();
    if lower.starts_with("ls") {
        Some(handle_ls(cwd))
    } else if lower.starts_with("cat ") {
        Some(handle_cat(cwd, line[4..].trim()))
    } else if lower.starts_with("uname") {
        Some(UNAME_OUTPUT.to_string())
    } else if lower.starts_with("whoami") || lower.starts_with("id") {
        Some("root\n".to_string())
    } else if lower.contains("ps aux") || lower.starts_with("ps") {
        Some(PS_OUTPUT.to_string())
    } else if lower.starts_with("exit") || lower.starts_with("logout") {
        None
    } else {
        Some(format!("-bash: {line}: command not found\n"))
    }
}

/// Runs the fake shell to completion, taking sole ownership of `stream`
/// until the attacker exits, disconnects, or a deadline fires. Never
/// returns an `Err` for socket-level conditions — those close the
/// session cleanly and are logged as `[HIGH_ENGAGEMENT]` markers, per
/// the error-handling design (§7).
pub async fn run(stream: &mut TcpStream, session_dir: &Path, limits: EngagementLimits) -> Result<()> {
    let start = Instant::now();
    log(session_dir, EventBody::HighEngagement("START".to_string()));

    if !send_str(stream, WELCOME_BANNER).await {
        log(
            session_dir,
            EventBody::HighEngagement("CLIENT_CLOSED_BEFORE_START".to_string()),
        );
        log(session_dir, EventBody::HighEngagement("END".to_string()));
        return Ok(());
    }
    if !send_str(stream, PROMPT).await {
        log(
            session_dir,
            EventBody::HighEngagement("CLIENT_CLOSED_BEFORE_PROMPT".to_string()),
        );
        log(session_dir, EventBody::HighEngagement("END".to_string()));
        return Ok(());
    }

    let cwd = "/root".to_string();
    let mut buf = Vec::new();
    let mut read_chunk = [0u8; READ_BUF_SIZE];
    let mut last_activity = Instant::now();

    loop {
        if start.elapsed() > limits.max_session {
            log(
                session_dir,
                EventBody::HighEngagement("TIMEOUT_CLOSING".to_string()),
            );
            break;
        }
        if last_activity.elapsed() > limits.inactivity {
            log(
                session_dir,
                EventBody::HighEngagement("INACTIVITY_CLOSING".to_string()),
            );
            break;
        }

        let read = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut read_chunk)).await;
        let n = match read {
            Ok(Ok(0)) => break, // peer closed
            Ok(Ok(n)) => n,
            Ok(Err(_)) => break, // transport error, closes quietly
            Err(_) => continue, // 1s heartbeat, re-check deadlines
        };
        buf.extend_from_slice(&read_chunk[..n]);

        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim()
                .to_string();
            last_activity = Instant::now();
            log(session_dir, EventBody::AttackerCmd(line.clone()));

            let lower = line.to_lowercase();
            let ok = if lower.contains("wget") || lower.contains("curl") {
                handle_download(stream, session_dir, &line).await
            } else if lower.starts_with("exit") || lower.starts_with("logout") {
                send_str(stream, "logout\n").await;
                log(
                    session_dir,
                    EventBody::HighEngagement("ATTACKER_EXIT".to_string()),
                );
                log(session_dir, EventBody::HighEngagement("END".to_string()));
                return Ok(());
            } else if let Some(resp) = dispatch_line(&cwd, &line) {
                send_str(stream, &resp).await
            } else {
                true
            };

            if !ok {
                log(
                    session_dir,
                    EventBody::HighEngagement("CLIENT_DISCONNECTED".to_string()),
                );
                log(session_dir, EventBody::HighEngagement("END".to_string()));
                return Ok(());
            }

            if !send_str(stream, PROMPT).await {
                log(
                    session_dir,
                    EventBody::HighEngagement("CLIENT_DISCONNECTED_AFTER_PROMPT".to_string()),
                );
                log(session_dir, EventBody::HighEngagement("END".to_string()));
                return Ok(());
            }
        }
    }

    log(session_dir, EventBody::HighEngagement("END".to_string()));
    let _ = send_str(stream, "\nConnection closed by remote host.\n").await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_url_from_command() {
        assert_eq!(
            extract_url("wget http://malicious.example/x please"),
            Some("http://malicious.example/x")
        );
    }

    #[test]
    fn extracts_https_url_case_insensitively() {
        assert_eq!(
            extract_url("CURL HTTPS://EXAMPLE.COM/a"),
            Some("HTTPS://EXAMPLE.COM/a")
        );
    }

    #[test]
    fn no_url_present_is_none() {
        assert_eq!(extract_url("ls -la"), None);
    }

    #[test]
    fn dispatch_ls_lists_root_virtual_files() {
        let out = dispatch_line("/root", "ls -la").unwrap();
        assert!(out.contains("drwxr-xr-x"));
        assert!(out.contains("notes.txt"));
    }

    #[test]
    fn dispatch_cat_reads_etc_passwd() {
        let out = dispatch_line("/root", "cat /etc/passwd").unwrap();
        assert!(out.contains("root:x:0:0:root:/root:/bin/bash"));
    }

    #[test]
    fn dispatch_cat_missing_file_reports_absence() {
        let out = dispatch_line("/root", "cat nope.txt").unwrap();
        assert!(out.contains("No such file or directory"));
    }

    #[test]
    fn dispatch_whoami_and_id_are_root() {
        assert_eq!(dispatch_line("/root", "whoami").unwrap(), "root\n");
        assert_eq!(dispatch_line("/root", "id").unwrap(), "root\n");
    }

    #[test]
    fn dispatch_exit_yields_none() {
        assert!(dispatch_line("/root", "exit").is_none());
        assert!(dispatch_line("/root", "logout").is_none());
    }

    #[test]
    fn dispatch_unknown_command_not_found() {
        let out = dispatch_line("/root", "frobnicate").unwrap();
        assert_eq!(out, "-bash: frobnicate: command not found\n");
    }

    #[test]
    fn default_limits_match_spec_caps() {
        let limits = EngagementLimits::default();
        assert_eq!(limits.max_session, Duration::from_secs(1200));
        assert_eq!(limits.inactivity, Duration::from_secs(180));
    }
}
