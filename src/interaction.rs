//! Canned banner and low-engagement response helpers.
//!
//! Grounded on `interaction_engine.py`'s `banner_for`/`fake_response_for`:
//! the service banner sent at connect, and the throwaway replies sent to
//! lines that never escalate past LOW/MEDIUM engagement.

/// Service banner for a given protocol name. Decorative — no real
/// handshake follows.
pub fn banner_for(service: &str) -> &'static str {
    match service {
        "ssh" => "SSH-2.0-OpenSSH_7.2p2 Ubuntu-4ubuntu2.10\n",
        "http" => "HTTP/1.1 200 OK\r\nServer: Apache/2.4.18 (Ubuntu)\r\n\r\n",
        _ => "\n",
    }
}

/// Canned reply to a line that did not trigger a handoff to the fake shell.
pub fn fake_response_for(line: &str) -> String {
    let lower = line.to_lowercase();
    let lower = lower.trim();
    if lower.starts_with("uname") {
        "Linux fakehost 4.15.0-99-generic\n".to_string()
    } else if lower.contains("whoami") {
        "root\n".to_string()
    } else {
        "Command executed (simulated)\n".to_string()
    }
}
