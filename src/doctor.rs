//! `decoyd doctor` — a handful of cheap sanity checks an operator can run
//! before trusting a node to actually capture anything.

use crate::config::Config;
use crate::view::fmt::{cprintln, BOLD, DIM, GREEN, RED, RESET};
use std::path::Path;

pub fn run(config: &Config) {
    cprintln!();
    cprintln!("{DIM}── decoyd doctor ───────────────────────────────{RESET}");
    cprintln!();

    let mut pass = 0;
    let mut fail = 0;

    check_sessions_root(&config.sessions_dir, &mut pass, &mut fail);
    check_bind_addr(config, &mut pass, &mut fail);
    check_model_path(&config.model_path, &mut pass);
    check_disk_space(&config.sessions_dir);

    cprintln!();
    cprintln!(
        "  {BOLD}{pass}{RESET} passed  {}{fail}{} failed",
        if fail > 0 { RED } else { DIM },
        RESET
    );
    cprintln!();
}

fn check_sessions_root(root: &Path, pass: &mut u32, fail: &mut u32) {
    if root.exists() {
        let writable = std::fs::metadata(root).map(|m| !m.permissions().readonly()).unwrap_or(false);
        if writable {
            ok(&format!("sessions root exists and is writable ({})", root.display()), pass);
        } else {
            err(&format!("sessions root exists but is read-only ({})", root.display()), fail);
        }
    } else {
        match std::fs::create_dir_all(root) {
            Ok(()) => ok(&format!("sessions root created ({})", root.display()), pass),
            Err(e) => err(&format!("sessions root not writable ({e})"), fail),
        }
    }
}

fn check_bind_addr(config: &Config, pass: &mut u32, fail: &mut u32) {
    match config.bind_addr().parse::<std::net::SocketAddr>() {
        Ok(addr) => ok(&format!("bind address parses ({addr})"), pass),
        Err(e) => err(&format!("bind address '{}' is invalid: {e}", config.bind_addr()), fail),
    }
}

fn check_model_path(model_path: &Path, pass: &mut u32) {
    if !model_path.exists() {
        cprintln!(
            "  {DIM}-{RESET}  no classifier model at {} (rule fallback will be used)",
            model_path.display()
        );
        return;
    }
    match std::fs::read_to_string(model_path) {
        Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(_) => ok(&format!("classifier model valid ({})", model_path.display()), pass),
            Err(e) => cprintln!(
                "  {RED}!{RESET}  classifier model at {} is malformed JSON ({e}), rule fallback will run",
                model_path.display()
            ),
        },
        Err(e) => cprintln!("  {RED}!{RESET}  classifier model unreadable: {e}"),
    }
}

fn check_disk_space(sessions_dir: &Path) {
    let dir = if sessions_dir.exists() {
        sessions_dir
    } else {
        sessions_dir.parent().unwrap_or(Path::new("."))
    };

    let dir_cstr = match std::ffi::CString::new(dir.to_string_lossy().as_bytes().to_vec()) {
        Ok(c) => c,
        Err(_) => return,
    };

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(dir_cstr.as_ptr(), &mut stat) };
    if ret == 0 {
        #[allow(clippy::unnecessary_cast)]
        let avail = stat.f_bavail as u64 * stat.f_frsize as u64;
        if avail < 100 * 1024 * 1024 {
            cprintln!(
                "  {RED}!{RESET}  low disk space: {} available on sessions filesystem",
                format_size(avail)
            );
        }
    }
}

fn format_size(size: u64) -> String {
    if size >= 1_048_576 {
        format!("{:.1}MB", size as f64 / 1_048_576.0)
    } else if size >= 1024 {
        format!("{}KB", size / 1024)
    } else {
        format!("{size}B")
    }
}

fn ok(msg: &str, pass: &mut u32) {
    cprintln!("  {GREEN}✓{RESET}  {msg}");
    *pass += 1;
}

fn err(msg: &str, fail: &mut u32) {
    cprintln!("  {RED}✗{RESET}  {msg}");
    *fail += 1;
}
