//! Connection acceptor and per-session loop.
//!
//! Grounded on `orchestrator.py`'s `Orchestrator.handle_client`/`start`:
//! one listening socket, one spawned task per accepted connection, a
//! line-buffered read loop that classifies every line and hands off to
//! the fake shell when the policy says so.

use crate::classifier::Classifier;
use crate::engagement::{self, EngagementLimits};
use crate::evidence;
use crate::features;
use crate::interaction;
use crate::models::{Classification, Engagement, EventBody, EventRecord, Label, Vector};
use crate::policy;
use crate::session::SessionManager;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

const READ_BUF_SIZE: usize = 4096;

/// Runs the acceptor until `shutdown` resolves. Accepted connections are
/// each handed to an independently spawned task; a panic or error inside
/// one never stops the accept loop.
pub async fn serve(
    bind_addr: &str,
    sessions: Arc<SessionManager>,
    classifier: Arc<Classifier>,
    limits: EngagementLimits,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    eprintln!("[decoyd] listening on {bind_addr}");
    run_listener(listener, sessions, classifier, limits, shutdown).await
}

/// Same as [`serve`] but over an already-bound listener — lets callers
/// (tests, chiefly) bind to an ephemeral port and learn the real address
/// via `TcpListener::local_addr` before the accept loop starts.
pub async fn run_listener(
    listener: TcpListener,
    sessions: Arc<SessionManager>,
    classifier: Arc<Classifier>,
    limits: EngagementLimits,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        eprintln!("[decoyd] accept failed: {e}");
                        continue;
                    }
                };
                let sessions = sessions.clone();
                let classifier = classifier.clone();
                tokio::spawn(async move {
                    let src_ip = peer.ip().to_string();
                    let src_port = peer.port();
                    if let Err(e) = handle_connection(stream, &src_ip, src_port, sessions, classifier, limits).await {
                        eprintln!("[decoyd] session for {src_ip}:{src_port} failed: {e}");
                    }
                });
            }
            _ = shutdown.changed() => {
                eprintln!("[decoyd] shutdown signal received, draining accept loop");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    src_ip: &str,
    src_port: u16,
    sessions: Arc<SessionManager>,
    classifier: Arc<Classifier>,
    limits: EngagementLimits,
) -> Result<()> {
    let (session_id, session_dir) = sessions.new_session(src_ip, src_port)?;
    eprintln!("[decoyd] session {session_id} started for {src_ip}:{src_port}");

    if let Err(e) = stream.write_all(interaction::banner_for("ssh").as_bytes()).await {
        eprintln!("[decoyd] session {session_id}: banner send failed (continuing): {e}");
    }

    let mut fell_back_once = false;
    let result = session_loop(
        &mut stream,
        &session_dir,
        src_ip,
        src_port,
        &classifier,
        limits,
        &mut fell_back_once,
    )
    .await;

    if let Err(e) = &result {
        log(&session_dir, EventBody::Error(e.to_string()));
    }

    if let Err(e) = evidence::close_session(&session_dir) {
        eprintln!("[decoyd] session {session_id}: failed to close meta.json: {e}");
    }
    eprintln!("[decoyd] session {session_id} closed");

    Ok(())
}

fn log(session_dir: &Path, body: EventBody) {
    if let Err(e) = evidence::append_event(session_dir, EventRecord::new(body)) {
        eprintln!("[decoyd] failed to append event: {e}");
    }
}

async fn session_loop(
    stream: &mut TcpStream,
    session_dir: &Path,
    src_ip: &str,
    src_port: u16,
    classifier: &Classifier,
    limits: EngagementLimits,
    fell_back_once: &mut bool,
) -> Result<()> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut read_chunk = [0u8; READ_BUF_SIZE];

    loop {
        let n = match stream.read(&mut read_chunk).await {
            Ok(0) => return Ok(()), // peer closed
            Ok(n) => n,
            Err(e) if is_quiet_transport_error(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        buf.extend_from_slice(&read_chunk[..n]);

        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim()
                .to_string();

            log(session_dir, EventBody::Raw(line.clone()));

            let meta = evidence::read_meta(session_dir)?;
            let feats = features::extract(&meta.events);
            let (label, confidence, fell_back) = classifier.classify(&feats);
            if fell_back && !*fell_back_once {
                *fell_back_once = true;
                log(session_dir, EventBody::Error("CLASSIFIER_FALLBACK".to_string()));
            }

            let lower = line.to_lowercase();
            let vector = if lower.contains("wget ") || lower.contains("curl ") {
                Vector::Download
            } else if lower.contains("ssh ") || lower.contains("scp ") {
                Vector::Ssh
            } else {
                Vector::Command
            };
            let forced = policy::is_forced_handoff(&lower);
            let engagement = policy::effective_engagement(label, confidence, forced);

            emit_classification(session_dir, label, confidence, vector, engagement, src_ip, src_port);

            if forced {
                save_forced_handoff_payload(session_dir, &line, src_ip, src_port);
            }

            if engagement == Engagement::High || forced {
                log(session_dir, EventBody::Action("HANDOFF_TO_HIGH_ENGAGEMENT".to_string()));
                return run_handoff(stream, session_dir, limits).await;
            }

            let reply = interaction::fake_response_for(&line);
            if stream.write_all(reply.as_bytes()).await.is_err() {
                return Ok(());
            }
        }
    }
}

async fn run_handoff(stream: &mut TcpStream, session_dir: &Path, limits: EngagementLimits) -> Result<()> {
    if let Err(e) = engagement::run(stream, session_dir, limits).await {
        log(
            session_dir,
            EventBody::Error(format!("HIGH_ENGAGEMENT_FAILED|{e}")),
        );
    }
    Ok(())
}

fn emit_classification(
    session_dir: &Path,
    label: Label,
    confidence: f64,
    vector: Vector,
    engagement: Engagement,
    src_ip: &str,
    src_port: u16,
) {
    let classification = Classification {
        label,
        confidence,
        vector,
        engagement,
    };

    let struct_event = serde_json::json!({
        "type": "classification",
        "label": label.to_string(),
        "confidence": confidence,
        "vector": vector.to_string(),
        "src_ip": src_ip,
        "src_port": src_port,
        "engagement": engagement.to_string(),
        "summary": format!("{} ({}) — conf {:.2}, ENG={}", label, vector, confidence, engagement),
    });
    log(session_dir, EventBody::StructEvent(struct_event));
    log(session_dir, EventBody::Classification(classification));
}

fn save_forced_handoff_payload(session_dir: &Path, line: &str, src_ip: &str, src_port: u16) {
    let url = engagement::extract_url(line).unwrap_or(line);
    let name = format!("payload_handoff_{}.bin", crate::models::now_ts() as u64);

    let detected_event = serde_json::json!({
        "type": "payload_detected",
        "url": url,
        "src_ip": src_ip,
        "src_port": src_port,
        "summary": "Download vector detected, handing off",
    });
    log(session_dir, EventBody::StructEvent(detected_event));
    log(session_dir, EventBody::PayloadDetected(url.to_string()));

    match evidence::save_payload(session_dir, url.as_bytes(), Some(&name)) {
        Ok(meta) => {
            let struct_event = serde_json::json!({
                "type": "payload_saved",
                "file": meta.file,
                "path": meta.path,
                "sha256": meta.sha256,
                "size": meta.size,
                "saved_ts": meta.saved_ts,
                "src_ip": src_ip,
                "src_port": src_port,
                "summary": "Payload saved from suspected download",
            });
            log(session_dir, EventBody::StructEvent(struct_event));
            log(session_dir, EventBody::PayloadSaved(meta));
        }
        Err(e) => log(
            session_dir,
            EventBody::Error(format!("PAYLOAD_SAVE_FAILED|{e}")),
        ),
    }
}

/// Transport-level errors expected from a misbehaving or departing peer —
/// these close the session quietly rather than surfacing an `[ERROR]`.
fn is_quiet_transport_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_transport_errors_are_recognized() {
        let e = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(is_quiet_transport_error(&e));
        let e = std::io::Error::from(std::io::ErrorKind::Other);
        assert!(!is_quiet_transport_error(&e));
    }
}
