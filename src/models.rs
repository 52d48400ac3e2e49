use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the epoch, as an `f64` so fractional seconds survive the
/// round trip through `meta.json` the same way the reference implementation's
/// `time.time()` timestamps do.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Attacker-suspected intent, derived from the accumulated event list.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Recon,
    Bruteforce,
    Exploit,
    Malware,
    Unknown,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Recon => "recon",
            Label::Bruteforce => "bruteforce",
            Label::Exploit => "exploit",
            Label::Malware => "malware",
            Label::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Which part of the protocol the classified line looked like.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Vector {
    Download,
    Ssh,
    Command,
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Vector::Download => "download",
            Vector::Ssh => "ssh",
            Vector::Command => "command",
        };
        f.write_str(s)
    }
}

/// How deeply the honeypot engages a given session. Ordered so that
/// sweeping confidence for a fixed label can never move engagement down —
/// `Engagement::Low < Engagement::Medium < Engagement::High`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Engagement {
    Low,
    Medium,
    High,
}

impl fmt::Display for Engagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Engagement::Low => "LOW",
            Engagement::Medium => "MEDIUM",
            Engagement::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Output of the classifier for one line: label, confidence, and the
/// engagement level the policy derives from them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Classification {
    pub label: Label,
    pub confidence: f64,
    pub vector: Vector,
    pub engagement: Engagement,
}

/// Metadata about one captured payload blob.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PayloadMeta {
    pub file: String,
    pub path: String,
    pub sha256: String,
    pub size: u64,
    pub saved_ts: f64,
}

/// The typed sum type over every event the engine can record. `Display`
/// renders the legacy `[TAG]=payload` on-disk form; structured readers
/// should prefer `EventBody::StructEvent`, which carries the same
/// information as a JSON value.
#[derive(Debug, Clone)]
pub enum EventBody {
    /// Verbatim attacker input line or an internal note.
    Raw(String),
    /// A line dispatched inside the fake shell.
    AttackerCmd(String),
    /// Legacy compact classification line: `[CLASS]=label|conf|ENG=level`.
    Classification(Classification),
    /// `[ACTION]=<payload>`
    Action(String),
    /// `[STRUCT_EVENT]=<json>` — the machine-parseable twin of a legacy line.
    StructEvent(serde_json::Value),
    /// `[HIGH_ENGAGEMENT]=<reason>`
    HighEngagement(String),
    /// `[PAYLOAD_DETECTED]=<url>`
    PayloadDetected(String),
    /// `[PAYLOAD_SAVED]=<json dict>`
    PayloadSaved(PayloadMeta),
    /// `[ERROR]=<detail>`
    Error(String),
}

impl fmt::Display for EventBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventBody::Raw(s) => f.write_str(s),
            EventBody::AttackerCmd(s) => write!(f, "ATTACKER_CMD: {s}"),
            EventBody::Classification(c) => {
                write!(
                    f,
                    "[CLASS]={}|{}|ENG={}",
                    c.label, c.confidence, c.engagement
                )
            }
            EventBody::Action(s) => write!(f, "[ACTION]={s}"),
            EventBody::StructEvent(v) => write!(f, "[STRUCT_EVENT]={v}"),
            EventBody::HighEngagement(s) => write!(f, "[HIGH_ENGAGEMENT]={s}"),
            EventBody::PayloadDetected(s) => write!(f, "[PAYLOAD_DETECTED]={s}"),
            EventBody::PayloadSaved(meta) => {
                let json = serde_json::to_string(meta).unwrap_or_default();
                write!(f, "[PAYLOAD_SAVED]={json}")
            }
            EventBody::Error(s) => write!(f, "[ERROR]={s}"),
        }
    }
}

/// One entry as it is actually stored in `meta.json`: a timestamp and the
/// rendered text of an `EventBody`. This is the wire format; `EventBody`
/// is the typed form constructed by the code that produces events.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventRecord {
    pub ts: f64,
    pub text: String,
}

impl EventRecord {
    pub fn new(body: EventBody) -> Self {
        EventRecord {
            ts: now_ts(),
            text: body.to_string(),
        }
    }

    pub fn at(ts: f64, body: EventBody) -> Self {
        EventRecord {
            ts,
            text: body.to_string(),
        }
    }
}

/// The full contents of a session's `meta.json`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionMeta {
    pub session_id: String,
    pub src_ip: String,
    pub src_port: u16,
    pub start_ts: f64,
    pub instance: String,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// Renders an epoch-seconds timestamp as a human-readable local time
/// string, for display in the session inspector.
pub fn format_ts(ts: f64) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Feature vector derived from a session's event list so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    pub wget: bool,
    pub num_commands: usize,
    pub failed_login: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_ordering_is_low_lt_medium_lt_high() {
        assert!(Engagement::Low < Engagement::Medium);
        assert!(Engagement::Medium < Engagement::High);
    }

    #[test]
    fn classification_event_renders_legacy_form() {
        let body = EventBody::Classification(Classification {
            label: Label::Exploit,
            confidence: 0.9,
            vector: Vector::Download,
            engagement: Engagement::High,
        });
        assert_eq!(body.to_string(), "[CLASS]=exploit|0.9|ENG=HIGH");
    }

    #[test]
    fn payload_saved_event_renders_json_dict() {
        let body = EventBody::PayloadSaved(PayloadMeta {
            file: "payload_1.bin".into(),
            path: "/tmp/S-1/payload_1.bin".into(),
            sha256: "abc".into(),
            size: 3,
            saved_ts: 1.0,
        });
        let text = body.to_string();
        assert!(text.starts_with("[PAYLOAD_SAVED]={"));
        assert!(text.contains("\"sha256\":\"abc\""));
    }

    #[test]
    fn attacker_cmd_event_prefixes_line() {
        let body = EventBody::AttackerCmd("ls -la".into());
        assert_eq!(body.to_string(), "ATTACKER_CMD: ls -la");
    }

    #[test]
    fn session_meta_round_trips_through_json() {
        let meta = SessionMeta {
            session_id: "S-1".into(),
            src_ip: "10.0.0.1".into(),
            src_port: 4444,
            start_ts: 1.0,
            instance: "node-a".into(),
            events: vec![EventRecord::at(1.0, EventBody::Raw("uname -a".into()))],
            end_time: None,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("end_time"));
        let parsed: SessionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].text, "uname -a");
    }

    #[test]
    fn format_ts_renders_a_date() {
        let s = format_ts(1_700_000_000.0);
        assert!(s.starts_with("20"), "expected a year prefix, got {s}");
    }
}
