use crate::models::{EventRecord, Features};

/// Derives the feature vector from a session's event list so far. Cheap —
/// O(n) in events, and n is bounded by line rate times session lifetime.
pub fn extract(events: &[EventRecord]) -> Features {
    let mut wget = false;
    let mut failed_login = 0usize;

    for e in events {
        let lower = e.text.to_lowercase();
        if lower.contains("wget") || lower.contains("curl") {
            wget = true;
        }
        if lower.contains("failed") || lower.contains("authentication") {
            failed_login += 1;
        }
    }

    Features {
        wget,
        num_commands: events.len(),
        failed_login,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventBody;

    fn raw(text: &str) -> EventRecord {
        EventRecord::at(0.0, EventBody::Raw(text.to_string()))
    }

    #[test]
    fn detects_wget_case_insensitively() {
        let events = vec![raw("WGET http://x"), raw("ls")];
        let f = extract(&events);
        assert!(f.wget);
        assert_eq!(f.num_commands, 2);
    }

    #[test]
    fn detects_curl_as_download_signal() {
        let events = vec![raw("curl -O http://x")];
        assert!(extract(&events).wget);
    }

    #[test]
    fn counts_failed_login_substrings() {
        let events = vec![
            raw("login failed"),
            raw("authentication failure"),
            raw("whoami"),
        ];
        let f = extract(&events);
        assert_eq!(f.failed_login, 2);
        assert!(!f.wget);
    }

    #[test]
    fn empty_session_has_zeroed_features() {
        let f = extract(&[]);
        assert!(!f.wget);
        assert_eq!(f.num_commands, 0);
        assert_eq!(f.failed_login, 0);
    }
}
