use crate::models::{Engagement, Label};

/// Turns a (label, confidence) pair into an engagement tier. Monotone in
/// confidence for a fixed label: every arm is a single `>=` threshold test,
/// so raising confidence can only move a session to an equal or higher tier.
pub fn decide_engagement(label: Label, confidence: f64) -> Engagement {
    let aggressive_signature = matches!(label, Label::Exploit | Label::Malware) && confidence >= 0.7;
    let confident_bruteforce = matches!(label, Label::Bruteforce) && confidence >= 0.85;

    if aggressive_signature || confident_bruteforce {
        Engagement::High
    } else if confidence >= 0.5 {
        Engagement::Medium
    } else {
        Engagement::Low
    }
}

/// A download vector (`wget `/`curl `) forces HIGH engagement regardless
/// of what the classifier says — the forced handoff.
pub fn is_forced_handoff(lowercase_line: &str) -> bool {
    lowercase_line.contains("wget ") || lowercase_line.contains("curl ")
}

/// The engagement the orchestrator actually acts on: the forced handoff,
/// if one fires, otherwise the policy's own decision.
pub fn effective_engagement(label: Label, confidence: f64, forced: bool) -> Engagement {
    if forced {
        Engagement::High
    } else {
        decide_engagement(label, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exploit_at_high_confidence_is_high() {
        assert_eq!(decide_engagement(Label::Exploit, 0.9), Engagement::High);
    }

    #[test]
    fn malware_at_threshold_is_high() {
        assert_eq!(decide_engagement(Label::Malware, 0.7), Engagement::High);
    }

    #[test]
    fn bruteforce_needs_higher_bar_than_exploit() {
        assert_eq!(decide_engagement(Label::Bruteforce, 0.8), Engagement::Medium);
        assert_eq!(decide_engagement(Label::Bruteforce, 0.85), Engagement::High);
    }

    #[test]
    fn low_confidence_recon_stays_low() {
        assert_eq!(decide_engagement(Label::Recon, 0.2), Engagement::Low);
    }

    #[test]
    fn mid_confidence_is_medium() {
        assert_eq!(decide_engagement(Label::Recon, 0.6), Engagement::Medium);
    }

    #[test]
    fn policy_is_monotone_in_confidence_for_every_label() {
        for label in [
            Label::Recon,
            Label::Bruteforce,
            Label::Exploit,
            Label::Malware,
            Label::Unknown,
        ] {
            let mut prev = Engagement::Low;
            let mut steps = (0..=100).map(|i| i as f64 / 100.0).collect::<Vec<_>>();
            steps.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for confidence in steps.drain(..) {
                let current = decide_engagement(label, confidence);
                assert!(
                    current >= prev,
                    "engagement decreased for {label:?} going from confidence {prev:?} tier to {current:?} at {confidence}"
                );
                prev = current;
            }
        }
    }

    #[test]
    fn download_vector_forces_high_regardless_of_classifier() {
        assert_eq!(
            effective_engagement(Label::Recon, 0.1, true),
            Engagement::High
        );
    }

    #[test]
    fn is_forced_handoff_matches_wget_and_curl_with_trailing_space() {
        assert!(is_forced_handoff("wget http://x"));
        assert!(is_forced_handoff("curl -o out http://x"));
        assert!(!is_forced_handoff("wgetter"));
    }
}
