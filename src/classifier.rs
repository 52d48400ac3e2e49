use crate::models::{Features, Label};
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

/// Per-label linear weights for the optional trained artifact. Training
/// this file is an external, out-of-scope pipeline; this crate only
/// implements the inference contract — a fixed-length feature vector in,
/// a label and a probability out.
#[derive(Deserialize, Debug, Clone)]
struct LabelWeights {
    label: Label,
    bias: f64,
    wget: f64,
    num_commands: f64,
    failed_login: f64,
}

#[derive(Deserialize, Debug, Clone)]
struct ModelArtifact {
    weights: Vec<LabelWeights>,
}

fn feature_vec(f: &Features) -> [f64; 3] {
    [if f.wget { 1.0 } else { 0.0 }, f.num_commands as f64, f.failed_login as f64]
}

/// The reference rule table (§4.3) — also the behavior a trained model
/// falls back to when its own scoring fails.
fn rule_classify(f: &Features) -> (Label, f64) {
    if f.wget && f.num_commands > 2 {
        (Label::Exploit, 0.9)
    } else if f.failed_login > 3 {
        (Label::Bruteforce, 0.85)
    } else if f.num_commands <= 2 {
        (Label::Recon, 0.6)
    } else {
        (Label::Unknown, 0.5)
    }
}

trait ScoringModel: Send + Sync {
    fn score(&self, features: &Features) -> Result<(Label, f64)>;
}

struct RuleModel;

impl ScoringModel for RuleModel {
    fn score(&self, features: &Features) -> Result<(Label, f64)> {
        Ok(rule_classify(features))
    }
}

struct TrainedModel {
    artifact: ModelArtifact,
}

impl ScoringModel for TrainedModel {
    fn score(&self, features: &Features) -> Result<(Label, f64)> {
        if self.artifact.weights.is_empty() {
            return Err(anyhow!("model artifact has no label weights"));
        }
        let x = feature_vec(features);
        let scores: Vec<(Label, f64)> = self
            .artifact
            .weights
            .iter()
            .map(|w| {
                let z = w.bias + w.wget * x[0] + w.num_commands * x[1] + w.failed_login * x[2];
                (w.label, z)
            })
            .collect();

        if scores.iter().any(|(_, z)| !z.is_finite()) {
            return Err(anyhow!("model produced a non-finite score"));
        }

        // Softmax over the raw scores so confidence is a real probability.
        let max_z = scores.iter().map(|(_, z)| *z).fold(f64::MIN, f64::max);
        let exp_sum: f64 = scores.iter().map(|(_, z)| (z - max_z).exp()).sum();
        let (best_label, best_z) = scores
            .iter()
            .copied()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or_else(|| anyhow!("model produced no candidate labels"))?;

        let confidence = (best_z - max_z).exp() / exp_sum;
        Ok((best_label, confidence))
    }
}

fn load_artifact(path: &Path) -> Option<ModelArtifact> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            eprintln!("[decoyd] model artifact at {path:?} is malformed, ignoring: {e}");
            None
        }
    }
}

/// The polymorphic classification capability: a trained-model scorer when
/// an artifact is present and well-formed, otherwise the rule fallback.
/// Immutable after construction, so it is trivially shared across handler
/// tasks without locking.
pub struct Classifier {
    model: Box<dyn ScoringModel>,
    pub used_model: bool,
}

impl Classifier {
    pub fn load(model_path: &Path) -> Self {
        match load_artifact(model_path) {
            Some(artifact) => {
                eprintln!("[decoyd] loaded classifier model from {model_path:?}");
                Classifier {
                    model: Box::new(TrainedModel { artifact }),
                    used_model: true,
                }
            }
            None => Classifier {
                model: Box::new(RuleModel),
                used_model: false,
            },
        }
    }

    pub fn rule_only() -> Self {
        Classifier {
            model: Box::new(RuleModel),
            used_model: false,
        }
    }

    /// Classifies `features`. The bool in the result is `true` when the
    /// primary model failed at inference time and the rule fallback ran
    /// in its place — callers use this to tag `[ERROR]=CLASSIFIER_FALLBACK`
    /// at most once per session.
    pub fn classify(&self, features: &Features) -> (Label, f64, bool) {
        match self.model.score(features) {
            Ok((label, confidence)) => (label, confidence, false),
            Err(_) => {
                let (label, confidence) = rule_classify(features);
                (label, confidence, true)
            }
        }
    }
}
