use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::labels::ClassLabelTable;

/// One class and its raw score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedClass {
    pub index: usize,
    pub score: f64,
}

/// A ranked class with its resolved name.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledClass {
    pub index: usize,
    pub score: f64,
    pub label: String,
}

/// Outcome of a single classification. Scores are raw model outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub top1_index: usize,
    pub top1_confidence: f64,
    pub top1_label: String,
    pub top_k: Option<Vec<LabeledClass>>,
}

/// Index of the highest score. Ties go to the lowest index.
pub fn top1(scores: &[f64]) -> Option<RankedClass> {
    let mut iter = scores.iter().copied().enumerate();
    let (index, score) = iter.next()?;
    let best = iter.fold(RankedClass { index, score }, |best, (i, s)| {
        if s > best.score { RankedClass { index: i, score: s } } else { best }
    });
    Some(best)
}

/// The `k` highest scores, descending. Equal scores keep index order, so
/// the first entry always agrees with [`top1`].
pub fn top_k(scores: &[f64], k: usize) -> Vec<RankedClass> {
    let mut ranked: Vec<RankedClass> = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| RankedClass { index, score })
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked.truncate(k);
    ranked
}

/// Score as a percentage with two decimals, rounding half to even.
pub fn to_percent(score: f64) -> f64 {
    (score * 10_000.0).round_ties_even() / 100.0
}

/// Turns a score vector into a [`ClassificationResult`].
#[derive(Debug, Clone, Copy)]
pub struct ResultExtractor {
    /// Number of entries in `top_k`; 0 leaves it out.
    pub k: usize,
}

impl ResultExtractor {
    pub fn new(k: usize) -> Self {
        ResultExtractor { k }
    }

    pub fn extract(&self, scores: &[f64], labels: &ClassLabelTable) -> Result<ClassificationResult, ExtractError> {
        let best = top1(scores).ok_or(ExtractError::Empty)?;
        let top1_label = resolve(labels, best.index)?;

        let top_k = if self.k == 0 {
            None
        } else {
            let entries = top_k(scores, self.k)
                .into_iter()
                .map(|r| {
                    Ok(LabeledClass { index: r.index, score: r.score, label: resolve(labels, r.index)? })
                })
                .collect::<Result<Vec<_>, ExtractError>>()?;
            Some(entries)
        };

        Ok(ClassificationResult {
            top1_index: best.index,
            top1_confidence: best.score,
            top1_label,
            top_k,
        })
    }
}

fn resolve(labels: &ClassLabelTable, index: usize) -> Result<String, ExtractError> {
    labels
        .get(index)
        .map(str::to_owned)
        .ok_or(ExtractError::UnknownClassIndex(index))
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKEntry {
    pub index: usize,
    pub conf: f64,
    pub label: String,
}

/// JSON body of a successful `POST /classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub pred_label: usize,
    /// Percentage, two decimals.
    pub pred_conf: f64,
    pub pred_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<Vec<TopKEntry>>,
}

impl From<&ClassificationResult> for ClassifyResponse {
    fn from(r: &ClassificationResult) -> Self {
        ClassifyResponse {
            pred_label: r.top1_index,
            pred_conf: to_percent(r.top1_confidence),
            pred_class: r.top1_label.clone(),
            top_k: r.top_k.as_ref().map(|entries| {
                entries
                    .iter()
                    .map(|e| TopKEntry { index: e.index, conf: to_percent(e.score), label: e.label.clone() })
                    .collect()
            }),
        }
    }
}
