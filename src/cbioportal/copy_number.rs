//! Copy-number alteration features from discrete GISTIC calls
//!
//! Levels: -2 deep deletion, -1 shallow deletion, 0 diploid, 1 gain,
//! 2 high-level amplification.

use std::collections::HashMap;

use serde::Serialize;

use super::models::MolecularDatum;
use super::stats::{mean, pct, round_to};
use super::SymbolMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CnaFeatures {
    /// `amp:{}%|del:{}%|neutral:{}%|dominant:{}`, or `N/A` without data
    pub cna_profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cna_breakdown: Option<String>,
    /// Gain plus high-level amplification
    pub amplification_pct: f64,
    pub deletion_pct: f64,
    pub cna_alteration_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_cna_level: Option<f64>,
}

impl Default for CnaFeatures {
    fn default() -> Self {
        Self {
            cna_profile: "N/A".to_string(),
            cna_breakdown: None,
            amplification_pct: 0.0,
            deletion_pct: 0.0,
            cna_alteration_pct: 0.0,
            mean_cna_level: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LevelCounts {
    deep_del: usize,
    shallow_del: usize,
    neutral: usize,
    gain: usize,
    high_amp: usize,
}

impl LevelCounts {
    fn from_levels(levels: &[i64]) -> Self {
        let mut counts = Self::default();
        for level in levels {
            match level {
                -2 => counts.deep_del += 1,
                -1 => counts.shallow_del += 1,
                0 => counts.neutral += 1,
                1 => counts.gain += 1,
                2 => counts.high_amp += 1,
                _ => {}
            }
        }
        counts
    }

    /// Most frequent call, biased toward the more extreme level on ties
    fn dominant(&self) -> &'static str {
        let c = self;
        if c.high_amp > c.deep_del.max(c.shallow_del).max(c.gain).max(c.neutral) {
            "high_amp"
        } else if c.gain > c.deep_del.max(c.shallow_del).max(c.neutral) {
            "gain"
        } else if c.deep_del > c.shallow_del.max(c.neutral) {
            "deep_del"
        } else if c.shallow_del > c.neutral {
            "shallow_del"
        } else {
            "neutral"
        }
    }
}

/// Copy-number features for every queried gene.
///
/// Returns an empty map when there is no CNA data at all; genes without
/// calls get `CnaFeatures::default()` otherwise.
pub fn cna_features(
    data: &[MolecularDatum],
    genes: &[String],
    symbols: &SymbolMap,
) -> HashMap<String, CnaFeatures> {
    if data.is_empty() {
        return HashMap::new();
    }

    let mut by_gene: HashMap<String, Vec<i64>> = HashMap::new();
    for datum in data {
        let Some(symbol) = datum.entrez_gene_id.and_then(|id| symbols.get(&id)) else {
            continue;
        };
        if !genes.iter().any(|g| g.eq_ignore_ascii_case(symbol)) {
            continue;
        }
        if let Some(level) = datum.integer_value() {
            by_gene.entry(symbol.to_uppercase()).or_default().push(level);
        }
    }

    genes
        .iter()
        .map(|gene| {
            let features = match by_gene.get(&gene.to_uppercase()) {
                Some(levels) if !levels.is_empty() => gene_features(levels),
                _ => CnaFeatures::default(),
            };
            (gene.clone(), features)
        })
        .collect()
}

fn gene_features(levels: &[i64]) -> CnaFeatures {
    let n = levels.len();
    let c = LevelCounts::from_levels(levels);

    let deep_del_pct = pct(c.deep_del, n);
    let shallow_del_pct = pct(c.shallow_del, n);
    let deletion_pct = pct(c.deep_del + c.shallow_del, n);
    let gain_pct = pct(c.gain, n);
    let amp_pct = pct(c.high_amp, n);
    let amplification_pct = pct(c.gain + c.high_amp, n);
    let neutral_pct = pct(c.neutral, n);
    let altered_pct = pct(n - c.neutral, n);

    let as_float: Vec<f64> = levels.iter().map(|l| *l as f64).collect();

    CnaFeatures {
        cna_profile: format!(
            "amp:{:.1}%|del:{:.1}%|neutral:{:.1}%|dominant:{}",
            amp_pct,
            deletion_pct,
            neutral_pct,
            c.dominant()
        ),
        cna_breakdown: Some(format!(
            "deep_del:{:.1}%|shallow_del:{:.1}%|neutral:{:.1}%|gain:{:.1}%|high_amp:{:.1}%",
            deep_del_pct, shallow_del_pct, neutral_pct, gain_pct, amp_pct
        )),
        amplification_pct: round_to(amplification_pct, 2),
        deletion_pct: round_to(deletion_pct, 2),
        cna_alteration_pct: round_to(altered_pct, 2),
        mean_cna_level: Some(round_to(mean(&as_float), 2)),
    }
}
