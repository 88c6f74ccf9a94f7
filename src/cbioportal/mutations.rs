//! Mutation features per gene

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::models::Mutation;
use super::stats::{mean, most_common, round_to};
use super::SymbolMap;

/// Variant classifications that truncate the protein product
const TRUNCATING_TYPES: [&str; 5] = [
    "Nonsense_Mutation",
    "Frame_Shift_Del",
    "Frame_Shift_Ins",
    "Splice_Site",
    "Translation_Start_Site",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationFeatures {
    /// Fraction of samples with at least one mutation (unique patients)
    pub mutation_frequency: f64,
    /// `freq:{f}|vaf:{v}|types:{type:count|...}`
    pub mutation_profile: String,
    /// Recurrent protein changes, e.g. `V600E(45)|V600K(3)`, or `None`
    pub hotspot_mutations: String,
    pub truncating_pct: f64,
}

impl Default for MutationFeatures {
    fn default() -> Self {
        Self {
            mutation_frequency: 0.0,
            mutation_profile: "freq:0.00".to_string(),
            hotspot_mutations: "None".to_string(),
            truncating_pct: 0.0,
        }
    }
}

/// Compute mutation features for every queried gene.
///
/// Genes with no mutations get `MutationFeatures::default()`.
pub fn mutation_features(
    mutations: &[Mutation],
    total_samples: u64,
    genes: &[String],
    symbols: &SymbolMap,
) -> HashMap<String, MutationFeatures> {
    let mut by_gene: HashMap<&str, Vec<&Mutation>> =
        genes.iter().map(|g| (g.as_str(), Vec::new())).collect();

    for mutation in mutations {
        let Some(symbol) = mutation.entrez_gene_id.and_then(|id| symbols.get(&id)) else {
            continue;
        };
        if let Some(bucket) = by_gene.get_mut(symbol.as_str()) {
            bucket.push(mutation);
        }
    }

    by_gene
        .into_iter()
        .map(|(gene, gene_mutations)| {
            let features = if gene_mutations.is_empty() {
                MutationFeatures::default()
            } else {
                gene_features(&gene_mutations, total_samples)
            };
            (gene.to_string(), features)
        })
        .collect()
}

fn gene_features(mutations: &[&Mutation], total_samples: u64) -> MutationFeatures {
    let patients: HashSet<&str> = mutations
        .iter()
        .filter_map(|m| m.patient_id.as_deref())
        .filter(|p| !p.is_empty())
        .collect();
    let frequency = if total_samples > 0 {
        patients.len() as f64 / total_samples as f64
    } else {
        0.0
    };

    let vafs: Vec<f64> = mutations
        .iter()
        .filter_map(|m| {
            let alt = m.tumor_alt_count.unwrap_or(0);
            let reference = m.tumor_ref_count.unwrap_or(0);
            let total = alt + reference;
            (total > 0).then(|| alt as f64 / total as f64)
        })
        .collect();
    let avg_vaf = mean(&vafs);

    let types: Vec<&str> = mutations
        .iter()
        .map(|m| m.mutation_type.as_deref().unwrap_or("Unknown"))
        .collect();
    let truncating = types
        .iter()
        .filter(|t| TRUNCATING_TYPES.contains(*t))
        .count();
    let truncating_pct = truncating as f64 / mutations.len() as f64 * 100.0;

    let type_dist = most_common(&types)
        .into_iter()
        .take(3)
        .map(|(t, c)| format!("{}:{}", t, c))
        .collect::<Vec<_>>()
        .join("|");

    MutationFeatures {
        mutation_frequency: round_to(frequency, 4),
        mutation_profile: format!("freq:{:.2}|vaf:{:.2}|types:{}", frequency, avg_vaf, type_dist),
        hotspot_mutations: hotspots(mutations),
        truncating_pct: round_to(truncating_pct, 2),
    }
}

/// Protein changes seen in at least max(2, 2% of mutations) cases
fn hotspots(mutations: &[&Mutation]) -> String {
    let changes: Vec<String> = mutations
        .iter()
        .filter_map(|m| m.protein_change.as_deref())
        .filter(|c| *c != "NA")
        .map(|c| c.replace("p.", "").trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let threshold = (mutations.len() as f64 * 0.02).max(2.0);
    let hotspots: Vec<String> = most_common(&changes)
        .into_iter()
        .take(5)
        .filter(|(_, count)| *count as f64 >= threshold)
        .take(3)
        .map(|(change, count)| format!("{}({})", change, count))
        .collect();

    if hotspots.is_empty() {
        "None".to_string()
    } else {
        hotspots.join("|")
    }
}
