//! mRNA and protein (RPPA) expression features
//!
//! Tumor values are treated as z-scores: a sample is "altered" when
//! |z| > 2. Normal-tissue values only get location/spread statistics.

use std::collections::HashMap;

use serde::Serialize;

use super::models::MolecularDatum;
use super::stats::{mean, median, pct, percentile, sample_std};
use super::SymbolMap;

/// z-score magnitude beyond which a sample counts as over/under expressed
const Z_ALTERED: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Tumor,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionFeatures {
    pub expression_profile: String,
    /// Only present for tumor data
    pub z_score_profile: Option<String>,
    pub sample_count: usize,
}

/// Finite values per queried gene. Genes with no values are absent.
pub(crate) fn values_by_gene(
    data: &[MolecularDatum],
    genes: &[String],
    symbols: &SymbolMap,
) -> HashMap<String, Vec<f64>> {
    let mut by_gene: HashMap<String, Vec<f64>> = HashMap::new();
    for datum in data {
        let Some(symbol) = datum.entrez_gene_id.and_then(|id| symbols.get(&id)) else {
            continue;
        };
        if !genes.iter().any(|g| g.eq_ignore_ascii_case(symbol)) {
            continue;
        }
        if let Some(value) = datum.numeric_value() {
            by_gene.entry(symbol.to_uppercase()).or_default().push(value);
        }
    }
    by_gene
}

pub fn expression_features(
    data: &[MolecularDatum],
    genes: &[String],
    symbols: &SymbolMap,
    kind: ExpressionKind,
) -> HashMap<String, ExpressionFeatures> {
    let by_gene = values_by_gene(data, genes, symbols);

    let mut features = HashMap::new();
    for gene in genes {
        let Some(values) = by_gene.get(&gene.to_uppercase()).filter(|v| !v.is_empty()) else {
            continue;
        };

        let mean_expr = mean(values);
        let median_expr = median(values);
        let std_expr = sample_std(values);
        let n = values.len();

        let gene_features = match kind {
            ExpressionKind::Normal => ExpressionFeatures {
                expression_profile: format!(
                    "mean:{:.2}|median:{:.2}|std:{:.2}",
                    mean_expr, median_expr, std_expr
                ),
                z_score_profile: None,
                sample_count: n,
            },
            ExpressionKind::Tumor => {
                let high = values.iter().filter(|v| **v > Z_ALTERED).count();
                let low = values.iter().filter(|v| **v < -Z_ALTERED).count();
                let altered = values.iter().filter(|v| v.abs() > Z_ALTERED).count();

                ExpressionFeatures {
                    expression_profile: format!(
                        "mean:{:.2}|median:{:.2}|std:{:.2}|altered_pct:{:.2}",
                        mean_expr,
                        median_expr,
                        std_expr,
                        pct(altered, n)
                    ),
                    z_score_profile: Some(format!(
                        "mean_z:{:.2}|high_pct:{:.2}|low_pct:{:.2}|q25:{:.2}|q75:{:.2}",
                        mean_expr,
                        pct(high, n),
                        pct(low, n),
                        percentile(values, 25.0),
                        percentile(values, 75.0)
                    )),
                    sample_count: n,
                }
            }
        };
        features.insert(gene.clone(), gene_features);
    }
    features
}

/// Tumor vs normal comparison per gene, as a profile string
///
/// Values are assumed to be log2-scaled already, so the log2 fold change is
/// the difference of means.
pub fn fold_changes(
    tumor: &[MolecularDatum],
    normal: &[MolecularDatum],
    genes: &[String],
    symbols: &SymbolMap,
) -> HashMap<String, String> {
    let tumor_values = values_by_gene(tumor, genes, symbols);
    let normal_values = values_by_gene(normal, genes, symbols);

    let mut features = HashMap::new();
    for gene in genes {
        let key = gene.to_uppercase();
        let (Some(t), Some(n)) = (tumor_values.get(&key), normal_values.get(&key)) else {
            continue;
        };
        if t.is_empty() || n.is_empty() {
            continue;
        }

        let normal_mean = mean(n);
        let log2fc = mean(t) - normal_mean;
        let up = t.iter().filter(|v| **v > normal_mean).count();
        let down = t.iter().filter(|v| **v < normal_mean).count();

        let effect = match log2fc.abs() {
            x if x < 0.5 => "minimal",
            x if x < 1.0 => "moderate",
            _ => "strong",
        };
        let direction = if log2fc > 0.0 { "up" } else { "down" };

        features.insert(
            gene.clone(),
            format!(
                "log2fc:{:.2}|{}|{}|up_pct:{:.2}|down_pct:{:.2}",
                log2fc,
                direction,
                effect,
                pct(up, t.len()),
                pct(down, t.len())
            ),
        );
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn datum(gene: i64, value: f64) -> MolecularDatum {
        MolecularDatum {
            entrez_gene_id: Some(gene),
            sample_id: None,
            value: Some(json!(value)),
        }
    }

    fn symbols() -> SymbolMap {
        SymbolMap::from([(1956, "EGFR".to_string()), (2064, "ERBB2".to_string())])
    }

    #[test]
    fn test_tumor_profile_counts_altered_samples() {
        let data = vec![
            datum(1956, 3.0),
            datum(1956, -2.5),
            datum(1956, 0.5),
            datum(1956, 1.0),
        ];
        let genes = vec!["EGFR".to_string(), "ERBB2".to_string()];

        let features = expression_features(&data, &genes, &symbols(), ExpressionKind::Tumor);

        let egfr = &features["EGFR"];
        assert_eq!(egfr.sample_count, 4);
        assert_eq!(
            egfr.expression_profile,
            "mean:0.50|median:0.75|std:2.27|altered_pct:50.00"
        );
        assert_eq!(
            egfr.z_score_profile.as_deref(),
            Some("mean_z:0.50|high_pct:25.00|low_pct:25.00|q25:-0.25|q75:1.50")
        );
        // No values for ERBB2, so no entry
        assert!(!features.contains_key("ERBB2"));
    }

    #[test]
    fn test_normal_profile_has_no_z_scores() {
        let data = vec![datum(2064, 1.0)];
        let genes = vec!["ERBB2".to_string()];
        let features = expression_features(&data, &genes, &symbols(), ExpressionKind::Normal);
        let erbb2 = &features["ERBB2"];
        assert_eq!(erbb2.expression_profile, "mean:1.00|median:1.00|std:0.00");
        assert!(erbb2.z_score_profile.is_none());
    }

    #[test]
    fn test_fold_change_direction_and_effect() {
        let tumor = vec![datum(2064, 5.0), datum(2064, 7.0)];
        let normal = vec![datum(2064, 4.0), datum(2064, 4.0)];
        let genes = vec!["ERBB2".to_string(), "EGFR".to_string()];

        let fc = fold_changes(&tumor, &normal, &genes, &symbols());
        assert_eq!(
            fc["ERBB2"],
            "log2fc:2.00|up|strong|up_pct:100.00|down_pct:0.00"
        );
        assert!(!fc.contains_key("EGFR"));
    }
}
