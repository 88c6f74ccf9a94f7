//! Patient-level clinical summary for a cohort

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::models::ClinicalDatum;
use super::stats::{mean, median, round_to, sample_std};

const AGE_ATTRIBUTES: [&str; 4] = ["AGE", "AGE_AT_DIAGNOSIS", "AGE_AT_SEQUENCING", "PATIENT_AGE"];
const SURVIVAL_ATTRIBUTES: [&str; 3] = ["OS_MONTHS", "OVERALL_SURVIVAL_MONTHS", "SURVIVAL_MONTHS"];
const STATUS_ATTRIBUTES: [&str; 3] = ["OS_STATUS", "OVERALL_SURVIVAL_STATUS", "VITAL_STATUS"];
const STAGE_ATTRIBUTES: [&str; 5] = [
    "STAGE",
    "TUMOR_STAGE",
    "AJCC_STAGE",
    "PATHOLOGIC_STAGE",
    "CLINICAL_STAGE",
];
const GRADE_ATTRIBUTES: [&str; 3] = ["GRADE", "TUMOR_GRADE", "HISTOLOGICAL_GRADE"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClinicalSummary {
    pub total_patients: usize,
    pub clinical_attributes_available: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_std: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub survival_median_months: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survival_mean_months: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survival_range_months: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patients_with_survival_data: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mortality_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_distribution: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patients_with_stage_data: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_distribution: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patients_with_grade_data: Option<usize>,

    /// `"{n} attributes available"`
    pub clinical_data_completeness: String,
}

/// Summarize patient clinical attributes. `None` when there is no data.
pub fn clinical_summary(data: &[ClinicalDatum]) -> Option<ClinicalSummary> {
    if data.is_empty() {
        return None;
    }

    let patients: HashSet<&str> = data
        .iter()
        .filter_map(|d| d.patient_id.as_deref())
        .filter(|p| !p.is_empty())
        .collect();

    let mut attributes: HashMap<&str, Vec<&str>> = HashMap::new();
    for datum in data {
        if let (Some(attr), Some(value)) = (
            datum.clinical_attribute_id.as_deref(),
            datum.value.as_deref(),
        ) {
            if !attr.is_empty() && !value.is_empty() {
                attributes.entry(attr).or_default().push(value);
            }
        }
    }

    let mut summary = ClinicalSummary {
        total_patients: patients.len(),
        ..Default::default()
    };

    if let Some(values) = first_present(&attributes, &AGE_ATTRIBUTES) {
        let ages = parse_floats(&values, |a| a > 0.0 && a < 120.0);
        if !ages.is_empty() {
            let (lo, hi) = min_max(&ages);
            summary.age_mean = Some(round_to(mean(&ages), 1));
            summary.age_median = Some(round_to(median(&ages), 1));
            summary.age_range = Some(format!("{}-{}", lo as i64, hi as i64));
            summary.age_std = Some(round_to(sample_std(&ages), 1));
            summary.clinical_attributes_available.push("age".to_string());
        }
    }

    if let Some(values) = first_present(&attributes, &SURVIVAL_ATTRIBUTES) {
        let months = parse_floats(&values, |m| m >= 0.0);
        if !months.is_empty() {
            let (lo, hi) = min_max(&months);
            summary.survival_median_months = Some(round_to(median(&months), 1));
            summary.survival_mean_months = Some(round_to(mean(&months), 1));
            summary.survival_range_months = Some(format!("{:.1}-{:.1}", lo, hi));
            summary.patients_with_survival_data = Some(months.len());
            summary
                .clinical_attributes_available
                .push("survival".to_string());
        }
    }

    if let Some(statuses) = first_present(&attributes, &STATUS_ATTRIBUTES) {
        let deceased = statuses
            .iter()
            .map(|s| s.to_uppercase())
            .filter(|s| s.contains("DECEASED") || s.contains("DEAD"))
            .count();
        summary.mortality_rate = Some(round_to(
            deceased as f64 / statuses.len() as f64 * 100.0,
            1,
        ));
    }

    if let Some(values) = first_present(&attributes, &STAGE_ATTRIBUTES) {
        let buckets: Vec<&'static str> = values.iter().filter_map(|s| stage_bucket(s)).collect();
        if let Some(dist) = distribution(&buckets, "stage") {
            summary.stage_distribution = Some(dist);
            summary.patients_with_stage_data = Some(buckets.len());
            summary.clinical_attributes_available.push("stage".to_string());
        }
    }

    if let Some(values) = first_present(&attributes, &GRADE_ATTRIBUTES) {
        let buckets: Vec<&'static str> = values.iter().filter_map(|g| grade_bucket(g)).collect();
        if let Some(dist) = distribution(&buckets, "grade") {
            summary.grade_distribution = Some(dist);
            summary.patients_with_grade_data = Some(buckets.len());
            summary.clinical_attributes_available.push("grade".to_string());
        }
    }

    summary.clinical_data_completeness = format!(
        "{} attributes available",
        summary.clinical_attributes_available.len()
    );
    Some(summary)
}

/// Values of the first candidate attribute present in the data
fn first_present<'a>(
    attributes: &HashMap<&'a str, Vec<&'a str>>,
    candidates: &[&str],
) -> Option<Vec<&'a str>> {
    candidates
        .iter()
        .find_map(|name| attributes.get(*name).cloned())
}

fn parse_floats(values: &[&str], keep: impl Fn(f64) -> bool) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && keep(*v))
        .collect()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

/// Broad stage I-IV from labels like `Stage IIIA`, `IIB` or `STAGE IV`.
/// Each label lands in at most one bucket.
fn stage_bucket(label: &str) -> Option<&'static str> {
    let upper = label.trim().to_uppercase();
    let rest = upper.strip_prefix("STAGE").unwrap_or(&upper).trim_start();
    let numeral: String = rest.chars().take_while(|c| *c == 'I' || *c == 'V').collect();
    match numeral.as_str() {
        "I" => Some("I"),
        "II" => Some("II"),
        "III" => Some("III"),
        "IV" => Some("IV"),
        _ => None,
    }
}

/// G1-G4 from labels like `G2`, `2` or `Grade 3`
fn grade_bucket(label: &str) -> Option<&'static str> {
    match label.chars().find(|c| c.is_ascii_digit())? {
        '1' => Some("G1"),
        '2' => Some("G2"),
        '3' => Some("G3"),
        '4' => Some("G4"),
        _ => None,
    }
}

/// `{prefix}_{bucket}: "{count} ({pct}%)"`, `None` when nothing was bucketed
fn distribution(buckets: &[&str], prefix: &str) -> Option<BTreeMap<String, String>> {
    if buckets.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for bucket in buckets {
        *counts.entry(*bucket).or_default() += 1;
    }
    let total = buckets.len() as f64;
    Some(
        counts
            .into_iter()
            .map(|(bucket, count)| {
                (
                    format!("{}_{}", prefix, bucket),
                    format!("{} ({:.1}%)", count, count as f64 / total * 100.0),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datum(patient: &str, attr: &str, value: &str) -> ClinicalDatum {
        ClinicalDatum {
            patient_id: Some(patient.to_string()),
            clinical_attribute_id: Some(attr.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_empty_data_has_no_summary() {
        assert!(clinical_summary(&[]).is_none());
    }

    #[test]
    fn test_age_survival_and_mortality() {
        let data = vec![
            datum("P1", "AGE", "50"),
            datum("P2", "AGE", "70"),
            datum("P3", "AGE", "150"),
            datum("P1", "OS_MONTHS", "12.5"),
            datum("P2", "OS_MONTHS", "NA"),
            datum("P1", "OS_STATUS", "1:DECEASED"),
            datum("P2", "OS_STATUS", "0:LIVING"),
        ];

        let summary = clinical_summary(&data).unwrap();
        assert_eq!(summary.total_patients, 3);
        assert_eq!(summary.age_mean, Some(60.0));
        assert_eq!(summary.age_range.as_deref(), Some("50-70"));
        assert_eq!(summary.age_std, Some(14.1));
        assert_eq!(summary.survival_range_months.as_deref(), Some("12.5-12.5"));
        assert_eq!(summary.patients_with_survival_data, Some(1));
        assert_eq!(summary.mortality_rate, Some(50.0));
        assert_eq!(summary.clinical_attributes_available, vec!["age", "survival"]);
        assert_eq!(summary.clinical_data_completeness, "2 attributes available");
    }

    #[test]
    fn test_stage_labels_count_once() {
        let data = vec![
            datum("P1", "AJCC_STAGE", "Stage IIIA"),
            datum("P2", "AJCC_STAGE", "Stage I"),
            datum("P3", "AJCC_STAGE", "IIB"),
            datum("P4", "AJCC_STAGE", "[Not Available]"),
        ];

        let summary = clinical_summary(&data).unwrap();
        let dist = summary.stage_distribution.unwrap();
        assert_eq!(dist.len(), 3);
        assert_eq!(dist["stage_III"], "1 (33.3%)");
        assert_eq!(dist["stage_I"], "1 (33.3%)");
        assert_eq!(summary.patients_with_stage_data, Some(3));
    }

    #[test]
    fn test_grade_buckets() {
        assert_eq!(grade_bucket("G2"), Some("G2"));
        assert_eq!(grade_bucket("Grade 3"), Some("G3"));
        assert_eq!(grade_bucket("GX"), None);
        assert_eq!(stage_bucket("STAGE IVB"), Some("IV"));
        assert_eq!(stage_bucket("Stage X"), None);
    }
}
