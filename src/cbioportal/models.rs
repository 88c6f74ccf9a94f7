//! cBioPortal API records
//!
//! Only the fields the feature extraction reads are declared; the API sends
//! many more and serde ignores them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub study_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub all_sample_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gene {
    pub entrez_gene_id: i64,
    pub hugo_gene_symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MolecularProfile {
    pub molecular_profile_id: String,
    pub molecular_alteration_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleList {
    pub sample_list_id: String,
    #[serde(default)]
    pub sample_ids: Vec<String>,
    #[serde(default)]
    pub sample_count: Option<u64>,
}

impl SampleList {
    pub fn len(&self) -> u64 {
        if self.sample_ids.is_empty() {
            self.sample_count.unwrap_or(0)
        } else {
            self.sample_ids.len() as u64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub entrez_gene_id: Option<i64>,
    pub patient_id: Option<String>,
    pub sample_id: Option<String>,
    pub tumor_alt_count: Option<i64>,
    pub tumor_ref_count: Option<i64>,
    pub mutation_type: Option<String>,
    pub protein_change: Option<String>,
}

/// One value from a molecular profile (expression z-score, RPPA, GISTIC CNA)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MolecularDatum {
    pub entrez_gene_id: Option<i64>,
    pub sample_id: Option<String>,
    /// Number or numeric string depending on the profile
    pub value: Option<Value>,
}

impl MolecularDatum {
    /// Finite numeric value, if the datum carries one
    pub fn numeric_value(&self) -> Option<f64> {
        let v = match self.value.as_ref()? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        v.is_finite().then_some(v)
    }

    /// Integer level, as used by discrete copy-number profiles
    pub fn integer_value(&self) -> Option<i64> {
        self.numeric_value().map(|v| v.trunc() as i64)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalDatum {
    pub patient_id: Option<String>,
    pub clinical_attribute_id: Option<String>,
    pub value: Option<String>,
}

/// Request body shared by the mutation and molecular-data fetch endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneFilter<'a> {
    pub sample_list_id: &'a str,
    pub entrez_gene_ids: &'a [i64],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_value_accepts_strings_and_numbers() {
        let from_number: MolecularDatum =
            serde_json::from_value(json!({"entrezGeneId": 7157, "value": -1.5})).unwrap();
        assert_eq!(from_number.numeric_value(), Some(-1.5));

        let from_string: MolecularDatum =
            serde_json::from_value(json!({"entrezGeneId": 7157, "value": "2"})).unwrap();
        assert_eq!(from_string.integer_value(), Some(2));

        let nan: MolecularDatum =
            serde_json::from_value(json!({"entrezGeneId": 7157, "value": "NaN"})).unwrap();
        assert_eq!(nan.numeric_value(), None);
    }

    #[test]
    fn test_sample_list_len_falls_back_to_count() {
        let list: SampleList =
            serde_json::from_value(json!({"sampleListId": "brca_all", "sampleCount": 12})).unwrap();
        assert_eq!(list.len(), 12);
    }
}
