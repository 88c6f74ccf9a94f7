//! Gene x cancer-type lookup: resolve studies and genes, fetch every study,
//! and fold the per-type features into one report

use std::collections::BTreeMap;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::client::{CbioportalClient, CbioportalError};
use super::clinical::{clinical_summary, ClinicalSummary};
use super::copy_number::cna_features;
use super::expression::{expression_features, fold_changes, ExpressionKind};
use super::mutations::mutation_features;
use super::study::{fetch_study_data, StudyData};
use super::SymbolMap;

const NOT_AVAILABLE: &str = "N/A";

/// Per-gene entry of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneReport {
    pub mutation_frequency: f64,
    pub mutation_profile: String,
    pub hotspot_mutations: String,
    pub truncating_pct: f64,
    pub mrna_expression_profile: String,
    pub mrna_z_score: String,
    pub mrna_normal_profile: String,
    pub mrna_fold_change: String,
    pub protein_expression_profile: String,
    pub cna_profile: String,
    pub cna_breakdown: String,
    pub amplification_pct: f64,
    pub deletion_pct: f64,
    pub sample_count: u64,
    pub study_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub total_samples: u64,
    pub studies_analyzed: Vec<String>,
    pub genes_queried: Vec<String>,
    pub data_types_available: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_summary: Option<ClinicalSummary>,
}

/// Serializes as `{"GENE": {...}, ..., "_metadata": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CbioportalReport {
    #[serde(flatten)]
    pub genes: BTreeMap<String, GeneReport>,
    #[serde(rename = "_metadata")]
    pub metadata: ReportMetadata,
}

impl CbioportalReport {
    pub fn to_json_pretty(&self) -> Result<String, CbioportalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl CbioportalClient {
    /// Aggregate mutation, expression, CNA and clinical data for `genes`
    /// across the largest studies matching `cancer_name`.
    ///
    /// `genes` are expected upper-cased and non-empty.
    #[instrument(skip(self), fields(studies = tracing::field::Empty))]
    pub async fn search(
        &self,
        genes: &[String],
        cancer_name: &str,
    ) -> Result<CbioportalReport, CbioportalError> {
        if genes.is_empty() {
            return Err(CbioportalError::InvalidQuery(
                "At least one gene symbol is required".to_string(),
            ));
        }
        if cancer_name.trim().is_empty() {
            return Err(CbioportalError::InvalidQuery(
                "cancer_name must not be empty".to_string(),
            ));
        }

        let study_ids = self.study_ids_for(cancer_name, self.max_studies).await?;
        if study_ids.is_empty() {
            return Err(CbioportalError::NoStudies(cancer_name.to_string()));
        }
        tracing::Span::current().record("studies", study_ids.len());

        let resolved = self.genes(genes).await?;
        if resolved.is_empty() {
            return Err(CbioportalError::UnresolvedGenes);
        }
        let gene_ids: Vec<i64> = resolved.iter().map(|g| g.entrez_gene_id).collect();
        let symbols: SymbolMap = resolved
            .iter()
            .map(|g| (g.entrez_gene_id, g.hugo_gene_symbol.to_uppercase()))
            .collect();
        debug!(resolved = gene_ids.len(), "resolved gene symbols");

        let studies: Vec<StudyData> = join_all(
            study_ids
                .iter()
                .map(|id| fetch_study_data(self, id, &gene_ids)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let report = aggregate(genes, &symbols, studies, cancer_name)?;
        info!(
            total_samples = report.metadata.total_samples,
            data_types = ?report.metadata.data_types_available,
            "cBioPortal search complete"
        );
        Ok(report)
    }
}

/// Combine per-study data into the report
pub fn aggregate(
    genes: &[String],
    symbols: &SymbolMap,
    studies: Vec<StudyData>,
    cancer_name: &str,
) -> Result<CbioportalReport, CbioportalError> {
    if studies.is_empty() {
        return Err(CbioportalError::NoUsableData(cancer_name.to_string()));
    }

    let mut total_samples = 0u64;
    let mut studies_used = Vec::with_capacity(studies.len());
    let mut all = StudyData::default();
    for study in studies {
        total_samples += study.sample_count;
        studies_used.push(study.study_id);
        all.mutations.extend(study.mutations);
        all.mrna_expression.extend(study.mrna_expression);
        all.mrna_normal.extend(study.mrna_normal);
        all.protein_expression.extend(study.protein_expression);
        all.copy_number.extend(study.copy_number);
        all.clinical.extend(study.clinical);
    }

    if all.mutations.is_empty()
        && all.mrna_expression.is_empty()
        && all.protein_expression.is_empty()
        && all.copy_number.is_empty()
    {
        return Err(CbioportalError::NoData);
    }

    let mutations = if all.mutations.is_empty() {
        Default::default()
    } else {
        mutation_features(&all.mutations, total_samples, genes, symbols)
    };
    let mrna = expression_features(&all.mrna_expression, genes, symbols, ExpressionKind::Tumor);
    let normal = expression_features(&all.mrna_normal, genes, symbols, ExpressionKind::Normal);
    let fold = fold_changes(&all.mrna_expression, &all.mrna_normal, genes, symbols);
    let protein = expression_features(&all.protein_expression, genes, symbols, ExpressionKind::Tumor);
    let cna = cna_features(&all.copy_number, genes, symbols);

    let study_count = studies_used.len();
    let mut report_genes = BTreeMap::new();
    for gene in genes {
        let mutation = mutations.get(gene).cloned().unwrap_or_default();
        let expr = mrna.get(gene);
        let prot = protein.get(gene);
        let copy = cna.get(gene).cloned().unwrap_or_default();

        let sample_count = expr
            .or(prot)
            .map(|f| f.sample_count as u64)
            .unwrap_or(total_samples);

        report_genes.insert(
            gene.clone(),
            GeneReport {
                mutation_frequency: mutation.mutation_frequency,
                mutation_profile: mutation.mutation_profile,
                hotspot_mutations: mutation.hotspot_mutations,
                truncating_pct: mutation.truncating_pct,
                mrna_expression_profile: expr
                    .map(|f| f.expression_profile.clone())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                mrna_z_score: expr
                    .and_then(|f| f.z_score_profile.clone())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                mrna_normal_profile: normal
                    .get(gene)
                    .map(|f| f.expression_profile.clone())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                mrna_fold_change: fold
                    .get(gene)
                    .cloned()
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                protein_expression_profile: prot
                    .map(|f| f.expression_profile.clone())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                cna_profile: copy.cna_profile,
                cna_breakdown: copy
                    .cna_breakdown
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                amplification_pct: copy.amplification_pct,
                deletion_pct: copy.deletion_pct,
                sample_count,
                study_count,
            },
        );
    }

    let mut data_types = Vec::new();
    for (present, name) in [
        (!all.mutations.is_empty(), "mutations"),
        (!all.mrna_expression.is_empty(), "mrna_expression"),
        (!all.protein_expression.is_empty(), "protein_expression"),
        (!all.copy_number.is_empty(), "copy_number_alterations"),
        (!all.clinical.is_empty(), "clinical_data"),
    ] {
        if present {
            data_types.push(name.to_string());
        }
    }

    Ok(CbioportalReport {
        genes: report_genes,
        metadata: ReportMetadata {
            total_samples,
            studies_analyzed: studies_used,
            genes_queried: genes.to_vec(),
            data_types_available: data_types,
            clinical_summary: clinical_summary(&all.clinical),
        },
    })
}
