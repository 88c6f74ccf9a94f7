//! `search_protein_expression`: protein-only view of the cBioPortal search

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::cbioportal::{gene_query, run_search};
use super::{BioTool, ToolOutput};
use crate::cbioportal::{CbioportalClient, CbioportalReport};
use crate::llm::Tool;

pub const NAME: &str = "search_protein_expression";

const DESCRIPTION: &str = "Protein-only view of search_cbioportal. Prefer search_cbioportal, \
which returns mutations, mRNA and protein data in one call; use this only when you need \
protein (RPPA z-score) expression alone. Query 3-10 proteins per call and call once per \
cancer type to compare.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProteinEntry {
    pub protein_expression_profile: String,
    pub sample_count: u64,
    pub study_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProteinMetadata {
    pub total_samples: u64,
    pub studies_analyzed: Vec<String>,
    pub proteins_queried: Vec<String>,
    pub data_types_available: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProteinReport {
    #[serde(flatten)]
    pub proteins: BTreeMap<String, ProteinEntry>,
    #[serde(rename = "_metadata")]
    pub metadata: ProteinMetadata,
}

/// Keep only the protein fields of a full report
pub fn project(report: &CbioportalReport) -> ProteinReport {
    let proteins = report
        .genes
        .iter()
        .map(|(gene, entry)| {
            (
                gene.clone(),
                ProteinEntry {
                    protein_expression_profile: entry.protein_expression_profile.clone(),
                    sample_count: entry.sample_count,
                    study_count: entry.study_count,
                },
            )
        })
        .collect();

    ProteinReport {
        proteins,
        metadata: ProteinMetadata {
            total_samples: report.metadata.total_samples,
            studies_analyzed: report.metadata.studies_analyzed.clone(),
            proteins_queried: report.metadata.genes_queried.clone(),
            data_types_available: report.metadata.data_types_available.clone(),
        },
    }
}

pub struct ProteinExpressionTool {
    client: Arc<CbioportalClient>,
}

impl ProteinExpressionTool {
    pub fn new(client: Arc<CbioportalClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BioTool for ProteinExpressionTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn definition(&self) -> Tool {
        Tool::function(
            NAME,
            DESCRIPTION,
            json!({
                "type": "object",
                "properties": {
                    "proteins": {
                        "type": "string",
                        "description": "Comma-separated protein/gene symbols, e.g. 'AKT1,EGFR,TP53,PTEN'"
                    },
                    "cancer_name": {
                        "type": "string",
                        "description": "Cancer type keyword, e.g. 'Breast' or 'Triple Negative Breast Cancer'"
                    }
                },
                "required": ["proteins", "cancer_name"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> ToolOutput {
        let (proteins, cancer_name) = match gene_query(args, "proteins") {
            Ok(query) => query,
            Err(message) => return ToolOutput::error(message),
        };

        match run_search(&self.client, &proteins, &cancer_name).await {
            Ok(report) => match serde_json::to_string_pretty(&project(&report)) {
                Ok(text) => ToolOutput::ok(text),
                Err(e) => ToolOutput::error(format!("Error processing results: {}", e)),
            },
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbioportal::models::MolecularDatum;
    use crate::cbioportal::{aggregate, StudyData, SymbolMap};

    #[test]
    fn test_projection_keeps_protein_fields() {
        let study = StudyData {
            study_id: "brca_tcga".to_string(),
            sample_count: 3,
            protein_expression: vec![
                MolecularDatum {
                    entrez_gene_id: Some(207),
                    sample_id: None,
                    value: Some(json!(1.0)),
                },
                MolecularDatum {
                    entrez_gene_id: Some(207),
                    sample_id: None,
                    value: Some(json!(3.0)),
                },
            ],
            ..Default::default()
        };
        let symbols = SymbolMap::from([(207, "AKT1".to_string())]);
        let genes = vec!["AKT1".to_string()];
        let report = aggregate(&genes, &symbols, vec![study], "Breast").unwrap();

        let projected = project(&report);
        let akt1 = &projected.proteins["AKT1"];
        assert_eq!(
            akt1.protein_expression_profile,
            "mean:2.00|median:2.00|std:1.41|altered_pct:50.00"
        );
        assert_eq!(akt1.sample_count, 2);
        assert_eq!(akt1.study_count, 1);

        let value = serde_json::to_value(&projected).unwrap();
        assert_eq!(value["_metadata"]["proteins_queried"], json!(["AKT1"]));
        assert!(value["_metadata"].get("genes_queried").is_none());
        assert!(value["AKT1"].get("mutation_profile").is_none());
    }

    #[tokio::test]
    async fn test_rejects_missing_proteins() {
        let tool =
            ProteinExpressionTool::new(Arc::new(CbioportalClient::new("http://localhost:1").unwrap()));
        let output = tool.call(&json!({"cancer_name": "Breast"})).await;
        assert!(output.is_error);
        assert!(output.content.contains("proteins"));
    }
}
