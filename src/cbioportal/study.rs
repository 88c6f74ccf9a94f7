//! Everything fetched from a single study

use std::future::Future;

use tracing::{debug, warn};

use super::client::{
    select_normal_sample_list, select_profiles, select_sample_list, CbioportalClient,
    CbioportalError,
};
use super::models::{ClinicalDatum, MolecularDatum, Mutation};

#[derive(Debug, Clone, Default)]
pub struct StudyData {
    pub study_id: String,
    pub sample_count: u64,
    pub mutations: Vec<Mutation>,
    pub mrna_expression: Vec<MolecularDatum>,
    pub mrna_normal: Vec<MolecularDatum>,
    pub protein_expression: Vec<MolecularDatum>,
    pub copy_number: Vec<MolecularDatum>,
    pub clinical: Vec<ClinicalDatum>,
}

/// Fetch all available data types of one study for the given genes.
///
/// Returns `None` when the study has no usable sample list. Failures of
/// individual data types are logged and leave that type empty.
pub async fn fetch_study_data(
    client: &CbioportalClient,
    study_id: &str,
    gene_ids: &[i64],
) -> Option<StudyData> {
    let (profiles, sample_lists) = tokio::join!(
        client.molecular_profiles(study_id),
        client.sample_lists(study_id)
    );
    let profiles = match profiles {
        Ok(p) => p,
        Err(e) => {
            warn!(study_id, error = %e, "failed to list molecular profiles");
            return None;
        }
    };
    let sample_lists = match sample_lists {
        Ok(l) => l,
        Err(e) => {
            warn!(study_id, error = %e, "failed to list sample lists");
            return None;
        }
    };

    let selection = select_profiles(&profiles);
    let sample_list_id = select_sample_list(&sample_lists)?;
    let normal_list_id = select_normal_sample_list(&sample_lists);

    let sample_count = match client.sample_list(sample_list_id).await {
        Ok(list) => list.len(),
        Err(e) => {
            warn!(study_id, sample_list_id, error = %e, "failed to fetch sample list");
            0
        }
    };
    if sample_count == 0 {
        debug!(study_id, "study has no samples, skipping");
        return None;
    }

    let mrna = selection.mrna.as_deref();
    let tumor = Some(sample_list_id);

    let (mutations, mrna_expression, mrna_normal, protein_expression, copy_number, clinical) = tokio::join!(
        mutations_or_empty(client, selection.mutation.as_deref(), sample_list_id, gene_ids, study_id),
        molecular_or_empty(client, mrna, tumor, gene_ids, study_id, "mrna_expression"),
        molecular_or_empty(client, mrna, normal_list_id, gene_ids, study_id, "mrna_normal"),
        molecular_or_empty(client, selection.protein.as_deref(), tumor, gene_ids, study_id, "protein_expression"),
        molecular_or_empty(client, selection.cna.as_deref(), tumor, gene_ids, study_id, "copy_number"),
        or_empty(client.clinical_data(study_id), study_id, "clinical"),
    );

    debug!(
        study_id,
        sample_count,
        mutations = mutations.len(),
        mrna = mrna_expression.len(),
        protein = protein_expression.len(),
        cna = copy_number.len(),
        "fetched study data"
    );

    Some(StudyData {
        study_id: study_id.to_string(),
        sample_count,
        mutations,
        mrna_expression,
        mrna_normal,
        protein_expression,
        copy_number,
        clinical,
    })
}

async fn mutations_or_empty(
    client: &CbioportalClient,
    profile: Option<&str>,
    sample_list_id: &str,
    gene_ids: &[i64],
    study_id: &str,
) -> Vec<Mutation> {
    match profile {
        Some(profile) => {
            or_empty(
                client.mutations(profile, sample_list_id, gene_ids),
                study_id,
                "mutations",
            )
            .await
        }
        None => Vec::new(),
    }
}

async fn molecular_or_empty(
    client: &CbioportalClient,
    profile: Option<&str>,
    sample_list_id: Option<&str>,
    gene_ids: &[i64],
    study_id: &str,
    what: &'static str,
) -> Vec<MolecularDatum> {
    let (Some(profile), Some(sample_list_id)) = (profile, sample_list_id) else {
        return Vec::new();
    };
    or_empty(
        client.molecular_data(profile, sample_list_id, gene_ids),
        study_id,
        what,
    )
    .await
}

async fn or_empty<T, F>(request: F, study_id: &str, what: &'static str) -> Vec<T>
where
    F: Future<Output = Result<Vec<T>, CbioportalError>>,
{
    match request.await {
        Ok(items) => items,
        Err(e) => {
            warn!(study_id, data_type = what, error = %e, "fetch failed, continuing without it");
            Vec::new()
        }
    }
}
