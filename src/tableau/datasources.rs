//! Project and datasource operations on an authenticated [`Session`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::tableau::client::{Datasource, Session};
use crate::tableau::convert::ConversionSummary;
use crate::tableau::error::{TableauError, TableauResult};

/// A datasource that was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedDataset {
    /// Datasource name (the file stem).
    pub name: String,
    /// Datasource LUID.
    pub id: String,
    /// LUID of the target project.
    pub project_id: String,
    /// Name of the target project.
    pub project: String,
    /// File that was published.
    pub file_path: PathBuf,
    /// Present when the file was converted to Hyper before publishing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionSummary>,
}

/// Result of looking up a datasource by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetCheck {
    /// Whether the datasource exists in the project.
    pub exists: bool,
    /// Name that was looked up.
    pub name: String,
    /// Datasource LUID, when found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Project LUID, when found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Project name.
    pub project: String,
}

/// One entry of a [`DatasetListing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetEntry {
    /// Datasource name.
    pub name: String,
    /// Datasource LUID.
    pub id: String,
    /// LUID of the project holding it.
    pub project_id: String,
}

/// Every datasource of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetListing {
    /// Project name that was listed.
    pub project: String,
    /// Number of entries in `datasets`.
    pub count: usize,
    /// Datasources in server order.
    pub datasets: Vec<DatasetEntry>,
}

/// Finds the LUID of the project called `name`.
///
/// Names are matched exactly; when several projects share a name, the first
/// one listed by the server wins.
///
/// # Errors
///
/// Returns [`TableauError::NotFound`] if no project has that name.
pub async fn resolve_project_id(session: &Session, name: &str) -> TableauResult<String> {
    let projects = session.list_projects().await?;
    let project = projects
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| TableauError::project_not_found(name))?;
    debug!(project = name, id = %project.id, "Resolved project");
    Ok(project.id)
}

async fn datasources_in(session: &Session, project_id: &str) -> TableauResult<Vec<Datasource>> {
    let all = session.list_datasources().await?;
    Ok(all
        .into_iter()
        .filter(|d| d.project_id() == Some(project_id))
        .collect())
}

/// Publishes `file` into `project`, replacing a same-named datasource.
///
/// The datasource is named after the file stem.
///
/// # Errors
///
/// Returns an error if the project does not exist or publishing fails.
pub async fn publish(
    session: &Session,
    file: &Path,
    project: &str,
) -> TableauResult<PublishedDataset> {
    let name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let project_id = resolve_project_id(session, project).await?;
    let published = session.publish_datasource(file, &name, &project_id).await?;

    Ok(PublishedDataset {
        name: published.name,
        id: published.id,
        project_id,
        project: project.to_string(),
        file_path: file.to_path_buf(),
        conversion: None,
    })
}

/// Looks up a datasource by exact name within `project`.
///
/// An absent datasource is not an error.
///
/// # Errors
///
/// Returns an error if the project does not exist or a request fails.
pub async fn check_dataset(
    session: &Session,
    name: &str,
    project: &str,
) -> TableauResult<DatasetCheck> {
    let project_id = resolve_project_id(session, project).await?;
    let found = datasources_in(session, &project_id)
        .await?
        .into_iter()
        .find(|d| d.name == name);

    info!(
        dataset = name,
        project,
        exists = found.is_some(),
        "Checked dataset"
    );
    Ok(match found {
        Some(datasource) => DatasetCheck {
            exists: true,
            name: datasource.name,
            id: Some(datasource.id),
            project_id: Some(project_id),
            project: project.to_string(),
        },
        None => DatasetCheck {
            exists: false,
            name: name.to_string(),
            id: None,
            project_id: None,
            project: project.to_string(),
        },
    })
}

/// Lists the datasources of `project`, in server order.
///
/// # Errors
///
/// Returns an error if the project does not exist or a request fails.
pub async fn list_datasets(session: &Session, project: &str) -> TableauResult<DatasetListing> {
    let project_id = resolve_project_id(session, project).await?;
    let datasets: Vec<DatasetEntry> = datasources_in(session, &project_id)
        .await?
        .into_iter()
        .map(|d| DatasetEntry {
            name: d.name,
            id: d.id,
            project_id: project_id.clone(),
        })
        .collect();

    Ok(DatasetListing {
        project: project.to_string(),
        count: datasets.len(),
        datasets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_check_omits_ids() {
        let check = DatasetCheck {
            exists: false,
            name: "Q3 Orders".to_string(),
            id: None,
            project_id: None,
            project: "Sales".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&check).unwrap(),
            serde_json::json!({"exists": false, "name": "Q3 Orders", "project": "Sales"})
        );
    }

    #[test]
    fn published_dataset_without_conversion() {
        let published = PublishedDataset {
            name: "sales".to_string(),
            id: "ds-1".to_string(),
            project_id: "p-1".to_string(),
            project: "Sales".to_string(),
            file_path: PathBuf::from("/data/sales.hyper"),
            conversion: None,
        };
        let value = serde_json::to_value(&published).unwrap();
        assert_eq!(value["file_path"], "/data/sales.hyper");
        assert!(value.get("conversion").is_none());
    }
}
