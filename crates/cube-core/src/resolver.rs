//! Dataset lookup-or-create.
//!
//! A dataset is identified by its exact name within a project, optionally
//! within one folder. At most one may match; more than one is a hard error
//! and nothing is created.

use serde::Deserialize;
use serde_json::json;

use cube_common::{DatasetId, Error, FolderId, ProjectId, Result, Schema};
use cube_config::TargetConfig;

use crate::catalog;
use crate::encode::encode_rows;
use crate::http::HttpSession;
use crate::log_event;
use crate::logging::{event_names, Stage};
use crate::mapping::ColumnMapping;

/// Search object type of cube datasets.
const CUBE_DATASET_TYPE: &str = "CUBE_DATASET";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResults {
    pub total_items: u64,
    pub result: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub ancestors: Vec<Ancestor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ancestor {
    pub id: String,
    pub name: String,
    pub level: Option<i64>,
}

impl SearchHit {
    /// Immediate parent folder: the lowest `level`, or the last ancestor when
    /// the server sends no levels.
    pub fn parent_folder(&self) -> Option<&Ancestor> {
        if self.ancestors.iter().any(|a| a.level.is_some()) {
            self.ancestors
                .iter()
                .filter(|a| a.level.is_some())
                .min_by_key(|a| a.level)
        } else {
            self.ancestors.last()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDataset {
    dataset_id: Option<String>,
    id: Option<String>,
}

/// How `resolve_or_create` obtained the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Existing(DatasetId),
    Created(DatasetId),
}

impl Resolution {
    pub fn dataset_id(&self) -> &DatasetId {
        match self {
            Resolution::Existing(id) | Resolution::Created(id) => id,
        }
    }

    pub fn into_dataset_id(self) -> DatasetId {
        match self {
            Resolution::Existing(id) | Resolution::Created(id) => id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

/// Project id from config: the id when given, else an exact-name lookup.
pub fn resolve_project(http: &mut HttpSession, target: &TargetConfig) -> Result<ProjectId> {
    let project_id = match target.project_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => ProjectId::new(id),
        _ => {
            let name = target.project_name.as_deref().unwrap_or("").trim();
            catalog::find_project_id(http, name)?
        }
    };

    log_event!(
        http.log(),
        INFO,
        event_names::PROJECT_RESOLVED,
        Stage::Resolve,
        "Project resolved",
        resolved_project = project_id.as_str()
    );
    Ok(project_id)
}

/// Datasets whose name equals `name` exactly, scoped to `folder` when given.
pub fn find_datasets(
    http: &mut HttpSession,
    project_id: &ProjectId,
    name: &str,
    folder: Option<&FolderId>,
) -> Result<Vec<SearchHit>> {
    let mut query = vec![
        ("name", name),
        ("pattern", "EXACT"),
        ("type", CUBE_DATASET_TYPE),
    ];
    if let Some(folder) = folder {
        query.push(("root", folder.as_str()));
        query.push(("getAncestors", "true"));
    }

    let results: SearchResults = http
        .get("/searches/results", Some(project_id), &query)?
        .json()?;

    Ok(results
        .result
        .into_iter()
        .filter(|hit| hit.name == name)
        .filter(|hit| match folder {
            Some(folder) => hit
                .parent_folder()
                .is_some_and(|parent| parent.id == folder.as_str()),
            None => true,
        })
        .collect())
}

/// Create an empty dataset whose single table follows `schema`.
pub fn create_dataset(
    http: &mut HttpSession,
    project_id: &ProjectId,
    name: &str,
    table_name: &str,
    schema: &Schema,
    folder: Option<&FolderId>,
) -> Result<DatasetId> {
    let mapping = ColumnMapping::from_schema(schema);
    let mut body = json!({
        "name": name,
        "tables": [{
            "name": table_name,
            "columnHeaders": mapping.column_headers(),
            "data": encode_rows(&[], schema)?,
        }],
        "attributes": mapping.attributes(table_name),
        "metrics": mapping.metrics(table_name),
    });
    if let Some(folder) = folder {
        body["folderId"] = json!(folder.as_str());
    }

    let response = http.post("/datasets", Some(project_id), body)?;
    let created: CreatedDataset = response.json()?;
    let id = created
        .dataset_id
        .or(created.id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Remote {
            status: response.status,
            message: format!("dataset '{}' created without an id", name),
        })?;
    Ok(DatasetId::new(id))
}

/// Return the one dataset named `name`, creating it when there is none.
pub fn resolve_or_create(
    http: &mut HttpSession,
    project_id: &ProjectId,
    name: &str,
    table_name: &str,
    schema: &Schema,
    folder: Option<&FolderId>,
) -> Result<Resolution> {
    let matches = find_datasets(http, project_id, name, folder)?;
    match matches.as_slice() {
        [] => {
            let id = create_dataset(http, project_id, name, table_name, schema, folder)?;
            log_event!(
                http.log(),
                INFO,
                event_names::DATASET_CREATED,
                Stage::Resolve,
                "Dataset created",
                dataset_id = id.as_str(),
                folder_id = folder.map(|f| f.as_str()).unwrap_or("")
            );
            Ok(Resolution::Created(id))
        }
        [hit] => {
            log_event!(
                http.log(),
                INFO,
                event_names::DATASET_FOUND,
                Stage::Resolve,
                "Existing dataset found",
                dataset_id = hit.id.as_str()
            );
            Ok(Resolution::Existing(DatasetId::new(hit.id.clone())))
        }
        hits => {
            let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
            log_event!(
                http.log(),
                ERROR,
                event_names::DATASET_AMBIGUOUS,
                Stage::Resolve,
                "Several datasets share this name",
                matches = hits.len() as u64,
                dataset_ids = ids.join(",").as_str()
            );
            Err(Error::AmbiguousDataset {
                name: name.to_string(),
                project_id: project_id.to_string(),
                matches: hits.len(),
            })
        }
    }
}
