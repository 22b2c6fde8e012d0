//! Project and folder browsing for configuration pickers.
//!
//! Pure glue over the same [`HttpSession`] the exporter uses. The folder
//! picker works on a path of (name, id) pairs serialized as
//! `{"names": [...], "ids": [...]}`, which is also the value a picker stores
//! for the selected folder.

use serde::{Deserialize, Serialize};

use cube_common::{Error, FolderId, ProjectId, Result};

use crate::http::HttpSession;
use crate::log_event;
use crate::logging::{event_names, Stage};

/// Object type of folders in folder listings.
pub const FOLDER_TYPE: i64 = 8;

/// Predefined folder listing the project's shared folders.
pub const SHARED_FOLDERS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub object_type: i64,
}

impl FolderEntry {
    pub fn is_folder(&self) -> bool {
        self.object_type == FOLDER_TYPE
    }
}

/// Folder listings come back either bare or wrapped in `children`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FolderListing {
    Bare(Vec<FolderEntry>),
    Wrapped { children: Vec<FolderEntry> },
}

impl FolderListing {
    fn into_entries(self) -> Vec<FolderEntry> {
        match self {
            FolderListing::Bare(entries) | FolderListing::Wrapped { children: entries } => entries,
        }
    }
}

/// One option of a select-style picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

/// Position in the folder tree, from a shared folder downwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderPath {
    pub names: Vec<String>,
    pub ids: Vec<String>,
}

impl FolderPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a stored picker value. Empty input is the root.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::root());
        }
        let path: FolderPath = serde_json::from_str(value)?;
        if path.names.len() != path.ids.len() {
            return Err(Error::Config(format!(
                "folder path has {} names but {} ids",
                path.names.len(),
                path.ids.len()
            )));
        }
        Ok(path)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.ids.is_empty()
    }

    /// Folder this path points at; `None` at the root.
    pub fn current(&self) -> Option<FolderId> {
        self.ids.last().map(|id| FolderId::new(id.as_str()))
    }

    pub fn parent(&self) -> Self {
        let keep = self.ids.len().saturating_sub(1);
        FolderPath {
            names: self.names[..keep.min(self.names.len())].to_vec(),
            ids: self.ids[..keep].to_vec(),
        }
    }

    pub fn child(&self, entry: &FolderEntry) -> Self {
        let mut path = self.clone();
        path.names.push(entry.name.clone());
        path.ids.push(entry.id.clone());
        path
    }

    /// `Shared Reports/Sales` style label.
    pub fn label(&self) -> String {
        self.names.join("/")
    }
}

pub fn list_projects(http: &mut HttpSession) -> Result<Vec<Project>> {
    http.get("/projects", None, &[])?.json()
}

/// Id of the project named exactly `name`.
pub fn find_project_id(http: &mut HttpSession, name: &str) -> Result<ProjectId> {
    list_projects(http)?
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| ProjectId::new(p.id))
        .ok_or_else(|| Error::ProjectNotFound {
            name: name.to_string(),
        })
}

pub fn shared_folders(http: &mut HttpSession, project: &ProjectId) -> Result<Vec<FolderEntry>> {
    let path = format!("/folders/preDefined/{}", SHARED_FOLDERS);
    let listing: FolderListing = http.get(&path, Some(project), &[])?.json()?;
    Ok(listing.into_entries())
}

pub fn folder_contents(
    http: &mut HttpSession,
    project: &ProjectId,
    folder: &FolderId,
) -> Result<Vec<FolderEntry>> {
    let listing: FolderListing = http
        .get(&format!("/folders/{}", folder), Some(project), &[])?
        .json()?;
    Ok(listing.into_entries())
}

/// Picker choices for one step of folder navigation.
///
/// Below the root the first choice selects the current folder itself and
/// the last one goes back up a level.
pub fn folder_choices(
    http: &mut HttpSession,
    project: &ProjectId,
    path: &FolderPath,
) -> Result<Vec<Choice>> {
    let entries = match path.current() {
        Some(folder) => folder_contents(http, project, &folder)?,
        None => shared_folders(http, project)?,
    };
    let choices = choices_for(path, &entries);

    log_event!(
        http.log(),
        DEBUG,
        event_names::BROWSE_LISTED,
        Stage::Browse,
        "Folder listed",
        path = path.label().as_str(),
        entries = entries.len() as u64,
        choices = choices.len() as u64
    );
    Ok(choices)
}

fn choices_for(path: &FolderPath, entries: &[FolderEntry]) -> Vec<Choice> {
    let mut choices = Vec::new();
    if !path.is_root() {
        choices.push(Choice {
            label: path.label(),
            value: path.to_json(),
        });
    }
    for entry in entries.iter().filter(|e| e.is_folder()) {
        let child = path.child(entry);
        choices.push(Choice {
            label: child.label(),
            value: child.to_json(),
        });
    }
    if !path.is_root() {
        let parent = path.parent();
        choices.push(Choice {
            label: format!("🔙 {}", parent.label()),
            value: parent.to_json(),
        });
    }
    choices
}

pub fn project_choices(http: &mut HttpSession) -> Result<Vec<Choice>> {
    Ok(list_projects(http)?
        .into_iter()
        .map(|p| Choice {
            label: p.name,
            value: p.id,
        })
        .collect())
}
