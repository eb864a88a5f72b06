//! Project configuration.
//!
//! A config names the pickable objects of a project, optionally the identity
//! of the annotating user, and optionally a static index of the dataset. When
//! the static index is present the entity tree is populated from it instead
//! of asking the storage backend.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{TypeError, TypeResult};
use crate::object::PickableObject;
use crate::records::{AnnotationKey, SegmentationKey, TOOL_SESSION_ID};
use crate::voxel::VoxelSize;

fn default_name() -> String {
    "CoPick".to_string()
}

fn default_description() -> String {
    "Let's CoPick!".to_string()
}

fn default_version() -> String {
    "0.2.0".to_string()
}

/// Writes voxel-size keys as their canonical `{:.3}` strings.
fn serialize_voxel_keyed<S: Serializer>(
    map: &BTreeMap<VoxelSize, Vec<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(map.iter().map(|(k, v)| (k.to_string(), v)))
}

/// Tool picks known up front for one object in one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreDeclaredPicks {
    pub run: String,
    pub object: String,
    /// Tool names; each becomes a picks set with session "0".
    pub tools: Vec<String>,
}

/// A tool segmentation present in every run of the static index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreDeclaredSegmentation {
    pub tool: String,
    pub name: String,
    pub voxel_size: VoxelSize,
    #[serde(default)]
    pub is_multilabel: bool,
}

/// Configuration of a copick project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    /// Version of the copick data model the project was written with.
    #[serde(default = "default_version")]
    pub version: String,
    pub pickable_objects: Vec<PickableObject>,
    /// Default user for new artifacts (e.g. when distributing a config to
    /// annotators).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    // ---- static index ----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voxel_spacings: Option<Vec<VoxelSize>>,
    /// Tomogram types available at each voxel spacing.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        serialize_with = "serialize_voxel_keyed"
    )]
    pub tomograms: BTreeMap<VoxelSize, Vec<String>>,
    /// Tomogram types, per voxel spacing, that carry the declared feature maps.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        serialize_with = "serialize_voxel_keyed"
    )]
    pub features: BTreeMap<VoxelSize, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_picks: Option<Vec<PreDeclaredPicks>>,
    /// Object name to the tools that produced a mesh for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_meshes: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_segmentations: Option<Vec<PreDeclaredSegmentation>>,
}

impl Config {
    /// A config with default metadata, the given objects and no static index.
    pub fn new(pickable_objects: Vec<PickableObject>) -> Self {
        Self {
            name: default_name(),
            description: default_description(),
            version: default_version(),
            pickable_objects,
            user_id: None,
            session_id: None,
            runs: None,
            voxel_spacings: None,
            tomograms: BTreeMap::new(),
            features: BTreeMap::new(),
            feature_types: Vec::new(),
            pre_picks: None,
            pre_meshes: None,
            pre_segmentations: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_runs<I, S>(mut self, runs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runs = Some(runs.into_iter().map(Into::into).collect());
        self
    }

    /// Declare the tomogram types available at `voxel_size`.
    pub fn with_tomograms<I, S>(mut self, voxel_size: VoxelSize, tomo_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tomograms
            .insert(voxel_size, tomo_types.into_iter().map(Into::into).collect());
        self
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(s: &str) -> TypeResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> TypeResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. Files ending in `.toml` are parsed as TOML,
    /// everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> TypeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    pub fn to_json_pretty(&self) -> TypeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> TypeResult<()> {
        let mut seen = HashSet::new();
        for obj in &self.pickable_objects {
            if !seen.insert(obj.name.as_str()) {
                return Err(TypeError::DuplicateObject {
                    name: obj.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn object(&self, name: &str) -> Option<&PickableObject> {
        self.pickable_objects.iter().find(|o| o.name == name)
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.object(name).is_some()
    }

    /// Whether the config describes the runs' voxel spacings itself.
    pub fn has_static_index(&self) -> bool {
        self.voxel_spacings.is_some() || !self.tomograms.is_empty()
    }

    /// Voxel spacings of the static index, in declaration order without
    /// duplicates. Falls back to the keys of `tomograms`.
    pub fn static_voxel_spacings(&self) -> Vec<VoxelSize> {
        match &self.voxel_spacings {
            Some(spacings) => {
                let mut seen = HashSet::new();
                spacings.iter().copied().filter(|v| seen.insert(*v)).collect()
            }
            None => self.tomograms.keys().copied().collect(),
        }
    }

    /// Tomogram types declared at `voxel_size`; empty when none are listed.
    pub fn static_tomograms(&self, voxel_size: VoxelSize) -> Vec<String> {
        self.tomograms.get(&voxel_size).cloned().unwrap_or_default()
    }

    /// Declared feature types of a tomogram, or `None` when the tomogram's
    /// features are not part of the static index.
    pub fn static_features(&self, voxel_size: VoxelSize, tomo_type: &str) -> Option<Vec<String>> {
        self.features
            .get(&voxel_size)
            .filter(|types| types.iter().any(|t| t == tomo_type))
            .map(|_| self.feature_types.clone())
    }

    /// Keys of the tool picks declared for `run`.
    pub fn pre_picks_for(&self, run: &str) -> Option<Vec<AnnotationKey>> {
        self.pre_picks.as_ref().map(|entries| {
            entries
                .iter()
                .filter(|e| e.run == run)
                .flat_map(|e| {
                    e.tools
                        .iter()
                        .map(|tool| AnnotationKey::new(&e.object, tool, TOOL_SESSION_ID))
                })
                .collect()
        })
    }

    /// Keys of the tool meshes declared for every run.
    pub fn pre_mesh_keys(&self) -> Option<Vec<AnnotationKey>> {
        self.pre_meshes.as_ref().map(|meshes| {
            meshes
                .iter()
                .flat_map(|(object, tools)| {
                    tools
                        .iter()
                        .map(move |tool| AnnotationKey::new(object, tool, TOOL_SESSION_ID))
                })
                .collect()
        })
    }

    /// Keys of the tool segmentations declared for every run.
    pub fn pre_segmentation_keys(&self) -> Option<Vec<SegmentationKey>> {
        self.pre_segmentations.as_ref().map(|segs| {
            segs.iter()
                .map(|s| SegmentationKey {
                    user_id: s.tool.clone(),
                    session_id: TOOL_SESSION_ID.to_string(),
                    name: s.name.clone(),
                    is_multilabel: s.is_multilabel,
                    voxel_size: s.voxel_size,
                })
                .collect()
        })
    }
}
