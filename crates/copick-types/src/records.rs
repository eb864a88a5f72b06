//! Backend-agnostic metadata records for every entity of the hierarchy.
//!
//! Each entity level has a record trait (the contract the tree needs from a
//! record) and a default record implementing it. Backends that need extra
//! bookkeeping, such as remote ids or storage paths, supply their own record
//! types through a schema and keep the generic tree logic unchanged.
//!
//! A record trait carries an associated `Options` type: the explicit list of
//! optional fields the record accepts at creation time. Records without
//! optional fields use `()`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::point::Point;
use crate::voxel::VoxelSize;

/// Session id reserved for artifacts produced by automated tools.
pub const TOOL_SESSION_ID: &str = "0";

/// Default unit of pick locations.
pub const DEFAULT_UNIT: &str = "angstrom";

/// Whether `session_id` marks a tool-generated artifact.
pub fn is_tool_session(session_id: &str) -> bool {
    session_id == TOOL_SESSION_ID
}

// ---------------------------------------------------------------------------
// Identity keys
// ---------------------------------------------------------------------------

/// Identity of a picks set or mesh within a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationKey {
    pub object_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl AnnotationKey {
    pub fn new(
        object_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} by user/tool {} in session {}",
            self.object_name, self.user_id, self.session_id
        )
    }
}

/// Identity of a segmentation within a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentationKey {
    pub user_id: String,
    pub session_id: String,
    pub name: String,
    pub is_multilabel: bool,
    pub voxel_size: VoxelSize,
}

impl fmt::Display for SegmentationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} by user/tool {} in session {} at voxel size {} (multilabel: {})",
            self.name, self.user_id, self.session_id, self.voxel_size, self.is_multilabel
        )
    }
}

// ---------------------------------------------------------------------------
// Record traits
// ---------------------------------------------------------------------------

/// Metadata of a run.
pub trait RunRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(name: &str, options: Self::Options) -> Self;

    fn name(&self) -> &str;
}

/// Metadata of a voxel spacing.
pub trait VoxelSpacingRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(voxel_size: VoxelSize, options: Self::Options) -> Self;

    fn voxel_size(&self) -> VoxelSize;
}

/// Metadata of a tomogram.
pub trait TomogramRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(tomo_type: &str, options: Self::Options) -> Self;

    fn tomo_type(&self) -> &str;
}

/// Metadata of a feature map.
pub trait FeaturesRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(tomo_type: &str, feature_type: &str, options: Self::Options) -> Self;

    fn tomo_type(&self) -> &str;

    fn feature_type(&self) -> &str;
}

/// Metadata and point payload of a picks set.
///
/// `points()` is `None` until the payload has been loaded or assigned.
pub trait PicksRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(key: AnnotationKey, run_name: &str, options: Self::Options) -> Self;

    fn pickable_object_name(&self) -> &str;

    fn user_id(&self) -> &str;

    fn session_id(&self) -> &str;

    fn trust_orientation(&self) -> bool;

    fn points(&self) -> Option<&[Point]>;

    fn set_points(&mut self, points: Vec<Point>);

    fn key(&self) -> AnnotationKey {
        AnnotationKey::new(self.pickable_object_name(), self.user_id(), self.session_id())
    }
}

/// Metadata of a mesh.
pub trait MeshRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(key: AnnotationKey, options: Self::Options) -> Self;

    fn pickable_object_name(&self) -> &str;

    fn user_id(&self) -> &str;

    fn session_id(&self) -> &str;

    fn key(&self) -> AnnotationKey {
        AnnotationKey::new(self.pickable_object_name(), self.user_id(), self.session_id())
    }
}

/// Metadata of a segmentation.
pub trait SegmentationRecord: Clone + fmt::Debug + Send + Sync + 'static {
    type Options: Default;

    fn create(key: SegmentationKey, options: Self::Options) -> Self;

    fn user_id(&self) -> &str;

    fn session_id(&self) -> &str;

    fn name(&self) -> &str;

    fn is_multilabel(&self) -> bool;

    fn voxel_size(&self) -> VoxelSize;

    fn key(&self) -> SegmentationKey {
        SegmentationKey {
            user_id: self.user_id().to_string(),
            session_id: self.session_id().to_string(),
            name: self.name().to_string(),
            is_multilabel: self.is_multilabel(),
            voxel_size: self.voxel_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default records
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub name: String,
}

impl RunRecord for RunMeta {
    type Options = ();

    fn create(name: &str, _options: ()) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelSpacingMeta {
    pub voxel_size: VoxelSize,
}

impl VoxelSpacingRecord for VoxelSpacingMeta {
    type Options = ();

    fn create(voxel_size: VoxelSize, _options: ()) -> Self {
        Self { voxel_size }
    }

    fn voxel_size(&self) -> VoxelSize {
        self.voxel_size
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomogramMeta {
    pub tomo_type: String,
}

impl TomogramRecord for TomogramMeta {
    type Options = ();

    fn create(tomo_type: &str, _options: ()) -> Self {
        Self {
            tomo_type: tomo_type.to_string(),
        }
    }

    fn tomo_type(&self) -> &str {
        &self.tomo_type
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesMeta {
    /// Type of the tomogram the features were computed on.
    pub tomo_type: String,
    pub feature_type: String,
}

impl FeaturesRecord for FeaturesMeta {
    type Options = ();

    fn create(tomo_type: &str, feature_type: &str, _options: ()) -> Self {
        Self {
            tomo_type: tomo_type.to_string(),
            feature_type: feature_type.to_string(),
        }
    }

    fn tomo_type(&self) -> &str {
        &self.tomo_type
    }

    fn feature_type(&self) -> &str {
        &self.feature_type
    }
}

/// Optional fields accepted when creating a [`PicksFile`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PicksOptions {
    /// Voxel spacing of the tomogram the picks were made on.
    pub voxel_spacing: Option<VoxelSize>,
    /// Unit of the locations; defaults to angstrom.
    pub unit: Option<String>,
    /// Whether orientations are meaningful; defaults to `true`.
    pub trust_orientation: Option<bool>,
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

fn default_trust() -> bool {
    true
}

/// A set of picked points for one object class, plus its provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PicksFile {
    pub pickable_object_name: String,
    /// User name, or tool name for tool-generated picks.
    pub user_id: String,
    /// Session id; [`TOOL_SESSION_ID`] for tool-generated picks.
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voxel_spacing: Option<VoxelSize>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Point>>,
    #[serde(default = "default_trust")]
    pub trust_orientation: bool,
}

impl PicksRecord for PicksFile {
    type Options = PicksOptions;

    fn create(key: AnnotationKey, run_name: &str, options: PicksOptions) -> Self {
        Self {
            pickable_object_name: key.object_name,
            user_id: key.user_id,
            session_id: key.session_id,
            run_name: Some(run_name.to_string()),
            voxel_spacing: options.voxel_spacing,
            unit: options.unit.unwrap_or_else(default_unit),
            points: None,
            trust_orientation: options.trust_orientation.unwrap_or(true),
        }
    }

    fn pickable_object_name(&self) -> &str {
        &self.pickable_object_name
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn trust_orientation(&self) -> bool {
        self.trust_orientation
    }

    fn points(&self) -> Option<&[Point]> {
        self.points.as_deref()
    }

    fn set_points(&mut self, points: Vec<Point>) {
        self.points = Some(points);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshMeta {
    pub pickable_object_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl MeshRecord for MeshMeta {
    type Options = ();

    fn create(key: AnnotationKey, _options: ()) -> Self {
        Self {
            pickable_object_name: key.object_name,
            user_id: key.user_id,
            session_id: key.session_id,
        }
    }

    fn pickable_object_name(&self) -> &str {
        &self.pickable_object_name
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMeta {
    pub user_id: String,
    pub session_id: String,
    /// Pickable object name, or a free-form name for multilabel masks.
    pub name: String,
    pub is_multilabel: bool,
    pub voxel_size: VoxelSize,
}

impl SegmentationRecord for SegmentationMeta {
    type Options = ();

    fn create(key: SegmentationKey, _options: ()) -> Self {
        Self {
            user_id: key.user_id,
            session_id: key.session_id,
            name: key.name,
            is_multilabel: key.is_multilabel,
            voxel_size: key.voxel_size,
        }
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_multilabel(&self) -> bool {
        self.is_multilabel
    }

    fn voxel_size(&self) -> VoxelSize {
        self.voxel_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_session_sentinel() {
        assert!(is_tool_session("0"));
        assert!(!is_tool_session("1"));
        assert!(!is_tool_session("00"));
    }

    #[test]
    fn picks_file_defaults() {
        let key = AnnotationKey::new("ribosome", "alice", "1");
        let file = PicksFile::create(key.clone(), "TS_001", PicksOptions::default());
        assert_eq!(file.unit, "angstrom");
        assert!(file.trust_orientation);
        assert!(file.points().is_none());
        assert_eq!(file.run_name.as_deref(), Some("TS_001"));
        assert_eq!(file.key(), key);
    }

    #[test]
    fn picks_file_options_are_applied() {
        let options = PicksOptions {
            voxel_spacing: Some(VoxelSize::new(10.0).unwrap()),
            unit: Some("nm".into()),
            trust_orientation: Some(false),
        };
        let file = PicksFile::create(AnnotationKey::new("a", "b", "c"), "r", options);
        assert_eq!(file.unit, "nm");
        assert!(!file.trust_orientation);
        assert_eq!(file.voxel_spacing.map(VoxelSize::get), Some(10.0));
    }

    #[test]
    fn picks_file_json_defaults() {
        let json = r#"{"pickable_object_name": "ribosome", "user_id": "tool", "session_id": "0"}"#;
        let file: PicksFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.unit, DEFAULT_UNIT);
        assert!(file.trust_orientation);
        assert!(file.points.is_none());
    }

    #[test]
    fn segmentation_key_round_trips_through_record() {
        let key = SegmentationKey {
            user_id: "alice".into(),
            session_id: "1".into(),
            name: "membrane".into(),
            is_multilabel: false,
            voxel_size: VoxelSize::new(10.0).unwrap(),
        };
        let meta = SegmentationMeta::create(key.clone(), ());
        assert_eq!(meta.key(), key);
    }

    #[test]
    fn key_display_names_every_part() {
        let key = AnnotationKey::new("ribosome", "alice", "1");
        assert_eq!(key.to_string(), "ribosome by user/tool alice in session 1");
    }
}
