//! Filters for annotation lookups.
//!
//! Every field is an independent, optional constraint; an empty filter
//! matches everything. Since the constraints are a conjunction, the order
//! in which they are set does not matter.

use copick_types::{AnnotationKey, SegmentationKey, VoxelSize};

/// Filter over picks or meshes by their `(object, user, session)` key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationFilter {
    pub object_name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

pub type PicksFilter = AnnotationFilter;
pub type MeshFilter = AnnotationFilter;

impl AnnotationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_name(mut self, name: impl Into<String>) -> Self {
        self.object_name = Some(name.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn matches(&self, key: &AnnotationKey) -> bool {
        field_matches(&self.object_name, &key.object_name)
            && field_matches(&self.user_id, &key.user_id)
            && field_matches(&self.session_id, &key.session_id)
    }
}

/// Filter over segmentations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentationFilter {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub is_multilabel: Option<bool>,
    pub name: Option<String>,
    pub voxel_size: Option<VoxelSize>,
}

impl SegmentationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_multilabel(mut self, is_multilabel: bool) -> Self {
        self.is_multilabel = Some(is_multilabel);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn voxel_size(mut self, voxel_size: VoxelSize) -> Self {
        self.voxel_size = Some(voxel_size);
        self
    }

    pub fn matches(&self, key: &SegmentationKey) -> bool {
        field_matches(&self.user_id, &key.user_id)
            && field_matches(&self.session_id, &key.session_id)
            && field_matches(&self.name, &key.name)
            && self.is_multilabel.map_or(true, |m| m == key.is_multilabel)
            && self.voxel_size.map_or(true, |v| v == key.voxel_size)
    }
}

fn field_matches(wanted: &Option<String>, actual: &str) -> bool {
    wanted.as_deref().map_or(true, |w| w == actual)
}
