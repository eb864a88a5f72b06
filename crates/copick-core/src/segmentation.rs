//! Segmentations: voxel masks at one voxel spacing.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use copick_types::{is_tool_session, Color, SegmentationKey, SegmentationRecord, VoxelSize};

use crate::error::{CopickError, CopickResult};
use crate::run::Run;
use crate::traits::{Backend, SegmentationMetaOf};

/// A single-label mask named after a pickable object, or a multilabel mask
/// with a free-form name.
pub struct Segmentation<B: Backend> {
    run: Weak<Run<B>>,
    backend: Arc<B>,
    meta: SegmentationMetaOf<B>,
}

impl<B: Backend> Segmentation<B> {
    pub(crate) fn attach(
        run: Weak<Run<B>>,
        backend: Arc<B>,
        meta: SegmentationMetaOf<B>,
    ) -> Arc<Self> {
        Arc::new(Self { run, backend, meta })
    }

    pub fn meta(&self) -> &SegmentationMetaOf<B> {
        &self.meta
    }

    pub fn key(&self) -> SegmentationKey {
        self.meta.key()
    }

    pub fn user_id(&self) -> &str {
        self.meta.user_id()
    }

    pub fn session_id(&self) -> &str {
        self.meta.session_id()
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    pub fn is_multilabel(&self) -> bool {
        self.meta.is_multilabel()
    }

    pub fn voxel_size(&self) -> VoxelSize {
        self.meta.voxel_size()
    }

    pub fn from_tool(&self) -> bool {
        is_tool_session(self.session_id())
    }

    pub fn from_user(&self) -> bool {
        !self.from_tool()
    }

    pub fn run(&self) -> CopickResult<Arc<Run<B>>> {
        self.run.upgrade().ok_or(CopickError::Detached {
            entity: "segmentation",
        })
    }

    /// [`Color::MULTILABEL`] for multilabel masks, otherwise the color of
    /// the named object.
    pub fn color(&self) -> CopickResult<Option<Color>> {
        if self.is_multilabel() {
            return Ok(Some(Color::MULTILABEL));
        }
        let root = self.run()?.root()?;
        let object = root
            .get_object(self.name())
            .ok_or_else(|| CopickError::UnknownObject {
                name: self.name().to_string(),
            })?;
        Ok(object.color())
    }

    /// Array store of the mask, created if absent.
    pub fn zarr(&self) -> CopickResult<B::ArrayStore> {
        debug!(segmentation = %self.key(), "opening segmentation store");
        self.backend.segmentation_store(self)
    }
}

impl<B: Backend> fmt::Debug for Segmentation<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Segmentation").field(&self.meta).finish()
    }
}
