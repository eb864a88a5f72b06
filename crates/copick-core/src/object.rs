//! Pickable objects attached to a root.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use copick_types::{Color, Label, PickableObject};

use crate::error::{CopickError, CopickResult};
use crate::root::Root;
use crate::traits::Backend;

/// A pickable object class of the project.
pub struct CopickObject<B: Backend> {
    root: Weak<Root<B>>,
    backend: Arc<B>,
    meta: PickableObject,
}

impl<B: Backend> CopickObject<B> {
    pub(crate) fn attach(root: Weak<Root<B>>, backend: Arc<B>, meta: PickableObject) -> Arc<Self> {
        Arc::new(Self {
            root,
            backend,
            meta,
        })
    }

    pub fn meta(&self) -> &PickableObject {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn is_particle(&self) -> bool {
        self.meta.is_particle
    }

    pub fn label(&self) -> Option<Label> {
        self.meta.label
    }

    pub fn color(&self) -> Option<Color> {
        self.meta.color
    }

    pub fn emdb_id(&self) -> Option<&str> {
        self.meta.emdb_id.as_deref()
    }

    pub fn pdb_id(&self) -> Option<&str> {
        self.meta.pdb_id.as_deref()
    }

    pub fn map_threshold(&self) -> Option<f64> {
        self.meta.map_threshold
    }

    pub fn radius(&self) -> Option<f64> {
        self.meta.radius
    }

    pub fn root(&self) -> CopickResult<Arc<Root<B>>> {
        self.root
            .upgrade()
            .ok_or(CopickError::Detached { entity: "object" })
    }

    /// Array store holding the reference density. Only particles have one.
    pub fn zarr(&self) -> CopickResult<Option<B::ArrayStore>> {
        if !self.is_particle() {
            return Ok(None);
        }
        debug!(object = self.name(), "opening object store");
        self.backend.object_store(self).map(Some)
    }
}

impl<B: Backend> fmt::Debug for CopickObject<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CopickObject").field(&self.meta).finish()
    }
}
