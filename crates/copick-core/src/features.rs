//! Feature maps computed over a tomogram.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use copick_types::FeaturesRecord;

use crate::error::{CopickError, CopickResult};
use crate::tomogram::Tomogram;
use crate::traits::{Backend, FeaturesMetaOf};

/// A feature map computed over one tomogram, unique by feature type.
pub struct Features<B: Backend> {
    tomogram: Weak<Tomogram<B>>,
    backend: Arc<B>,
    meta: FeaturesMetaOf<B>,
}

impl<B: Backend> Features<B> {
    pub(crate) fn attach(
        tomogram: Weak<Tomogram<B>>,
        backend: Arc<B>,
        meta: FeaturesMetaOf<B>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tomogram,
            backend,
            meta,
        })
    }

    pub fn tomo_type(&self) -> &str {
        self.meta.tomo_type()
    }

    pub fn feature_type(&self) -> &str {
        self.meta.feature_type()
    }

    pub fn meta(&self) -> &FeaturesMetaOf<B> {
        &self.meta
    }

    pub fn tomogram(&self) -> CopickResult<Arc<Tomogram<B>>> {
        self.tomogram
            .upgrade()
            .ok_or(CopickError::Detached { entity: "features" })
    }

    /// Array store of the feature map, created if absent.
    pub fn zarr(&self) -> CopickResult<B::ArrayStore> {
        debug!(
            tomo_type = self.tomo_type(),
            feature_type = self.feature_type(),
            "opening features store"
        );
        self.backend.features_store(self)
    }
}

impl<B: Backend> fmt::Debug for Features<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Features").field(&self.meta).finish()
    }
}
