//! Voxel spacings: one reconstruction resolution of a run.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use copick_types::{Config, TomogramRecord, VoxelSize, VoxelSpacingRecord};

use crate::error::{CopickError, CopickResult};
use crate::lazy::LazyCollection;
use crate::run::Run;
use crate::tomogram::Tomogram;
use crate::traits::{Backend, TomogramMetaOf, VoxelSpacingMetaOf};

/// A reconstruction resolution of a run. Owns the tomograms at that
/// resolution.
pub struct VoxelSpacing<B: Backend> {
    this: Weak<VoxelSpacing<B>>,
    run: Weak<Run<B>>,
    backend: Arc<B>,
    meta: VoxelSpacingMetaOf<B>,
    tomograms: LazyCollection<Tomogram<B>>,
}

impl<B: Backend> VoxelSpacing<B> {
    pub(crate) fn attach(
        run: Weak<Run<B>>,
        backend: Arc<B>,
        meta: VoxelSpacingMetaOf<B>,
        index: Option<&Config>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let voxel_size = meta.voxel_size();
            let tomograms = match index {
                Some(config) => LazyCollection::loaded_with(
                    config
                        .static_tomograms(voxel_size)
                        .iter()
                        .map(|tomo_type| {
                            let meta = TomogramMetaOf::<B>::create(tomo_type, Default::default());
                            let features = config.static_features(voxel_size, tomo_type);
                            Tomogram::attach(this.clone(), Arc::clone(&backend), meta, features)
                        })
                        .collect(),
                ),
                None => LazyCollection::new(),
            }
            .identified_by(|a: &Tomogram<B>, b: &Tomogram<B>| a.tomo_type() == b.tomo_type());

            Self {
                this: this.clone(),
                run,
                backend,
                meta,
                tomograms,
            }
        })
    }

    pub fn voxel_size(&self) -> VoxelSize {
        self.meta.voxel_size()
    }

    pub fn meta(&self) -> &VoxelSpacingMetaOf<B> {
        &self.meta
    }

    pub fn run(&self) -> CopickResult<Arc<Run<B>>> {
        self.run.upgrade().ok_or(CopickError::Detached {
            entity: "voxel spacing",
        })
    }

    /// Whether the voxel spacing's record exists in the backend, creating it
    /// first when `create` is set.
    pub fn ensure(&self, create: bool) -> CopickResult<bool> {
        debug!(voxel_size = %self.voxel_size(), create, "ensuring voxel spacing");
        self.backend.ensure_voxel_spacing(self, create)
    }

    pub fn tomograms(&self) -> CopickResult<Vec<Arc<Tomogram<B>>>> {
        self.tomograms.get(|| self.query_tomograms())
    }

    /// The tomogram of type `tomo_type`, loading the collection if needed.
    pub fn get_tomogram(&self, tomo_type: &str) -> CopickResult<Option<Arc<Tomogram<B>>>> {
        Ok(self
            .tomograms()?
            .into_iter()
            .find(|t| t.tomo_type() == tomo_type))
    }

    pub fn new_tomogram(&self, tomo_type: &str) -> CopickResult<Arc<Tomogram<B>>> {
        self.new_tomogram_with(tomo_type, Default::default())
    }

    /// Create a tomogram and its array store.
    pub fn new_tomogram_with(
        &self,
        tomo_type: &str,
        options: <TomogramMetaOf<B> as TomogramRecord>::Options,
    ) -> CopickResult<Arc<Tomogram<B>>> {
        self.tomograms.create_with(
            || self.query_tomograms(),
            |tomograms| {
                if tomograms.iter().any(|t| t.tomo_type() == tomo_type) {
                    return Err(CopickError::conflict("tomogram", tomo_type));
                }
                let meta = TomogramMetaOf::<B>::create(tomo_type, options);
                let tomogram =
                    Tomogram::attach(self.this.clone(), Arc::clone(&self.backend), meta, None);
                tomogram.zarr()?;
                info!(voxel_size = %self.voxel_size(), tomo_type, "created tomogram");
                Ok(tomogram)
            },
        )
    }

    pub fn refresh_tomograms(&self) -> CopickResult<()> {
        let tomograms = self.tomograms.refresh(|| self.query_tomograms())?;
        debug!(voxel_size = %self.voxel_size(), count = tomograms.len(), "refreshed tomograms");
        Ok(())
    }

    /// Reload the tomograms from the backend.
    pub fn refresh(&self) -> CopickResult<()> {
        self.refresh_tomograms()
    }

    fn query_tomograms(&self) -> CopickResult<Vec<Arc<Tomogram<B>>>> {
        debug!(voxel_size = %self.voxel_size(), "querying tomograms");
        let metas = self.backend.query_tomograms(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| Tomogram::attach(self.this.clone(), Arc::clone(&self.backend), meta, None))
            .collect())
    }
}

impl<B: Backend> fmt::Debug for VoxelSpacing<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelSpacing")
            .field("meta", &self.meta)
            .field("tomograms", &self.tomograms)
            .finish()
    }
}
