//! Tomograms: one reconstructed volume at a voxel spacing.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use copick_types::{FeaturesRecord, TomogramRecord};

use crate::error::{CopickError, CopickResult};
use crate::features::Features;
use crate::lazy::LazyCollection;
use crate::traits::{Backend, FeaturesMetaOf, TomogramMetaOf};
use crate::voxel_spacing::VoxelSpacing;

/// One reconstruction type at a voxel spacing. Owns its feature maps.
pub struct Tomogram<B: Backend> {
    this: Weak<Tomogram<B>>,
    voxel_spacing: Weak<VoxelSpacing<B>>,
    backend: Arc<B>,
    meta: TomogramMetaOf<B>,
    features: LazyCollection<Features<B>>,
}

impl<B: Backend> Tomogram<B> {
    /// `feature_types` pre-populates the feature maps, when known.
    pub(crate) fn attach(
        voxel_spacing: Weak<VoxelSpacing<B>>,
        backend: Arc<B>,
        meta: TomogramMetaOf<B>,
        feature_types: Option<Vec<String>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let features = match feature_types {
                Some(types) => LazyCollection::loaded_with(
                    types
                        .iter()
                        .map(|feature_type| {
                            let meta = FeaturesMetaOf::<B>::create(
                                meta.tomo_type(),
                                feature_type,
                                Default::default(),
                            );
                            Features::attach(this.clone(), Arc::clone(&backend), meta)
                        })
                        .collect(),
                ),
                None => LazyCollection::new(),
            };

            Self {
                this: this.clone(),
                voxel_spacing,
                backend,
                meta,
                features,
            }
        })
    }

    pub fn tomo_type(&self) -> &str {
        self.meta.tomo_type()
    }

    pub fn meta(&self) -> &TomogramMetaOf<B> {
        &self.meta
    }

    pub fn voxel_spacing(&self) -> CopickResult<Arc<VoxelSpacing<B>>> {
        self.voxel_spacing
            .upgrade()
            .ok_or(CopickError::Detached { entity: "tomogram" })
    }

    /// Array store of the volume, created if absent.
    pub fn zarr(&self) -> CopickResult<B::ArrayStore> {
        debug!(tomo_type = self.tomo_type(), "opening tomogram store");
        self.backend.tomogram_store(self)
    }

    pub fn features(&self) -> CopickResult<Vec<Arc<Features<B>>>> {
        self.features.get(|| self.query_features())
    }

    /// The feature map of type `feature_type`, loading the collection if
    /// needed.
    pub fn get_features(&self, feature_type: &str) -> CopickResult<Option<Arc<Features<B>>>> {
        Ok(self
            .features()?
            .into_iter()
            .find(|f| f.feature_type() == feature_type))
    }

    pub fn new_features(&self, feature_type: &str) -> CopickResult<Arc<Features<B>>> {
        self.new_features_with(feature_type, Default::default())
    }

    /// Create a feature map and its array store.
    pub fn new_features_with(
        &self,
        feature_type: &str,
        options: <FeaturesMetaOf<B> as FeaturesRecord>::Options,
    ) -> CopickResult<Arc<Features<B>>> {
        self.features.create_with(
            || self.query_features(),
            |features| {
                if features.iter().any(|f| f.feature_type() == feature_type) {
                    return Err(CopickError::conflict(
                        "features",
                        format!("{feature_type} of tomogram {}", self.tomo_type()),
                    ));
                }
                let meta = FeaturesMetaOf::<B>::create(self.tomo_type(), feature_type, options);
                let features = Features::attach(self.this.clone(), Arc::clone(&self.backend), meta);
                features.zarr()?;
                info!(tomo_type = self.tomo_type(), feature_type, "created features");
                Ok(features)
            },
        )
    }

    pub fn refresh_features(&self) -> CopickResult<()> {
        let features = self.features.refresh(|| self.query_features())?;
        debug!(tomo_type = self.tomo_type(), count = features.len(), "refreshed features");
        Ok(())
    }

    pub fn refresh(&self) -> CopickResult<()> {
        self.refresh_features()
    }

    fn query_features(&self) -> CopickResult<Vec<Arc<Features<B>>>> {
        debug!(tomo_type = self.tomo_type(), "querying features");
        let metas = self.backend.query_features(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| Features::attach(self.this.clone(), Arc::clone(&self.backend), meta))
            .collect())
    }
}

impl<B: Backend> fmt::Debug for Tomogram<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tomogram")
            .field("meta", &self.meta)
            .field("features", &self.features)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::root::Root;
    use bytes::Bytes;
    use copick_types::{Config, VoxelSize};

    fn tomogram(root: &Arc<Root<MemoryBackend>>) -> Arc<Tomogram<MemoryBackend>> {
        let run = root.new_run("TS_001").unwrap();
        let spacing = run.new_voxel_spacing(VoxelSize::new(10.0).unwrap()).unwrap();
        spacing.new_tomogram("wbp").unwrap()
    }

    #[test]
    fn features_are_unique_by_type() {
        let root = Root::new(Config::new(vec![]), MemoryBackend::new()).unwrap();
        let tomo = tomogram(&root);

        let sobel = tomo.new_features("sobel").unwrap();
        assert_eq!(sobel.tomo_type(), "wbp");
        assert_eq!(sobel.tomogram().unwrap().tomo_type(), "wbp");
        let err = tomo.new_features("sobel").unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("sobel of tomogram wbp"));

        tomo.new_features("gaussian").unwrap();
        assert!(tomo.get_features("gaussian").unwrap().is_some());
        assert!(tomo.get_features("dog").unwrap().is_none());
        assert_eq!(tomo.features().unwrap().len(), 2);
    }

    #[test]
    fn created_tomogram_is_persisted() {
        let backend = Arc::new(MemoryBackend::new());
        let root = Root::with_shared_backend(Config::new(vec![]), Arc::clone(&backend)).unwrap();
        let tomo = tomogram(&root);
        tomo.zarr()
            .unwrap()
            .set("0/.zarray", Bytes::from_static(b"{}"))
            .unwrap();

        // A second root over the same storage sees the tomogram and its data.
        let other = Root::with_shared_backend(Config::new(vec![]), backend).unwrap();
        let seen = other
            .get_run("TS_001")
            .unwrap()
            .unwrap()
            .get_voxel_spacing(VoxelSize::new(10.0).unwrap())
            .unwrap()
            .unwrap()
            .get_tomogram("wbp")
            .unwrap()
            .unwrap();
        assert_eq!(seen.zarr().unwrap().keys().unwrap(), vec!["0/.zarray".to_string()]);
    }

    #[test]
    fn refresh_reloads_features() {
        let backend = Arc::new(MemoryBackend::new());
        let root = Root::with_shared_backend(Config::new(vec![]), Arc::clone(&backend)).unwrap();
        let tomo = tomogram(&root);
        assert!(tomo.features().unwrap().is_empty());

        backend
            .seed_features("TS_001", VoxelSize::new(10.0).unwrap(), "wbp", "sobel")
            .unwrap();
        assert!(tomo.features().unwrap().is_empty());
        tomo.refresh().unwrap();
        assert_eq!(tomo.features().unwrap().len(), 1);
    }
}
