//! Backend contract and schema registry.
//!
//! The entity tree never touches storage itself. Every query, existence
//! check, artifact load/store and array-store acquisition goes through a
//! [`Backend`]. Each operation has a provided body that fails with
//! [`CopickError::NotImplemented`], so a backend implements exactly the
//! operations its medium supports (a read-only index, for example, leaves the
//! `store_*` operations alone) and the gap surfaces as a distinct error rather
//! than an empty result.
//!
//! The record types attached to every entity are chosen once per backend
//! through its [`Schema`] and threaded through the whole tree.

use std::fmt;

use copick_types::{
    FeaturesMeta, FeaturesRecord, MeshMeta, MeshRecord, PicksFile, PicksRecord, RunMeta,
    RunRecord, SegmentationMeta, SegmentationRecord, TomogramMeta, TomogramRecord,
    VoxelSpacingMeta, VoxelSpacingRecord,
};

use crate::error::{CopickError, CopickResult};
use crate::features::Features;
use crate::mesh::Mesh;
use crate::object::CopickObject;
use crate::picks::Picks;
use crate::root::Root;
use crate::run::Run;
use crate::segmentation::Segmentation;
use crate::tomogram::Tomogram;
use crate::voxel_spacing::VoxelSpacing;

/// Registry of the record type used at every level of the hierarchy.
pub trait Schema: Send + Sync + 'static {
    type Run: RunRecord;
    type VoxelSpacing: VoxelSpacingRecord;
    type Tomogram: TomogramRecord;
    type Features: FeaturesRecord;
    type Picks: PicksRecord;
    type Mesh: MeshRecord;
    type Segmentation: SegmentationRecord;
}

/// The records defined in `copick-types`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSchema;

impl Schema for DefaultSchema {
    type Run = RunMeta;
    type VoxelSpacing = VoxelSpacingMeta;
    type Tomogram = TomogramMeta;
    type Features = FeaturesMeta;
    type Picks = PicksFile;
    type Mesh = MeshMeta;
    type Segmentation = SegmentationMeta;
}

pub type RunMetaOf<B> = <<B as Backend>::Schema as Schema>::Run;
pub type VoxelSpacingMetaOf<B> = <<B as Backend>::Schema as Schema>::VoxelSpacing;
pub type TomogramMetaOf<B> = <<B as Backend>::Schema as Schema>::Tomogram;
pub type FeaturesMetaOf<B> = <<B as Backend>::Schema as Schema>::Features;
pub type PicksMetaOf<B> = <<B as Backend>::Schema as Schema>::Picks;
pub type MeshMetaOf<B> = <<B as Backend>::Schema as Schema>::Mesh;
pub type SegmentationMetaOf<B> = <<B as Backend>::Schema as Schema>::Segmentation;

fn not_implemented<T>(operation: &'static str) -> CopickResult<T> {
    Err(CopickError::NotImplemented { operation })
}

/// Persistence operations the entity tree requires from a storage medium.
///
/// Implementations must treat `ensure_*(create = true)` and the `store_*`
/// operations as atomic with respect to their own storage: the tree only
/// guarantees uniqueness for a single caller's view.
#[allow(unused_variables)]
pub trait Backend: Send + Sync + Sized + 'static {
    type Schema: Schema;

    /// Handle to a chunked key/value array store.
    type ArrayStore: Clone + Send + Sync;

    /// Mesh geometry. `Default` is the empty geometry of a new mesh.
    type Mesh: Default + Clone + fmt::Debug + Send + Sync;

    // ---- runs ----

    fn query_runs(&self, root: &Root<Self>) -> CopickResult<Vec<RunMetaOf<Self>>> {
        not_implemented("query_runs")
    }

    /// Whether the run's record exists, creating it first when `create`
    /// is set. Calling it twice with `create = true` must not fail.
    fn ensure_run(&self, run: &Run<Self>, create: bool) -> CopickResult<bool> {
        not_implemented("ensure_run")
    }

    // ---- voxel spacings and tomograms ----

    fn query_voxel_spacings(&self, run: &Run<Self>) -> CopickResult<Vec<VoxelSpacingMetaOf<Self>>> {
        not_implemented("query_voxel_spacings")
    }

    fn ensure_voxel_spacing(
        &self,
        voxel_spacing: &VoxelSpacing<Self>,
        create: bool,
    ) -> CopickResult<bool> {
        not_implemented("ensure_voxel_spacing")
    }

    fn query_tomograms(
        &self,
        voxel_spacing: &VoxelSpacing<Self>,
    ) -> CopickResult<Vec<TomogramMetaOf<Self>>> {
        not_implemented("query_tomograms")
    }

    fn query_features(&self, tomogram: &Tomogram<Self>) -> CopickResult<Vec<FeaturesMetaOf<Self>>> {
        not_implemented("query_features")
    }

    // ---- annotations ----

    fn query_picks(&self, run: &Run<Self>) -> CopickResult<Vec<PicksMetaOf<Self>>> {
        not_implemented("query_picks")
    }

    fn query_meshes(&self, run: &Run<Self>) -> CopickResult<Vec<MeshMetaOf<Self>>> {
        not_implemented("query_meshes")
    }

    fn query_segmentations(&self, run: &Run<Self>) -> CopickResult<Vec<SegmentationMetaOf<Self>>> {
        not_implemented("query_segmentations")
    }

    /// Read the persisted record of a picks set, points included.
    fn load_picks(&self, picks: &Picks<Self>) -> CopickResult<PicksMetaOf<Self>> {
        not_implemented("load_picks")
    }

    fn store_picks(&self, picks: &Picks<Self>, record: &PicksMetaOf<Self>) -> CopickResult<()> {
        not_implemented("store_picks")
    }

    fn load_mesh(&self, mesh: &Mesh<Self>) -> CopickResult<Self::Mesh> {
        not_implemented("load_mesh")
    }

    fn store_mesh(&self, mesh: &Mesh<Self>, geometry: &Self::Mesh) -> CopickResult<()> {
        not_implemented("store_mesh")
    }

    // ---- array stores ----
    //
    // Each returns a handle to the entity's array store, creating the store
    // if it does not exist yet.

    fn object_store(&self, object: &CopickObject<Self>) -> CopickResult<Self::ArrayStore> {
        not_implemented("object_store")
    }

    fn tomogram_store(&self, tomogram: &Tomogram<Self>) -> CopickResult<Self::ArrayStore> {
        not_implemented("tomogram_store")
    }

    fn features_store(&self, features: &Features<Self>) -> CopickResult<Self::ArrayStore> {
        not_implemented("features_store")
    }

    fn segmentation_store(
        &self,
        segmentation: &Segmentation<Self>,
    ) -> CopickResult<Self::ArrayStore> {
        not_implemented("segmentation_store")
    }
}
