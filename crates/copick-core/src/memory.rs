//! In-memory backend for testing and ephemeral use.
//!
//! [`MemoryBackend`] keeps the whole dataset in `BTreeMap`s behind a
//! `RwLock` and implements every operation of the [`Backend`] contract.
//! Picks and meshes are kept JSON-encoded, the way a file-based backend
//! would persist them, and array stores are shared [`MemoryArrayStore`]
//! handles keyed by the path a filesystem overlay would use.
//!
//! Sharing one backend between several roots (see
//! [`Root::with_shared_backend`]) simulates independent processes working
//! on the same storage. The `seed_*` helpers write directly to that storage,
//! bypassing any entity tree, and [`MemoryBackend::calls`] reports how often
//! each operation ran.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use copick_types::{
    AnnotationKey, FeaturesMeta, FeaturesRecord, MeshMeta, MeshRecord, PicksFile, PicksRecord,
    RunMeta, RunRecord, SegmentationKey, SegmentationMeta, SegmentationRecord, TomogramMeta,
    TomogramRecord, VoxelSize, VoxelSpacingMeta, VoxelSpacingRecord,
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
use crate::traits::{Backend, DefaultSchema};
use crate::voxel_spacing::VoxelSpacing;

// ---------------------------------------------------------------------------
// Array store and mesh geometry
// ---------------------------------------------------------------------------

/// A shared key-to-bytes map standing in for a chunked array store.
///
/// Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryArrayStore {
    entries: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryArrayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> CopickResult<Option<Bytes>> {
        let entries = self.entries.read().map_err(CopickError::poisoned)?;
        Ok(entries.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: Bytes) -> CopickResult<()> {
        let mut entries = self.entries.write().map_err(CopickError::poisoned)?;
        entries.insert(key.into(), value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> CopickResult<Option<Bytes>> {
        let mut entries = self.entries.write().map_err(CopickError::poisoned)?;
        Ok(entries.remove(key))
    }

    /// All keys in lexicographic order.
    pub fn keys(&self) -> CopickResult<Vec<String>> {
        let entries = self.entries.read().map_err(CopickError::poisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    pub fn len(&self) -> CopickResult<usize> {
        let entries = self.entries.read().map_err(CopickError::poisoned)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> CopickResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Indexed triangle mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<[f64; 3]>,
    /// Vertex indices of each triangle.
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.faces.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Storage layout
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RunState {
    /// Voxel spacing to tomogram type to feature types.
    voxel_spacings: BTreeMap<VoxelSize, BTreeMap<String, BTreeSet<String>>>,
    /// JSON-encoded [`PicksFile`]s.
    picks: BTreeMap<AnnotationKey, String>,
    /// JSON-encoded [`TriangleMesh`]es.
    meshes: BTreeMap<AnnotationKey, Bytes>,
    segmentations: BTreeSet<SegmentationKey>,
}

impl RunState {
    fn tomogram_mut(&mut self, voxel_size: VoxelSize, tomo_type: &str) -> &mut BTreeSet<String> {
        self.voxel_spacings
            .entry(voxel_size)
            .or_default()
            .entry(tomo_type.to_string())
            .or_default()
    }
}

fn run_path(run: &str) -> String {
    format!("ExperimentRuns/{run}")
}

fn tomogram_path(run: &str, voxel_size: VoxelSize, tomo_type: &str) -> String {
    format!("{}/VoxelSpacing{voxel_size}/{tomo_type}.zarr", run_path(run))
}

fn features_path(run: &str, voxel_size: VoxelSize, tomo_type: &str, feature_type: &str) -> String {
    format!(
        "{}/VoxelSpacing{voxel_size}/{tomo_type}_{feature_type}_features.zarr",
        run_path(run)
    )
}

fn segmentation_path(run: &str, key: &SegmentationKey) -> String {
    let suffix = if key.is_multilabel { "-multilabel" } else { "" };
    format!(
        "{}/Segmentations/{}_{}_{}_{}{suffix}.zarr",
        run_path(run),
        key.voxel_size,
        key.user_id,
        key.session_id,
        key.name
    )
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// An in-memory implementation of [`Backend`]. Data is lost when the
/// backend is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    runs: RwLock<BTreeMap<String, RunState>>,
    stores: RwLock<BTreeMap<String, MemoryArrayStore>>,
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `operation` (e.g. `"query_picks"`) has run.
    pub fn calls(&self, operation: &str) -> usize {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.get(operation).copied().unwrap_or(0)
    }

    /// Paths of every array store created so far.
    pub fn store_paths(&self) -> CopickResult<Vec<String>> {
        let stores = self.stores.read().map_err(CopickError::poisoned)?;
        Ok(stores.keys().cloned().collect())
    }

    fn count(&self, operation: &'static str) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        *calls.entry(operation).or_insert(0) += 1;
    }

    fn read_run<T>(&self, run: &str, f: impl FnOnce(&RunState) -> T) -> CopickResult<Option<T>> {
        let runs = self.runs.read().map_err(CopickError::poisoned)?;
        Ok(runs.get(run).map(f))
    }

    /// Apply `f` to the run's state, creating the run if needed.
    fn write_run<T>(&self, run: &str, f: impl FnOnce(&mut RunState) -> T) -> CopickResult<T> {
        let mut runs = self.runs.write().map_err(CopickError::poisoned)?;
        Ok(f(runs.entry(run.to_string()).or_default()))
    }

    fn store_at(&self, path: String) -> CopickResult<MemoryArrayStore> {
        let mut stores = self.stores.write().map_err(CopickError::poisoned)?;
        Ok(stores.entry(path).or_default().clone())
    }

    // ---- seeding ----

    pub fn seed_run(&self, run: &str) -> CopickResult<()> {
        self.write_run(run, |_| ())
    }

    pub fn seed_voxel_spacing(&self, run: &str, voxel_size: VoxelSize) -> CopickResult<()> {
        self.write_run(run, |state| {
            state.voxel_spacings.entry(voxel_size).or_default();
        })
    }

    pub fn seed_tomogram(&self, run: &str, voxel_size: VoxelSize, tomo_type: &str) -> CopickResult<()> {
        self.write_run(run, |state| {
            state.tomogram_mut(voxel_size, tomo_type);
        })
    }

    pub fn seed_features(
        &self,
        run: &str,
        voxel_size: VoxelSize,
        tomo_type: &str,
        feature_type: &str,
    ) -> CopickResult<()> {
        self.write_run(run, |state| {
            state
                .tomogram_mut(voxel_size, tomo_type)
                .insert(feature_type.to_string());
        })
    }

    pub fn seed_picks(&self, run: &str, file: PicksFile) -> CopickResult<()> {
        let json = encode(&file)?;
        self.write_run(run, |state| {
            state.picks.insert(file.key(), json);
        })
    }

    pub fn seed_mesh(&self, run: &str, key: AnnotationKey, mesh: TriangleMesh) -> CopickResult<()> {
        let bytes = Bytes::from(encode(&mesh)?);
        self.write_run(run, |state| {
            state.meshes.insert(key, bytes);
        })
    }

    pub fn seed_segmentation(&self, run: &str, key: SegmentationKey) -> CopickResult<()> {
        self.write_run(run, |state| {
            state.segmentations.insert(key);
        })
    }
}

fn encode<T: Serialize>(value: &T) -> CopickResult<String> {
    serde_json::to_string(value).map_err(|e| CopickError::Backend(format!("encode failed: {e}")))
}

fn decode<'a, T: Deserialize<'a>>(what: &AnnotationKey, text: &'a [u8]) -> CopickResult<T> {
    serde_json::from_slice(text).map_err(|e| CopickError::Backend(format!("corrupt {what}: {e}")))
}

/// Run name and voxel size of a tomogram.
fn tomogram_location(tomogram: &Tomogram<MemoryBackend>) -> CopickResult<(String, VoxelSize)> {
    let spacing = tomogram.voxel_spacing()?;
    let run = spacing.run()?;
    Ok((run.name().to_string(), spacing.voxel_size()))
}

impl Backend for MemoryBackend {
    type Schema = DefaultSchema;
    type ArrayStore = MemoryArrayStore;
    type Mesh = TriangleMesh;

    fn query_runs(&self, _root: &Root<Self>) -> CopickResult<Vec<RunMeta>> {
        self.count("query_runs");
        let runs = self.runs.read().map_err(CopickError::poisoned)?;
        Ok(runs.keys().map(|name| RunMeta::create(name, ())).collect())
    }

    fn ensure_run(&self, run: &Run<Self>, create: bool) -> CopickResult<bool> {
        self.count("ensure_run");
        if create {
            self.write_run(run.name(), |_| ())?;
            return Ok(true);
        }
        Ok(self.read_run(run.name(), |_| ())?.is_some())
    }

    fn query_voxel_spacings(&self, run: &Run<Self>) -> CopickResult<Vec<VoxelSpacingMeta>> {
        self.count("query_voxel_spacings");
        let sizes = self.read_run(run.name(), |state| {
            state.voxel_spacings.keys().copied().collect::<Vec<_>>()
        })?;
        Ok(sizes
            .unwrap_or_default()
            .into_iter()
            .map(|size| VoxelSpacingMeta::create(size, ()))
            .collect())
    }

    fn ensure_voxel_spacing(
        &self,
        voxel_spacing: &VoxelSpacing<Self>,
        create: bool,
    ) -> CopickResult<bool> {
        self.count("ensure_voxel_spacing");
        let run = voxel_spacing.run()?;
        let size = voxel_spacing.voxel_size();
        if create {
            self.write_run(run.name(), |state| {
                state.voxel_spacings.entry(size).or_default();
            })?;
            return Ok(true);
        }
        Ok(self
            .read_run(run.name(), |state| state.voxel_spacings.contains_key(&size))?
            .unwrap_or(false))
    }

    fn query_tomograms(&self, voxel_spacing: &VoxelSpacing<Self>) -> CopickResult<Vec<TomogramMeta>> {
        self.count("query_tomograms");
        let run = voxel_spacing.run()?;
        let size = voxel_spacing.voxel_size();
        let types = self.read_run(run.name(), |state| {
            state
                .voxel_spacings
                .get(&size)
                .map(|tomograms| tomograms.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;
        Ok(types
            .unwrap_or_default()
            .iter()
            .map(|t| TomogramMeta::create(t, ()))
            .collect())
    }

    fn query_features(&self, tomogram: &Tomogram<Self>) -> CopickResult<Vec<FeaturesMeta>> {
        self.count("query_features");
        let (run, size) = tomogram_location(tomogram)?;
        let tomo_type = tomogram.tomo_type();
        let types = self.read_run(&run, |state| {
            state
                .voxel_spacings
                .get(&size)
                .and_then(|tomograms| tomograms.get(tomo_type))
                .map(|features| features.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;
        Ok(types
            .unwrap_or_default()
            .iter()
            .map(|f| FeaturesMeta::create(tomo_type, f, ()))
            .collect())
    }

    fn query_picks(&self, run: &Run<Self>) -> CopickResult<Vec<PicksFile>> {
        self.count("query_picks");
        let encoded = self.read_run(run.name(), |state| {
            state
                .picks
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>()
        })?;
        encoded
            .unwrap_or_default()
            .into_iter()
            .map(|(key, json)| {
                let mut file: PicksFile = decode(&key, json.as_bytes())?;
                // Listing reads metadata only.
                file.points = None;
                Ok(file)
            })
            .collect()
    }

    fn query_meshes(&self, run: &Run<Self>) -> CopickResult<Vec<MeshMeta>> {
        self.count("query_meshes");
        let keys = self.read_run(run.name(), |state| {
            state.meshes.keys().cloned().collect::<Vec<_>>()
        })?;
        Ok(keys
            .unwrap_or_default()
            .into_iter()
            .map(|key| MeshMeta::create(key, ()))
            .collect())
    }

    fn query_segmentations(&self, run: &Run<Self>) -> CopickResult<Vec<SegmentationMeta>> {
        self.count("query_segmentations");
        let keys = self.read_run(run.name(), |state| {
            state.segmentations.iter().cloned().collect::<Vec<_>>()
        })?;
        Ok(keys
            .unwrap_or_default()
            .into_iter()
            .map(|key| SegmentationMeta::create(key, ()))
            .collect())
    }

    fn load_picks(&self, picks: &Picks<Self>) -> CopickResult<PicksFile> {
        self.count("load_picks");
        let run = picks.run()?;
        let json = self
            .read_run(run.name(), |state| state.picks.get(picks.key()).cloned())?
            .flatten()
            .ok_or_else(|| {
                CopickError::Backend(format!("picks {} not found in run {}", picks.key(), run.name()))
            })?;
        decode(picks.key(), json.as_bytes())
    }

    fn store_picks(&self, picks: &Picks<Self>, record: &PicksFile) -> CopickResult<()> {
        self.count("store_picks");
        let run = picks.run()?;
        let json = encode(record)?;
        self.write_run(run.name(), |state| {
            state.picks.insert(picks.key().clone(), json);
        })
    }

    fn load_mesh(&self, mesh: &Mesh<Self>) -> CopickResult<TriangleMesh> {
        self.count("load_mesh");
        let run = mesh.run()?;
        let bytes = self
            .read_run(run.name(), |state| state.meshes.get(mesh.key()).cloned())?
            .flatten()
            .ok_or_else(|| {
                CopickError::Backend(format!("mesh {} not found in run {}", mesh.key(), run.name()))
            })?;
        decode(mesh.key(), &bytes)
    }

    fn store_mesh(&self, mesh: &Mesh<Self>, geometry: &TriangleMesh) -> CopickResult<()> {
        self.count("store_mesh");
        let run = mesh.run()?;
        let bytes = Bytes::from(encode(geometry)?);
        self.write_run(run.name(), |state| {
            state.meshes.insert(mesh.key().clone(), bytes);
        })
    }

    fn object_store(&self, object: &CopickObject<Self>) -> CopickResult<MemoryArrayStore> {
        self.count("object_store");
        self.store_at(format!("Objects/{}.zarr", object.name()))
    }

    fn tomogram_store(&self, tomogram: &Tomogram<Self>) -> CopickResult<MemoryArrayStore> {
        self.count("tomogram_store");
        let (run, size) = tomogram_location(tomogram)?;
        self.write_run(&run, |state| {
            state.tomogram_mut(size, tomogram.tomo_type());
        })?;
        self.store_at(tomogram_path(&run, size, tomogram.tomo_type()))
    }

    fn features_store(&self, features: &Features<Self>) -> CopickResult<MemoryArrayStore> {
        self.count("features_store");
        let tomogram = features.tomogram()?;
        let (run, size) = tomogram_location(&tomogram)?;
        self.write_run(&run, |state| {
            state
                .tomogram_mut(size, features.tomo_type())
                .insert(features.feature_type().to_string());
        })?;
        self.store_at(features_path(
            &run,
            size,
            features.tomo_type(),
            features.feature_type(),
        ))
    }

    fn segmentation_store(
        &self,
        segmentation: &Segmentation<Self>,
    ) -> CopickResult<MemoryArrayStore> {
        self.count("segmentation_store");
        let run = segmentation.run()?;
        let key = segmentation.key();
        let path = segmentation_path(run.name(), &key);
        self.write_run(run.name(), |state| {
            state.segmentations.insert(key);
        })?;
        self.store_at(path)
    }
}
