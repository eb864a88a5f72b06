//! Runs: one physical acquisition with its reconstructions and annotations.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use copick_types::{
    AnnotationKey, Config, MeshRecord, PicksRecord, RunRecord, SegmentationKey,
    SegmentationRecord, VoxelSize, VoxelSpacingRecord,
};

use crate::error::{CopickError, CopickResult};
use crate::filter::{MeshFilter, PicksFilter, SegmentationFilter};
use crate::lazy::LazyCollection;
use crate::mesh::Mesh;
use crate::picks::Picks;
use crate::root::Root;
use crate::segmentation::Segmentation;
use crate::traits::{
    Backend, MeshMetaOf, PicksMetaOf, RunMetaOf, SegmentationMetaOf, VoxelSpacingMetaOf,
};
use crate::voxel_spacing::VoxelSpacing;

type PicksOptionsOf<B> = <PicksMetaOf<B> as PicksRecord>::Options;
type MeshOptionsOf<B> = <MeshMetaOf<B> as MeshRecord>::Options;
type SegmentationOptionsOf<B> = <SegmentationMetaOf<B> as SegmentationRecord>::Options;

/// A run of the project.
pub struct Run<B: Backend> {
    this: Weak<Run<B>>,
    root: Weak<Root<B>>,
    backend: Arc<B>,
    meta: RunMetaOf<B>,
    voxel_spacings: LazyCollection<VoxelSpacing<B>>,
    picks: LazyCollection<Picks<B>>,
    meshes: LazyCollection<Mesh<B>>,
    segmentations: LazyCollection<Segmentation<B>>,
}

impl<B: Backend> Run<B> {
    /// Build a run. With an `index`, the collections the config declares
    /// are populated from it instead of the backend.
    pub(crate) fn attach(
        root: Weak<Root<B>>,
        backend: Arc<B>,
        meta: RunMetaOf<B>,
        index: Option<&Config>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let name = meta.name();
            let mut voxel_spacings = LazyCollection::new();
            let mut picks = LazyCollection::new();
            let mut meshes = LazyCollection::new();
            let mut segmentations = LazyCollection::new();

            if let Some(config) = index {
                if config.has_static_index() {
                    voxel_spacings = LazyCollection::loaded_with(
                        config
                            .static_voxel_spacings()
                            .into_iter()
                            .map(|size| {
                                let meta = VoxelSpacingMetaOf::<B>::create(size, Default::default());
                                VoxelSpacing::attach(
                                    this.clone(),
                                    Arc::clone(&backend),
                                    meta,
                                    Some(config),
                                )
                            })
                            .collect(),
                    );
                }
                if let Some(keys) = config.pre_picks_for(name) {
                    picks = LazyCollection::loaded_with(
                        keys.into_iter()
                            .map(|key| {
                                let meta = PicksMetaOf::<B>::create(key, name, Default::default());
                                Picks::attach(this.clone(), Arc::clone(&backend), meta)
                            })
                            .collect(),
                    );
                }
                if let Some(keys) = config.pre_mesh_keys() {
                    meshes = LazyCollection::loaded_with(
                        keys.into_iter()
                            .map(|key| {
                                let meta = MeshMetaOf::<B>::create(key, Default::default());
                                Mesh::attach(this.clone(), Arc::clone(&backend), meta, None)
                            })
                            .collect(),
                    );
                }
                if let Some(keys) = config.pre_segmentation_keys() {
                    segmentations = LazyCollection::loaded_with(
                        keys.into_iter()
                            .map(|key| {
                                let meta = SegmentationMetaOf::<B>::create(key, Default::default());
                                Segmentation::attach(this.clone(), Arc::clone(&backend), meta)
                            })
                            .collect(),
                    );
                }
            }

            Self {
                this: this.clone(),
                root,
                backend,
                meta,
                voxel_spacings: voxel_spacings.identified_by(
                    |a: &VoxelSpacing<B>, b: &VoxelSpacing<B>| a.voxel_size() == b.voxel_size(),
                ),
                picks,
                meshes,
                segmentations,
            }
        })
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    pub fn meta(&self) -> &RunMetaOf<B> {
        &self.meta
    }

    pub fn root(&self) -> CopickResult<Arc<Root<B>>> {
        self.root.upgrade().ok_or(CopickError::Detached { entity: "run" })
    }

    /// Whether the run's record exists in the backend, creating it first
    /// when `create` is set.
    pub fn ensure(&self, create: bool) -> CopickResult<bool> {
        debug!(run = self.name(), create, "ensuring run");
        self.backend.ensure_run(self, create)
    }

    // ---- voxel spacings ----

    pub fn voxel_spacings(&self) -> CopickResult<Vec<Arc<VoxelSpacing<B>>>> {
        self.voxel_spacings.get(|| self.query_voxel_spacings())
    }

    /// Look up a voxel spacing, with the same cache-or-existence-check
    /// behavior as [`Root::get_run`].
    pub fn get_voxel_spacing(
        &self,
        voxel_size: VoxelSize,
    ) -> CopickResult<Option<Arc<VoxelSpacing<B>>>> {
        if let Some(spacings) = self.voxel_spacings.loaded()? {
            return Ok(spacings.into_iter().find(|vs| vs.voxel_size() == voxel_size));
        }

        let meta = VoxelSpacingMetaOf::<B>::create(voxel_size, Default::default());
        let vs = VoxelSpacing::attach(self.this.clone(), Arc::clone(&self.backend), meta, None);
        if !vs.ensure(false)? {
            return Ok(None);
        }
        Ok(Some(self.voxel_spacings.retain(vs)?))
    }

    pub fn new_voxel_spacing(&self, voxel_size: VoxelSize) -> CopickResult<Arc<VoxelSpacing<B>>> {
        self.new_voxel_spacing_with(voxel_size, Default::default())
    }

    pub fn new_voxel_spacing_with(
        &self,
        voxel_size: VoxelSize,
        options: <VoxelSpacingMetaOf<B> as VoxelSpacingRecord>::Options,
    ) -> CopickResult<Arc<VoxelSpacing<B>>> {
        self.voxel_spacings.create_with(
            || self.query_voxel_spacings(),
            |spacings| {
                if spacings.iter().any(|vs| vs.voxel_size() == voxel_size) {
                    return Err(CopickError::conflict("voxel spacing", voxel_size));
                }
                let meta = VoxelSpacingMetaOf::<B>::create(voxel_size, options);
                let vs =
                    VoxelSpacing::attach(self.this.clone(), Arc::clone(&self.backend), meta, None);
                if !vs.ensure(true)? {
                    return Err(CopickError::Backend(format!(
                        "voxel spacing {voxel_size} was not created in run {}",
                        self.name()
                    )));
                }
                info!(run = self.name(), %voxel_size, "created voxel spacing");
                Ok(vs)
            },
        )
    }

    pub fn refresh_voxel_spacings(&self) -> CopickResult<()> {
        let spacings = self.voxel_spacings.refresh(|| self.query_voxel_spacings())?;
        debug!(run = self.name(), count = spacings.len(), "refreshed voxel spacings");
        Ok(())
    }

    fn query_voxel_spacings(&self) -> CopickResult<Vec<Arc<VoxelSpacing<B>>>> {
        debug!(run = self.name(), "querying voxel spacings");
        let metas = self.backend.query_voxel_spacings(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| {
                VoxelSpacing::attach(self.this.clone(), Arc::clone(&self.backend), meta, None)
            })
            .collect())
    }

    // ---- picks ----

    pub fn picks(&self) -> CopickResult<Vec<Arc<Picks<B>>>> {
        self.picks.get(|| self.query_picks())
    }

    /// Picks matching every constraint of `filter`.
    pub fn get_picks(&self, filter: &PicksFilter) -> CopickResult<Vec<Arc<Picks<B>>>> {
        Ok(self
            .picks()?
            .into_iter()
            .filter(|p| filter.matches(p.key()))
            .collect())
    }

    /// Picks of the configured user, or every non-tool picks set when no
    /// user is configured.
    pub fn user_picks(&self) -> CopickResult<Vec<Arc<Picks<B>>>> {
        let user = self.root()?.user_id()?;
        Ok(user_partition(self.picks()?, user.as_deref(), |p| {
            (p.user_id(), p.session_id())
        }))
    }

    pub fn tool_picks(&self) -> CopickResult<Vec<Arc<Picks<B>>>> {
        Ok(self.picks()?.into_iter().filter(|p| p.from_tool()).collect())
    }

    /// Create an empty picks set. `user_id` defaults to the root's user.
    pub fn new_picks(
        &self,
        object_name: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> CopickResult<Arc<Picks<B>>> {
        self.new_picks_with(object_name, session_id, user_id, Default::default())
    }

    pub fn new_picks_with(
        &self,
        object_name: &str,
        session_id: &str,
        user_id: Option<&str>,
        options: PicksOptionsOf<B>,
    ) -> CopickResult<Arc<Picks<B>>> {
        let key = self.annotation_key(object_name, session_id, user_id, "new_picks")?;

        self.picks.create_with(
            || self.query_picks(),
            |existing| {
                if existing.iter().any(|p| p.key() == &key) {
                    return Err(CopickError::conflict("picks", &key));
                }
                let mut meta = PicksMetaOf::<B>::create(key.clone(), self.name(), options);
                meta.set_points(Vec::new());
                let picks = Picks::attach(self.this.clone(), Arc::clone(&self.backend), meta);
                picks.store()?;
                info!(run = self.name(), picks = %key, "created picks");
                Ok(picks)
            },
        )
    }

    pub fn refresh_picks(&self) -> CopickResult<()> {
        let picks = self.picks.refresh(|| self.query_picks())?;
        debug!(run = self.name(), count = picks.len(), "refreshed picks");
        Ok(())
    }

    fn query_picks(&self) -> CopickResult<Vec<Arc<Picks<B>>>> {
        debug!(run = self.name(), "querying picks");
        let metas = self.backend.query_picks(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| Picks::attach(self.this.clone(), Arc::clone(&self.backend), meta))
            .collect())
    }

    // ---- meshes ----

    pub fn meshes(&self) -> CopickResult<Vec<Arc<Mesh<B>>>> {
        self.meshes.get(|| self.query_meshes())
    }

    pub fn get_meshes(&self, filter: &MeshFilter) -> CopickResult<Vec<Arc<Mesh<B>>>> {
        Ok(self
            .meshes()?
            .into_iter()
            .filter(|m| filter.matches(m.key()))
            .collect())
    }

    pub fn user_meshes(&self) -> CopickResult<Vec<Arc<Mesh<B>>>> {
        let user = self.root()?.user_id()?;
        Ok(user_partition(self.meshes()?, user.as_deref(), |m| {
            (m.user_id(), m.session_id())
        }))
    }

    pub fn tool_meshes(&self) -> CopickResult<Vec<Arc<Mesh<B>>>> {
        Ok(self.meshes()?.into_iter().filter(|m| m.from_tool()).collect())
    }

    /// Create a mesh holding empty geometry.
    pub fn new_mesh(
        &self,
        object_name: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> CopickResult<Arc<Mesh<B>>> {
        self.new_mesh_with(object_name, session_id, user_id, Default::default())
    }

    pub fn new_mesh_with(
        &self,
        object_name: &str,
        session_id: &str,
        user_id: Option<&str>,
        options: MeshOptionsOf<B>,
    ) -> CopickResult<Arc<Mesh<B>>> {
        let key = self.annotation_key(object_name, session_id, user_id, "new_mesh")?;

        self.meshes.create_with(
            || self.query_meshes(),
            |existing| {
                if existing.iter().any(|m| m.key() == &key) {
                    return Err(CopickError::conflict("mesh", &key));
                }
                let meta = MeshMetaOf::<B>::create(key.clone(), options);
                let mesh = Mesh::attach(
                    self.this.clone(),
                    Arc::clone(&self.backend),
                    meta,
                    Some(B::Mesh::default()),
                );
                mesh.store()?;
                info!(run = self.name(), mesh = %key, "created mesh");
                Ok(mesh)
            },
        )
    }

    pub fn refresh_meshes(&self) -> CopickResult<()> {
        let meshes = self.meshes.refresh(|| self.query_meshes())?;
        debug!(run = self.name(), count = meshes.len(), "refreshed meshes");
        Ok(())
    }

    fn query_meshes(&self) -> CopickResult<Vec<Arc<Mesh<B>>>> {
        debug!(run = self.name(), "querying meshes");
        let metas = self.backend.query_meshes(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| Mesh::attach(self.this.clone(), Arc::clone(&self.backend), meta, None))
            .collect())
    }

    // ---- segmentations ----

    pub fn segmentations(&self) -> CopickResult<Vec<Arc<Segmentation<B>>>> {
        self.segmentations.get(|| self.query_segmentations())
    }

    pub fn get_segmentations(
        &self,
        filter: &SegmentationFilter,
    ) -> CopickResult<Vec<Arc<Segmentation<B>>>> {
        Ok(self
            .segmentations()?
            .into_iter()
            .filter(|s| filter.matches(&s.key()))
            .collect())
    }

    pub fn user_segmentations(&self) -> CopickResult<Vec<Arc<Segmentation<B>>>> {
        let user = self.root()?.user_id()?;
        Ok(user_partition(self.segmentations()?, user.as_deref(), |s| {
            (s.user_id(), s.session_id())
        }))
    }

    pub fn tool_segmentations(&self) -> CopickResult<Vec<Arc<Segmentation<B>>>> {
        Ok(self
            .segmentations()?
            .into_iter()
            .filter(|s| s.from_tool())
            .collect())
    }

    /// Create a segmentation and its array store.
    ///
    /// `voxel_size` must be an existing voxel spacing of this run. Unless
    /// `is_multilabel` is set, `name` must be a pickable object.
    pub fn new_segmentation(
        &self,
        voxel_size: VoxelSize,
        name: &str,
        session_id: &str,
        is_multilabel: bool,
        user_id: Option<&str>,
    ) -> CopickResult<Arc<Segmentation<B>>> {
        self.new_segmentation_with(
            voxel_size,
            name,
            session_id,
            is_multilabel,
            user_id,
            Default::default(),
        )
    }

    pub fn new_segmentation_with(
        &self,
        voxel_size: VoxelSize,
        name: &str,
        session_id: &str,
        is_multilabel: bool,
        user_id: Option<&str>,
        options: SegmentationOptionsOf<B>,
    ) -> CopickResult<Arc<Segmentation<B>>> {
        let root = self.root()?;
        if !is_multilabel && !root.config().has_object(name) {
            return Err(CopickError::UnknownObject {
                name: name.to_string(),
            });
        }
        if self.get_voxel_spacing(voxel_size)?.is_none() {
            return Err(CopickError::UnknownVoxelSpacing {
                voxel_size,
                run: self.name().to_string(),
            });
        }
        let user_id = root.resolve_user_id(user_id, "new_segmentation")?;

        let key = SegmentationKey {
            user_id,
            session_id: session_id.to_string(),
            name: name.to_string(),
            is_multilabel,
            voxel_size,
        };

        self.segmentations.create_with(
            || self.query_segmentations(),
            |existing| {
                if existing.iter().any(|s| s.key() == key) {
                    return Err(CopickError::conflict("segmentation", &key));
                }
                let meta = SegmentationMetaOf::<B>::create(key.clone(), options);
                let seg = Segmentation::attach(self.this.clone(), Arc::clone(&self.backend), meta);
                seg.zarr()?;
                info!(run = self.name(), segmentation = %key, "created segmentation");
                Ok(seg)
            },
        )
    }

    pub fn refresh_segmentations(&self) -> CopickResult<()> {
        let segs = self.segmentations.refresh(|| self.query_segmentations())?;
        debug!(run = self.name(), count = segs.len(), "refreshed segmentations");
        Ok(())
    }

    fn query_segmentations(&self) -> CopickResult<Vec<Arc<Segmentation<B>>>> {
        debug!(run = self.name(), "querying segmentations");
        let metas = self.backend.query_segmentations(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| Segmentation::attach(self.this.clone(), Arc::clone(&self.backend), meta))
            .collect())
    }

    // ---- shared ----

    /// Reload voxel spacings, picks, meshes and segmentations, in that order.
    pub fn refresh(&self) -> CopickResult<()> {
        self.refresh_voxel_spacings()?;
        self.refresh_picks()?;
        self.refresh_meshes()?;
        self.refresh_segmentations()
    }

    /// Validate the object and resolve the user of a new picks set or mesh.
    fn annotation_key(
        &self,
        object_name: &str,
        session_id: &str,
        user_id: Option<&str>,
        operation: &'static str,
    ) -> CopickResult<AnnotationKey> {
        let root = self.root()?;
        if !root.config().has_object(object_name) {
            return Err(CopickError::UnknownObject {
                name: object_name.to_string(),
            });
        }
        let user_id = root.resolve_user_id(user_id, operation)?;
        Ok(AnnotationKey::new(object_name, user_id, session_id))
    }
}

/// Artifacts of `user` if set, otherwise every artifact not produced by a
/// tool.
fn user_partition<T, F>(items: Vec<Arc<T>>, user: Option<&str>, ids: F) -> Vec<Arc<T>>
where
    F: Fn(&T) -> (&str, &str),
{
    items
        .into_iter()
        .filter(|item| {
            let (user_id, session_id) = ids(&**item);
            match user {
                Some(user) => user_id == user,
                None => !copick_types::is_tool_session(session_id),
            }
        })
        .collect()
}

impl<B: Backend> fmt::Debug for Run<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("meta", &self.meta)
            .field("voxel_spacings", &self.voxel_spacings)
            .field("picks", &self.picks)
            .field("meshes", &self.meshes)
            .field("segmentations", &self.segmentations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use copick_types::{Color, PickableObject, PicksFile, PreDeclaredSegmentation};
    use std::collections::BTreeMap;

    fn vs(v: f64) -> VoxelSize {
        VoxelSize::new(v).unwrap()
    }

    fn objects() -> Vec<PickableObject> {
        vec![
            PickableObject::new("ribosome", true)
                .with_label(1)
                .unwrap()
                .with_color(&[255, 0, 0, 255])
                .unwrap(),
            PickableObject::new("membrane", false).with_label(2).unwrap(),
        ]
    }

    /// Root with one run "TS_001" holding voxel spacing 10.0.
    fn scenario(config: Config) -> (Arc<Root<MemoryBackend>>, Arc<Run<MemoryBackend>>) {
        let backend = MemoryBackend::new();
        backend.seed_voxel_spacing("TS_001", vs(10.0)).unwrap();
        let root = Root::new(config, backend).unwrap();
        let run = root.get_run("TS_001").unwrap().unwrap();
        (root, run)
    }

    #[test]
    fn new_picks_then_lookup_then_conflict() {
        let (_root, run) = scenario(Config::new(objects()));

        let picks = run.new_picks("ribosome", "1", Some("alice")).unwrap();
        assert_eq!(picks.user_id(), "alice");

        let found = run
            .get_picks(&PicksFilter::new().object_name("ribosome"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pickable_object_name(), "ribosome");
        assert_eq!(found[0].user_id(), "alice");
        assert_eq!(found[0].session_id(), "1");

        let err = run.new_picks("ribosome", "1", Some("alice")).unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("ribosome by user/tool alice in session 1"));
        assert_eq!(run.picks().unwrap().len(), 1);

        // A different session is a different identity.
        run.new_picks("ribosome", "2", Some("alice")).unwrap();
        assert_eq!(run.picks().unwrap().len(), 2);
    }

    #[test]
    fn new_picks_rejects_unknown_object_before_user() {
        let (root, run) = scenario(Config::new(objects()));
        let err = run.new_picks("proteasome", "1", Some("alice")).unwrap_err();
        assert!(err.is_referential());
        // Without any user id the referential failure still wins.
        let err = run.new_picks("proteasome", "1", None).unwrap_err();
        assert!(err.is_referential());
        assert_eq!(root.backend().calls("query_picks"), 0);
        assert_eq!(root.backend().calls("store_picks"), 0);
    }

    #[test]
    fn new_picks_without_user_fails_before_backend() {
        let (root, run) = scenario(Config::new(objects()));
        let err = run.new_picks("ribosome", "1", None).unwrap_err();
        assert!(matches!(err, CopickError::MissingUserId { operation: "new_picks" }));
        assert_eq!(root.backend().calls("query_picks"), 0);
    }

    #[test]
    fn new_picks_uses_configured_user() {
        let (_root, run) = scenario(Config::new(objects()).with_user_id("bob"));
        let picks = run.new_picks("ribosome", "1", None).unwrap();
        assert_eq!(picks.user_id(), "bob");
        assert!(picks.points().unwrap().is_empty());
    }

    #[test]
    fn new_mesh_checks_object_and_key() {
        let (_root, run) = scenario(Config::new(objects()).with_user_id("alice"));
        assert!(run.new_mesh("proteasome", "1", None).unwrap_err().is_referential());

        let mesh = run.new_mesh("membrane", "1", None).unwrap();
        assert!(mesh.mesh().unwrap().is_empty());
        assert!(run.new_mesh("membrane", "1", None).unwrap_err().is_conflict());
        assert_eq!(
            run.get_meshes(&MeshFilter::new().user_id("alice")).unwrap().len(),
            1
        );
    }

    #[test]
    fn new_segmentation_requires_existing_voxel_spacing() {
        let (_root, run) = scenario(Config::new(objects()).with_user_id("alice"));

        let err = run
            .new_segmentation(vs(20.0), "anything", "1", true, None)
            .unwrap_err();
        assert!(matches!(err, CopickError::UnknownVoxelSpacing { .. }));
        assert!(run.segmentations().unwrap().is_empty());

        let err = run
            .new_segmentation(vs(10.0), "proteasome", "1", false, None)
            .unwrap_err();
        assert!(matches!(err, CopickError::UnknownObject { .. }));

        let seg = run.new_segmentation(vs(10.0), "anything", "1", true, None).unwrap();
        assert_eq!(seg.color().unwrap(), Some(Color::MULTILABEL));
        let seg = run.new_segmentation(vs(10.0), "ribosome", "1", false, None).unwrap();
        assert_eq!(seg.color().unwrap(), Some(Color::rgba(255, 0, 0, 255)));

        assert!(run
            .new_segmentation(vs(10.0), "ribosome", "1", false, None)
            .unwrap_err()
            .is_conflict());
        // Same name, different multilabel flag: distinct identity.
        run.new_segmentation(vs(10.0), "ribosome", "1", true, None).unwrap();
        assert_eq!(run.segmentations().unwrap().len(), 3);
        assert_eq!(
            run.get_segmentations(&SegmentationFilter::new().is_multilabel(true))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn new_segmentation_reports_unknown_voxel_spacing_before_user() {
        let (root, run) = scenario(Config::new(objects()));

        let err = run
            .new_segmentation(vs(20.0), "anything", "1", true, None)
            .unwrap_err();
        assert!(err.is_referential());
        assert!(matches!(err, CopickError::UnknownVoxelSpacing { .. }));

        // With a known voxel spacing the missing user is what fails.
        let err = run
            .new_segmentation(vs(10.0), "anything", "1", true, None)
            .unwrap_err();
        assert!(matches!(
            err,
            CopickError::MissingUserId {
                operation: "new_segmentation"
            }
        ));
        assert_eq!(root.backend().calls("query_segmentations"), 0);
        assert_eq!(root.backend().calls("segmentation_store"), 0);
    }

    #[test]
    fn voxel_spacing_creation_and_lookup() {
        let (root, run) = scenario(Config::new(objects()));

        // Targeted check before the collection is loaded.
        assert!(run.get_voxel_spacing(vs(10.0)).unwrap().is_some());
        assert!(run.get_voxel_spacing(vs(20.0)).unwrap().is_none());
        assert_eq!(root.backend().calls("query_voxel_spacings"), 0);

        assert!(run.new_voxel_spacing(vs(10.0)).unwrap_err().is_conflict());
        let created = run.new_voxel_spacing(vs(20.0)).unwrap();
        assert_eq!(created.voxel_size(), vs(20.0));
        assert_eq!(run.voxel_spacings().unwrap().len(), 2);
        assert_eq!(root.backend().calls("query_voxel_spacings"), 1);
        // Rounded to the same spacing.
        assert!(run.new_voxel_spacing(vs(20.0004)).unwrap_err().is_conflict());
    }

    #[test]
    fn user_and_tool_partitions() {
        let (root, run) = scenario(Config::new(objects()));
        run.new_picks("ribosome", "1", Some("alice")).unwrap();
        run.new_picks("ribosome", "3", Some("bob")).unwrap();
        run.new_picks("ribosome", "0", Some("pytom")).unwrap();

        assert_eq!(run.tool_picks().unwrap().len(), 1);
        assert_eq!(run.user_picks().unwrap().len(), 2);

        root.set_user_id("alice").unwrap();
        let mine = run.user_picks().unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user_id(), "alice");

        run.new_mesh("membrane", "0", Some("mc")).unwrap();
        assert_eq!(run.tool_meshes().unwrap().len(), 1);
        assert!(run.user_meshes().unwrap().is_empty());

        run.new_segmentation(vs(10.0), "membrane", "0", false, Some("memseg")).unwrap();
        run.new_segmentation(vs(10.0), "membrane", "1", false, None).unwrap();
        assert_eq!(run.tool_segmentations().unwrap().len(), 1);
        assert_eq!(run.user_segmentations().unwrap().len(), 1);
    }

    #[test]
    fn refresh_reflects_backend_changes() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed_voxel_spacing("TS_001", vs(10.0)).unwrap();
        let root = Root::with_shared_backend(
            Config::new(objects()).with_user_id("alice"),
            Arc::clone(&backend),
        )
        .unwrap();
        let run = root.get_run("TS_001").unwrap().unwrap();

        run.new_picks("ribosome", "1", None).unwrap();
        assert_eq!(run.voxel_spacings().unwrap().len(), 1);
        assert!(run.meshes().unwrap().is_empty());
        assert!(run.segmentations().unwrap().is_empty());

        // Another process writes to the shared storage.
        backend.seed_voxel_spacing("TS_001", vs(20.0)).unwrap();
        backend
            .seed_picks(
                "TS_001",
                PicksFile::create(
                    AnnotationKey::new("ribosome", "pytom", "0"),
                    "TS_001",
                    Default::default(),
                ),
            )
            .unwrap();
        backend
            .seed_mesh("TS_001", AnnotationKey::new("membrane", "mc", "0"), Default::default())
            .unwrap();
        backend
            .seed_segmentation(
                "TS_001",
                SegmentationKey {
                    user_id: "memseg".into(),
                    session_id: "0".into(),
                    name: "membrane".into(),
                    is_multilabel: false,
                    voxel_size: vs(10.0),
                },
            )
            .unwrap();

        assert_eq!(run.picks().unwrap().len(), 1);
        run.refresh().unwrap();
        assert_eq!(run.voxel_spacings().unwrap().len(), 2);
        assert_eq!(run.picks().unwrap().len(), 2);
        assert_eq!(run.meshes().unwrap().len(), 1);
        assert_eq!(run.segmentations().unwrap().len(), 1);
    }

    #[test]
    fn pre_declared_annotations_populate_static_runs() {
        let mut config = Config::new(objects()).with_runs(["TS_001"]);
        config.voxel_spacings = Some(vec![vs(10.0)]);
        config.pre_picks = Some(vec![copick_types::PreDeclaredPicks {
            run: "TS_001".into(),
            object: "ribosome".into(),
            tools: vec!["pytom".into()],
        }]);
        config.pre_meshes = Some(BTreeMap::new());
        config.pre_segmentations = Some(vec![PreDeclaredSegmentation {
            tool: "memseg".into(),
            name: "membrane".into(),
            voxel_size: vs(10.0),
            is_multilabel: false,
        }]);
        let root = Root::new(config, MemoryBackend::new()).unwrap();
        let run = root.get_run("TS_001").unwrap().unwrap();

        let picks = run.tool_picks().unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].user_id(), "pytom");
        assert!(run.meshes().unwrap().is_empty());
        assert_eq!(run.tool_segmentations().unwrap().len(), 1);
        assert_eq!(run.voxel_spacings().unwrap().len(), 1);

        let backend = root.backend();
        assert_eq!(backend.calls("query_picks"), 0);
        assert_eq!(backend.calls("query_meshes"), 0);
        assert_eq!(backend.calls("query_segmentations"), 0);
        assert_eq!(backend.calls("query_voxel_spacings"), 0);
    }

    #[test]
    fn static_and_queried_runs_look_the_same() {
        let mut config = Config::new(objects()).with_runs(["TS_001"]);
        config.voxel_spacings = Some(vec![vs(10.0)]);
        let from_index = Root::new(config, MemoryBackend::new()).unwrap();

        let (_root, queried) = scenario(Config::new(objects()));

        let a = from_index.get_run("TS_001").unwrap().unwrap();
        let a: Vec<_> = a.voxel_spacings().unwrap().iter().map(|v| v.voxel_size()).collect();
        let b: Vec<_> = queried.voxel_spacings().unwrap().iter().map(|v| v.voxel_size()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn detached_run_reports_error() {
        let (root, run) = scenario(Config::new(objects()));
        drop(root);
        let err = run.new_picks("ribosome", "1", Some("alice")).unwrap_err();
        assert!(matches!(err, CopickError::Detached { entity: "run" }));
    }
}
