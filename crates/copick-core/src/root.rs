//! The root of a copick project.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, info};

use copick_types::{Config, RunRecord};

use crate::error::{CopickError, CopickResult};
use crate::lazy::LazyCollection;
use crate::object::CopickObject;
use crate::run::Run;
use crate::traits::{Backend, RunMetaOf};

#[derive(Debug, Default)]
struct Identity {
    user_id: Option<String>,
    session_id: Option<String>,
}

/// Entry point of the entity tree: project config, pickable objects and
/// the runs of the dataset.
///
/// When the config lists run names, the run collection is populated from it
/// at construction; otherwise runs are queried from the backend on first
/// access.
///
/// Entities refer to their parents weakly. Everything below a root stays
/// attached for as long as the root itself is alive.
pub struct Root<B: Backend> {
    this: Weak<Root<B>>,
    config: Config,
    backend: Arc<B>,
    identity: RwLock<Identity>,
    objects: Vec<Arc<CopickObject<B>>>,
    runs: LazyCollection<Run<B>>,
}

impl<B: Backend> Root<B> {
    /// Open a root that owns `backend`. Fails if the config does not
    /// validate.
    pub fn new(config: Config, backend: B) -> CopickResult<Arc<Self>> {
        Self::with_shared_backend(config, Arc::new(backend))
    }

    /// Open a root over a backend that other roots may share, such as
    /// several annotators writing to the same storage.
    pub fn with_shared_backend(config: Config, backend: Arc<B>) -> CopickResult<Arc<Self>> {
        config.validate()?;

        let root = Arc::new_cyclic(|this: &Weak<Self>| {
            let objects = config
                .pickable_objects
                .iter()
                .cloned()
                .map(|o| CopickObject::attach(this.clone(), Arc::clone(&backend), o))
                .collect();

            let runs = match &config.runs {
                Some(names) => LazyCollection::loaded_with(
                    names
                        .iter()
                        .map(|name| {
                            let meta = RunMetaOf::<B>::create(name, Default::default());
                            Run::attach(this.clone(), Arc::clone(&backend), meta, Some(&config))
                        })
                        .collect(),
                ),
                None => LazyCollection::new(),
            }
            .identified_by(|a: &Run<B>, b: &Run<B>| a.name() == b.name());

            let identity = Identity {
                user_id: config.user_id.clone(),
                session_id: config.session_id.clone(),
            };

            Self {
                this: this.clone(),
                config,
                backend,
                identity: RwLock::new(identity),
                objects,
                runs,
            }
        });

        info!(
            project = %root.config.name,
            objects = root.objects.len(),
            static_runs = root.config.runs.as_ref().map(Vec::len),
            "opened copick root"
        );
        Ok(root)
    }

    /// Load the config from `path` (JSON, or TOML by extension) and open it.
    pub fn from_file(path: impl AsRef<Path>, backend: B) -> CopickResult<Arc<Self>> {
        Self::new(Config::from_file(path)?, backend)
    }

    /// The config as it was loaded. A user or session set afterwards is
    /// reported by [`Root::user_id`] and [`Root::session_id`], and included
    /// in [`Root::current_config`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A copy of the config with the current user and session applied,
    /// e.g. for writing the project back to disk.
    pub fn current_config(&self) -> CopickResult<Config> {
        let identity = self.identity.read().map_err(CopickError::poisoned)?;
        let mut config = self.config.clone();
        config.user_id = identity.user_id.clone();
        config.session_id = identity.session_id.clone();
        Ok(config)
    }

    /// The storage backend shared by every entity of this root.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // ---- identity ----

    pub fn user_id(&self) -> CopickResult<Option<String>> {
        let identity = self.identity.read().map_err(CopickError::poisoned)?;
        Ok(identity.user_id.clone())
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) -> CopickResult<()> {
        let mut identity = self.identity.write().map_err(CopickError::poisoned)?;
        identity.user_id = Some(user_id.into());
        Ok(())
    }

    pub fn session_id(&self) -> CopickResult<Option<String>> {
        let identity = self.identity.read().map_err(CopickError::poisoned)?;
        Ok(identity.session_id.clone())
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) -> CopickResult<()> {
        let mut identity = self.identity.write().map_err(CopickError::poisoned)?;
        identity.session_id = Some(session_id.into());
        Ok(())
    }

    /// The explicit user id if given, else the configured one.
    pub(crate) fn resolve_user_id(
        &self,
        explicit: Option<&str>,
        operation: &'static str,
    ) -> CopickResult<String> {
        match explicit {
            Some(user_id) => Ok(user_id.to_string()),
            None => self
                .user_id()?
                .ok_or(CopickError::MissingUserId { operation }),
        }
    }

    // ---- objects ----

    pub fn pickable_objects(&self) -> &[Arc<CopickObject<B>>] {
        &self.objects
    }

    pub fn get_object(&self, name: &str) -> Option<Arc<CopickObject<B>>> {
        self.objects.iter().find(|o| o.name() == name).cloned()
    }

    // ---- runs ----

    pub fn runs(&self) -> CopickResult<Vec<Arc<Run<B>>>> {
        self.runs.get(|| self.query_runs())
    }

    /// Look up a run by name.
    ///
    /// Scans the run collection when it is loaded. Otherwise asks the
    /// backend whether this single run exists and, if so, returns an
    /// instance that is not added to the collection. The root keeps that
    /// instance alive and hands it out again on later lookups; the first
    /// load of the collection adopts it.
    pub fn get_run(&self, name: &str) -> CopickResult<Option<Arc<Run<B>>>> {
        if let Some(runs) = self.runs.loaded()? {
            return Ok(runs.into_iter().find(|r| r.name() == name));
        }

        let meta = RunMetaOf::<B>::create(name, Default::default());
        let run = Run::attach(self.this.clone(), Arc::clone(&self.backend), meta, None);
        debug!(run = name, "checking run existence");
        if !run.ensure(false)? {
            return Ok(None);
        }
        Ok(Some(self.runs.retain(run)?))
    }

    pub fn new_run(&self, name: &str) -> CopickResult<Arc<Run<B>>> {
        self.new_run_with(name, Default::default())
    }

    /// Create a run with explicit record options.
    pub fn new_run_with(
        &self,
        name: &str,
        options: <RunMetaOf<B> as RunRecord>::Options,
    ) -> CopickResult<Arc<Run<B>>> {
        self.runs.create_with(
            || self.query_runs(),
            |runs| {
                if runs.iter().any(|r| r.name() == name) {
                    return Err(CopickError::conflict("run", name));
                }
                let meta = RunMetaOf::<B>::create(name, options);
                let run = Run::attach(self.this.clone(), Arc::clone(&self.backend), meta, None);
                if !run.ensure(true)? {
                    return Err(CopickError::Backend(format!("run {name} was not created")));
                }
                info!(run = name, "created run");
                Ok(run)
            },
        )
    }

    pub fn refresh_runs(&self) -> CopickResult<()> {
        let runs = self.runs.refresh(|| self.query_runs())?;
        debug!(count = runs.len(), "refreshed runs");
        Ok(())
    }

    pub fn refresh(&self) -> CopickResult<()> {
        self.refresh_runs()
    }

    fn query_runs(&self) -> CopickResult<Vec<Arc<Run<B>>>> {
        debug!(project = %self.config.name, "querying runs");
        let metas = self.backend.query_runs(self)?;
        Ok(metas
            .into_iter()
            .map(|meta| Run::attach(self.this.clone(), Arc::clone(&self.backend), meta, None))
            .collect())
    }
}

impl<B: Backend> fmt::Debug for Root<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("project", &self.config.name)
            .field("objects", &self.objects.len())
            .field("runs", &self.runs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use copick_types::{PickableObject, TypeError, VoxelSize};

    fn config() -> Config {
        Config::new(vec![PickableObject::new("ribosome", true)
            .with_label(1)
            .unwrap()
            .with_color(&[255, 0, 0, 255])
            .unwrap()])
    }

    #[test]
    fn new_run_conflicts_on_same_name() {
        let root = Root::new(config(), MemoryBackend::new()).unwrap();
        root.new_run("TS_001").unwrap();

        let err = root.new_run("TS_001").unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("TS_001"));
        assert_eq!(root.runs().unwrap().len(), 1);
        assert!(root.get_run("TS_001").unwrap().is_some());
    }

    #[test]
    fn runs_are_queried_once() {
        let backend = MemoryBackend::new();
        backend.seed_run("TS_001").unwrap();
        backend.seed_run("TS_002").unwrap();
        let root = Root::new(config(), backend).unwrap();

        assert_eq!(root.runs().unwrap().len(), 2);
        assert_eq!(root.runs().unwrap().len(), 2);
        assert_eq!(root.backend().calls("query_runs"), 1);
    }

    #[test]
    fn get_run_before_load_uses_single_existence_check() {
        let backend = MemoryBackend::new();
        backend.seed_run("TS_001").unwrap();
        let root = Root::new(config(), backend).unwrap();

        let run = root.get_run("TS_001").unwrap().unwrap();
        assert_eq!(run.name(), "TS_001");
        assert!(root.get_run("TS_404").unwrap().is_none());
        assert_eq!(root.backend().calls("ensure_run"), 2);
        assert_eq!(root.backend().calls("query_runs"), 0);
    }

    #[test]
    fn get_run_after_load_scans_cache() {
        let backend = MemoryBackend::new();
        backend.seed_run("TS_001").unwrap();
        let root = Root::new(config(), backend).unwrap();

        root.runs().unwrap();
        assert!(root.get_run("TS_001").unwrap().is_some());
        assert!(root.get_run("TS_404").unwrap().is_none());
        assert_eq!(root.backend().calls("ensure_run"), 0);
    }

    #[test]
    fn creating_on_unloaded_collection_loads_it_first() {
        let backend = MemoryBackend::new();
        backend.seed_run("TS_001").unwrap();
        let root = Root::new(config(), backend).unwrap();

        assert!(root.new_run("TS_001").unwrap_err().is_conflict());
        root.new_run("TS_002").unwrap();
        assert_eq!(root.runs().unwrap().len(), 2);
        assert_eq!(root.backend().calls("query_runs"), 1);
    }

    #[test]
    fn static_run_index_skips_the_backend() {
        let root = Root::new(config().with_runs(["TS_001", "TS_002"]), MemoryBackend::new()).unwrap();
        let names: Vec<_> = root.runs().unwrap().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["TS_001", "TS_002"]);
        assert_eq!(root.backend().calls("query_runs"), 0);
    }

    #[test]
    fn refresh_picks_up_runs_written_elsewhere() {
        let backend = Arc::new(MemoryBackend::new());
        let root = Root::with_shared_backend(config(), Arc::clone(&backend)).unwrap();
        assert!(root.runs().unwrap().is_empty());

        backend.seed_run("TS_001").unwrap();
        assert!(root.runs().unwrap().is_empty());
        root.refresh().unwrap();
        assert_eq!(root.runs().unwrap().len(), 1);
    }

    #[test]
    fn identity_defaults_to_config_and_can_change() {
        let root = Root::new(config().with_user_id("alice"), MemoryBackend::new()).unwrap();
        assert_eq!(root.user_id().unwrap().as_deref(), Some("alice"));
        assert!(root.session_id().unwrap().is_none());

        root.set_user_id("bob").unwrap();
        root.set_session_id("7").unwrap();
        assert_eq!(root.resolve_user_id(None, "test").unwrap(), "bob");
        assert_eq!(root.resolve_user_id(Some("carol"), "test").unwrap(), "carol");
        assert_eq!(root.session_id().unwrap().as_deref(), Some("7"));
    }

    #[test]
    fn missing_user_id_is_reported() {
        let root = Root::new(config(), MemoryBackend::new()).unwrap();
        let err = root.resolve_user_id(None, "new_picks").unwrap_err();
        assert!(matches!(err, CopickError::MissingUserId { operation: "new_picks" }));
    }

    #[test]
    fn duplicate_objects_fail_construction() {
        let config = Config::new(vec![
            PickableObject::new("a", true),
            PickableObject::new("a", false),
        ]);
        let err = Root::new(config, MemoryBackend::new()).unwrap_err();
        assert!(matches!(
            err,
            CopickError::Validation(TypeError::DuplicateObject { .. })
        ));
    }

    #[test]
    fn opens_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copick.json");
        let mut config = config().with_runs(["TS_001"]);
        config.voxel_spacings = Some(vec![VoxelSize::new(10.0).unwrap()]);
        std::fs::write(&path, config.to_json_pretty().unwrap()).unwrap();

        let root = Root::from_file(&path, MemoryBackend::new()).unwrap();
        assert_eq!(root.config(), &config);
        let run = root.get_run("TS_001").unwrap().unwrap();
        assert_eq!(run.voxel_spacings().unwrap().len(), 1);
    }

    #[test]
    fn missing_config_file_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Root::from_file(dir.path().join("absent.json"), MemoryBackend::new()).unwrap_err();
        assert!(matches!(err, CopickError::Validation(TypeError::Io(_))));
    }

    #[test]
    fn identity_changes_show_in_current_config() {
        let root = Root::new(config().with_user_id("alice"), MemoryBackend::new()).unwrap();
        root.set_user_id("bob").unwrap();
        root.set_session_id("7").unwrap();

        assert_eq!(root.config().user_id.as_deref(), Some("alice"));
        let current = root.current_config().unwrap();
        assert_eq!(current.user_id.as_deref(), Some("bob"));
        assert_eq!(current.session_id.as_deref(), Some("7"));
        assert_eq!(current.pickable_objects, root.config().pickable_objects);
    }

    #[test]
    fn objects_are_looked_up_by_name() {
        let root = Root::new(config(), MemoryBackend::new()).unwrap();
        assert_eq!(root.pickable_objects().len(), 1);
        let ribosome = root.get_object("ribosome").unwrap();
        assert_eq!(ribosome.label().map(|l| l.get()), Some(1));
        assert!(root.get_object("proteasome").is_none());
    }
}
