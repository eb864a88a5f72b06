//! Meshes: a user- or tool-attributed surface for one object class.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use copick_types::{is_tool_session, AnnotationKey, Color, MeshRecord};

use crate::error::{CopickError, CopickResult};
use crate::run::Run;
use crate::traits::{Backend, MeshMetaOf};

/// A surface for one object class, keyed by object, user and session.
pub struct Mesh<B: Backend> {
    run: Weak<Run<B>>,
    backend: Arc<B>,
    key: AnnotationKey,
    meta: MeshMetaOf<B>,
    geometry: RwLock<Option<B::Mesh>>,
}

impl<B: Backend> Mesh<B> {
    pub(crate) fn attach(
        run: Weak<Run<B>>,
        backend: Arc<B>,
        meta: MeshMetaOf<B>,
        geometry: Option<B::Mesh>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run,
            backend,
            key: meta.key(),
            meta,
            geometry: RwLock::new(geometry),
        })
    }

    pub fn key(&self) -> &AnnotationKey {
        &self.key
    }

    pub fn meta(&self) -> &MeshMetaOf<B> {
        &self.meta
    }

    pub fn pickable_object_name(&self) -> &str {
        &self.key.object_name
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.key.session_id
    }

    pub fn from_tool(&self) -> bool {
        is_tool_session(self.session_id())
    }

    pub fn from_user(&self) -> bool {
        !self.from_tool()
    }

    pub fn run(&self) -> CopickResult<Arc<Run<B>>> {
        self.run.upgrade().ok_or(CopickError::Detached { entity: "mesh" })
    }

    /// The geometry, loaded from the backend on first access.
    pub fn mesh(&self) -> CopickResult<B::Mesh> {
        {
            let geometry = self.geometry.read().map_err(CopickError::poisoned)?;
            if let Some(mesh) = geometry.as_ref() {
                return Ok(mesh.clone());
            }
        }
        self.load()?;
        let geometry = self.geometry.read().map_err(CopickError::poisoned)?;
        Ok(geometry.clone().unwrap_or_default())
    }

    /// Replace the in-memory geometry. Call [`Mesh::store`] to persist it.
    pub fn set_mesh(&self, mesh: B::Mesh) -> CopickResult<()> {
        let mut geometry = self.geometry.write().map_err(CopickError::poisoned)?;
        *geometry = Some(mesh);
        Ok(())
    }

    pub fn load(&self) -> CopickResult<()> {
        debug!(mesh = %self.key, "loading mesh");
        let loaded = self.backend.load_mesh(self)?;
        let mut geometry = self.geometry.write().map_err(CopickError::poisoned)?;
        *geometry = Some(loaded);
        Ok(())
    }

    /// Persist the in-memory geometry. Does nothing if the geometry was
    /// never loaded or assigned.
    pub fn store(&self) -> CopickResult<()> {
        let geometry = self.geometry.read().map_err(CopickError::poisoned)?.clone();
        match geometry {
            Some(mesh) => {
                debug!(mesh = %self.key, "storing mesh");
                self.backend.store_mesh(self, &mesh)
            }
            None => Ok(()),
        }
    }

    pub fn refresh(&self) -> CopickResult<()> {
        self.load()
    }

    pub fn color(&self) -> CopickResult<Option<Color>> {
        let root = self.run()?.root()?;
        let object = root
            .get_object(self.pickable_object_name())
            .ok_or_else(|| CopickError::UnknownObject {
                name: self.pickable_object_name().to_string(),
            })?;
        Ok(object.color())
    }
}

impl<B: Backend> fmt::Debug for Mesh<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mesh").field(&self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, TriangleMesh};
    use crate::root::Root;
    use copick_types::{Config, PickableObject};

    fn open_root(backend: Arc<MemoryBackend>) -> Arc<Root<MemoryBackend>> {
        let config = Config::new(vec![PickableObject::new("membrane", false)
            .with_color(&[0, 255, 0, 128])
            .unwrap()]);
        Root::with_shared_backend(config, backend).unwrap()
    }

    fn triangle() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn geometry_is_stored_and_loaded_lazily() {
        let backend = Arc::new(MemoryBackend::new());
        let root = open_root(Arc::clone(&backend));
        let run = root.new_run("TS_001").unwrap();
        let mesh = run.new_mesh("membrane", "1", Some("alice")).unwrap();
        assert!(mesh.mesh().unwrap().is_empty());
        assert_eq!(mesh.color().unwrap(), Some(Color::rgba(0, 255, 0, 128)));

        mesh.set_mesh(triangle()).unwrap();
        mesh.store().unwrap();

        let other = open_root(Arc::clone(&backend));
        let seen = other.get_run("TS_001").unwrap().unwrap().meshes().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].from_user());
        assert_eq!(backend.calls("load_mesh"), 0);
        assert_eq!(seen[0].mesh().unwrap(), triangle());
        seen[0].mesh().unwrap();
        assert_eq!(backend.calls("load_mesh"), 1);
    }

    #[test]
    fn refresh_discards_unstored_geometry() {
        let root = open_root(Arc::new(MemoryBackend::new()));
        let run = root.new_run("TS_001").unwrap();
        let mesh = run.new_mesh("membrane", "0", Some("mc")).unwrap();
        assert!(mesh.from_tool());

        mesh.set_mesh(triangle()).unwrap();
        mesh.refresh().unwrap();
        assert!(mesh.mesh().unwrap().is_empty());
    }

    #[test]
    fn store_without_geometry_is_a_no_op() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .seed_mesh("TS_001", AnnotationKey::new("membrane", "mc", "0"), triangle())
            .unwrap();
        let root = open_root(Arc::clone(&backend));
        let meshes = root.get_run("TS_001").unwrap().unwrap().meshes().unwrap();

        meshes[0].store().unwrap();
        assert_eq!(backend.calls("store_mesh"), 0);
        assert_eq!(meshes[0].mesh().unwrap(), triangle());
    }
}
