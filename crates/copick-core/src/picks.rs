//! Picks: a user- or tool-attributed point set for one object class.
//!
//! The record (and with it the points) is loaded from the backend on first
//! access to [`Picks::points`]. Assigning points only changes the in-memory
//! record; [`Picks::store`] persists it.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use copick_types::{is_tool_session, AnnotationKey, Color, PicksRecord, Point};

use crate::error::{CopickError, CopickResult};
use crate::run::Run;
use crate::traits::{Backend, PicksMetaOf};

/// A point set for one object class, keyed by object, user and session.
pub struct Picks<B: Backend> {
    run: Weak<Run<B>>,
    backend: Arc<B>,
    key: AnnotationKey,
    record: RwLock<PicksMetaOf<B>>,
}

impl<B: Backend> Picks<B> {
    pub(crate) fn attach(run: Weak<Run<B>>, backend: Arc<B>, record: PicksMetaOf<B>) -> Arc<Self> {
        Arc::new(Self {
            run,
            backend,
            key: record.key(),
            record: RwLock::new(record),
        })
    }

    pub fn key(&self) -> &AnnotationKey {
        &self.key
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
        self.run.upgrade().ok_or(CopickError::Detached { entity: "picks" })
    }

    /// Snapshot of the current in-memory record.
    pub fn record(&self) -> CopickResult<PicksMetaOf<B>> {
        let record = self.record.read().map_err(CopickError::poisoned)?;
        Ok(record.clone())
    }

    pub fn trust_orientation(&self) -> CopickResult<bool> {
        let record = self.record.read().map_err(CopickError::poisoned)?;
        Ok(record.trust_orientation())
    }

    /// The points, loading the record first if they are not in memory.
    pub fn points(&self) -> CopickResult<Vec<Point>> {
        {
            let record = self.record.read().map_err(CopickError::poisoned)?;
            if let Some(points) = record.points() {
                return Ok(points.to_vec());
            }
        }
        self.load()?;
        let record = self.record.read().map_err(CopickError::poisoned)?;
        Ok(record.points().map(<[Point]>::to_vec).unwrap_or_default())
    }

    /// Replace the in-memory points. Call [`Picks::store`] to persist them.
    pub fn set_points(&self, points: Vec<Point>) -> CopickResult<()> {
        let mut record = self.record.write().map_err(CopickError::poisoned)?;
        record.set_points(points);
        Ok(())
    }

    /// Replace the in-memory record with the persisted one.
    pub fn load(&self) -> CopickResult<()> {
        debug!(picks = %self.key, "loading picks");
        let loaded = self.backend.load_picks(self)?;
        let mut record = self.record.write().map_err(CopickError::poisoned)?;
        *record = loaded;
        Ok(())
    }

    pub fn store(&self) -> CopickResult<()> {
        let record = self.record()?;
        debug!(
            picks = %self.key,
            points = record.points().map_or(0, <[Point]>::len),
            "storing picks"
        );
        self.backend.store_picks(self, &record)
    }

    /// Discard in-memory changes and reload from the backend.
    pub fn refresh(&self) -> CopickResult<()> {
        self.load()
    }

    /// Color of the picked object class.
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

impl<B: Backend> fmt::Debug for Picks<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Picks").field(&self.key).finish()
    }
}
