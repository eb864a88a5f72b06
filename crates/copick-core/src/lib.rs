//! Lazily loaded entity tree over a pluggable storage backend.
//!
//! A copick dataset is a fixed hierarchy:
//!
//! ```text
//! Root ─┬─ CopickObject (from the config)
//!       └─ Run ─┬─ VoxelSpacing ── Tomogram ── Features
//!               ├─ Picks
//!               ├─ Mesh
//!               └─ Segmentation
//! ```
//!
//! Every parent-to-children link is a [`LazyCollection`]: populated from the
//! project [`Config`](copick_types::Config)'s static index when it has one,
//! otherwise queried from the [`Backend`] on first access and cached until
//! refreshed. Creation operations check referential integrity and key
//! uniqueness, ask the backend to persist, then append to the cache.
//!
//! # Key Types
//!
//! - [`Root`]: entry point, owns the objects and runs
//! - [`Backend`]: storage contract; unimplemented operations fail with
//!   [`CopickError::NotImplemented`]
//! - [`Schema`]: the record type used at each level, chosen per backend
//! - [`MemoryBackend`]: complete in-memory backend
//!
//! # Example
//!
//! ```
//! use copick_core::{MemoryBackend, PicksFilter, Root};
//! use copick_types::{Config, PickableObject, VoxelSize};
//!
//! let config = Config::new(vec![PickableObject::new("ribosome", true)]).with_user_id("alice");
//! let root = Root::new(config, MemoryBackend::new())?;
//! let run = root.new_run("TS_001")?;
//! run.new_voxel_spacing(VoxelSize::new(10.0)?)?;
//! run.new_picks("ribosome", "1", None)?;
//!
//! let picks = run.get_picks(&PicksFilter::new().object_name("ribosome"))?;
//! assert_eq!(picks[0].user_id(), "alice");
//! # Ok::<(), copick_core::CopickError>(())
//! ```

pub mod error;
pub mod features;
pub mod filter;
pub mod lazy;
pub mod memory;
pub mod mesh;
pub mod object;
pub mod picks;
pub mod root;
pub mod run;
pub mod segmentation;
pub mod tomogram;
pub mod traits;
pub mod voxel_spacing;

pub use error::{CopickError, CopickResult};
pub use features::Features;
pub use filter::{AnnotationFilter, MeshFilter, PicksFilter, SegmentationFilter};
pub use lazy::LazyCollection;
pub use memory::{MemoryArrayStore, MemoryBackend, TriangleMesh};
pub use mesh::Mesh;
pub use object::CopickObject;
pub use picks::Picks;
pub use root::Root;
pub use run::Run;
pub use segmentation::Segmentation;
pub use tomogram::Tomogram;
pub use traits::{
    Backend, DefaultSchema, FeaturesMetaOf, MeshMetaOf, PicksMetaOf, RunMetaOf, Schema,
    SegmentationMetaOf, TomogramMetaOf, VoxelSpacingMetaOf,
};
pub use voxel_spacing::VoxelSpacing;
