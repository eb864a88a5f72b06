//! Foundation types for copick datasets.
//!
//! A copick project describes annotated cryo-electron tomograms: runs
//! (physical acquisitions) holding reconstructions at several voxel spacings,
//! plus user- or tool-attributed picks, meshes and segmentations of named
//! object classes. This crate holds the plain, backend-agnostic values that
//! flow through the entity tree of `copick-core`.
//!
//! # Key Types
//!
//! - [`PickableObject`]: object class metadata with validated [`Label`] and [`Color`]
//! - [`Point`]: picked location with a validated homogeneous [`Transform`]
//! - [`VoxelSize`]: positive voxel spacing rounded to three decimals
//! - [`Config`]: project configuration and optional static dataset index
//! - Records ([`RunMeta`], [`PicksFile`], ...) and the record traits a
//!   storage backend implements to attach its own metadata

pub mod config;
pub mod error;
pub mod object;
pub mod point;
pub mod records;
pub mod voxel;

pub use config::{Config, PreDeclaredPicks, PreDeclaredSegmentation};
pub use error::{TypeError, TypeResult};
pub use object::{Color, Label, PickableObject};
pub use point::{Location, Point, Transform};
pub use records::{
    is_tool_session, AnnotationKey, FeaturesMeta, FeaturesRecord, MeshMeta, MeshRecord,
    PicksFile, PicksOptions, PicksRecord, RunMeta, RunRecord, SegmentationKey, SegmentationMeta,
    SegmentationRecord, TomogramMeta, TomogramRecord, VoxelSpacingMeta, VoxelSpacingRecord,
    DEFAULT_UNIT, TOOL_SESSION_ID,
};
pub use voxel::VoxelSize;
