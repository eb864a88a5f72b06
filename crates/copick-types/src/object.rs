//! Pickable object metadata and the validated label/color values it carries.
//!
//! A pickable object is one class of thing that can be annotated in a
//! tomogram (a protein complex, a membrane, a fiducial bead). Its name is the
//! join key used by picks, meshes and single-label segmentations.

use std::fmt;
use std::num::NonZeroI64;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Numeric id of an object class inside a multilabel segmentation mask.
///
/// Never zero: 0 is the background value of every mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Label(NonZeroI64);

impl Label {
    /// Create a label, rejecting the reserved background value.
    pub fn new(value: i64) -> TypeResult<Self> {
        NonZeroI64::new(value)
            .map(Self)
            .ok_or(TypeError::ReservedLabel)
    }

    /// The raw label value.
    pub fn get(self) -> i64 {
        self.0.get()
    }
}

impl TryFrom<i64> for Label {
    type Error = TypeError;

    fn try_from(value: i64) -> TypeResult<Self> {
        Self::new(value)
    }
}

impl From<Label> for i64 {
    fn from(label: Label) -> Self {
        label.get()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RGBA display color, one byte per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "[u8; 4]")]
pub struct Color([u8; 4]);

impl Color {
    /// Neutral color used for every multilabel segmentation.
    pub const MULTILABEL: Color = Color([128, 128, 128, 0]);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Build a color from untyped integer components.
    ///
    /// Fails unless there are exactly four components, each in `[0, 255]`.
    pub fn from_components(components: &[i64]) -> TypeResult<Self> {
        if components.len() != 4 {
            return Err(TypeError::InvalidColorArity {
                actual: components.len(),
            });
        }

        let mut rgba = [0u8; 4];
        for (index, (&value, slot)) in components.iter().zip(rgba.iter_mut()).enumerate() {
            *slot = u8::try_from(value).map_err(|_| TypeError::ColorOutOfRange { index, value })?;
        }
        Ok(Self(rgba))
    }

    pub fn components(&self) -> [u8; 4] {
        self.0
    }

    pub fn r(&self) -> u8 {
        self.0[0]
    }

    pub fn g(&self) -> u8 {
        self.0[1]
    }

    pub fn b(&self) -> u8 {
        self.0[2]
    }

    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl TryFrom<Vec<i64>> for Color {
    type Error = TypeError;

    fn try_from(components: Vec<i64>) -> TypeResult<Self> {
        Self::from_components(&components)
    }
}

impl From<Color> for [u8; 4] {
    fn from(color: Color) -> Self {
        color.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "({r}, {g}, {b}, {a})")
    }
}

/// Metadata for one pickable object class.
///
/// Immutable once loaded from the project config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PickableObject {
    /// Unique name within the project.
    pub name: String,
    /// Whether the object is annotated with points (`true`) or masks (`false`).
    pub is_particle: bool,
    /// Value used for this object in multilabel masks. Project-wide
    /// uniqueness is expected but not enforced here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// EMDB accession of a reference density.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emdb_id: Option<String>,
    /// PDB accession of a reference model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdb_id: Option<String>,
    /// Isosurface threshold used when rendering the reference density.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_threshold: Option<f64>,
    /// Display radius when rendered as a sphere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl PickableObject {
    pub fn new(name: impl Into<String>, is_particle: bool) -> Self {
        Self {
            name: name.into(),
            is_particle,
            label: None,
            color: None,
            emdb_id: None,
            pdb_id: None,
            map_threshold: None,
            radius: None,
        }
    }

    pub fn with_label(mut self, label: i64) -> TypeResult<Self> {
        self.label = Some(Label::new(label)?);
        Ok(self)
    }

    pub fn with_color(mut self, components: &[i64]) -> TypeResult<Self> {
        self.color = Some(Color::from_components(components)?);
        Ok(self)
    }

    pub fn with_emdb_id(mut self, emdb_id: impl Into<String>) -> Self {
        self.emdb_id = Some(emdb_id.into());
        self
    }

    pub fn with_pdb_id(mut self, pdb_id: impl Into<String>) -> Self {
        self.pdb_id = Some(pdb_id.into());
        self
    }

    pub fn with_map_threshold(mut self, threshold: f64) -> Self {
        self.map_threshold = Some(threshold);
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }
}
