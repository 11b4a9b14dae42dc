//! Annotation records.
//!
//! An annotation record is the ordered history of [`Annotation`]s one user
//! made on one image. The UI saves an in-progress annotation as an empty
//! placeholder, so appending new work first drops a single trailing
//! placeholder (see [`merge_annotations`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool used to draw an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Toolbox {
    Paintbrush,
    Spline,
    BoundingBox,
}

/// Slice (`z`) and time point (`t`) an annotation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpaceTimeInfo {
    pub z: i64,
    pub t: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

impl XyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A corner that may not have been placed yet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionalPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl From<XyPoint> for OptionalPoint {
    fn from(p: XyPoint) -> Self {
        Self {
            x: Some(p.x),
            y: Some(p.y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spline {
    #[serde(default)]
    pub coordinates: Vec<XyPoint>,
    #[serde(default)]
    pub space_time_info: SpaceTimeInfo,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Spline {
    pub fn new(coordinates: Vec<XyPoint>) -> Self {
        Self {
            coordinates,
            ..Self::default()
        }
    }

    pub fn closed(mut self) -> Self {
        self.is_closed = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxCorners {
    #[serde(default)]
    pub top_left: OptionalPoint,
    #[serde(default)]
    pub bottom_right: OptionalPoint,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    #[serde(default)]
    pub coordinates: BoxCorners,
    #[serde(default)]
    pub space_time_info: SpaceTimeInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BoundingBox {
    pub fn new(top_left: XyPoint, bottom_right: XyPoint) -> Self {
        Self {
            coordinates: BoxCorners {
                top_left: top_left.into(),
                bottom_right: bottom_right.into(),
            },
            space_time_info: SpaceTimeInfo::default(),
            extra: Map::new(),
        }
    }

    /// A box whose top-left corner has been placed.
    pub fn is_set(&self) -> bool {
        self.coordinates.top_left.x.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brush {
    pub radius: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    #[serde(rename = "is3D")]
    pub is_3d: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            radius: 0.5,
            kind: "paint".to_string(),
            color: "rgba(170, 0, 0, 0.5)".to_string(),
            is_3d: false,
            extra: Map::new(),
        }
    }
}

/// A connected run of brush points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushStroke {
    #[serde(default)]
    pub coordinates: Vec<XyPoint>,
    #[serde(default)]
    pub space_time_info: SpaceTimeInfo,
    #[serde(default)]
    pub brush: Brush,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BrushStroke {
    pub fn new(coordinates: Vec<XyPoint>) -> Self {
        Self {
            coordinates,
            ..Self::default()
        }
    }

    pub fn with_brush(mut self, brush: Brush) -> Self {
        self.brush = brush;
        self
    }
}

/// One annotation. Depending on `toolbox`, a non-empty annotation carries a
/// spline, a bounding box or brush strokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub toolbox: Toolbox,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub spline: Spline,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    /// Erased strokes are kept as `null` entries.
    #[serde(default)]
    pub brush_strokes: Vec<Option<BrushStroke>>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Fields written by other clients, carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    /// An empty annotation for the given tool.
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox,
            labels: Vec::new(),
            spline: Spline::default(),
            bounding_box: BoundingBox::default(),
            brush_strokes: Vec::new(),
            parameters: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_spline(mut self, spline: Spline) -> Self {
        self.spline = spline;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    pub fn with_brush_strokes(mut self, strokes: Vec<Option<BrushStroke>>) -> Self {
        self.brush_strokes = strokes;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// A placeholder: no spline points, no brush strokes and no box corner.
    pub fn is_empty(&self) -> bool {
        self.spline.coordinates.is_empty()
            && self.brush_strokes.is_empty()
            && !self.bounding_box.is_set()
    }
}

/// Append `new` to `prior`, first dropping one trailing empty annotation.
///
/// Only the last element is inspected; earlier empty entries stay in the
/// history.
pub fn merge_annotations(mut prior: Vec<Annotation>, new: Vec<Annotation>) -> Vec<Annotation> {
    if prior.last().is_some_and(Annotation::is_empty) {
        prior.pop();
    }
    prior.extend(new);
    prior
}
