use serde::{Deserialize, Serialize};

/// Axis-aligned bounding rectangle in the coordinates of some CRS.
///
/// Envelopes are carried on tree nodes and buckets so spatial queries can
/// prune whole subtrees without reading them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Create an envelope from its corners.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate envelope covering a single point.
    pub const fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Whole-world bounds in EPSG:4326 longitude/latitude order.
    pub const WORLD: Self = Self::new(-180.0, -90.0, 180.0, 90.0);

    /// `true` if all ordinates are finite and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            self.min_x + self.width() / 2.0,
            self.min_y + self.height() / 2.0,
        )
    }

    /// Check if this envelope intersects another (touching counts).
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if this envelope fully contains another.
    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Smallest envelope covering both.
    pub fn union(&self, other: &Envelope) -> Envelope {
        Envelope::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Union over an iterator of optional envelopes. `None` if all are absent.
    pub fn union_all<'a>(envelopes: impl IntoIterator<Item = Option<&'a Envelope>>) -> Option<Envelope> {
        envelopes
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<Envelope>, env| match acc {
                Some(a) => Some(a.union(env)),
                None => Some(*env),
            })
    }

    /// One of the four quadrants of this envelope.
    ///
    /// Quadrants are numbered `0` = south-west, `1` = north-west,
    /// `2` = north-east, `3` = south-east. Returns `None` for other values.
    pub fn quadrant(&self, quadrant: u32) -> Option<Envelope> {
        let (cx, cy) = self.center();
        match quadrant {
            0 => Some(Envelope::new(self.min_x, self.min_y, cx, cy)),
            1 => Some(Envelope::new(self.min_x, cy, cx, self.max_y)),
            2 => Some(Envelope::new(cx, cy, self.max_x, self.max_y)),
            3 => Some(Envelope::new(cx, self.min_y, self.max_x, cy)),
            _ => None,
        }
    }
}

impl From<geo_types::Rect<f64>> for Envelope {
    fn from(rect: geo_types::Rect<f64>) -> Self {
        Envelope::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}
