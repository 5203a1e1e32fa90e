//! Coordinate reference system bounds.
//!
//! Projection math lives outside this crate. Index creation only needs the
//! valid domain of a CRS, obtained through [`CrsBoundsProvider`].

use std::collections::HashMap;

use geovc_types::Envelope;

use crate::error::{IndexError, IndexResult};

/// Identifier of the WGS 84 geographic CRS.
pub const EPSG_4326: &str = "EPSG:4326";
/// Identifier of the WGS 84 / Pseudo-Mercator CRS.
pub const EPSG_3857: &str = "EPSG:3857";

const WEB_MERCATOR: Envelope = Envelope::new(
    -20037508.342789244,
    -20048966.1040146,
    20037508.342789244,
    20048966.1040146,
);

/// Resolves the valid domain of a coordinate reference system.
pub trait CrsBoundsProvider: Send + Sync {
    /// Bounds of `crs` in its own units, or a reason they are unknown.
    fn bounds_of(&self, crs: &str) -> Result<Envelope, String>;
}

/// Lookup-table bounds provider. Identifiers are matched case-insensitively.
#[derive(Clone, Debug)]
pub struct StaticBoundsProvider {
    table: HashMap<String, Envelope>,
}

impl StaticBoundsProvider {
    /// A provider with no entries.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register or replace the bounds of `crs`.
    pub fn insert(&mut self, crs: &str, bounds: Envelope) {
        self.table.insert(crs.to_ascii_uppercase(), bounds);
    }

    pub fn with(mut self, crs: &str, bounds: Envelope) -> Self {
        self.insert(crs, bounds);
        self
    }
}

impl Default for StaticBoundsProvider {
    fn default() -> Self {
        Self::empty()
            .with(EPSG_4326, Envelope::WORLD)
            .with(EPSG_3857, WEB_MERCATOR)
    }
}

impl CrsBoundsProvider for StaticBoundsProvider {
    fn bounds_of(&self, crs: &str) -> Result<Envelope, String> {
        self.table
            .get(&crs.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| format!("no bounds registered for {crs}"))
    }
}

/// Resolve the quadtree bounds of `tree.attribute` in `crs`.
///
/// Domains that wrap the anti-meridian or a pole (`min > max` on either
/// axis) are rejected rather than split.
pub fn resolve_bounds(
    provider: &dyn CrsBoundsProvider,
    tree: &str,
    attribute: &str,
    crs: &str,
) -> IndexResult<Envelope> {
    let failure = |reason: String| IndexError::ReferenceResolution {
        tree: tree.to_string(),
        attribute: attribute.to_string(),
        crs: crs.to_string(),
        reason,
    };
    let bounds = provider.bounds_of(crs).map_err(failure)?;
    let finite = [bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(failure(format!("non-finite bounds {bounds:?}")));
    }
    if bounds.min_x > bounds.max_x || bounds.min_y > bounds.max_y {
        return Err(failure(format!("inverted bounds {bounds:?}")));
    }
    Ok(bounds)
}
