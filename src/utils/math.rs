use glam::{DVec3, Vec3};

/// Width of a region in meters
pub const REGION_WIDTH: u32 = 256;

/// Region handle for Second Life grid coordinates
///
/// The handle packs the global X origin (meters) in the upper 32 bits and
/// the global Y origin in the lower 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize, Default)]
pub struct RegionHandle {
    pub x: u32,
    pub y: u32,
}

impl RegionHandle {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Build a handle from grid cell indices (e.g. 1000, 1000)
    pub fn from_grid(grid_x: u32, grid_y: u32) -> Self {
        Self::new(grid_x * REGION_WIDTH, grid_y * REGION_WIDTH)
    }

    pub fn from_u64(handle: u64) -> Self {
        Self {
            x: (handle >> 32) as u32,
            y: (handle & 0xFFFF_FFFF) as u32,
        }
    }

    pub fn to_u64(&self) -> u64 {
        ((self.x as u64) << 32) | self.y as u64
    }

    /// Convert a region-local position into a global position
    pub fn to_global(&self, local: Vec3) -> DVec3 {
        DVec3::new(
            self.x as f64 + local.x as f64,
            self.y as f64 + local.y as f64,
            local.z as f64,
        )
    }

    /// Parse region handle from Second Life format: "[r123456, r789012]"
    pub fn parse_sl_format(value: &str) -> Result<Self, String> {
        let cleaned = value
            .trim_start_matches('[')
            .trim_end_matches(']')
            .replace('r', "");

        let coords: Result<Vec<u32>, _> = cleaned
            .split(',')
            .map(|s| s.trim().parse())
            .collect();

        match coords {
            Ok(coords) if coords.len() >= 2 => Ok(Self::new(coords[0], coords[1])),
            _ => Err(format!("Invalid region handle format: {}", value)),
        }
    }
}

impl std::fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[r{}, r{}]", self.x, self.y)
    }
}

/// Parse a global vector from Second Life format: "[r1.0, r0.0, r0.0]" or "r1,0,0"
pub fn parse_sl_vector(value: &str) -> Result<DVec3, String> {
    let cleaned = value
        .trim_start_matches(['r', '['])
        .trim_end_matches(']')
        .replace('r', "");

    let coords: Result<Vec<f64>, _> = cleaned
        .split(',')
        .map(|s| s.trim().parse())
        .collect();

    match coords {
        Ok(coords) if coords.len() >= 3 => Ok(DVec3::new(coords[0], coords[1], coords[2])),
        _ => Err(format!("Invalid vector format: {}", value)),
    }
}

/// Distance truncated toward zero, as used by the stuck and stall detectors
pub fn truncated_distance(a: DVec3, b: DVec3) -> i64 {
    a.distance(b) as i64
}
