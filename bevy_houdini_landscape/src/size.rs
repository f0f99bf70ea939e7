//! Landscape size solving
//!
//! Maps an arbitrary heightfield grid onto the closest landscape grid made of whole
//! components. Solving never fails for valid input: it degrades from an exact match,
//! to a padded fit, to the largest supported layout, to a fixed default.

use crate::error::{LandscapeError, Result};
use bevy::log::warn;

/// Quads per section supported by landscapes, ascending
pub const SECTION_SIZES: [u32; 6] = [7, 15, 31, 63, 127, 255];

/// Sections per component axis, ascending
pub const SECTIONS_PER_COMPONENT: [u32; 2] = [1, 2];

/// Components allowed per axis
pub const MAX_COMPONENTS: u32 = 32;

/// Vertices allowed per axis
pub const MAX_VERTICES: u32 = 8191;

/// Landscape grid layout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LandscapeSize {
    /// Vertices along X
    pub size_x: u32,
    /// Vertices along Y
    pub size_y: u32,
    pub sections_per_component: u32,
    pub quads_per_section: u32,
    pub components_x: u32,
    pub components_y: u32,
    /// True when neither an exact nor a padded fit was possible
    pub degraded: bool,
}

impl LandscapeSize {
    /// Fallback used when nothing else applies: one 512x512 component.
    pub const DEFAULT: LandscapeSize = LandscapeSize {
        size_x: 512,
        size_y: 512,
        sections_per_component: 1,
        quads_per_section: 511,
        components_x: 1,
        components_y: 1,
        degraded: true,
    };

    pub fn quads_per_component(&self) -> u32 {
        self.sections_per_component * self.quads_per_section
    }

    pub fn vertex_count(&self) -> usize {
        self.size_x as usize * self.size_y as usize
    }

    /// Inclusive quad extent `(0, 0, size_x - 1, size_y - 1)` of the landscape.
    pub fn extent(&self) -> LandscapeExtent {
        LandscapeExtent {
            min_x: 0,
            min_y: 0,
            max_x: self.size_x as i32 - 1,
            max_y: self.size_y as i32 - 1,
        }
    }
}

/// Inclusive vertex-space rectangle of a landscape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LandscapeExtent {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl LandscapeExtent {
    pub fn size_x(&self) -> u32 {
        (self.max_x - self.min_x + 1).max(0) as u32
    }

    pub fn size_y(&self) -> u32 {
        (self.max_y - self.min_y + 1).max(0) as u32
    }

    /// Whether a landscape of this extent can hold data of the given size unchanged.
    pub fn matches(&self, size: &LandscapeSize) -> bool {
        self.size_x() == size.size_x && self.size_y() == size.size_y
    }
}

fn clamp_components(count: u32, quads_per_component: u32) -> u32 {
    let max = MAX_COMPONENTS.min(MAX_VERTICES / quads_per_component.max(1));
    count.clamp(1, max.max(1))
}

fn layout(
    raw_x: u32,
    raw_y: u32,
    quads_per_section: u32,
    sections_per_component: u32,
    round_up: bool,
    degraded: bool,
) -> LandscapeSize {
    let quads = quads_per_section * sections_per_component;
    let count = |raw: u32| {
        if round_up {
            (raw - 1).div_ceil(quads)
        } else {
            (raw - 1) / quads
        }
    };
    let components_x = clamp_components(count(raw_x), quads);
    let components_y = clamp_components(count(raw_y), quads);
    LandscapeSize {
        size_x: components_x * quads + 1,
        size_y: components_y * quads + 1,
        sections_per_component,
        quads_per_section,
        components_x,
        components_y,
        degraded,
    }
}

/// Find a section layout dividing both axes exactly, largest layout first.
fn exact_match(raw_x: u32, raw_y: u32) -> Option<LandscapeSize> {
    SECTION_SIZES.iter().rev().find_map(|&ss| {
        SECTIONS_PER_COMPONENT.iter().rev().find_map(|&ns| {
            let quads = ss * ns;
            let fits = |raw: u32| (raw - 1) % quads == 0 && (raw - 1) / quads <= MAX_COMPONENTS;
            (fits(raw_x) && fits(raw_y)).then(|| layout(raw_x, raw_y, ss, ns, false, false))
        })
    })
}

/// Smallest single-section layout whose component grid covers both axes.
fn grow_match(raw_x: u32, raw_y: u32) -> Option<LandscapeSize> {
    const SECTIONS: u32 = 1;
    SECTION_SIZES.iter().find_map(|&ss| {
        let quads = ss * SECTIONS;
        let covers = |raw: u32| (raw - 1).div_ceil(quads) <= MAX_COMPONENTS;
        (covers(raw_x) && covers(raw_y)).then(|| layout(raw_x, raw_y, ss, SECTIONS, true, false))
    })
}

/// Compute the landscape layout for a heightfield of `raw_x * raw_y` samples.
///
/// Both dimensions must be at least 2. The returned size satisfies
/// `(size - 1) % quads_per_component == 0` with at most [`MAX_COMPONENTS`] components
/// per axis.
pub fn solve_landscape_size(raw_x: i32, raw_y: i32) -> Result<LandscapeSize> {
    if raw_x < 2 || raw_y < 2 {
        return Err(LandscapeError::InvalidInput(format!(
            "heightfield of {raw_x}x{raw_y} samples is below 2x2"
        )));
    }
    let (raw_x, raw_y) = (raw_x as u32, raw_y as u32);

    if let Some(size) = exact_match(raw_x, raw_y).or_else(|| grow_match(raw_x, raw_y)) {
        return Ok(size);
    }

    let max_ss = SECTION_SIZES[SECTION_SIZES.len() - 1];
    let max_ns = SECTIONS_PER_COMPONENT[SECTIONS_PER_COMPONENT.len() - 1];
    let size = layout(raw_x, raw_y, max_ss, max_ns, true, true);
    if size.size_x < 2 || size.size_y < 2 {
        warn!("Could not size a landscape for {raw_x}x{raw_y} samples, using the default");
        return Ok(LandscapeSize::DEFAULT);
    }
    warn!(
        "Heightfield of {raw_x}x{raw_y} samples exceeds the landscape limits, fitting it into {}x{}",
        size.size_x, size.size_y
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_legal(size: &LandscapeSize) {
        let quads = size.quads_per_component();
        assert_eq!((size.size_x - 1) % quads, 0);
        assert_eq!((size.size_y - 1) % quads, 0);
        assert!((size.size_x - 1) / quads <= MAX_COMPONENTS);
        assert!((size.size_y - 1) / quads <= MAX_COMPONENTS);
        assert!(size.size_x <= MAX_VERTICES + 1);
    }

    #[test]
    fn test_exact_match_prefers_largest_layout() {
        // 509 = 2 * 254 = 4 * 127
        let size = solve_landscape_size(509, 509).unwrap();
        assert_eq!(size.quads_per_section, 127);
        assert_eq!(size.sections_per_component, 2);
        assert_eq!(size.components_x, 2);
        assert_eq!((size.size_x, size.size_y), (509, 509));
        assert!(!size.degraded);
    }

    #[test]
    fn test_exact_match_size_is_unchanged() {
        for raw in [8, 64, 127 * 2 + 1, 63 * 10 + 1, 255 * 2 * 4 + 1] {
            let size = solve_landscape_size(raw, raw).unwrap();
            assert_eq!(size.size_x, raw as u32);
            assert_legal(&size);
        }
    }

    #[test]
    fn test_grow_pads_to_smallest_section() {
        // 511 = 7 * 73 needs too many 7-quad components, so it grows
        let size = solve_landscape_size(512, 512).unwrap();
        assert_eq!(size.quads_per_section, 31);
        assert_eq!(size.sections_per_component, 1);
        assert_eq!(size.components_x, 17);
        assert_eq!(size.size_x, 528);
        assert_legal(&size);
    }

    #[test]
    fn test_odd_size_solves() {
        // 299 = 13 * 23 has no divisor in the table either
        let size = solve_landscape_size(300, 300).unwrap();
        assert_eq!(size.quads_per_section, 15);
        assert_eq!(size.components_x, 20);
        assert_eq!(size.size_x, 301);
        assert!(size.size_x >= 300);
        assert_legal(&size);
    }

    #[test]
    fn test_non_square_solves_per_axis() {
        // 63 and 127 share no table divisor, the smallest covering section wins
        let size = solve_landscape_size(64, 128).unwrap();
        assert_eq!(size.quads_per_component(), 7);
        assert_eq!(size.components_x, 9);
        assert_eq!(size.components_y, 19);
        assert_eq!((size.size_x, size.size_y), (64, 134));
        assert_legal(&size);
    }

    #[test]
    fn test_huge_heightfield_falls_back_to_max_layout() {
        let size = solve_landscape_size(20000, 20000).unwrap();
        assert!(size.degraded);
        assert_eq!(size.quads_per_section, 255);
        assert_eq!(size.sections_per_component, 2);
        assert_eq!(size.components_x, 16);
        assert_eq!(size.size_x, 16 * 510 + 1);
        assert_legal(&size);
    }

    #[test]
    fn test_every_small_size_is_legal() {
        for x in 2..300 {
            for y in [2, 3, 17, 64, 129, 300] {
                let size = solve_landscape_size(x, y).unwrap();
                assert_legal(&size);
            }
        }
    }

    #[test]
    fn test_rejects_tiny_input() {
        let err = solve_landscape_size(1, 10).unwrap_err();
        assert_eq!(err.reason(), "invalid_input");
        assert!(solve_landscape_size(0, -3).is_err());
    }

    #[test]
    fn test_extent_matches_size() {
        let size = solve_landscape_size(64, 64).unwrap();
        let extent = size.extent();
        assert_eq!((extent.max_x, extent.max_y), (63, 63));
        assert!(extent.matches(&size));
    }
}
