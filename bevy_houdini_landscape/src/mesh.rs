//! Landscape mesh generation
//!
//! Builds a render mesh straight from the uint16 height digits of a landscape. The mesh
//! is laid out in landscape vertex space with Y up; [`display_transform`] maps the
//! landscape transform (Z up, centimeters) onto Bevy's frame.

use crate::convert::{LANDSCAPE_DIGITS_PER_UNIT, LANDSCAPE_ZERO_DIGIT, UNITS_PER_METER};
use crate::registry::LandscapeRecord;
use bevy::asset::RenderAssetUsages;
use bevy::mesh::Indices;
use bevy::prelude::*;
use bevy::render::render_resource::PrimitiveTopology;

/// Base vertex color of unpainted landscape
const BASE_COLOR: [f32; 4] = [0.45, 0.42, 0.36, 1.0];

/// Tint per paint layer, in layer order
const LAYER_PALETTE: [[f32; 4]; 6] = [
    [0.30, 0.55, 0.22, 1.0],
    [0.55, 0.52, 0.50, 1.0],
    [0.80, 0.72, 0.48, 1.0],
    [0.20, 0.40, 0.65, 1.0],
    [0.92, 0.92, 0.95, 1.0],
    [0.40, 0.28, 0.18, 1.0],
];

/// Weights at or above this punch a hole through the visibility layer
pub const HOLE_THRESHOLD: u8 = 128;

/// Local height of a digit, in landscape units before Z scale.
#[inline]
pub fn digit_to_local_height(digit: u16) -> f32 {
    ((digit as f64 - LANDSCAPE_ZERO_DIGIT) / LANDSCAPE_DIGITS_PER_UNIT) as f32
}

/// Bevy transform of a landscape transform: Z up becomes Y up, centimeters become meters.
///
/// Landscape transforms never carry a rotation, so only translation and scale are mapped.
pub fn display_transform(transform: &Transform) -> Transform {
    let to_meters = (1.0 / UNITS_PER_METER) as f32;
    let t = transform.translation;
    let s = transform.scale;
    Transform {
        translation: Vec3::new(t.x, t.z, t.y) * to_meters,
        rotation: Quat::IDENTITY,
        scale: Vec3::new(s.x, s.z, s.y) * to_meters,
    }
}

/// Triangle indices of a `size_x * size_y` grid, skipping quads touching a hole.
pub fn landscape_indices(size_x: u32, size_y: u32, holes: Option<&[u8]>) -> Vec<u32> {
    let is_hole = |i: u32| holes.is_some_and(|h| h.get(i as usize).is_some_and(|&w| w >= HOLE_THRESHOLD));

    let mut indices = Vec::with_capacity((size_x.saturating_sub(1) * size_y.saturating_sub(1) * 6) as usize);
    for y in 0..size_y.saturating_sub(1) {
        for x in 0..size_x.saturating_sub(1) {
            let top_left = y * size_x + x;
            let top_right = top_left + 1;
            let bottom_left = (y + 1) * size_x + x;
            let bottom_right = bottom_left + 1;

            if [top_left, top_right, bottom_left, bottom_right].into_iter().any(is_hole) {
                continue;
            }

            indices.extend_from_slice(&[top_left, bottom_left, top_right]);
            indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
        }
    }
    indices
}

fn smooth_normal(heights: &[u16], size_x: usize, size_y: usize, x: usize, y: usize) -> [f32; 3] {
    let h = |x: usize, y: usize| digit_to_local_height(heights[y * size_x + x]);
    let left = h(x.saturating_sub(1), y);
    let right = h((x + 1).min(size_x - 1), y);
    let down = h(x, y.saturating_sub(1));
    let up = h(x, (y + 1).min(size_y - 1));

    let dx = (right - left) / 2.0;
    let dz = (up - down) / 2.0;
    Vec3::new(-dx, 1.0, -dz).normalize().to_array()
}

fn blend_layers(record: &LandscapeRecord, index: usize) -> [f32; 4] {
    let mut color = Vec4::from_array(BASE_COLOR);
    let painted = record
        .layers
        .iter()
        .filter(|(id, _)| Some(**id) != record.visibility_layer);
    for (slot, (_, weights)) in painted.enumerate() {
        let weight = weights.get(index).copied().unwrap_or(0) as f32 / 255.0;
        let tint = Vec4::from_array(LAYER_PALETTE[slot % LAYER_PALETTE.len()]);
        color = color.lerp(tint, weight);
    }
    color.to_array()
}

/// Render mesh of a landscape record in landscape vertex space.
pub fn build_landscape_mesh(record: &LandscapeRecord) -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());

    let size = record.size();
    let (size_x, size_y) = (size.x as usize, size.y as usize);
    let count = size_x * size_y;

    let mut positions = Vec::with_capacity(count);
    let mut normals = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);
    let mut uvs = Vec::with_capacity(count);

    if record.heights.len() == count && count > 0 {
        for y in 0..size_y {
            for x in 0..size_x {
                let index = y * size_x + x;
                positions.push([x as f32, digit_to_local_height(record.heights[index]), y as f32]);
                normals.push(smooth_normal(&record.heights, size_x, size_y, x, y));
                colors.push(blend_layers(record, index));
                uvs.push([
                    x as f32 / (size_x.max(2) - 1) as f32,
                    y as f32 / (size_y.max(2) - 1) as f32,
                ]);
            }
        }
    }

    let holes = record
        .visibility_layer
        .and_then(|id| record.layers.get(&id))
        .map(Vec::as_slice);
    let indices = if positions.is_empty() {
        Vec::new()
    } else {
        landscape_indices(size.x, size.y, holes)
    };

    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_indices(Indices::U32(indices));

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_digit_is_ground_level() {
        assert_eq!(digit_to_local_height(32768), 0.0);
        assert_eq!(digit_to_local_height(32768 + 128), 1.0);
        assert!(digit_to_local_height(0) < 0.0);
    }

    #[test]
    fn test_grid_indices() {
        let indices = landscape_indices(3, 3, None);
        assert_eq!(indices.len(), 4 * 6);
        assert_eq!(&indices[..3], &[0, 3, 1]);
    }

    #[test]
    fn test_holes_remove_touching_quads() {
        // center vertex of a 3x3 grid is shared by all four quads
        let mut holes = vec![0u8; 9];
        holes[4] = 255;
        assert!(landscape_indices(3, 3, Some(&holes)).is_empty());

        let mut corner = vec![0u8; 9];
        corner[0] = 200;
        assert_eq!(landscape_indices(3, 3, Some(&corner)).len(), 3 * 6);
    }

    #[test]
    fn test_display_transform_swaps_up_axis() {
        let transform = Transform {
            translation: Vec3::new(100.0, 200.0, 300.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::new(200.0, 200.0, 50.0),
        };
        let display = display_transform(&transform);
        assert!(display.translation.abs_diff_eq(Vec3::new(1.0, 3.0, 2.0), 1e-5));
        assert!(display.scale.abs_diff_eq(Vec3::new(2.0, 0.5, 2.0), 1e-5));
    }
}
