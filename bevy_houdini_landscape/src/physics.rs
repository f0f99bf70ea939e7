//! Physics integration for landscapes using Rapier
//!
//! This module is only available when the `rapier` feature is enabled.
//! Every landscape entity gets a heightfield collider, rebuilt whenever the host was
//! asked to recreate collision.

use crate::Landscape;
use crate::convert::transpose_row_major;
use crate::mesh::digit_to_local_height;
use crate::registry::LandscapeRegistry;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

/// Collision revision a landscape's collider was built from
#[derive(Component)]
pub struct LandscapeCollider {
    pub revision: u32,
}

/// Heightfield collider matching a landscape mesh in landscape vertex space.
///
/// Rapier heightfields are centered on their origin, so the shape is offset to start at
/// the first vertex like the mesh does.
pub fn landscape_collider(heights: &[u16], size: UVec2) -> Option<Collider> {
    let (num_cols, num_rows) = (size.x as usize, size.y as usize);
    if num_rows < 2 || num_cols < 2 || heights.len() != num_rows * num_cols {
        return None;
    }

    // heightfield matrices are column-major with rows along Z
    let local_heights: Vec<f32> = transpose_row_major(heights, num_cols, num_rows)
        .into_iter()
        .map(digit_to_local_height)
        .collect();
    let extent = Vec3::new((num_cols - 1) as f32, 1.0, (num_rows - 1) as f32);
    let heightfield = Collider::heightfield(local_heights, num_rows, num_cols, extent);
    let center = Vec3::new(extent.x / 2.0, 0.0, extent.z / 2.0);
    Some(Collider::compound(vec![(center, Quat::IDENTITY, heightfield)]))
}

/// System to (re)build heightfield colliders of landscapes whose collision is stale
pub fn sync_landscape_colliders(
    mut commands: Commands,
    registry: Res<LandscapeRegistry>,
    landscapes: Query<(Entity, &Landscape, Option<&LandscapeCollider>)>,
) {
    for (entity, landscape, collider) in landscapes.iter() {
        let Some(record) = registry.landscape(landscape.id) else {
            continue;
        };
        if collider.is_some_and(|c| c.revision == record.collision_revision) {
            continue;
        }

        let Some(shape) = landscape_collider(&record.heights, record.size()) else {
            warn!("Landscape {} has no usable height data for collision", landscape.id.0);
            continue;
        };

        commands.entity(entity).insert((
            shape,
            LandscapeCollider {
                revision: record.collision_revision,
            },
            // Landscapes are static
            RigidBody::Fixed,
        ));
    }
}
