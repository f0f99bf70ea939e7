//! Landscape materials
//!
//! Material paths read from the heightfield are resolved to `StandardMaterial` handles.
//! Landscapes sharing a material path share one handle; vertex colors carry the layer
//! weights so the same material serves every landscape.

use crate::reader::LandscapeMaterials;
use bevy::prelude::*;
use std::collections::HashMap;

/// Key used for landscapes without a material path
const DEFAULT_MATERIAL_KEY: &str = "";

/// Shared material handles keyed by material path
#[derive(Resource, Default)]
pub struct LandscapeMaterialCache {
    handles: HashMap<String, Handle<StandardMaterial>>,
}

/// Stable tint for a material path, so distinct paths are told apart in the viewport.
pub fn material_tint(path: &str) -> Color {
    if path.is_empty() {
        return Color::WHITE;
    }
    let hash = path
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    let hue = (hash % 360) as f32;
    Color::hsl(hue, 0.25, 0.85)
}

fn landscape_material(path: &str) -> StandardMaterial {
    StandardMaterial {
        base_color: material_tint(path), // vertex colors modulate this
        perceptual_roughness: 0.85,
        metallic: 0.0,
        reflectance: 0.25,
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

impl LandscapeMaterialCache {
    /// Handle for the landscape material of `materials`, created on first use.
    pub fn handle_for(
        &mut self,
        materials: &LandscapeMaterials,
        assets: &mut Assets<StandardMaterial>,
    ) -> Handle<StandardMaterial> {
        let key = materials.material.as_deref().unwrap_or(DEFAULT_MATERIAL_KEY);
        self.handles
            .entry(key.to_string())
            .or_insert_with(|| assets.add(landscape_material(key)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_shared_per_path() {
        let mut assets = Assets::<StandardMaterial>::default();
        let mut cache = LandscapeMaterialCache::default();
        let rock = LandscapeMaterials {
            material: Some("/Game/Materials/Rock".to_string()),
            hole_material: None,
        };

        let a = cache.handle_for(&rock, &mut assets);
        let b = cache.handle_for(&rock, &mut assets);
        let c = cache.handle_for(&LandscapeMaterials::default(), &mut assets);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_tint_is_stable() {
        assert_eq!(material_tint("/Game/A"), material_tint("/Game/A"));
        assert_eq!(material_tint(""), Color::WHITE);
    }
}
