//! Heightfield reading
//!
//! Locates the height and mask volumes of a cooked output and reads their samples and
//! the marshalling attributes that drive landscape creation.

use crate::error::{LandscapeError, Result};
use crate::size::LandscapeExtent;
use crate::source::{AttributeOwner, GeoPart, GeometrySource, PartKey, PartType, StorageType, VolumeInfo};
use bevy::log::{debug, warn};

pub const ATTRIB_TILE: &str = "tile";
pub const ATTRIB_NON_WEIGHT_BLENDED_PREFIX: &str = "unreal_landscape_layer_nonweightblended";
pub const ATTRIB_UNIT_LANDSCAPE_LAYER: &str = "unreal_unit_landscape_layer";
pub const ATTRIB_MATERIAL: &str = "unreal_material";
pub const ATTRIB_MATERIAL_INSTANCE: &str = "unreal_material_instance";
pub const ATTRIB_HOLE_MATERIAL: &str = "unreal_hole_material";
pub const ATTRIB_HOLE_MATERIAL_INSTANCE: &str = "unreal_hole_material_instance";
pub const ATTRIB_STREAMING_PROXY: &str = "unreal_landscape_streaming_proxy";
pub const ATTRIB_TAG_PREFIX: &str = "unreal_tag_";
pub const ATTRIB_COMPONENT_MIN_X: &str = "landscape_component_min_X";
pub const ATTRIB_COMPONENT_MAX_X: &str = "landscape_component_max_X";
pub const ATTRIB_COMPONENT_MIN_Y: &str = "landscape_component_min_Y";
pub const ATTRIB_COMPONENT_MAX_Y: &str = "landscape_component_max_Y";

/// Float samples of one volume with their observed range
#[derive(Clone, Debug, PartialEq)]
pub struct HeightfieldSample {
    pub part: PartKey,
    pub volume: VolumeInfo,
    /// `x_length * y_length` samples, X fastest
    pub samples: Vec<f32>,
    pub min: f32,
    pub max: f32,
}

/// Mask volume samples destined for a paint layer
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSample {
    pub name: String,
    pub heightfield: HeightfieldSample,
    /// Quantize over `[0, 1]` instead of the observed or shared range
    pub unit_range: bool,
    pub has_geo_changed: bool,
}

/// Material paths assigned to a landscape
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LandscapeMaterials {
    pub material: Option<String>,
    pub hole_material: Option<String>,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whether a volume can hold a 2D heightfield: one float channel, one slice deep.
fn is_heightfield_volume(info: &VolumeInfo) -> bool {
    info.is_float_grid()
}

/// Locate the primary height volume among the parts of one output.
pub fn find_height_volume(parts: &[GeoPart]) -> Result<&GeoPart> {
    parts
        .iter()
        .find(|part| {
            part.part_type == PartType::Volume
                && part
                    .volume
                    .as_ref()
                    .is_some_and(|info| contains_ignore_case(&info.name, "height") && is_heightfield_volume(info))
        })
        .ok_or_else(|| LandscapeError::NotFound("height volume".to_string()))
}

/// Tile index carried by a primitive `tile` attribute.
pub fn read_tile_index(source: &dyn GeometrySource, part: PartKey) -> Option<i32> {
    let tile = source.int_attribute(part, ATTRIB_TILE, None).ok()?;
    if tile.info.exists && tile.info.owner == AttributeOwner::Prim {
        tile.values.first().copied()
    } else {
        None
    }
}

/// Locate the mask volumes belonging to a height volume.
///
/// Candidates share the height volume's geo node. When the height volume carries a tile
/// index only parts of that same tile are kept, so layers of neighbouring tiles never
/// bleed into this one.
pub fn find_layer_volumes<'a>(
    source: &dyn GeometrySource,
    parts: &'a [GeoPart],
    height: &GeoPart,
) -> Vec<&'a GeoPart> {
    let geo_id = height.key.geo_id;
    let height_tile = read_tile_index(source, height.key);

    parts
        .iter()
        .filter(|part| part.key.geo_id != -1 && part.key.geo_id == geo_id)
        .filter(|part| match height_tile {
            Some(tile) => read_tile_index(source, part.key).is_some_and(|t| t == tile && t != -1),
            None => true,
        })
        .filter(|part| match source.volume_info(part.key) {
            Ok(info) => !contains_ignore_case(&info.name, "height") && is_heightfield_volume(&info),
            Err(err) => {
                debug!("Skipping part {:?} while looking for layers: {err}", part.key);
                false
            }
        })
        .collect()
}

/// Read the float samples of a volume part with their observed range.
pub fn read_float_samples(source: &dyn GeometrySource, part: &GeoPart) -> Result<HeightfieldSample> {
    if part.part_type != PartType::Volume {
        return Err(LandscapeError::shape(part.key, "part is not a volume"));
    }
    let Some(info) = part.volume.as_ref() else {
        return Err(LandscapeError::shape(part.key, "volume has no info"));
    };
    if info.tuple_size != 1 {
        return Err(LandscapeError::shape(part.key, format!("tuple size {}", info.tuple_size)));
    }
    if info.z_length != 1 {
        return Err(LandscapeError::shape(part.key, format!("z length {}", info.z_length)));
    }
    if info.storage != StorageType::Float {
        return Err(LandscapeError::shape(part.key, format!("{:?} storage", info.storage)));
    }
    if info.x_length < 2 || info.y_length < 2 {
        return Err(LandscapeError::shape(
            part.key,
            format!("{}x{} samples", info.x_length, info.y_length),
        ));
    }

    let samples = source.heightfield_data(part.key)?;
    if samples.len() != info.sample_count() {
        return Err(LandscapeError::Source {
            part: part.key,
            message: format!("expected {} samples, got {}", info.sample_count(), samples.len()),
        });
    }

    let (min, max) = samples
        .iter()
        .fold((samples[0], samples[0]), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    Ok(HeightfieldSample {
        part: part.key,
        volume: info.clone(),
        samples,
        min,
        max,
    })
}

/// Collect the layer names listed in `unreal_landscape_layer_nonweightblended*` attributes.
///
/// The first matching attribute wins. Its string values are split on spaces.
pub fn read_non_weight_blended_layer_names(source: &dyn GeometrySource, part: PartKey) -> Result<Vec<String>> {
    let prefix = ATTRIB_NON_WEIGHT_BLENDED_PREFIX.to_lowercase();
    for owner in [AttributeOwner::Prim, AttributeOwner::Detail] {
        let names = source.attribute_names(part, owner)?;
        let Some(name) = names.iter().find(|n| n.to_lowercase().starts_with(&prefix)) else {
            continue;
        };

        return match source.string_attribute(part, name, Some(owner)) {
            Ok(values) => Ok(values
                .values
                .iter()
                .flat_map(|v| v.split(' ').filter(|t| !t.is_empty()).map(str::to_string))
                .collect()),
            Err(err) => {
                debug!("Ignoring non weight blended attribute {name}: {err}");
                Ok(Vec::new())
            }
        };
    }
    Ok(Vec::new())
}

/// Whether a layer volume asks for a `[0, 1]` quantization range.
pub fn is_unit_landscape_layer(source: &dyn GeometrySource, part: PartKey) -> bool {
    let owner = if source.attribute_exists(part, ATTRIB_UNIT_LANDSCAPE_LAYER, AttributeOwner::Prim) {
        AttributeOwner::Prim
    } else if source.attribute_exists(part, ATTRIB_UNIT_LANDSCAPE_LAYER, AttributeOwner::Detail) {
        AttributeOwner::Detail
    } else {
        return false;
    };

    source
        .int_attribute(part, ATTRIB_UNIT_LANDSCAPE_LAYER, Some(owner))
        .is_ok_and(|values| values.first() == Some(&1))
}

fn read_material(source: &dyn GeometrySource, part: PartKey, name: &str, instance_name: &str) -> Option<String> {
    let mut values = source.string_attribute(part, name, None).ok()?;
    if !values.info.exists {
        values = source.string_attribute(part, instance_name, None).ok()?;
    }
    if !values.info.exists {
        return None;
    }
    if !matches!(values.info.owner, AttributeOwner::Prim | AttributeOwner::Detail) {
        warn!("Landscape: {name} must be a primitive or detail attribute, ignoring attribute");
        return None;
    }
    values.values.into_iter().next().filter(|path| !path.is_empty())
}

/// Read the landscape and hole materials, each falling back to its instance attribute.
pub fn read_landscape_materials(source: &dyn GeometrySource, part: PartKey) -> LandscapeMaterials {
    LandscapeMaterials {
        material: read_material(source, part, ATTRIB_MATERIAL, ATTRIB_MATERIAL_INSTANCE),
        hole_material: read_material(source, part, ATTRIB_HOLE_MATERIAL, ATTRIB_HOLE_MATERIAL_INSTANCE),
    }
}

/// Whether a streaming proxy should be created instead of a full landscape.
pub fn read_streaming_proxy_flag(source: &dyn GeometrySource, part: PartKey) -> bool {
    source
        .int_attribute(part, ATTRIB_STREAMING_PROXY, None)
        .is_ok_and(|values| values.first().is_some_and(|v| *v != 0))
}

/// Read the `landscape_component_min/max_X/Y` primitive attributes, all four or nothing.
pub fn read_component_extent(source: &dyn GeometrySource, part: PartKey) -> Option<LandscapeExtent> {
    if !source.attribute_exists(part, ATTRIB_COMPONENT_MIN_X, AttributeOwner::Prim) {
        return None;
    }
    let read = |name: &str| -> Option<i32> {
        source
            .int_attribute(part, name, Some(AttributeOwner::Prim))
            .ok()
            .and_then(|values| values.first().copied())
    };
    Some(LandscapeExtent {
        min_x: read(ATTRIB_COMPONENT_MIN_X)?,
        max_x: read(ATTRIB_COMPONENT_MAX_X)?,
        min_y: read(ATTRIB_COMPONENT_MIN_Y)?,
        max_y: read(ATTRIB_COMPONENT_MAX_Y)?,
    })
}

/// Collect the values of every `unreal_tag_*` primitive attribute.
pub fn read_tags(source: &dyn GeometrySource, part: PartKey) -> Vec<String> {
    let Ok(names) = source.attribute_names(part, AttributeOwner::Prim) else {
        return Vec::new();
    };
    names
        .iter()
        .filter(|name| name.starts_with(ATTRIB_TAG_PREFIX))
        .filter_map(|name| {
            source
                .string_attribute(part, name, Some(AttributeOwner::Prim))
                .ok()
                .and_then(|values| values.values.into_iter().next())
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AttributeValues, MemorySource};

    fn grid(width: i32, height: i32, f: impl Fn(i32, i32) -> f32) -> Vec<f32> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect()
    }

    fn tile_source() -> (MemorySource, Vec<GeoPart>) {
        let mut source = MemorySource::new();
        let mut parts = Vec::new();
        for (part_id, name, tile) in [(0, "height", 0), (1, "mask", 0), (2, "height", 1), (3, "mask", 1), (4, "water", -1)] {
            let key = PartKey::new(1, 7, part_id);
            parts.push(source.add_volume(
                key,
                VolumeInfo::heightfield(name, 4, 4),
                grid(4, 4, |x, y| (x + y * part_id) as f32),
            ));
            source.set_attribute(key, ATTRIB_TILE, AttributeOwner::Prim, AttributeValues::Int(vec![tile]));
        }
        (source, parts)
    }

    #[test]
    fn test_find_height_volume() {
        let (_, parts) = tile_source();
        let height = find_height_volume(&parts).unwrap();
        assert_eq!(height.key.part_id, 0);
    }

    #[test]
    fn test_height_volume_name_is_case_insensitive() {
        let mut source = MemorySource::new();
        let part = source.add_volume(PartKey::new(0, 0, 0), VolumeInfo::heightfield("Height", 2, 2), vec![0.0; 4]);
        assert!(find_height_volume(std::slice::from_ref(&part)).is_ok());
    }

    #[test]
    fn test_missing_height_volume() {
        let mut source = MemorySource::new();
        let mask = source.add_volume(PartKey::new(0, 0, 0), VolumeInfo::heightfield("mask", 2, 2), vec![0.0; 4]);
        let mut vector = VolumeInfo::heightfield("height", 2, 2);
        vector.tuple_size = 3;
        let vector = source.add_volume(PartKey::new(0, 0, 1), vector, vec![0.0; 4]);

        let err = find_height_volume(&[mask, vector]).unwrap_err();
        assert_eq!(err.reason(), "not_found");
    }

    #[test]
    fn test_layers_are_filtered_by_tile() {
        let (source, parts) = tile_source();
        let layers = find_layer_volumes(&source, &parts, &parts[2]);
        let ids: Vec<_> = layers.iter().map(|p| p.key.part_id).collect();
        assert_eq!(ids, vec![3]);

        let layers = find_layer_volumes(&source, &parts, &parts[0]);
        let ids: Vec<_> = layers.iter().map(|p| p.key.part_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_layers_without_tile_share_the_node() {
        let mut source = MemorySource::new();
        let height = source.add_volume(PartKey::new(1, 7, 0), VolumeInfo::heightfield("height", 2, 2), vec![0.0; 4]);
        let mask = source.add_volume(PartKey::new(1, 7, 1), VolumeInfo::heightfield("mask", 2, 2), vec![0.0; 4]);
        let other = source.add_volume(PartKey::new(1, 8, 0), VolumeInfo::heightfield("mask", 2, 2), vec![0.0; 4]);
        let mut int_volume = VolumeInfo::heightfield("ids", 2, 2);
        int_volume.storage = StorageType::Int;
        let ints = source.add_volume(PartKey::new(1, 7, 2), int_volume, vec![0.0; 4]);

        let parts = vec![height.clone(), mask, other, ints];
        let layers = find_layer_volumes(&source, &parts, &height);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].name, "mask");
    }

    #[test]
    fn test_read_float_samples_range() {
        let (source, parts) = tile_source();
        let sample = read_float_samples(&source, &parts[1]).unwrap();
        assert_eq!(sample.samples.len(), 16);
        assert_eq!(sample.min, 0.0);
        assert_eq!(sample.max, 6.0);
    }

    #[test]
    fn test_read_float_samples_rejects_thin_volume() {
        let mut source = MemorySource::new();
        let part = source.add_volume(PartKey::new(0, 0, 0), VolumeInfo::heightfield("height", 1, 8), vec![0.0; 8]);
        let err = read_float_samples(&source, &part).unwrap_err();
        assert_eq!(err.reason(), "invalid_shape");
    }

    #[test]
    fn test_non_weight_blended_names() {
        let (mut source, parts) = tile_source();
        let key = parts[0].key;
        source.set_attribute(
            key,
            "unreal_landscape_layer_NonWeightBlended_a",
            AttributeOwner::Prim,
            AttributeValues::String(vec!["water  snow".to_string()]),
        );
        let names = read_non_weight_blended_layer_names(&source, key).unwrap();
        assert_eq!(names, vec!["water".to_string(), "snow".to_string()]);
    }

    #[test]
    fn test_unit_layer_flag() {
        let (mut source, parts) = tile_source();
        let key = parts[1].key;
        assert!(!is_unit_landscape_layer(&source, key));

        source.set_attribute(key, ATTRIB_UNIT_LANDSCAPE_LAYER, AttributeOwner::Detail, AttributeValues::Int(vec![1]));
        assert!(is_unit_landscape_layer(&source, key));

        source.set_attribute(key, ATTRIB_UNIT_LANDSCAPE_LAYER, AttributeOwner::Prim, AttributeValues::Int(vec![0]));
        assert!(!is_unit_landscape_layer(&source, key));
    }

    #[test]
    fn test_materials_fall_back_to_instances() {
        let (mut source, parts) = tile_source();
        let key = parts[0].key;
        source.set_attribute(
            key,
            ATTRIB_MATERIAL_INSTANCE,
            AttributeOwner::Detail,
            AttributeValues::String(vec!["/Game/Terrain/MI_Ground".to_string()]),
        );
        source.set_attribute(
            key,
            ATTRIB_HOLE_MATERIAL,
            AttributeOwner::Point,
            AttributeValues::String(vec!["/Game/Terrain/M_Hole".to_string()]),
        );

        let materials = read_landscape_materials(&source, key);
        assert_eq!(materials.material.as_deref(), Some("/Game/Terrain/MI_Ground"));
        assert_eq!(materials.hole_material, None);
    }

    #[test]
    fn test_streaming_proxy_flag() {
        let (mut source, parts) = tile_source();
        let key = parts[0].key;
        assert!(!read_streaming_proxy_flag(&source, key));
        source.set_attribute(key, ATTRIB_STREAMING_PROXY, AttributeOwner::Detail, AttributeValues::Int(vec![2]));
        assert!(read_streaming_proxy_flag(&source, key));
    }

    #[test]
    fn test_component_extent_needs_all_bounds() {
        let (mut source, parts) = tile_source();
        let key = parts[0].key;
        for (name, value) in [(ATTRIB_COMPONENT_MIN_X, 0), (ATTRIB_COMPONENT_MAX_X, 63), (ATTRIB_COMPONENT_MIN_Y, 64)] {
            source.set_attribute(key, name, AttributeOwner::Prim, AttributeValues::Int(vec![value]));
        }
        assert_eq!(read_component_extent(&source, key), None);

        source.set_attribute(key, ATTRIB_COMPONENT_MAX_Y, AttributeOwner::Prim, AttributeValues::Int(vec![127]));
        let extent = read_component_extent(&source, key).unwrap();
        assert_eq!((extent.min_x, extent.max_x, extent.min_y, extent.max_y), (0, 63, 64, 127));
    }

    #[test]
    fn test_tags() {
        let (mut source, parts) = tile_source();
        let key = parts[0].key;
        source.set_attribute(key, "unreal_tag_0", AttributeOwner::Prim, AttributeValues::String(vec!["terrain".into()]));
        source.set_attribute(key, "unreal_tag_1", AttributeOwner::Prim, AttributeValues::String(vec!["baked".into()]));
        source.set_attribute(key, "unreal_other", AttributeOwner::Prim, AttributeValues::String(vec!["x".into()]));
        assert_eq!(read_tags(&source, key), vec!["terrain".to_string(), "baked".to_string()]);
    }
}
