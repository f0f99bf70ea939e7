//! Geometry source abstraction
//!
//! Provides the `GeometrySource` trait, the seam to the Houdini session that cooks
//! heightfield volumes, and `MemorySource`, an in-process implementation backed by
//! plain sample buffers (used by the demo session and by tests).

use crate::error::{LandscapeError, Result};
use bevy::prelude::*;
use std::collections::{HashMap, HashSet};

/// Houdini node id.
pub type NodeId = i32;

/// `(object, geo, part)` identity of one cooked geometry part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartKey {
    pub object_id: NodeId,
    pub geo_id: NodeId,
    pub part_id: i32,
}

impl PartKey {
    pub fn new(object_id: NodeId, geo_id: NodeId, part_id: i32) -> Self {
        Self {
            object_id,
            geo_id,
            part_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartType {
    Volume,
    Mesh,
    Curve,
    Instancer,
    Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageType {
    Float,
    Int,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeOwner {
    Point,
    Vertex,
    Prim,
    Detail,
}

/// Lookup order used when a query does not name an owner.
pub const ATTRIBUTE_OWNER_SEARCH_ORDER: [AttributeOwner; 4] = [
    AttributeOwner::Point,
    AttributeOwner::Vertex,
    AttributeOwner::Prim,
    AttributeOwner::Detail,
];

/// Shape and placement of a volume part
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeInfo {
    /// Declared volume name (`height`, `mask`, `water`...)
    pub name: String,
    pub tuple_size: i32,
    pub x_length: i32,
    pub y_length: i32,
    pub z_length: i32,
    /// Voxel-space origin of the volume, expected to be zero for heightfields
    pub min_x: i32,
    pub min_y: i32,
    pub storage: StorageType,
    /// Volume transform, already expressed in the destination's axis convention
    pub transform: Transform,
}

impl VolumeInfo {
    /// A single-channel float heightfield volume of the given size.
    pub fn heightfield(name: impl Into<String>, x_length: i32, y_length: i32) -> Self {
        Self {
            name: name.into(),
            tuple_size: 1,
            x_length,
            y_length,
            z_length: 1,
            min_x: 0,
            min_y: 0,
            storage: StorageType::Float,
            transform: Transform::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Whether this volume can be read as a 2D float grid.
    pub fn is_float_grid(&self) -> bool {
        self.tuple_size == 1 && self.z_length == 1 && self.storage == StorageType::Float
    }

    pub fn sample_count(&self) -> usize {
        self.x_length.max(0) as usize * self.y_length.max(0) as usize
    }
}

/// Volume bounds in the source's Y-up convention
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VolumeBounds {
    pub x_min: f32,
    pub y_min: f32,
    pub z_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub z_max: f32,
}

/// Description of an attribute returned by a query, `exists` separates absent from empty
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeInfo {
    pub exists: bool,
    pub owner: AttributeOwner,
    pub storage: StorageType,
    pub count: usize,
    pub tuple_size: usize,
}

impl AttributeInfo {
    pub fn missing() -> Self {
        Self {
            exists: false,
            owner: AttributeOwner::Detail,
            storage: StorageType::Int,
            count: 0,
            tuple_size: 0,
        }
    }
}

/// Typed attribute values together with their info.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeData<T> {
    pub info: AttributeInfo,
    pub values: Vec<T>,
}

impl<T> AttributeData<T> {
    pub fn missing() -> Self {
        Self {
            info: AttributeInfo::missing(),
            values: Vec::new(),
        }
    }

    /// First value, if the attribute exists and holds any.
    pub fn first(&self) -> Option<&T> {
        if self.info.exists {
            self.values.first()
        } else {
            None
        }
    }
}

/// One cooked part of a generator output, as cached by the caller between cooks
#[derive(Clone, Debug, PartialEq)]
pub struct GeoPart {
    pub key: PartKey,
    pub part_type: PartType,
    pub name: String,
    /// Volume info cached when the output was built, `None` for non-volume parts
    pub volume: Option<VolumeInfo>,
    /// Whether the source reported new geometry for this part on the last cook
    pub has_geo_changed: bool,
}

impl GeoPart {
    pub fn volume(key: PartKey, info: VolumeInfo) -> Self {
        Self {
            key,
            part_type: PartType::Volume,
            name: info.name.clone(),
            volume: Some(info),
            has_geo_changed: true,
        }
    }

    pub fn with_geo_changed(mut self, changed: bool) -> Self {
        self.has_geo_changed = changed;
        self
    }
}

/// Trait for querying cooked geometry from the procedural engine.
///
/// Every call is synchronous and treated as atomic. Implementations must never mutate
/// the cooked geometry.
pub trait GeometrySource {
    /// Fresh volume info for a part.
    fn volume_info(&self, part: PartKey) -> Result<VolumeInfo>;

    /// Raw heightfield samples, row-major with X fastest, `x_length * y_length` values.
    fn heightfield_data(&self, part: PartKey) -> Result<Vec<f32>>;

    fn volume_bounds(&self, part: PartKey) -> Result<VolumeBounds>;

    /// Names of all attributes of one owner class.
    fn attribute_names(&self, part: PartKey, owner: AttributeOwner) -> Result<Vec<String>>;

    /// Integer attribute values. With `owner == None` the owners are searched in
    /// [`ATTRIBUTE_OWNER_SEARCH_ORDER`].
    fn int_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Result<AttributeData<i32>>;

    fn float_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Result<AttributeData<f32>>;

    fn string_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Result<AttributeData<String>>;

    /// Whether an attribute of that exact owner exists
    fn attribute_exists(&self, part: PartKey, name: &str, owner: AttributeOwner) -> bool {
        self.attribute_names(part, owner)
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }

    /// Whether a node still exists in the session.
    fn is_node_valid(&self, _node: NodeId) -> bool {
        true
    }
}

/// Attribute payloads stored by [`MemorySource`].
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValues {
    Int(Vec<i32>),
    Float(Vec<f32>),
    String(Vec<String>),
}

impl AttributeValues {
    fn storage(&self) -> StorageType {
        match self {
            AttributeValues::Int(_) => StorageType::Int,
            AttributeValues::Float(_) => StorageType::Float,
            AttributeValues::String(_) => StorageType::String,
        }
    }

    fn len(&self) -> usize {
        match self {
            AttributeValues::Int(v) => v.len(),
            AttributeValues::Float(v) => v.len(),
            AttributeValues::String(v) => v.len(),
        }
    }
}

#[derive(Clone, Debug)]
struct MemoryVolume {
    info: VolumeInfo,
    samples: Vec<f32>,
}

/// In-process geometry source backed by sample buffers
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    volumes: HashMap<PartKey, MemoryVolume>,
    attributes: HashMap<PartKey, HashMap<(AttributeOwner, String), AttributeValues>>,
    invalid_nodes: HashSet<NodeId>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a volume part and return the matching [`GeoPart`].
    pub fn add_volume(&mut self, key: PartKey, info: VolumeInfo, samples: Vec<f32>) -> GeoPart {
        let part = GeoPart::volume(key, info.clone());
        self.volumes.insert(key, MemoryVolume { info, samples });
        part
    }

    pub fn set_attribute(
        &mut self,
        key: PartKey,
        name: impl Into<String>,
        owner: AttributeOwner,
        values: AttributeValues,
    ) {
        self.attributes
            .entry(key)
            .or_default()
            .insert((owner, name.into()), values);
    }

    /// Mark a node as deleted from the session.
    pub fn invalidate_node(&mut self, node: NodeId) {
        self.invalid_nodes.insert(node);
    }

    pub fn clear(&mut self) {
        self.volumes.clear();
        self.attributes.clear();
        self.invalid_nodes.clear();
    }

    fn volume(&self, part: PartKey) -> Result<&MemoryVolume> {
        self.volumes.get(&part).ok_or_else(|| LandscapeError::Source {
            part,
            message: "no volume for part".to_string(),
        })
    }

    fn find_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Option<(AttributeOwner, &AttributeValues)> {
        let attributes = self.attributes.get(&part)?;
        let owners: &[AttributeOwner] = match &owner {
            Some(owner) => std::slice::from_ref(owner),
            None => &ATTRIBUTE_OWNER_SEARCH_ORDER,
        };
        owners.iter().find_map(|owner| {
            attributes
                .get(&(*owner, name.to_string()))
                .map(|values| (*owner, values))
        })
    }

    fn typed_attribute<T: Clone>(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
        extract: impl Fn(&AttributeValues) -> Option<Vec<T>>,
    ) -> Result<AttributeData<T>> {
        let Some((owner, values)) = self.find_attribute(part, name, owner) else {
            return Ok(AttributeData::missing());
        };
        let info = AttributeInfo {
            exists: true,
            owner,
            storage: values.storage(),
            count: values.len(),
            tuple_size: 1,
        };
        match extract(values) {
            Some(values) => Ok(AttributeData { info, values }),
            None => Err(LandscapeError::Source {
                part,
                message: format!("attribute {name} has storage {:?}", info.storage),
            }),
        }
    }
}

impl GeometrySource for MemorySource {
    fn volume_info(&self, part: PartKey) -> Result<VolumeInfo> {
        Ok(self.volume(part)?.info.clone())
    }

    fn heightfield_data(&self, part: PartKey) -> Result<Vec<f32>> {
        let volume = self.volume(part)?;
        if volume.samples.len() != volume.info.sample_count() {
            return Err(LandscapeError::Source {
                part,
                message: format!(
                    "expected {} samples, volume holds {}",
                    volume.info.sample_count(),
                    volume.samples.len()
                ),
            });
        }
        Ok(volume.samples.clone())
    }

    fn volume_bounds(&self, part: PartKey) -> Result<VolumeBounds> {
        let volume = self.volume(part)?;
        let (y_min, y_max) = volume
            .samples
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if volume.samples.is_empty() {
            return Err(LandscapeError::Source {
                part,
                message: "empty volume has no bounds".to_string(),
            });
        }
        let scale = volume.info.transform.scale;
        Ok(VolumeBounds {
            x_min: -scale.x,
            y_min,
            z_min: -scale.y,
            x_max: scale.x,
            y_max,
            z_max: scale.y,
        })
    }

    fn attribute_names(&self, part: PartKey, owner: AttributeOwner) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .attributes
            .get(&part)
            .map(|attributes| {
                attributes
                    .keys()
                    .filter(|(o, _)| *o == owner)
                    .map(|(_, name)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    fn int_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Result<AttributeData<i32>> {
        self.typed_attribute(part, name, owner, |values| match values {
            AttributeValues::Int(v) => Some(v.clone()),
            AttributeValues::Float(v) => Some(v.iter().map(|f| *f as i32).collect()),
            AttributeValues::String(_) => None,
        })
    }

    fn float_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Result<AttributeData<f32>> {
        self.typed_attribute(part, name, owner, |values| match values {
            AttributeValues::Float(v) => Some(v.clone()),
            AttributeValues::Int(v) => Some(v.iter().map(|i| *i as f32).collect()),
            AttributeValues::String(_) => None,
        })
    }

    fn string_attribute(
        &self,
        part: PartKey,
        name: &str,
        owner: Option<AttributeOwner>,
    ) -> Result<AttributeData<String>> {
        self.typed_attribute(part, name, owner, |values| match values {
            AttributeValues::String(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn is_node_valid(&self, node: NodeId) -> bool {
        !self.invalid_nodes.contains(&node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_volume_roundtrip() {
        let mut source = MemorySource::new();
        let key = PartKey::new(1, 2, 0);
        let part = source.add_volume(
            key,
            VolumeInfo::heightfield("height", 2, 3),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        );

        assert_eq!(part.part_type, PartType::Volume);
        assert_eq!(part.name, "height");
        assert_eq!(source.heightfield_data(key).unwrap().len(), 6);

        let bounds = source.volume_bounds(key).unwrap();
        assert_eq!(bounds.y_min, 0.0);
        assert_eq!(bounds.y_max, 5.0);
    }

    #[test]
    fn test_attribute_owner_search() {
        let mut source = MemorySource::new();
        let key = PartKey::new(1, 2, 0);
        source.set_attribute(key, "tile", AttributeOwner::Prim, AttributeValues::Int(vec![4]));

        let any = source.int_attribute(key, "tile", None).unwrap();
        assert!(any.info.exists);
        assert_eq!(any.info.owner, AttributeOwner::Prim);
        assert_eq!(any.first(), Some(&4));

        let detail = source
            .int_attribute(key, "tile", Some(AttributeOwner::Detail))
            .unwrap();
        assert!(!detail.info.exists);
        assert!(source.attribute_exists(key, "tile", AttributeOwner::Prim));
        assert!(!source.attribute_exists(key, "tile", AttributeOwner::Point));
    }

    #[test]
    fn test_string_query_on_int_attribute_fails() {
        let mut source = MemorySource::new();
        let key = PartKey::new(1, 2, 0);
        source.set_attribute(key, "tile", AttributeOwner::Prim, AttributeValues::Int(vec![4]));

        assert!(source.string_attribute(key, "tile", None).is_err());
    }

    #[test]
    fn test_sample_count_mismatch_is_reported() {
        let mut source = MemorySource::new();
        let key = PartKey::new(1, 2, 0);
        source.add_volume(key, VolumeInfo::heightfield("height", 4, 4), vec![0.0; 3]);
        assert!(source.heightfield_data(key).is_err());
    }
}
