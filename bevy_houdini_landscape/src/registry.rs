//! In-process landscape host
//!
//! `LandscapeRegistry` keeps every landscape the translator creates, together with the
//! layer-info objects and their quantization side table. Landscapes touched since the
//! last frame are marked dirty so [`sync_landscape_entities`] can rebuild their meshes.

use crate::error::{LandscapeError, Result};
use crate::host::{LandscapeCreate, LandscapeGuid, LandscapeHost, LandscapeId, LayerInfoId};
use crate::layers::{LayerQuantizationParams, LayerQuantizationTable};
use crate::material::LandscapeMaterialCache;
use crate::mesh::build_landscape_mesh;
use crate::package::sanitize_package_name;
use crate::reader::LandscapeMaterials;
use crate::size::LandscapeExtent;
use crate::Landscape;
use bevy::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A landscape actor owned by the registry
#[derive(Clone, Debug, PartialEq)]
pub struct LandscapeRecord {
    pub guid: LandscapeGuid,
    pub extent: LandscapeExtent,
    pub sections_per_component: u32,
    pub quads_per_section: u32,
    pub transform: Transform,
    /// `size_x * size_y` digits, X fastest
    pub heights: Vec<u16>,
    /// Weight data per paint layer
    pub layers: BTreeMap<LayerInfoId, Vec<u8>>,
    pub materials: LandscapeMaterials,
    pub tags: Vec<String>,
    pub streaming_proxy: bool,
    /// Map the landscape was spawned into, `None` for the current world
    pub map_package: Option<String>,
    pub package_name: String,
    pub static_lighting_lod: u32,
    pub component_extent: Option<LandscapeExtent>,
    pub visibility_layer: Option<LayerInfoId>,
    pub height_writes: u32,
    pub alpha_writes: u32,
    pub collision_revision: u32,
}

impl LandscapeRecord {
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.extent.size_x(), self.extent.size_y())
    }
}

/// A paint layer-info object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfoRecord {
    pub name: String,
    /// Full package name, `path/name`
    pub package: String,
    pub no_weight_blend: bool,
}

#[derive(Resource, Debug, Default)]
pub struct LandscapeRegistry {
    landscapes: HashMap<LandscapeId, LandscapeRecord>,
    layer_infos: HashMap<LayerInfoId, LayerInfoRecord>,
    layer_infos_by_package: HashMap<String, LayerInfoId>,
    quantization: LayerQuantizationTable,
    dirty: BTreeSet<LandscapeId>,
    destroyed: Vec<LandscapeId>,
    /// Render entity per landscape
    entities: HashMap<LandscapeId, Entity>,
    next_landscape: u64,
    next_layer_info: u64,
}

impl LandscapeRegistry {
    pub fn landscape(&self, id: LandscapeId) -> Option<&LandscapeRecord> {
        self.landscapes.get(&id)
    }

    /// Ids of every live landscape, ascending.
    pub fn landscape_ids(&self) -> Vec<LandscapeId> {
        let mut ids: Vec<_> = self.landscapes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.landscapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landscapes.is_empty()
    }

    pub fn layer_info(&self, id: LayerInfoId) -> Option<&LayerInfoRecord> {
        self.layer_infos.get(&id)
    }

    pub fn quantization_table(&self) -> &LayerQuantizationTable {
        &self.quantization
    }

    /// Landscapes changed since the last call.
    pub fn take_dirty(&mut self) -> Vec<LandscapeId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Landscapes destroyed since the last call.
    pub fn take_destroyed(&mut self) -> Vec<LandscapeId> {
        std::mem::take(&mut self.destroyed)
    }

    pub fn entity(&self, id: LandscapeId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    fn record_mut(&mut self, id: LandscapeId) -> Result<&mut LandscapeRecord> {
        self.landscapes
            .get_mut(&id)
            .ok_or_else(|| LandscapeError::Host(format!("landscape {} does not exist", id.0)))
    }

    fn check_layer_info(&self, id: LayerInfoId) -> Result<()> {
        if self.layer_infos.contains_key(&id) {
            Ok(())
        } else {
            Err(LandscapeError::Host(format!("layer info {} does not exist", id.0)))
        }
    }
}

fn check_region(current: &LandscapeExtent, region: &LandscapeExtent, len: usize, what: &str) -> Result<()> {
    if region != current {
        return Err(LandscapeError::Host(format!(
            "{what} region {region:?} does not cover the landscape extent {current:?}"
        )));
    }
    let expected = region.size_x() as usize * region.size_y() as usize;
    if len != expected {
        return Err(LandscapeError::Host(format!("{what} data has {len} values, expected {expected}")));
    }
    Ok(())
}

impl LandscapeHost for LandscapeRegistry {
    fn landscape_extent(&self, landscape: LandscapeId) -> Option<LandscapeExtent> {
        self.landscapes.get(&landscape).map(|record| record.extent)
    }

    fn create_landscape(&mut self, mut request: LandscapeCreate) -> Result<LandscapeId> {
        let heights = request
            .heights_per_layer
            .remove(&LandscapeGuid::NIL)
            .ok_or_else(|| LandscapeError::Host("no height data for the base layer".to_string()))?;
        check_region(&request.extent, &request.extent, heights.len(), "height")?;

        let mut layers = BTreeMap::new();
        for layer in request.layers_per_layer.remove(&LandscapeGuid::NIL).unwrap_or_default() {
            self.check_layer_info(layer.layer_info)?;
            check_region(&request.extent, &request.extent, layer.weights.len(), &layer.name)?;
            layers.insert(layer.layer_info, layer.weights);
        }

        self.next_landscape += 1;
        let id = LandscapeId(self.next_landscape);
        info!(
            "Created landscape {} ({}x{}) in {}",
            id.0,
            request.extent.size_x(),
            request.extent.size_y(),
            request.package_name
        );

        self.landscapes.insert(
            id,
            LandscapeRecord {
                guid: request.guid,
                extent: request.extent,
                sections_per_component: request.sections_per_component,
                quads_per_section: request.quads_per_section,
                transform: request.transform,
                heights,
                layers,
                materials: request.materials,
                tags: Vec::new(),
                streaming_proxy: request.streaming_proxy,
                map_package: request.new_map_package,
                package_name: request.package_name,
                static_lighting_lod: request.static_lighting_lod,
                component_extent: request.component_extent,
                visibility_layer: None,
                height_writes: 1,
                alpha_writes: 0,
                collision_revision: 0,
            },
        );
        self.dirty.insert(id);
        Ok(id)
    }

    fn set_height_data(&mut self, landscape: LandscapeId, extent: LandscapeExtent, heights: &[u16]) -> Result<()> {
        let record = self.record_mut(landscape)?;
        check_region(&record.extent, &extent, heights.len(), "height")?;
        record.heights.clear();
        record.heights.extend_from_slice(heights);
        record.height_writes += 1;
        self.dirty.insert(landscape);
        Ok(())
    }

    fn set_alpha_data(
        &mut self,
        landscape: LandscapeId,
        layer_info: LayerInfoId,
        extent: LandscapeExtent,
        weights: &[u8],
    ) -> Result<()> {
        self.check_layer_info(layer_info)?;
        let record = self.record_mut(landscape)?;
        check_region(&record.extent, &extent, weights.len(), "weight")?;
        record.layers.insert(layer_info, weights.to_vec());
        record.alpha_writes += 1;
        self.dirty.insert(landscape);
        Ok(())
    }

    fn set_transform(&mut self, landscape: LandscapeId, transform: &Transform) -> Result<()> {
        self.record_mut(landscape)?.transform = *transform;
        self.dirty.insert(landscape);
        Ok(())
    }

    fn materials(&self, landscape: LandscapeId) -> Option<LandscapeMaterials> {
        self.landscapes.get(&landscape).map(|record| record.materials.clone())
    }

    fn set_materials(&mut self, landscape: LandscapeId, materials: &LandscapeMaterials) -> Result<()> {
        self.record_mut(landscape)?.materials = materials.clone();
        self.dirty.insert(landscape);
        Ok(())
    }

    fn set_tags(&mut self, landscape: LandscapeId, tags: &[String]) -> Result<()> {
        self.record_mut(landscape)?.tags = tags.to_vec();
        Ok(())
    }

    fn set_visibility_layer(&mut self, landscape: LandscapeId, layer_info: LayerInfoId) -> Result<()> {
        self.check_layer_info(layer_info)?;
        self.record_mut(landscape)?.visibility_layer = Some(layer_info);
        if let Some(info) = self.layer_infos.get_mut(&layer_info) {
            info.no_weight_blend = true;
        }
        self.dirty.insert(landscape);
        Ok(())
    }

    fn recreate_collision(&mut self, landscape: LandscapeId) -> Result<()> {
        self.record_mut(landscape)?.collision_revision += 1;
        self.dirty.insert(landscape);
        Ok(())
    }

    fn destroy_landscape(&mut self, landscape: LandscapeId) -> Result<()> {
        if self.landscapes.remove(&landscape).is_none() {
            return Err(LandscapeError::Host(format!("landscape {} does not exist", landscape.0)));
        }
        info!("Destroyed landscape {}", landscape.0);
        self.dirty.remove(&landscape);
        self.destroyed.push(landscape);
        Ok(())
    }

    fn landscape_package(&self, landscape: LandscapeId) -> Option<String> {
        self.landscapes.get(&landscape).map(|record| {
            record
                .map_package
                .clone()
                .unwrap_or_else(|| record.package_name.clone())
        })
    }

    fn package_exists(&self, package: &str) -> bool {
        self.layer_infos_by_package.contains_key(package)
            || self
                .landscapes
                .values()
                .any(|record| record.package_name == package || record.map_package.as_deref() == Some(package))
    }

    fn find_or_create_layer_info(&mut self, layer_name: &str, package_path: &str, package_name: &str) -> Result<LayerInfoId> {
        if layer_name.is_empty() {
            return Err(LandscapeError::Host("layer info needs a name".to_string()));
        }
        let package = sanitize_package_name(&format!("{package_path}/{package_name}"));
        if let Some(id) = self.layer_infos_by_package.get(&package) {
            return Ok(*id);
        }

        self.next_layer_info += 1;
        let id = LayerInfoId(self.next_layer_info);
        debug!("Created layer info {layer_name} in {package}");
        self.layer_infos.insert(
            id,
            LayerInfoRecord {
                name: layer_name.to_string(),
                package: package.clone(),
                no_weight_blend: false,
            },
        );
        self.layer_infos_by_package.insert(package, id);
        Ok(id)
    }

    fn set_no_weight_blend(&mut self, layer_info: LayerInfoId, no_weight_blend: bool) -> Result<()> {
        let info = self
            .layer_infos
            .get_mut(&layer_info)
            .ok_or_else(|| LandscapeError::Host(format!("layer info {} does not exist", layer_info.0)))?;
        info.no_weight_blend = no_weight_blend;
        Ok(())
    }

    fn set_layer_quantization(&mut self, layer_info: LayerInfoId, params: LayerQuantizationParams) -> Result<()> {
        self.check_layer_info(layer_info)?;
        self.quantization.insert(layer_info, params);
        Ok(())
    }

    fn layer_quantization(&self, layer_info: LayerInfoId) -> Option<LayerQuantizationParams> {
        self.quantization.get(layer_info)
    }
}

/// System: rebuild render entities of changed landscapes and despawn destroyed ones
pub fn sync_landscape_entities(
    mut commands: Commands,
    mut registry: ResMut<LandscapeRegistry>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut material_cache: ResMut<LandscapeMaterialCache>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for id in registry.take_destroyed() {
        if let Some(entity) = registry.entities.remove(&id) {
            commands.entity(entity).despawn();
        }
    }

    for id in registry.take_dirty() {
        let Some(record) = registry.landscape(id) else {
            continue;
        };
        let mesh = meshes.add(build_landscape_mesh(record));
        let material = material_cache.handle_for(&record.materials, &mut materials);
        let transform = crate::mesh::display_transform(&record.transform);
        let size = record.size();

        match registry.entities.get(&id) {
            Some(&entity) => {
                commands
                    .entity(entity)
                    .insert((Mesh3d(mesh), MeshMaterial3d(material), transform));
            }
            None => {
                let entity = commands
                    .spawn((
                        Landscape { id, size },
                        Mesh3d(mesh),
                        MeshMaterial3d(material),
                        transform,
                    ))
                    .id();
                registry.entities.insert(id, entity);
            }
        }
    }
}
