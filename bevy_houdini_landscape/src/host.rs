//! Destination landscape host
//!
//! `LandscapeHost` is the seam to the engine that owns landscape actors and layer-info
//! assets. The translator only talks to landscapes through it.

use crate::error::Result;
use crate::layers::LayerQuantizationParams;
use crate::reader::LandscapeMaterials;
use crate::size::LandscapeExtent;
use bevy::prelude::*;
use rand::Rng;
use std::collections::HashMap;

/// Handle of a landscape actor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LandscapeId(pub u64);

/// Handle of a layer-info object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerInfoId(pub u64);

/// Landscape GUID, the nil GUID keys the base edit layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LandscapeGuid(pub u128);

impl LandscapeGuid {
    pub const NIL: LandscapeGuid = LandscapeGuid(0);

    /// Fresh random GUID, never nil.
    pub fn new_random(rng: &mut impl Rng) -> Self {
        loop {
            let value: u128 = rng.random();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// First `len` hex digits, used in package paths.
    pub fn short(&self, len: usize) -> String {
        format!("{:032X}", self.0).chars().take(len).collect()
    }
}

/// How weight layers are combined on import
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlphamapImportType {
    #[default]
    Additive,
    Layered,
}

/// One paint layer handed to the import call
#[derive(Clone, Debug, PartialEq)]
pub struct ImportLayer {
    pub name: String,
    pub layer_info: LayerInfoId,
    /// One weight per landscape vertex, X fastest
    pub weights: Vec<u8>,
}

/// Everything needed to spawn and import a new landscape
#[derive(Clone, Debug)]
pub struct LandscapeCreate {
    pub guid: LandscapeGuid,
    pub extent: LandscapeExtent,
    pub sections_per_component: u32,
    pub quads_per_section: u32,
    pub heights_per_layer: HashMap<LandscapeGuid, Vec<u16>>,
    pub layers_per_layer: HashMap<LandscapeGuid, Vec<ImportLayer>>,
    pub alphamap_type: AlphamapImportType,
    pub transform: Transform,
    pub materials: LandscapeMaterials,
    pub streaming_proxy: bool,
    /// Spawn into a new map stored in this package instead of the current world
    pub new_map_package: Option<String>,
    pub package_name: String,
    pub static_lighting_lod: u32,
    pub component_extent: Option<LandscapeExtent>,
}

/// Engine-side operations the translator needs
pub trait LandscapeHost {
    /// Extent of a live landscape, `None` once destroyed.
    fn landscape_extent(&self, landscape: LandscapeId) -> Option<LandscapeExtent>;

    /// Spawn a landscape, import its data and register its components.
    fn create_landscape(&mut self, request: LandscapeCreate) -> Result<LandscapeId>;

    fn set_height_data(&mut self, landscape: LandscapeId, extent: LandscapeExtent, heights: &[u16]) -> Result<()>;

    fn set_alpha_data(
        &mut self,
        landscape: LandscapeId,
        layer_info: LayerInfoId,
        extent: LandscapeExtent,
        weights: &[u8],
    ) -> Result<()>;

    fn set_transform(&mut self, landscape: LandscapeId, transform: &Transform) -> Result<()>;

    fn materials(&self, landscape: LandscapeId) -> Option<LandscapeMaterials>;

    fn set_materials(&mut self, landscape: LandscapeId, materials: &LandscapeMaterials) -> Result<()>;

    fn set_tags(&mut self, landscape: LandscapeId, tags: &[String]) -> Result<()>;

    fn set_visibility_layer(&mut self, landscape: LandscapeId, layer_info: LayerInfoId) -> Result<()>;

    fn recreate_collision(&mut self, landscape: LandscapeId) -> Result<()>;

    fn destroy_landscape(&mut self, landscape: LandscapeId) -> Result<()>;

    /// Package holding a landscape.
    fn landscape_package(&self, landscape: LandscapeId) -> Option<String>;

    /// Whether any landscape, map or layer-info object lives in `package`.
    fn package_exists(&self, package: &str) -> bool;

    /// Find the layer-info object in `package_path/package_name` or create it.
    fn find_or_create_layer_info(
        &mut self,
        layer_name: &str,
        package_path: &str,
        package_name: &str,
    ) -> Result<LayerInfoId>;

    fn set_no_weight_blend(&mut self, layer_info: LayerInfoId, no_weight_blend: bool) -> Result<()>;

    /// Remember how a layer was quantized so it can be converted back later.
    fn set_layer_quantization(&mut self, layer_info: LayerInfoId, params: LayerQuantizationParams) -> Result<()>;

    fn layer_quantization(&self, layer_info: LayerInfoId) -> Option<LayerQuantizationParams>;
}

/// Static lighting LOD that keeps lightmap baking within limits.
///
/// Below 2048x2048 vertices LOD0, then one LOD per quadrupling.
pub fn static_lighting_lod(size_x: u32, size_y: u32) -> u32 {
    let blocks = (size_x as u64 * size_y as u64) / (2048 * 2048) + 1;
    let ceil_log2 = blocks.next_power_of_two().trailing_zeros();
    ceil_log2.div_ceil(2)
}
