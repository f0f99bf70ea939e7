//! Landscape materialization
//!
//! `LandscapeTranslator` turns the heightfield outputs of a generator into landscapes on a
//! [`LandscapeHost`] and remembers which landscape each tile is bound to, so later cooks
//! update in place instead of recreating.
//!
//! A tile goes through three phases:
//! 1. [`LandscapeTranslator::prepare_tile`] reads everything from the geometry source.
//! 2. [`LandscapeTranslator::convert_tile`] converts heights and layers. It is pure and
//!    can run on any thread.
//! 3. [`LandscapeTranslator::commit_tile`] picks the landscape to update or creates one,
//!    then destroys landscapes orphaned by the previous cook of the same output.

use crate::config::MarshallingConfig;
use crate::convert::{ConvertedHeightData, convert_height_data};
use crate::error::{LandscapeError, Result};
use crate::host::{
    AlphamapImportType, ImportLayer, LandscapeCreate, LandscapeGuid, LandscapeHost, LandscapeId,
    static_lighting_lod,
};
use crate::layers::{
    ConvertedLayer, GlobalLayerRanges, convert_landscape_layers, create_or_update_landscape_layers,
    is_visibility_layer,
};
use crate::package::{PACKAGE_GUID_LENGTH, PackageParams};
use crate::reader::{
    HeightfieldSample, LandscapeMaterials, LayerSample, find_height_volume, find_layer_volumes,
    is_unit_landscape_layer, read_component_extent, read_float_samples, read_landscape_materials,
    read_non_weight_blended_layer_names, read_streaming_proxy_flag, read_tags, read_tile_index,
};
use crate::size::{LandscapeExtent, LandscapeSize, solve_landscape_size};
use crate::source::{GeoPart, GeometrySource, PartKey, PartType};
use bevy::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Split name of the object produced for a height volume
pub const HEIGHTFIELD_SPLIT: &str = "Heightfield";

/// Identity of one generator output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u32);

/// Identity of an object produced by an output
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputObjectIdentifier {
    pub part: PartKey,
    pub split: String,
}

impl OutputObjectIdentifier {
    pub fn heightfield(part: PartKey) -> Self {
        Self {
            part,
            split: HEIGHTFIELD_SPLIT.to_string(),
        }
    }
}

/// What a tile is bound to after a cook
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// A landscape supplied by the caller as an input to update, never destroyed here
    ExternalLandscape(LandscapeId),
    /// A landscape created by this translator
    OwnedLandscape {
        landscape: LandscapeId,
        world_composition: bool,
    },
    /// Output not owned by an asset: only the landscape's package is recorded
    PackageOnly { landscape: LandscapeId, package: String },
}

impl Binding {
    pub fn landscape(&self) -> LandscapeId {
        match self {
            Binding::ExternalLandscape(landscape)
            | Binding::OwnedLandscape { landscape, .. }
            | Binding::PackageOnly { landscape, .. } => *landscape,
        }
    }
}

/// The cached parts of one landscape output
#[derive(Clone, Debug, PartialEq)]
pub struct LandscapeOutput {
    pub id: OutputId,
    pub parts: Vec<GeoPart>,
    /// Whether an asset instance owns the output, as opposed to a one-shot importer
    pub owned_by_asset: bool,
}

impl LandscapeOutput {
    pub fn new(id: OutputId, parts: Vec<GeoPart>) -> Self {
        Self {
            id,
            parts,
            owned_by_asset: true,
        }
    }
}

/// Attributes of the height volume that travel with a tile unchanged
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileAttributes {
    pub non_weight_blended: Vec<String>,
    pub materials: LandscapeMaterials,
    pub streaming_proxy: bool,
    pub tags: Vec<String>,
    pub component_extent: Option<LandscapeExtent>,
    pub tile_index: Option<i32>,
}

/// Everything read from the source for one tile
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedTile {
    pub output: OutputId,
    pub owned_by_asset: bool,
    pub identifier: OutputObjectIdentifier,
    pub height: HeightfieldSample,
    pub has_geo_changed: bool,
    /// Range the heights are quantized over, shared across outputs when one is known
    pub height_range: (f32, f32),
    pub size: LandscapeSize,
    pub layers: Vec<LayerSample>,
    pub layer_ranges: GlobalLayerRanges,
    pub attributes: TileAttributes,
}

/// A tile with its data converted, ready to commit
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedTile {
    pub output: OutputId,
    pub owned_by_asset: bool,
    pub identifier: OutputObjectIdentifier,
    pub has_geo_changed: bool,
    pub size: LandscapeSize,
    pub height: ConvertedHeightData,
    pub layers: Vec<ConvertedLayer>,
    pub attributes: TileAttributes,
}

fn is_valid_height_part(source: &dyn GeometrySource, part: &GeoPart) -> bool {
    part.part_type == PartType::Volume
        && part.volume.as_ref().is_some_and(|info| {
            info.name.to_lowercase().contains("height") && info.is_float_grid()
        })
        && source.is_node_valid(part.key.geo_id)
}

/// Height range shared by every landscape output, from the bounds of their height volumes.
///
/// Starts at `(0, 0)` and only widens. Volumes whose bounds cannot be read are skipped.
pub fn calc_height_global_z_min_max(source: &dyn GeometrySource, outputs: &[LandscapeOutput]) -> (f32, f32) {
    let (mut global_min, mut global_max) = (0.0f32, 0.0f32);
    for output in outputs {
        for part in output.parts.iter().filter(|p| is_valid_height_part(source, p)) {
            if let Err(err) = source.volume_info(part.key) {
                debug!("Skipping {:?} in the global height range: {err}", part.key);
                continue;
            }
            match source.volume_bounds(part.key) {
                Ok(bounds) => {
                    global_min = global_min.min(bounds.y_min);
                    global_max = global_max.max(bounds.y_max);
                }
                Err(err) => debug!("Skipping {:?} in the global height range: {err}", part.key),
            }
        }
        if global_min > global_max {
            global_min = 0.0;
            global_max = 0.0;
        }
    }
    (global_min, global_max)
}

/// Per-volume-name ranges over every single-channel volume of one output.
pub fn calc_heightfields_global_z_min_max(source: &dyn GeometrySource, parts: &[GeoPart]) -> GlobalLayerRanges {
    let mut ranges = GlobalLayerRanges::default();
    for part in parts {
        if part.volume.as_ref().is_none_or(|info| info.tuple_size != 1) || part.key.geo_id == -1 {
            continue;
        }
        let Ok(info) = source.volume_info(part.key) else {
            continue;
        };
        let Ok(bounds) = source.volume_bounds(part.key) else {
            continue;
        };
        ranges.include(&info.name, bounds.y_min, bounds.y_max);
    }
    ranges
}

/// Builds and updates landscapes for generator outputs, one binding map per output
#[derive(Resource)]
pub struct LandscapeTranslator {
    pub config: MarshallingConfig,
    /// Naming of the produced packages, the part and split are filled in per tile
    pub package_params: PackageParams,
    bindings: HashMap<OutputId, BTreeMap<OutputObjectIdentifier, Binding>>,
    rng: StdRng,
}

impl LandscapeTranslator {
    pub fn new(config: MarshallingConfig, package_params: PackageParams) -> Self {
        Self::with_seed(config, package_params, rand::random())
    }

    /// Translator with a deterministic GUID sequence.
    pub fn with_seed(config: MarshallingConfig, mut package_params: PackageParams, seed: u64) -> Self {
        package_params.mode = config.package_mode;
        if package_params.temp_cook_folder.is_empty() {
            package_params.temp_cook_folder = config.temporary_cook_folder.clone();
        }
        if package_params.bake_folder.is_empty() {
            package_params.bake_folder = config.bake_folder.clone();
        }
        Self {
            config,
            package_params,
            bindings: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Swap in a new config. Package folders that came from the old config follow it.
    pub fn set_config(&mut self, config: MarshallingConfig) {
        let params = &mut self.package_params;
        params.mode = config.package_mode;
        if params.temp_cook_folder == self.config.temporary_cook_folder {
            params.temp_cook_folder = config.temporary_cook_folder.clone();
        }
        if params.bake_folder == self.config.bake_folder {
            params.bake_folder = config.bake_folder.clone();
        }
        self.config = config;
    }

    /// Bindings of an output after its last cook.
    pub fn bindings(&self, output: OutputId) -> Option<&BTreeMap<OutputObjectIdentifier, Binding>> {
        self.bindings.get(&output)
    }

    /// Outputs with bindings, ascending.
    pub fn bound_outputs(&self) -> Vec<OutputId> {
        let mut ids: Vec<_> = self.bindings.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Every landscape bound to any output.
    pub fn bound_landscapes(&self) -> Vec<LandscapeId> {
        let mut ids: Vec<_> = self
            .bindings
            .values()
            .flat_map(|objects| objects.values().map(Binding::landscape))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Read one tile of `output` from the source.
    ///
    /// Fails only when the height volume is missing or unreadable. Layers that cannot be
    /// read are skipped.
    pub fn prepare_tile(
        &self,
        source: &dyn GeometrySource,
        output: &LandscapeOutput,
        global_range: (f32, f32),
    ) -> Result<PreparedTile> {
        let height_part = find_height_volume(&output.parts)?;
        let height = read_float_samples(source, height_part)?;

        let height_range = if global_range.0 != global_range.1 {
            global_range
        } else {
            (height.min, height.max)
        };

        // landscape X runs along the volume's Y axis
        let size = solve_landscape_size(height.volume.y_length, height.volume.x_length)?;

        let mut layers = Vec::new();
        for part in find_layer_volumes(source, &output.parts, height_part) {
            if !source.is_node_valid(part.key.geo_id) {
                continue;
            }
            match read_float_samples(source, part) {
                Ok(heightfield) => layers.push(LayerSample {
                    name: heightfield.volume.name.clone(),
                    unit_range: is_unit_landscape_layer(source, part.key),
                    has_geo_changed: part.has_geo_changed,
                    heightfield,
                }),
                Err(err) => warn!("Skipping layer {}: {err}", part.name),
            }
        }

        let non_weight_blended = read_non_weight_blended_layer_names(source, height_part.key).unwrap_or_else(|err| {
            warn!("Could not read non weight blended layers: {err}");
            Vec::new()
        });

        Ok(PreparedTile {
            output: output.id,
            owned_by_asset: output.owned_by_asset,
            identifier: OutputObjectIdentifier::heightfield(height_part.key),
            has_geo_changed: height_part.has_geo_changed,
            height_range,
            size,
            layers,
            layer_ranges: calc_heightfields_global_z_min_max(source, &output.parts),
            attributes: TileAttributes {
                non_weight_blended,
                materials: read_landscape_materials(source, height_part.key),
                streaming_proxy: read_streaming_proxy_flag(source, height_part.key),
                tags: read_tags(source, height_part.key),
                component_extent: read_component_extent(source, height_part.key),
                tile_index: read_tile_index(source, height_part.key),
            },
            height,
        })
    }

    /// Convert a prepared tile. Touches no shared state.
    pub fn convert_tile(tile: PreparedTile, config: &MarshallingConfig) -> Result<ConvertedTile> {
        let height = convert_height_data(
            &tile.height.samples,
            &tile.height.volume,
            &tile.size,
            tile.height_range.0,
            tile.height_range.1,
            config,
        )?;
        let layers = convert_landscape_layers(&tile.layers, &tile.layer_ranges, &tile.size, config.resize_policy);

        Ok(ConvertedTile {
            output: tile.output,
            owned_by_asset: tile.owned_by_asset,
            identifier: tile.identifier,
            has_geo_changed: tile.has_geo_changed,
            size: tile.size,
            height,
            layers,
            attributes: tile.attributes,
        })
    }

    fn tile_package_params(&self, part: PartKey) -> PackageParams {
        self.package_params
            .clone()
            .with_part(part)
            .with_split(HEIGHTFIELD_SPLIT)
    }

    /// An input landscape of the same size, removed from `inputs_to_update` when found.
    fn take_matching_input(
        host: &dyn LandscapeHost,
        size: &LandscapeSize,
        inputs_to_update: &mut Vec<LandscapeId>,
    ) -> Option<LandscapeId> {
        let index = inputs_to_update
            .iter()
            .position(|id| host.landscape_extent(*id).is_some_and(|extent| extent.matches(size)))?;
        Some(inputs_to_update.remove(index))
    }

    /// A landscape bound by the previous cook of this output that still fits.
    ///
    /// Owned and external bindings both qualify; only `valid_landscapes` are exempt.
    fn find_previous_landscape(
        &self,
        host: &dyn LandscapeHost,
        output: OutputId,
        size: &LandscapeSize,
        valid_landscapes: &[LandscapeId],
    ) -> Option<Binding> {
        self.bindings.get(&output)?.values().find_map(|binding| match binding {
            Binding::OwnedLandscape { landscape, .. } | Binding::ExternalLandscape(landscape)
                if !valid_landscapes.contains(landscape)
                    && host.landscape_extent(*landscape).is_some_and(|extent| extent.matches(size)) =>
            {
                Some(binding.clone())
            }
            _ => None,
        })
    }

    /// Bind a converted tile to a landscape, creating one if nothing can be reused.
    ///
    /// `inputs_to_update` are caller-supplied landscapes that may be updated in place; the
    /// one used is removed. Landscapes of the previous cook are reused when they fit and
    /// destroyed otherwise, except for `valid_landscapes`.
    pub fn commit_tile(
        &mut self,
        host: &mut dyn LandscapeHost,
        tile: ConvertedTile,
        inputs_to_update: &mut Vec<LandscapeId>,
        valid_landscapes: &[LandscapeId],
    ) -> Result<LandscapeId> {
        let size = tile.size;
        let output = tile.output;
        let identifier = tile.identifier.clone();
        let owned_by_asset = tile.owned_by_asset;
        let world_composition = self.config.world_composition;

        let input = Self::take_matching_input(host, &size, inputs_to_update);
        let previous = match input {
            Some(_) => None,
            None => self.find_previous_landscape(host, output, &size, valid_landscapes),
        };
        // a reused external landscape stays external
        let external = input.or(match previous {
            Some(Binding::ExternalLandscape(landscape)) => Some(landscape),
            _ => None,
        });

        let landscape = match input.or(previous.as_ref().map(Binding::landscape)) {
            Some(landscape) => {
                info!(
                    "Updating landscape {} ({}x{}) from {:?}",
                    landscape.0, size.size_x, size.size_y, identifier.part
                );
                self.update_landscape(host, landscape, tile)?;
                landscape
            }
            None => self.create_landscape(host, tile)?,
        };

        host.recreate_collision(landscape)?;

        self.cleanup_previous(host, output, landscape, valid_landscapes);

        let binding = if !owned_by_asset {
            Binding::PackageOnly {
                landscape,
                package: host.landscape_package(landscape).unwrap_or_default(),
            }
        } else if external.is_some() {
            Binding::ExternalLandscape(landscape)
        } else {
            Binding::OwnedLandscape {
                landscape,
                world_composition,
            }
        };
        self.bindings.entry(output).or_default().insert(identifier, binding);
        Ok(landscape)
    }

    fn create_landscape(&mut self, host: &mut dyn LandscapeHost, tile: ConvertedTile) -> Result<LandscapeId> {
        let ConvertedTile {
            identifier,
            size,
            height,
            layers,
            attributes,
            ..
        } = tile;

        let package_params = self.tile_package_params(identifier.part);
        let imports = create_or_update_landscape_layers(
            host,
            layers,
            &attributes.non_weight_blended,
            false,
            &package_params,
        );
        let visibility = imports
            .iter()
            .find(|layer| is_visibility_layer(&layer.name))
            .map(|layer| layer.layer_info);

        let mut tile_params = package_params;
        if self.config.world_composition
            && let Some(index) = attributes.tile_index.filter(|index| *index >= 0)
        {
            if tile_params.object_name.is_empty() {
                tile_params.object_name = tile_params.package_name();
            }
            tile_params.object_name.push_str(&format!("_Tile{index}"));
        }
        let rng = &mut self.rng;
        let package_name = tile_params.unique_package_name(
            |package| host.package_exists(package),
            || LandscapeGuid::new_random(&mut *rng).short(PACKAGE_GUID_LENGTH),
        )?;

        let request = LandscapeCreate {
            guid: LandscapeGuid::new_random(&mut self.rng),
            extent: size.extent(),
            sections_per_component: size.sections_per_component,
            quads_per_section: size.quads_per_section,
            heights_per_layer: HashMap::from([(LandscapeGuid::NIL, height.heights)]),
            layers_per_layer: HashMap::from([(LandscapeGuid::NIL, imports)]),
            alphamap_type: AlphamapImportType::Additive,
            transform: height.transform.transform,
            materials: attributes.materials,
            streaming_proxy: attributes.streaming_proxy,
            new_map_package: self.config.world_composition.then(|| package_name.clone()),
            package_name,
            static_lighting_lod: static_lighting_lod(size.size_x, size.size_y),
            component_extent: attributes.component_extent,
        };
        let landscape = host.create_landscape(request)?;

        if let Some(layer_info) = visibility {
            host.set_visibility_layer(landscape, layer_info)?;
        }
        if !attributes.tags.is_empty() {
            host.set_tags(landscape, &attributes.tags)?;
        }
        Ok(landscape)
    }

    fn update_landscape(&mut self, host: &mut dyn LandscapeHost, landscape: LandscapeId, tile: ConvertedTile) -> Result<()> {
        let extent = tile.size.extent();
        if tile.has_geo_changed {
            host.set_height_data(landscape, extent, &tile.height.heights)?;
            host.set_transform(landscape, &tile.height.transform.transform)?;
        }

        let package_params = self.tile_package_params(tile.identifier.part);
        let updated: Vec<ImportLayer> = create_or_update_landscape_layers(
            host,
            tile.layers,
            &tile.attributes.non_weight_blended,
            true,
            &package_params,
        );
        for layer in &updated {
            host.set_alpha_data(landscape, layer.layer_info, extent, &layer.weights)?;
            if is_visibility_layer(&layer.name) {
                host.set_visibility_layer(landscape, layer.layer_info)?;
            }
        }

        if host.materials(landscape).as_ref() != Some(&tile.attributes.materials) {
            host.set_materials(landscape, &tile.attributes.materials)?;
        }
        if !tile.attributes.tags.is_empty() {
            host.set_tags(landscape, &tile.attributes.tags)?;
        }
        Ok(())
    }

    /// Destroy landscapes of the previous cook that were neither reused nor supplied.
    fn cleanup_previous(
        &mut self,
        host: &mut dyn LandscapeHost,
        output: OutputId,
        kept: LandscapeId,
        valid_landscapes: &[LandscapeId],
    ) {
        let Some(previous) = self.bindings.get_mut(&output) else {
            return;
        };

        let mut cleaned = false;
        for binding in previous.values() {
            let (Binding::OwnedLandscape { landscape, .. } | Binding::ExternalLandscape(landscape)) = binding else {
                continue;
            };
            if *landscape == kept || valid_landscapes.contains(landscape) {
                continue;
            }
            cleaned = true;
            if host.landscape_extent(*landscape).is_none() {
                continue;
            }
            info!("Destroying orphaned landscape {}", landscape.0);
            if let Err(err) = host.destroy_landscape(*landscape) {
                warn!("Could not destroy landscape {}: {err}", landscape.0);
            }
        }

        if cleaned {
            previous.clear();
        }
    }

    /// Read, convert and commit one output in a single pass.
    pub fn create_all_landscapes_from_output(
        &mut self,
        source: &dyn GeometrySource,
        host: &mut dyn LandscapeHost,
        output: &LandscapeOutput,
        inputs_to_update: &mut Vec<LandscapeId>,
        valid_landscapes: &[LandscapeId],
        global_range: (f32, f32),
    ) -> Result<LandscapeId> {
        let prepared = self.prepare_tile(source, output, global_range)?;
        let converted = Self::convert_tile(prepared, &self.config)?;
        self.commit_tile(host, converted, inputs_to_update, valid_landscapes)
    }

    /// Cook every output against a shared height range.
    ///
    /// Outputs that were bound before but are absent now lose their landscapes. Results
    /// are returned per output in input order; a failed output leaves its previous
    /// bindings alone.
    pub fn cook_outputs(
        &mut self,
        source: &dyn GeometrySource,
        host: &mut dyn LandscapeHost,
        outputs: &[LandscapeOutput],
        inputs_to_update: &mut Vec<LandscapeId>,
        valid_landscapes: &[LandscapeId],
    ) -> Vec<(OutputId, Result<LandscapeId>)> {
        let present: HashSet<OutputId> = outputs.iter().map(|output| output.id).collect();
        for id in self.bound_outputs().into_iter().filter(|id| !present.contains(id)) {
            self.release_output(host, id);
        }

        let global_range = calc_height_global_z_min_max(source, outputs);
        outputs
            .iter()
            .map(|output| {
                let result = self.create_all_landscapes_from_output(
                    source,
                    host,
                    output,
                    inputs_to_update,
                    valid_landscapes,
                    global_range,
                );
                if let Err(err) = &result {
                    error!("Landscape output {} failed: {err}", output.id.0);
                }
                (output.id, result)
            })
            .collect()
    }

    /// Drop the bindings of one output, destroying the landscapes it owns.
    pub fn release_output(&mut self, host: &mut dyn LandscapeHost, output: OutputId) {
        let Some(objects) = self.bindings.remove(&output) else {
            return;
        };
        for binding in objects.values() {
            if let Binding::OwnedLandscape { landscape, .. } = binding
                && host.landscape_extent(*landscape).is_some()
            {
                info!("Destroying landscape {} of removed output {}", landscape.0, output.0);
                if let Err(err) = host.destroy_landscape(*landscape) {
                    warn!("Could not destroy landscape {}: {err}", landscape.0);
                }
            }
        }
    }

    /// Forget every binding before a full regenerate, destroying owned landscapes.
    pub fn invalidate(&mut self, host: &mut dyn LandscapeHost) {
        for output in self.bound_outputs() {
            self.release_output(host, output);
        }
    }
}

impl Default for LandscapeTranslator {
    fn default() -> Self {
        Self::new(MarshallingConfig::default(), PackageParams::default())
    }
}

/// Missing height volume, as reported by [`LandscapeTranslator::prepare_tile`]
pub fn is_missing_height_volume(err: &LandscapeError) -> bool {
    matches!(err, LandscapeError::NotFound(_))
}

/// Push changes of the [`MarshallingConfig`] resource into the translator before the next cook.
pub fn apply_config_changes(config: Res<MarshallingConfig>, mut translator: ResMut<LandscapeTranslator>) {
    if config.is_changed() {
        translator.set_config(config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageMode, ReplaceMode};
    use crate::reader::{ATTRIB_TAG_PREFIX, ATTRIB_TILE};
    use crate::registry::LandscapeRegistry;
    use crate::source::{AttributeOwner, AttributeValues, MemorySource, VolumeInfo};

    fn ramp(width: i32, height: i32, offset: f32) -> Vec<f32> {
        (0..width * height).map(|i| offset + i as f32 * 0.5).collect()
    }

    fn gradient(width: i32, height: i32) -> Vec<f32> {
        (0..width * height).map(|i| i as f32 / (width * height - 1) as f32).collect()
    }

    /// Height plus `grass` and `visibility` masks on one geo node.
    fn add_tile(source: &mut MemorySource, geo: i32, width: i32, height: i32, offset: f32) -> Vec<GeoPart> {
        vec![
            source.add_volume(
                PartKey::new(1, geo, 0),
                VolumeInfo::heightfield("height", width, height),
                ramp(width, height, offset),
            ),
            source.add_volume(
                PartKey::new(1, geo, 1),
                VolumeInfo::heightfield("grass", width, height),
                gradient(width, height),
            ),
            source.add_volume(
                PartKey::new(1, geo, 2),
                VolumeInfo::heightfield("visibility", width, height),
                gradient(width, height),
            ),
        ]
    }

    fn translator() -> LandscapeTranslator {
        LandscapeTranslator::with_seed(
            MarshallingConfig::default(),
            PackageParams::new("terrain"),
            11,
        )
    }

    fn cook(
        translator: &mut LandscapeTranslator,
        source: &MemorySource,
        registry: &mut LandscapeRegistry,
        output: &LandscapeOutput,
    ) -> Result<LandscapeId> {
        translator.create_all_landscapes_from_output(source, registry, output, &mut Vec::new(), &[], (0.0, 0.0))
    }

    #[test]
    fn test_first_cook_creates_landscape() {
        let mut source = MemorySource::new();
        let output = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 8, 8, 0.0));
        source.set_attribute(
            PartKey::new(1, 7, 0),
            format!("{ATTRIB_TAG_PREFIX}biome"),
            AttributeOwner::Prim,
            AttributeValues::String(vec!["alpine".to_string()]),
        );
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();

        let id = cook(&mut translator, &source, &mut registry, &output).unwrap();
        let record = registry.landscape(id).unwrap();
        assert_eq!(record.size(), UVec2::new(8, 8));
        assert_eq!(record.layers.len(), 2);
        assert_eq!(record.tags, vec!["alpine".to_string()]);
        assert_eq!(record.collision_revision, 1);
        assert_eq!(record.package_name, "/Game/HoudiniEngine/Temp/terrain/terrain_1_7_0_Heightfield");

        let visibility = record.visibility_layer.unwrap();
        assert!(registry.layer_info(visibility).unwrap().no_weight_blend);

        let bindings = translator.bindings(OutputId(1)).unwrap();
        assert_eq!(
            bindings.get(&OutputObjectIdentifier::heightfield(PartKey::new(1, 7, 0))),
            Some(&Binding::OwnedLandscape {
                landscape: id,
                world_composition: false
            })
        );
    }

    #[test]
    fn test_recook_reuses_and_skips_unchanged_data() {
        let mut source = MemorySource::new();
        let parts = add_tile(&mut source, 7, 8, 8, 0.0);
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();
        let first = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), parts.clone())).unwrap();

        let unchanged: Vec<GeoPart> = parts.iter().cloned().map(|p| p.with_geo_changed(false)).collect();
        let second = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), unchanged)).unwrap();
        assert_eq!(first, second);
        let record = registry.landscape(second).unwrap();
        assert_eq!(record.height_writes, 1);
        assert_eq!(record.alpha_writes, 0);
        assert_eq!(record.collision_revision, 2);

        let third = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), parts)).unwrap();
        assert_eq!(first, third);
        let record = registry.landscape(third).unwrap();
        assert_eq!(record.height_writes, 2);
        assert_eq!(record.alpha_writes, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_size_change_recreates_and_destroys_orphan() {
        let mut source = MemorySource::new();
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();
        let small = add_tile(&mut source, 7, 8, 8, 0.0);
        let first = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), small)).unwrap();

        source.clear();
        let large = add_tile(&mut source, 7, 16, 16, 0.0);
        let second = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), large)).unwrap();

        assert_ne!(first, second);
        assert!(registry.landscape(first).is_none());
        assert_eq!(registry.landscape_ids(), vec![second]);
        assert_eq!(translator.bindings(OutputId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_external_landscape_is_updated_not_destroyed() {
        let mut source = MemorySource::new();
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();
        let input_parts = add_tile(&mut source, 3, 8, 8, 0.0);
        let input = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(9), input_parts)).unwrap();

        let output = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 8, 8, 5.0));
        let mut inputs = vec![input];
        let bound = translator
            .create_all_landscapes_from_output(&source, &mut registry, &output, &mut inputs, &[input], (0.0, 0.0))
            .unwrap();

        assert_eq!(bound, input);
        assert!(inputs.is_empty());
        assert_eq!(
            translator.bindings(OutputId(1)).unwrap().values().next(),
            Some(&Binding::ExternalLandscape(input))
        );

        // a second output of the same size can no longer claim it
        let other = LandscapeOutput::new(OutputId(2), add_tile(&mut source, 8, 8, 8, 1.0));
        let created = translator
            .create_all_landscapes_from_output(&source, &mut registry, &other, &mut inputs, &[input], (0.0, 0.0))
            .unwrap();
        assert_ne!(created, input);
        assert!(registry.landscape(input).is_some());
    }

    /// Binds a landscape cooked by another translator to output 1 as an external input.
    fn bind_external(
        translator: &mut LandscapeTranslator,
        source: &mut MemorySource,
        registry: &mut LandscapeRegistry,
    ) -> LandscapeId {
        let input_parts = add_tile(source, 3, 8, 8, 0.0);
        let input = cook(&mut self::translator(), source, registry, &LandscapeOutput::new(OutputId(9), input_parts)).unwrap();

        let output = LandscapeOutput::new(OutputId(1), add_tile(source, 7, 8, 8, 5.0));
        let bound = translator
            .create_all_landscapes_from_output(&*source, &mut *registry, &output, &mut vec![input], &[input], (0.0, 0.0))
            .unwrap();
        assert_eq!(bound, input);
        input
    }

    #[test]
    fn test_unsupplied_external_landscape_is_reused() {
        let mut source = MemorySource::new();
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();
        let input = bind_external(&mut translator, &mut source, &mut registry);

        let output = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 8, 8, 5.0));
        let recooked = cook(&mut translator, &source, &mut registry, &output).unwrap();

        assert_eq!(recooked, input);
        assert_eq!(registry.landscape_ids(), vec![input]);
        assert_eq!(
            translator.bindings(OutputId(1)).unwrap().values().next(),
            Some(&Binding::ExternalLandscape(input))
        );
    }

    #[test]
    fn test_unsupplied_external_landscape_is_destroyed_when_it_no_longer_fits() {
        let mut source = MemorySource::new();
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();
        let input = bind_external(&mut translator, &mut source, &mut registry);

        source.clear();
        let output = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 16, 16, 5.0));
        let recooked = cook(&mut translator, &source, &mut registry, &output).unwrap();

        assert_ne!(recooked, input);
        assert!(registry.landscape(input).is_none());
        assert_eq!(registry.landscape_ids(), vec![recooked]);
        assert_eq!(translator.bindings(OutputId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_new_assets_never_share_a_package() {
        let mut source = MemorySource::new();
        let parts = add_tile(&mut source, 7, 8, 8, 0.0);
        let mut params = PackageParams::new("terrain");
        params.replace_mode = ReplaceMode::CreateNewAssets;
        let mut translator = LandscapeTranslator::with_seed(MarshallingConfig::default(), params, 3);
        let mut registry = LandscapeRegistry::default();

        let a = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), parts.clone())).unwrap();
        let b = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(2), parts)).unwrap();

        let first = registry.landscape(a).unwrap().package_name.clone();
        let second = registry.landscape(b).unwrap().package_name.clone();
        assert_eq!(first, "/Game/HoudiniEngine/Temp/terrain/terrain_1_7_0_Heightfield");
        assert_ne!(first, second);
        assert!(second.starts_with(&format!("{first}_")));
    }

    #[test]
    fn test_missing_height_volume_aborts_tile() {
        let mut source = MemorySource::new();
        let parts = vec![source.add_volume(
            PartKey::new(1, 7, 1),
            VolumeInfo::heightfield("mask", 8, 8),
            gradient(8, 8),
        )];
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();

        let err = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), parts)).unwrap_err();
        assert!(is_missing_height_volume(&err));
        assert!(registry.is_empty());
        assert!(translator.bindings(OutputId(1)).is_none());
    }

    #[test]
    fn test_global_range_spans_outputs() {
        let mut source = MemorySource::new();
        let a = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 8, 8, -10.0));
        let b = LandscapeOutput::new(OutputId(2), add_tile(&mut source, 8, 8, 8, 5.0));

        let global = calc_height_global_z_min_max(&source, &[a.clone(), b.clone()]);
        assert_eq!(global, (-10.0, 5.0 + 63.0 * 0.5));

        // positive-only heights still start from zero
        assert_eq!(calc_height_global_z_min_max(&source, &[b]), (0.0, 36.5));

        let tile = translator().prepare_tile(&source, &a, global).unwrap();
        assert_eq!(tile.height_range, (-10.0, 36.5));
        assert_eq!((tile.height.min, tile.height.max), (-10.0, 21.5));

        let local = translator().prepare_tile(&source, &a, (0.0, 0.0)).unwrap();
        assert_eq!(local.height_range, (-10.0, 21.5));
    }

    #[test]
    fn test_per_name_ranges() {
        let mut source = MemorySource::new();
        let parts = add_tile(&mut source, 7, 8, 8, 2.0);
        let ranges = calc_heightfields_global_z_min_max(&source, &parts);
        assert_eq!(ranges.minimums.get("height"), Some(&2.0));
        assert_eq!(ranges.maximums.get("grass"), Some(&1.0));
    }

    #[test]
    fn test_world_composition_tiles() {
        let mut source = MemorySource::new();
        let parts = add_tile(&mut source, 7, 8, 8, 0.0);
        for part in &parts {
            source.set_attribute(part.key, ATTRIB_TILE, AttributeOwner::Prim, AttributeValues::Int(vec![3]));
        }
        let config = MarshallingConfig::builder().world_composition(true).build();
        let mut translator = LandscapeTranslator::with_seed(config, PackageParams::new("terrain"), 5);
        let mut registry = LandscapeRegistry::default();

        let id = cook(&mut translator, &source, &mut registry, &LandscapeOutput::new(OutputId(1), parts)).unwrap();
        let record = registry.landscape(id).unwrap();
        assert!(record.package_name.ends_with("terrain_1_7_0_Heightfield_Tile3"));
        assert_eq!(record.map_package.as_deref(), Some(record.package_name.as_str()));
        assert_eq!(
            translator.bindings(OutputId(1)).unwrap().values().next(),
            Some(&Binding::OwnedLandscape {
                landscape: id,
                world_composition: true
            })
        );
    }

    #[test]
    fn test_importer_output_records_package() {
        let mut source = MemorySource::new();
        let mut output = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 8, 8, 0.0));
        output.owned_by_asset = false;
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();

        let id = cook(&mut translator, &source, &mut registry, &output).unwrap();
        match translator.bindings(OutputId(1)).unwrap().values().next() {
            Some(Binding::PackageOnly { landscape, package }) => {
                assert_eq!(*landscape, id);
                assert_eq!(package, &registry.landscape(id).unwrap().package_name);
            }
            other => panic!("unexpected binding {other:?}"),
        }
    }

    #[test]
    fn test_cook_outputs_releases_removed_outputs() {
        let mut source = MemorySource::new();
        let a = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 8, 8, 0.0));
        let b = LandscapeOutput::new(OutputId(2), add_tile(&mut source, 8, 8, 8, 0.0));
        let mut registry = LandscapeRegistry::default();
        let mut translator = translator();

        let results = translator.cook_outputs(&source, &mut registry, &[a.clone(), b], &mut Vec::new(), &[]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(registry.len(), 2);

        translator.cook_outputs(&source, &mut registry, &[a], &mut Vec::new(), &[]);
        assert_eq!(registry.len(), 1);
        assert!(translator.bindings(OutputId(2)).is_none());

        translator.invalidate(&mut registry);
        assert!(registry.is_empty());
        assert!(translator.bound_landscapes().is_empty());
    }

    #[test]
    fn test_convert_tile_is_detached_from_translator() {
        let mut source = MemorySource::new();
        let output = LandscapeOutput::new(OutputId(1), add_tile(&mut source, 7, 9, 9, 0.0));
        let translator = translator();
        let prepared = translator.prepare_tile(&source, &output, (0.0, 0.0)).unwrap();
        assert_eq!(prepared.size.size_x, 15);

        let converted = std::thread::spawn(move || LandscapeTranslator::convert_tile(prepared, &MarshallingConfig::default()))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(converted.height.heights.len(), 15 * 15);
        assert_eq!(converted.layers.len(), 2);
        assert!(converted.layers.iter().all(|l| l.weights.len() == 15 * 15));
    }

    #[test]
    fn test_config_resource_changes_reach_the_translator() {
        let mut app = App::new();
        app.insert_resource(MarshallingConfig::default())
            .insert_resource(translator())
            .add_systems(Update, apply_config_changes);
        app.update();

        {
            let mut config = app.world_mut().resource_mut::<MarshallingConfig>();
            config.world_composition = true;
            config.package_mode = PackageMode::Bake;
            config.bake_folder = "/Game/Baked".to_string();
        }
        app.update();

        let translator = app.world().resource::<LandscapeTranslator>();
        assert!(translator.config.world_composition);
        assert_eq!(translator.package_params.mode, PackageMode::Bake);
        assert_eq!(translator.package_params.bake_folder, "/Game/Baked");
    }
}
