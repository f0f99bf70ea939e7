//! Paint layer management
//!
//! Mask volumes become uint8 weight layers. Each layer gets a layer-info object on the
//! host, scoped by a package derived from the layer name and part id, and the range used
//! to quantize it is stored in a side table so the original values can be recovered.

use crate::config::ResizePolicy;
use crate::convert::{check_layer_range, convert_layer_data, layer_digit};
use crate::host::{ImportLayer, LandscapeHost, LayerInfoId};
use crate::package::{PackageParams, sanitize_object_name, sanitize_package_name};
use crate::reader::LayerSample;
use crate::size::LandscapeSize;
use bevy::log::{debug, warn};
use std::collections::HashMap;

/// Name of the layer that drives landscape hole visibility
pub const VISIBILITY_LAYER_NAME: &str = "visibility";

/// Range a layer was quantized with
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerQuantizationParams {
    pub min: f32,
    pub max: f32,
    /// Source units per digit
    pub spacing: f32,
}

impl LayerQuantizationParams {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            spacing: (max - min) / 255.0,
        }
    }

    pub fn to_digit(&self, value: f32) -> u8 {
        layer_digit(value, self.min, self.max)
    }

    /// Recover the source value of a weight.
    pub fn to_value(&self, digit: u8) -> f32 {
        self.min + digit as f32 * self.spacing
    }
}

/// Quantization parameters keyed by layer-info object
#[derive(Clone, Debug, Default)]
pub struct LayerQuantizationTable {
    params: HashMap<LayerInfoId, LayerQuantizationParams>,
}

impl LayerQuantizationTable {
    pub fn insert(&mut self, layer_info: LayerInfoId, params: LayerQuantizationParams) {
        self.params.insert(layer_info, params);
    }

    pub fn get(&self, layer_info: LayerInfoId) -> Option<LayerQuantizationParams> {
        self.params.get(&layer_info).copied()
    }

    pub fn remove(&mut self, layer_info: LayerInfoId) -> Option<LayerQuantizationParams> {
        self.params.remove(&layer_info)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Per-volume-name ranges shared by every tile of an output
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlobalLayerRanges {
    pub minimums: HashMap<String, f32>,
    pub maximums: HashMap<String, f32>,
}

impl GlobalLayerRanges {
    /// Widen the range of `name` to include `[min, max]`.
    pub fn include(&mut self, name: &str, min: f32, max: f32) {
        self.minimums
            .entry(name.to_string())
            .and_modify(|m| *m = m.min(min))
            .or_insert(min);
        self.maximums
            .entry(name.to_string())
            .and_modify(|m| *m = m.max(max))
            .or_insert(max);
    }

    /// Replace an observed range with the shared one, bound by bound.
    pub fn resolve(&self, name: &str, observed_min: f32, observed_max: f32) -> (f32, f32) {
        (
            self.minimums.get(name).copied().unwrap_or(observed_min),
            self.maximums.get(name).copied().unwrap_or(observed_max),
        )
    }
}

pub fn is_visibility_layer(name: &str) -> bool {
    name.eq_ignore_ascii_case(VISIBILITY_LAYER_NAME)
}

/// A layer converted to landscape weights, not yet bound to a layer-info object
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedLayer {
    /// Sanitized layer name
    pub name: String,
    pub part_id: i32,
    pub weights: Vec<u8>,
    pub quantization: LayerQuantizationParams,
    pub has_geo_changed: bool,
}

/// Convert every informative layer of a tile.
///
/// Flat masks are dropped. Unit layers use `[0, 1]`, the others the shared range of
/// their volume name when there is one. A layer that fails to convert is skipped.
pub fn convert_landscape_layers(
    layers: &[LayerSample],
    ranges: &GlobalLayerRanges,
    size: &LandscapeSize,
    policy: ResizePolicy,
) -> Vec<ConvertedLayer> {
    let mut converted = Vec::with_capacity(layers.len());
    for layer in layers {
        let heightfield = &layer.heightfield;
        if let Err(err) = check_layer_range(&layer.name, heightfield.min, heightfield.max) {
            debug!("Skipping flat layer: {err}");
            continue;
        }

        let (min, max) = if layer.unit_range {
            (0.0, 1.0)
        } else {
            ranges.resolve(&layer.name, heightfield.min, heightfield.max)
        };

        let weights = match convert_layer_data(&heightfield.samples, &heightfield.volume, min, max, size, policy) {
            Ok(weights) => weights,
            Err(err) => {
                warn!("Skipping layer {}: {err}", layer.name);
                continue;
            }
        };

        converted.push(ConvertedLayer {
            name: sanitize_object_name(&layer.name),
            part_id: heightfield.part.part_id,
            weights,
            quantization: LayerQuantizationParams::new(min, max),
            has_geo_changed: layer.has_geo_changed,
        });
    }
    converted
}

/// Bind converted layers to layer-info objects on the host.
///
/// On update only layers whose geometry changed are returned. Listed names and the
/// visibility layer are flagged no-weight-blend, every other layer is cleared.
pub fn create_or_update_landscape_layers(
    host: &mut dyn LandscapeHost,
    layers: Vec<ConvertedLayer>,
    non_weight_blended: &[String],
    is_update: bool,
    package_params: &PackageParams,
) -> Vec<ImportLayer> {
    let mut layer_params = package_params.clone();
    layer_params.object_name.clear();

    let mut imports = Vec::with_capacity(layers.len());
    for layer in layers {
        if is_update && !layer.has_geo_changed {
            continue;
        }

        layer_params.split = sanitize_package_name(&format!("{}_{}", layer.name, layer.part_id));
        let layer_info = match host.find_or_create_layer_info(
            &layer.name,
            &layer_params.package_path(),
            &layer_params.package_name(),
        ) {
            Ok(id) => id,
            Err(err) => {
                warn!("Could not create layer info for {}: {err}", layer.name);
                continue;
            }
        };

        if let Err(err) = host.set_layer_quantization(layer_info, layer.quantization) {
            warn!("Could not store the range of layer {}: {err}", layer.name);
        }

        let no_weight_blend = non_weight_blended.contains(&layer.name) || is_visibility_layer(&layer.name);
        if let Err(err) = host.set_no_weight_blend(layer_info, no_weight_blend) {
            warn!("Could not set weight blending of layer {}: {err}", layer.name);
        }

        imports.push(ImportLayer {
            name: layer.name,
            layer_info,
            weights: layer.weights,
        });
    }
    imports
}
