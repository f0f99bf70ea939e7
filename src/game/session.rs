//! Procedural stand-in for a Houdini session.
//!
//! Cooks a grid of heightfield tiles from noise, the way a tiled heightfield network
//! would, and hands them to the landscape plugin.

use bevy::prelude::*;
use bevy_houdini_landscape::cook::CookRequest;
use bevy_houdini_landscape::prelude::*;
use bevy_houdini_landscape::reader::{
    ATTRIB_MATERIAL, ATTRIB_NON_WEIGHT_BLENDED_PREFIX, ATTRIB_TAG_PREFIX, ATTRIB_TILE, ATTRIB_UNIT_LANDSCAPE_LAYER,
};
use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Object node every tile lives under
const OBJECT_ID: i32 = 1;

pub struct SessionPlugin;

impl Plugin for SessionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SessionSettings>()
            .insert_resource(SessionRng(StdRng::seed_from_u64(7)))
            .add_systems(Startup, start_session)
            .add_systems(Update, session_controls);
    }
}

/// Shape of the cooked tile grid
#[derive(Resource, Clone, Debug)]
pub struct SessionSettings {
    pub seed: i32,
    /// Tile count along X and Y
    pub tiles: UVec2,
    /// Samples per tile edge, shared with the neighbouring tile
    pub tile_samples: i32,
    /// Meters between samples
    pub voxel_size: f32,
    pub max_height: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            tiles: UVec2::new(2, 2),
            tile_samples: 128,
            voxel_size: 1.0,
            max_height: 60.0,
        }
    }
}

#[derive(Resource)]
struct SessionRng(StdRng);

/// Outputs of the last session cook
#[derive(Resource, Default)]
pub struct SessionOutputs(pub Vec<LandscapeOutput>);

/// Noise layers driving height and masks
pub struct SessionNoise {
    pub height: FastNoiseLite,
    pub ridges: FastNoiseLite,
    pub moisture: FastNoiseLite,
}

impl SessionNoise {
    pub fn with_seed(seed: i32) -> Self {
        let mut height = FastNoiseLite::with_seed(seed);
        height.set_noise_type(Some(NoiseType::OpenSimplex2S));
        height.set_frequency(Some(0.006));
        height.set_fractal_type(Some(FractalType::FBm));
        height.set_fractal_octaves(Some(5));

        let mut ridges = FastNoiseLite::with_seed(seed + 17);
        ridges.set_noise_type(Some(NoiseType::OpenSimplex2));
        ridges.set_frequency(Some(0.01));
        ridges.set_fractal_type(Some(FractalType::Ridged));
        ridges.set_fractal_octaves(Some(3));

        let mut moisture = FastNoiseLite::with_seed(seed + 101);
        moisture.set_noise_type(Some(NoiseType::OpenSimplex2S));
        moisture.set_frequency(Some(0.015));

        Self {
            height,
            ridges,
            moisture,
        }
    }

    fn height(&self, x: f32, y: f32, max_height: f32) -> f32 {
        let base = (self.height.get_noise_2d(x, y) + 1.0) * 0.5;
        let ridge = self.ridges.get_noise_2d(x, y).max(0.0);
        (base * 0.7 + ridge * base * 0.3) * max_height
    }
}

/// Per-tile sample buffers, X fastest
struct TileSamples {
    height: Vec<f32>,
    grass: Vec<f32>,
    rock: Vec<f32>,
    visibility: Vec<f32>,
}

fn sample_tile(noise: &SessionNoise, settings: &SessionSettings, tile: UVec2) -> TileSamples {
    let n = settings.tile_samples;
    let count = (n * n) as usize;
    let mut samples = TileSamples {
        height: Vec::with_capacity(count),
        grass: Vec::with_capacity(count),
        rock: Vec::with_capacity(count),
        visibility: Vec::with_capacity(count),
    };

    let grid = settings.tiles.as_vec2() * (n - 1) as f32;
    let crater = grid * 0.5;
    let crater_radius = (n as f32 * 0.08).max(2.0);

    for y in 0..n {
        for x in 0..n {
            // neighbouring tiles share their edge samples
            let gx = (tile.x as i32 * (n - 1) + x) as f32;
            let gy = (tile.y as i32 * (n - 1) + y) as f32;
            let (wx, wy) = (gx * settings.voxel_size, gy * settings.voxel_size);

            let h = noise.height(wx, wy, settings.max_height);
            let slope = (noise.height(wx + settings.voxel_size, wy, settings.max_height) - h).abs()
                + (noise.height(wx, wy + settings.voxel_size, settings.max_height) - h).abs();
            let wet = (noise.moisture.get_noise_2d(wx, wy) + 1.0) * 0.5;

            samples.height.push(h);
            samples.rock.push((slope / settings.voxel_size).clamp(0.0, 1.0));
            samples.grass.push((wet * (1.0 - h / settings.max_height)).clamp(0.0, 1.0));
            let hole = Vec2::new(gx, gy).distance(crater) < crater_radius;
            samples.visibility.push(if hole { 1.0 } else { 0.0 });
        }
    }
    samples
}

/// Cook the tile grid into a geometry source and one output per tile.
pub fn build_session(settings: &SessionSettings) -> (MemorySource, Vec<LandscapeOutput>) {
    let noise = SessionNoise::with_seed(settings.seed);
    let mut source = MemorySource::new();
    let mut outputs = Vec::new();

    let n = settings.tile_samples;
    // heightfield volumes are scaled to half their voxel size
    let half_voxel = settings.voxel_size * 0.5;
    let tile_span_cm = (n - 1) as f32 * settings.voxel_size * 100.0;

    for ty in 0..settings.tiles.y {
        for tx in 0..settings.tiles.x {
            let index = (ty * settings.tiles.x + tx) as i32;
            let geo_id = index + 1;
            let samples = sample_tile(&noise, settings, UVec2::new(tx, ty));
            let transform = Transform {
                translation: Vec3::new(tx as f32 * tile_span_cm, ty as f32 * tile_span_cm, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::new(half_voxel, half_voxel, 0.5),
            };

            let volumes = [
                ("height", samples.height),
                ("grass", samples.grass),
                ("rock", samples.rock),
                ("visibility", samples.visibility),
            ];
            let mut parts = Vec::with_capacity(volumes.len());
            for (part_id, (name, values)) in volumes.into_iter().enumerate() {
                let key = PartKey::new(OBJECT_ID, geo_id, part_id as i32);
                let info = VolumeInfo::heightfield(name, n, n).with_transform(transform);
                parts.push(source.add_volume(key, info, values));
                source.set_attribute(key, ATTRIB_TILE, AttributeOwner::Prim, AttributeValues::Int(vec![index]));
            }

            let height = PartKey::new(OBJECT_ID, geo_id, 0);
            source.set_attribute(
                height,
                ATTRIB_MATERIAL,
                AttributeOwner::Prim,
                AttributeValues::String(vec![format!("/Game/Landscape/M_Tile{}", index % 2)]),
            );
            source.set_attribute(
                height,
                format!("{ATTRIB_TAG_PREFIX}biome"),
                AttributeOwner::Prim,
                AttributeValues::String(vec!["temperate".to_string()]),
            );
            source.set_attribute(
                height,
                ATTRIB_NON_WEIGHT_BLENDED_PREFIX,
                AttributeOwner::Detail,
                AttributeValues::String(vec!["rock".to_string()]),
            );
            source.set_attribute(
                PartKey::new(OBJECT_ID, geo_id, 1),
                ATTRIB_UNIT_LANDSCAPE_LAYER,
                AttributeOwner::Prim,
                AttributeValues::Int(vec![1]),
            );

            outputs.push(LandscapeOutput::new(OutputId(index as u32), parts));
        }
    }
    (source, outputs)
}

fn cook_session(commands: &mut Commands, cook: &mut LandscapeCook, settings: &SessionSettings) {
    let (source, outputs) = build_session(settings);
    info!(
        "Cooked session seed {} into {} tiles",
        settings.seed,
        outputs.len()
    );
    cook.request(CookRequest {
        outputs: outputs.clone(),
        ..Default::default()
    });
    commands.insert_resource(LandscapeSource(Box::new(source)));
    commands.insert_resource(SessionOutputs(outputs));
}

fn start_session(mut commands: Commands, mut cook: ResMut<LandscapeCook>, settings: Res<SessionSettings>) {
    cook_session(&mut commands, &mut cook, &settings);
}

/// R reseeds and recooks, I drops every landscape and recooks, C toggles world composition.
fn session_controls(
    mut commands: Commands,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut settings: ResMut<SessionSettings>,
    mut rng: ResMut<SessionRng>,
    mut cook: ResMut<LandscapeCook>,
    mut config: ResMut<MarshallingConfig>,
    mut translator: ResMut<LandscapeTranslator>,
    mut registry: ResMut<LandscapeRegistry>,
) {
    if !cook.is_idle() {
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyR) {
        settings.seed = rng.0.random_range(0..i32::MAX / 2);
        cook_session(&mut commands, &mut cook, &settings);
    } else if keyboard.just_pressed(KeyCode::KeyI) {
        translator.invalidate(&mut *registry);
        cook_session(&mut commands, &mut cook, &settings);
    } else if keyboard.just_pressed(KeyCode::KeyC) {
        let enabled = !config.world_composition;
        config.world_composition = enabled;
        info!("World composition {}", if enabled { "on" } else { "off" });
        translator.invalidate(&mut *registry);
        cook_session(&mut commands, &mut cook, &settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SessionSettings {
        SessionSettings {
            tiles: UVec2::new(2, 1),
            tile_samples: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_output_per_tile() {
        let (source, outputs) = build_session(&small());
        assert_eq!(outputs.len(), 2);
        for output in &outputs {
            assert_eq!(output.parts.len(), 4);
            let height = output.parts[0].key;
            assert_eq!(source.heightfield_data(height).unwrap().len(), 16 * 16);
        }
    }

    #[test]
    fn test_tiles_share_edges() {
        let (source, outputs) = build_session(&small());
        let left = source.heightfield_data(outputs[0].parts[0].key).unwrap();
        let right = source.heightfield_data(outputs[1].parts[0].key).unwrap();
        for y in 0..16 {
            assert_eq!(left[y * 16 + 15], right[y * 16]);
        }
    }

    #[test]
    fn test_same_seed_same_heights() {
        let (a, outputs) = build_session(&small());
        let (b, _) = build_session(&small());
        let key = outputs[1].parts[0].key;
        assert_eq!(a.heightfield_data(key).unwrap(), b.heightfield_data(key).unwrap());
    }
}
