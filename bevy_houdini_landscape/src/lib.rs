//! # bevy_houdini_landscape
//!
//! Turns heightfield volumes cooked by a procedural generator into landscapes:
//! - Height and paint layer quantization onto landscape digits
//! - Landscape size solving and grid resampling/padding
//! - Landscape transforms matching the source volume placement
//! - Create, reuse and cleanup of landscapes per output across cooks
//! - Async cook passes on Bevy's task pools
//! - A Bevy landscape host with mesh rendering
//! - Optional Rapier physics integration (feature-gated)

use bevy::prelude::*;
use host::LandscapeId;

pub mod config;
pub mod convert;
pub mod cook;
pub mod error;
pub mod host;
pub mod layers;
pub mod material;
pub mod mesh;
pub mod package;
#[cfg(feature = "rapier")]
pub mod physics;
pub mod reader;
pub mod registry;
pub mod size;
pub mod source;
pub mod translator;

pub mod prelude {
    pub use crate::config::{MarshallingConfig, MarshallingConfigBuilder, ResizePolicy};
    pub use crate::cook::{CookRequest, LandscapeCook, LandscapeSource};
    pub use crate::error::{LandscapeError, Result};
    pub use crate::host::{LandscapeHost, LandscapeId, LayerInfoId};
    pub use crate::package::{PackageMode, PackageParams};
    pub use crate::registry::LandscapeRegistry;
    pub use crate::source::{
        AttributeOwner, AttributeValues, GeoPart, GeometrySource, MemorySource, PartKey, VolumeInfo,
    };
    pub use crate::translator::{Binding, LandscapeOutput, LandscapeTranslator, OutputId};
    pub use crate::{Landscape, LandscapePlugin};

    #[cfg(feature = "rapier")]
    pub use crate::physics::LandscapeCollider;
}

/// Main landscape plugin that sets up the cook and host systems
#[derive(Default)]
pub struct LandscapePlugin {
    /// Configuration for heightfield marshalling
    pub config: config::MarshallingConfig,
    /// Naming of the landscapes and layer infos the plugin creates
    pub package_params: package::PackageParams,
}

impl LandscapePlugin {
    pub fn new(config: config::MarshallingConfig, package_params: package::PackageParams) -> Self {
        Self { config, package_params }
    }

    /// Create a landscape plugin using a builder pattern
    pub fn builder() -> LandscapePluginBuilder {
        LandscapePluginBuilder::default()
    }
}

impl Plugin for LandscapePlugin {
    fn build(&self, app: &mut App) {
        let translator = translator::LandscapeTranslator::new(self.config.clone(), self.package_params.clone());
        app.insert_resource(self.config.clone())
            .insert_resource(translator)
            .init_resource::<registry::LandscapeRegistry>()
            .init_resource::<cook::LandscapeCook>()
            .init_resource::<material::LandscapeMaterialCache>()
            .add_systems(
                Update,
                (
                    translator::apply_config_changes,
                    cook::start_cook_pass,
                    cook::finish_cook_pass,
                    registry::sync_landscape_entities,
                )
                    .chain(),
            );

        #[cfg(feature = "rapier")]
        {
            app.add_systems(
                Update,
                physics::sync_landscape_colliders.after(registry::sync_landscape_entities),
            );
        }
    }
}

/// Builder for constructing a LandscapePlugin with custom settings
#[derive(Default)]
pub struct LandscapePluginBuilder {
    config: config::MarshallingConfig,
    package_params: package::PackageParams,
}

impl LandscapePluginBuilder {
    pub fn config(mut self, config: config::MarshallingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn asset_name(mut self, name: impl Into<String>) -> Self {
        self.package_params.asset_name = name.into();
        self
    }

    /// GUID of the owning component, separating cooks of different instances
    pub fn component_guid(mut self, guid: impl Into<String>) -> Self {
        self.package_params.component_guid = Some(guid.into());
        self
    }

    pub fn world_composition(mut self, enabled: bool) -> Self {
        self.config.world_composition = enabled;
        self
    }

    pub fn resize_policy(mut self, policy: config::ResizePolicy) -> Self {
        self.config.resize_policy = policy;
        self
    }

    pub fn build(self) -> LandscapePlugin {
        LandscapePlugin::new(self.config, self.package_params)
    }
}

/// Component marking the entity that displays a landscape
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Landscape {
    /// Landscape in the [`registry::LandscapeRegistry`]
    pub id: LandscapeId,
    /// Vertex counts along X and Y
    pub size: UVec2,
}
