//! Marshalling configuration and builder pattern

use crate::package::PackageMode;
use bevy::prelude::*;

/// Full uint16 span used under full resolution and default Unreal scaling
pub const FULL_DIGIT_Z_RANGE: f64 = 65534.0;

/// How a converted grid is fitted to a solved landscape size that differs from it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Shrinking axes are resampled, growing axes are padded, each axis on its own.
    #[default]
    PerAxis,
    /// Resample only when no axis grows, pad everything otherwise.
    Legacy,
}

/// Main configuration for heightfield marshalling
#[derive(Resource, Clone, Debug)]
pub struct MarshallingConfig {
    /// Quantize heights over the full uint16 range instead of the reduced one
    pub use_full_resolution: bool,
    /// Map heights onto Unreal's historical default landscape Z range
    pub use_default_unreal_scaling: bool,
    /// Absolute height past which default Unreal scaling clips samples
    pub default_scaling_z_limit: f64,
    /// Digit span used when full resolution is off, the rest is sculpting headroom
    pub reduced_digit_z_range: f64,
    pub resize_policy: ResizePolicy,
    /// Place tile landscapes in their own maps and suffix them with the tile index
    pub world_composition: bool,
    /// Whether outputs are written to the temporary cook folder or baked
    pub package_mode: PackageMode,
    pub temporary_cook_folder: String,
    pub bake_folder: String,
}

impl Default for MarshallingConfig {
    fn default() -> Self {
        Self {
            use_full_resolution: false,
            use_default_unreal_scaling: false,
            default_scaling_z_limit: 256.0,
            reduced_digit_z_range: 49152.0,
            resize_policy: ResizePolicy::PerAxis,
            world_composition: false,
            package_mode: PackageMode::CookToTemp,
            temporary_cook_folder: "/Game/HoudiniEngine/Temp".to_string(),
            bake_folder: "/Game/HoudiniEngine/Bake".to_string(),
        }
    }
}

impl MarshallingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for customizing the configuration
    pub fn builder() -> MarshallingConfigBuilder {
        MarshallingConfigBuilder::default()
    }

    /// Digit span heights are quantized into.
    pub fn digit_z_range(&self) -> f64 {
        if self.use_full_resolution || self.use_default_unreal_scaling {
            FULL_DIGIT_Z_RANGE
        } else {
            self.reduced_digit_z_range
        }
    }
}

/// Builder for creating a customized MarshallingConfig
#[derive(Default)]
pub struct MarshallingConfigBuilder {
    config: MarshallingConfig,
}

impl MarshallingConfigBuilder {
    pub fn use_full_resolution(mut self, enabled: bool) -> Self {
        self.config.use_full_resolution = enabled;
        self
    }

    pub fn use_default_unreal_scaling(mut self, enabled: bool) -> Self {
        self.config.use_default_unreal_scaling = enabled;
        self
    }

    /// Set the clip warning limit for default Unreal scaling
    pub fn default_scaling_z_limit(mut self, limit: f64) -> Self {
        self.config.default_scaling_z_limit = limit;
        self
    }

    pub fn reduced_digit_z_range(mut self, range: f64) -> Self {
        self.config.reduced_digit_z_range = range;
        self
    }

    pub fn resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.config.resize_policy = policy;
        self
    }

    pub fn world_composition(mut self, enabled: bool) -> Self {
        self.config.world_composition = enabled;
        self
    }

    pub fn package_mode(mut self, mode: PackageMode) -> Self {
        self.config.package_mode = mode;
        self
    }

    pub fn temporary_cook_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.temporary_cook_folder = folder.into();
        self
    }

    pub fn bake_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.bake_folder = folder.into();
        self
    }

    pub fn build(self) -> MarshallingConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MarshallingConfig::default();
        assert!(!config.use_full_resolution);
        assert_eq!(config.digit_z_range(), 49152.0);
        assert_eq!(config.default_scaling_z_limit, 256.0);
        assert_eq!(config.resize_policy, ResizePolicy::PerAxis);
    }

    #[test]
    fn test_builder() {
        let config = MarshallingConfig::builder()
            .use_full_resolution(true)
            .resize_policy(ResizePolicy::Legacy)
            .bake_folder("/Game/Baked")
            .build();

        assert_eq!(config.digit_z_range(), FULL_DIGIT_Z_RANGE);
        assert_eq!(config.resize_policy, ResizePolicy::Legacy);
        assert_eq!(config.bake_folder, "/Game/Baked");
    }

    #[test]
    fn test_default_scaling_uses_full_range() {
        let config = MarshallingConfig::builder()
            .use_default_unreal_scaling(true)
            .build();
        assert_eq!(config.digit_z_range(), FULL_DIGIT_Z_RANGE);
    }
}
