//! Package naming and temporary-object detection
//!
//! Cooked objects live in packages under a temporary cook folder until they are baked.
//! `PackageParams` derives package names and paths from the output identity, and
//! [`is_object_temporary`] decides whether an object still belongs to a cook.

use crate::error::{LandscapeError, Result};
use crate::source::PartKey;

/// Characters replaced in object names
const INVALID_OBJECT_NAME_CHARACTERS: &str = "\"' ,.:|&!~\n\r\t@#(){}[]=;^%$`";

/// Characters replaced in long package names
const INVALID_PACKAGE_CHARACTERS: &str = "\\:*?\"<>|' ,.&!~\n\r\t@#";

/// Length of the component GUID prefix used as a package subfolder
pub const PACKAGE_GUID_LENGTH: usize = 8;

/// Candidate names tried before giving up on a free package name
pub const MAX_UNIQUE_NAME_ATTEMPTS: u32 = 256;

/// Where cooked objects are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PackageMode {
    #[default]
    CookToTemp,
    Bake,
}

/// What happens when a package name is already taken
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplaceMode {
    #[default]
    ReplaceExistingAssets,
    CreateNewAssets,
}

pub fn sanitize_object_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_OBJECT_NAME_CHARACTERS.contains(c) { '_' } else { c })
        .collect()
}

/// Sanitize a long package name, slashes are kept as path separators.
pub fn sanitize_package_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_PACKAGE_CHARACTERS.contains(c) { '_' } else { c })
        .collect()
}

/// Naming parameters for objects produced by one output
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackageParams {
    pub mode: PackageMode,
    pub replace_mode: ReplaceMode,
    pub temp_cook_folder: String,
    pub bake_folder: String,
    /// Explicit object name, overrides the generated one when set
    pub object_name: String,
    pub asset_name: String,
    /// Owning component, its GUID prefix separates cooks of different instances
    pub component_guid: Option<String>,
    pub object_id: i32,
    pub geo_id: i32,
    pub part_id: i32,
    pub split: String,
}

impl PackageParams {
    pub fn new(asset_name: impl Into<String>) -> Self {
        Self {
            asset_name: asset_name.into(),
            ..Default::default()
        }
    }

    pub fn with_part(mut self, part: PartKey) -> Self {
        self.object_id = part.object_id;
        self.geo_id = part.geo_id;
        self.part_id = part.part_id;
        self
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = split.into();
        self
    }

    pub fn with_folders(mut self, temp_cook_folder: impl Into<String>, bake_folder: impl Into<String>) -> Self {
        self.temp_cook_folder = temp_cook_folder.into();
        self.bake_folder = bake_folder.into();
        self
    }

    pub fn package_name(&self) -> String {
        if !self.object_name.is_empty() {
            return self.object_name.clone();
        }
        format!(
            "{}_{}_{}_{}_{}",
            self.asset_name, self.object_id, self.geo_id, self.part_id, self.split
        )
    }

    pub fn package_path(&self) -> String {
        match self.mode {
            PackageMode::CookToTemp => {
                let mut path = self.temp_cook_folder.clone();
                if !self.asset_name.is_empty() {
                    path.push('/');
                    path.push_str(&self.asset_name);
                }
                if let Some(guid) = self.component_guid.as_deref().filter(|g| !g.is_empty()) {
                    path.push('/');
                    path.extend(guid.chars().take(PACKAGE_GUID_LENGTH));
                }
                path
            }
            PackageMode::Bake => self.bake_folder.clone(),
        }
    }

    /// Full sanitized package name, `path/name`.
    pub fn full_package_name(&self) -> String {
        sanitize_package_name(&format!("{}/{}", self.package_path(), self.package_name()))
    }

    /// Full package name that does not collide with an existing package.
    ///
    /// Existing packages are replaced unless `replace_mode` asks for new assets, in which
    /// case bakes get a `_N` counter and cooks get a fresh GUID suffix. Fails after
    /// [`MAX_UNIQUE_NAME_ATTEMPTS`] taken candidates.
    pub fn unique_package_name(
        &self,
        exists: impl Fn(&str) -> bool,
        mut fresh_guid: impl FnMut() -> String,
    ) -> Result<String> {
        let base = self.package_name();
        let path = self.package_path();
        for attempt in 0..MAX_UNIQUE_NAME_ATTEMPTS {
            let mut name = base.clone();
            if attempt > 0 {
                name.push('_');
                match self.mode {
                    PackageMode::Bake => name.push_str(&attempt.to_string()),
                    PackageMode::CookToTemp => name.extend(fresh_guid().chars().take(PACKAGE_GUID_LENGTH)),
                }
            }
            let full = sanitize_package_name(&format!("{path}/{name}"));
            if self.replace_mode == ReplaceMode::CreateNewAssets && exists(&full) {
                continue;
            }
            return Ok(full);
        }
        Err(LandscapeError::InvalidInput(format!(
            "no free package name for {path}/{base} after {MAX_UNIQUE_NAME_ATTEMPTS} attempts"
        )))
    }
}

/// Whether an object still belongs to a cook and must be duplicated before baking.
///
/// True when `object` is one of the outputs' objects, or when its package lies in the
/// asset's temporary cook folder or in the default temporary folder.
pub fn is_object_temporary<T: PartialEq>(
    object: &T,
    package_path: &str,
    output_objects: &[T],
    temporary_cook_folder: &str,
    default_temporary_cook_folder: &str,
) -> bool {
    if output_objects.contains(object) {
        return true;
    }
    is_under_folder(package_path, temporary_cook_folder) || is_under_folder(package_path, default_temporary_cook_folder)
}

/// Whether `path` is `folder` itself or lies below it.
fn is_under_folder(path: &str, folder: &str) -> bool {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        return false;
    }
    path.strip_prefix(folder)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
