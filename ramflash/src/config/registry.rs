use super::Target;
use ramflash_target::{ChipFamily, ConfigurationError};
use std::path::Path;

/// Error type for all errors which occur when working
/// with the internal registry of targets.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum RegistryError {
    /// The requested chip '{0}' was not found in the list of known targets.
    ChipNotFound(String),

    /// Found multiple chips matching '{name}', unable to select a single chip: {candidates:?}
    ChipNotUnique {
        /// The requested name.
        name: String,
        /// All variants starting with the requested name.
        candidates: Vec<String>,
    },

    /// An error occurred while parsing the target description.
    Yaml(#[from] serde_yaml::Error),

    /// The target description is invalid.
    Configuration(#[from] ConfigurationError),

    /// An IO error was encountered.
    Io(#[from] std::io::Error),
}

/// Registry of all available targets.
#[derive(Debug, Default)]
pub struct Registry {
    /// All the available chips.
    families: Vec<ChipFamily>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// All chip families of the registry.
    pub fn families(&self) -> &[ChipFamily] {
        &self.families
    }

    /// Finds the variant named `name`.
    ///
    /// Names are compared case insensitively. If no variant has exactly that
    /// name, a unique variant starting with `name` is accepted.
    pub fn get_target_by_name(&self, name: impl AsRef<str>) -> Result<Target, RegistryError> {
        let name = name.as_ref();
        tracing::debug!("Searching registry for chip with name {name}");

        let lowercase = name.to_ascii_lowercase();
        let mut partial_matches = Vec::new();

        for family in &self.families {
            for variant in family.variants() {
                let variant_name = variant.name.to_ascii_lowercase();

                if variant_name == lowercase {
                    tracing::debug!("Exact match for chip name: {}", variant.name);
                    return Ok(Target::new(family, variant));
                }

                if variant_name.starts_with(&lowercase) {
                    partial_matches.push((family, variant));
                }
            }
        }

        match partial_matches.as_slice() {
            [] => Err(RegistryError::ChipNotFound(name.to_string())),
            [(family, variant)] => {
                tracing::warn!(
                    "Found chip {} which matches given partial name {}. Consider specifying its full name.",
                    variant.name,
                    name,
                );
                Ok(Target::new(family, variant))
            }
            candidates => Err(RegistryError::ChipNotUnique {
                name: name.to_string(),
                candidates: candidates
                    .iter()
                    .map(|(_, variant)| variant.name.clone())
                    .collect(),
            }),
        }
    }

    /// Validates `family` and adds it to the registry.
    ///
    /// A family with the same name is replaced. Returns the name of the family.
    pub fn add_target_family(&mut self, family: ChipFamily) -> Result<String, RegistryError> {
        family.validate()?;

        let family_name = family.name.clone();

        self.families.retain(|old| old.name != family_name);
        self.families.push(family);

        tracing::debug!("Added chip family {family_name}");

        Ok(family_name)
    }

    /// Parses a YAML target description and adds it to the registry.
    pub fn add_target_family_from_yaml(&mut self, yaml: &str) -> Result<String, RegistryError> {
        let family: ChipFamily = serde_yaml::from_str(yaml)?;
        self.add_target_family(family)
    }

    /// Reads a YAML target description file and adds it to the registry.
    pub fn add_target_from_yaml_file(&mut self, path: &Path) -> Result<String, RegistryError> {
        let file = std::fs::File::open(path)?;
        let family: ChipFamily = serde_yaml::from_reader(file)?;
        self.add_target_family(family)
    }
}
