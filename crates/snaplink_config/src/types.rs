//! Configuration types deserialized from `snaplink.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// The top-level configuration parsed from `snaplink.toml`.
#[derive(Debug, Deserialize)]
pub struct SnaplinkConfig {
    /// What to generate and where to write it.
    pub snapshot: SnapshotConfig,
    /// Transform cache location and namespace.
    pub cache: CacheConfig,
    /// Modules left to the host's loader.
    #[serde(default)]
    pub exclude: ExcludeConfig,
}

/// The `[snapshot]` table.
#[derive(Debug, Deserialize)]
pub struct SnapshotConfig {
    /// Entry file, relative to `base_dir`.
    pub main: String,
    /// Directory module keys are relative to, relative to the project directory.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// Output script path, relative to the project directory.
    #[serde(default = "default_output")]
    pub output: String,
    /// JSON file embedded as `snapshotAuxiliaryData`.
    #[serde(default)]
    pub auxiliary_data: Option<String>,
    /// Overrides the build-time `process.platform`.
    #[serde(default)]
    pub platform: Option<String>,
}

/// The `[cache]` table.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Cache root, relative to the project directory.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Namespace discriminator; changing it starts a disjoint cache.
    pub invalidation_key: String,
}

/// The `[exclude]` table.
///
/// Both fields accept a single string or a list of strings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExcludeConfig {
    /// Module keys ending with any of these are excluded.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub suffixes: Vec<String>,
    /// Packages under `node_modules` that are excluded, e.g. `"electron"` or
    /// `"@scope/name"`.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub packages: Vec<String>,
}

fn default_base_dir() -> String {
    ".".to_string()
}

fn default_output() -> String {
    "snapshot.js".to_string()
}

fn default_cache_dir() -> String {
    ".snaplink-cache".to_string()
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows `suffixes = "b.js"` as well as `suffixes = ["b.js", "c.js"]`.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
