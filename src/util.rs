use std::iter::repeat;
use std::path::{Path, PathBuf};

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Converts a price into the gateway's minor currency unit (cents, paisa).
pub fn minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Stores UUIDs as hyphenated strings.
///
/// The BSON raw serializer isn't human readable, so plain `Uuid` fields would
/// end up as binary in MongoDB but as strings in JSON responses. Pinning the
/// representation keeps filters like `doc! { "_id": id.to_string() }` valid.
pub mod uuid_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&id.hyphenated().to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Uuid::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}
