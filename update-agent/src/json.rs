use std::io;

use serde::Deserialize;
use serde_json::Deserializer;

#[derive(Debug, thiserror::Error)]
#[error("failed to deserialize")]
pub struct Error(#[source] serde_path_to_error::Error<serde_json::Error>);

/// Deserialize json from a reader, reporting the path inside the document at
/// which deserialization failed.
pub fn deserialize<'de, R, T>(reader: R) -> Result<T, Error>
where
    R: io::Read,
    T: Deserialize<'de>,
{
    let json_deserializer = &mut Deserializer::from_reader(reader);
    serde_path_to_error::deserialize(json_deserializer).map_err(Error)
}
