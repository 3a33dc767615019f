use serde::{Deserialize, Serialize};

/// The `supported-hardware` entry of an update package: either the literal
/// string `"any"` or an explicit list of hardware identifiers.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum SupportedHardware {
    #[serde(with = "any")]
    Any,
    List(Vec<String>),
}

impl SupportedHardware {
    pub fn supports(&self, hardware: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(supported) => supported.iter().any(|h| h == hardware),
        }
    }
}

impl Default for SupportedHardware {
    fn default() -> Self {
        Self::Any
    }
}

// serde helper matching the bare string "any"
mod any {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("any")
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<(), D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "any" => Ok(()),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Str(other),
                &"the string \"any\"",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_supports_everything() {
        let parsed: SupportedHardware = serde_json::from_str(r#""any""#).unwrap();
        assert_eq!(parsed, SupportedHardware::Any);
        assert!(parsed.supports("hardware-revA"));
    }

    #[test]
    fn list_only_supports_named_hardware() {
        let parsed: SupportedHardware =
            serde_json::from_str(r#"["revA", "revB"]"#).unwrap();
        assert!(parsed.supports("revA"));
        assert!(!parsed.supports("revC"));
    }

    #[test]
    fn arbitrary_bare_strings_are_rejected() {
        serde_json::from_str::<SupportedHardware>(r#""all""#).unwrap_err();
    }
}
