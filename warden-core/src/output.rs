//! Rich execution outputs produced by interpreter children.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of a rich output item.
///
/// These are the wire names emitted by the executor children; order of
/// variants follows the display-priority convention the children use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Text,
    ImagePng,
    ImageJpeg,
    Svg,
    Html,
    Json,
    Latex,
    Markdown,
    Javascript,
    Error,
}

impl OutputKind {
    /// The kebab-case wire name (`image-png`, `text`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Text => "text",
            OutputKind::ImagePng => "image-png",
            OutputKind::ImageJpeg => "image-jpeg",
            OutputKind::Svg => "svg",
            OutputKind::Html => "html",
            OutputKind::Json => "json",
            OutputKind::Latex => "latex",
            OutputKind::Markdown => "markdown",
            OutputKind::Javascript => "javascript",
            OutputKind::Error => "error",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One type-tagged output item from a code execution.
///
/// `data` is opaque to the control plane: text for textual kinds, base64
/// for image kinds. The children encode, consumers decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RichOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl RichOutput {
    /// Creates an output item with no metadata.
    #[must_use]
    pub fn new(kind: OutputKind, data: impl Into<String>) -> Self {
        Self { kind, data: data.into(), metadata: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_wire_names_are_kebab_case() {
        assert_eq!(OutputKind::ImagePng.as_str(), "image-png");
        assert_eq!(OutputKind::ImageJpeg.as_str(), "image-jpeg");
        assert_eq!(OutputKind::Text.as_str(), "text");
    }

    #[test]
    fn output_kind_serde_matches_as_str() {
        for kind in [
            OutputKind::Text,
            OutputKind::ImagePng,
            OutputKind::ImageJpeg,
            OutputKind::Svg,
            OutputKind::Html,
            OutputKind::Json,
            OutputKind::Latex,
            OutputKind::Markdown,
            OutputKind::Javascript,
            OutputKind::Error,
        ] {
            let json = match serde_json::to_string(&kind) {
                Ok(s) => s,
                Err(e) => panic!("serialization failed for {kind}: {e}"),
            };
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn rich_output_serializes_type_field() {
        let out = RichOutput::new(OutputKind::Json, "{\"x\":1}");
        let json = match serde_json::to_value(&out) {
            Ok(v) => v,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert_eq!(json["type"], "json");
        assert!(json.get("metadata").is_none(), "absent metadata must be omitted");
    }
}
