use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal geometry a recording is normalized to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
        }
    }
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Metadata record on line 0 of an asciicast v2 capture.
///
/// Fields this crate does not interpret are kept in `extra` so a parsed header can be
/// inspected without losing information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastHeader {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<CastEnv>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CastEnv {
    #[serde(rename = "SHELL", default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(rename = "TERM", default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CastHeader {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}
