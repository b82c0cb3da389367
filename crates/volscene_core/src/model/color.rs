//! Color lookup table payload.

use serde::{Deserialize, Serialize};

/// Named palette referenced by volume display nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTableNode {
    pub palette: String,
    /// Discrete palette meant for classification labels.
    pub labels: bool,
}

impl ColorTableNode {
    pub fn new(palette: impl Into<String>, labels: bool) -> Self {
        Self {
            palette: palette.into(),
            labels,
        }
    }
}

impl Default for ColorTableNode {
    fn default() -> Self {
        Self::new("Grey", false)
    }
}
