//! MapCSS styles applied to each render layer.

use serde::{Deserialize, Serialize};

use crate::LayerName;

/// MapCSS style sheet text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style(String);

impl Style {
    /// Wrap MapCSS source text.
    #[must_use]
    pub fn new(mapcss: impl Into<String>) -> Self {
        Self(mapcss.into())
    }

    /// MapCSS source text.
    #[must_use]
    pub fn as_mapcss(&self) -> &str {
        &self.0
    }
}

/// Supplies the style used to draw a layer.
pub trait StyleProvider: Send + Sync {
    /// Style sheet for `layer`.
    fn style(&self, layer: LayerName) -> Style;
}

/// Server data in blue/brown, unsynchronised edits highlighted.
const SOURCE_STYLE: &str = r#"node {
    icon-image: "poi_circle_small.svg";
    icon-scale: 1;
    icon-tint: blue;
    [fixme] {icon-tint: red;}
    |z17- {icon-scale: 2;}
}
line {
    linecap: round;
    width: 1pt;
    color:brown;
    [fixme] {color:red;}
    |z17- {width: 3pt;}
}
area {
    width:1pt;
    color:black;
    [fixme] {color:red;}
    |z17- {width:3pt;}
}
"#;

const MODIFIED_STYLE: &str = r#"node {
    icon-image: "poi_circle_small.svg";
    icon-scale: 2;
    icon-tint: green;
}
line {
    linecap: round;
    width: 3pt;
    color:green;
}
area {
    width:3pt;
    color:green;
}
"#;

const CREATED_STYLE: &str = r#"node {
    icon-image: "poi_circle_small.svg";
    icon-scale: 2;
    icon-tint: orange;
}
line {
    linecap: round;
    width: 3pt;
    color:orange;
}
area {
    width:3pt;
    color:orange;
}
"#;

/// Built-in style sheets for the three layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStyles;

impl StyleProvider for DefaultStyles {
    fn style(&self, layer: LayerName) -> Style {
        let text = match layer {
            LayerName::Source => SOURCE_STYLE,
            LayerName::Modified => MODIFIED_STYLE,
            LayerName::Created => CREATED_STYLE,
        };
        Style::new(text)
    }
}
