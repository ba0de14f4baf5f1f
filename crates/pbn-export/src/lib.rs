//! pbn-export: Pure format serializers (sans-IO)
//!
//! Converts a paint-by-numbers pipeline result into output formats:
//! an SVG drawing of the labelled facets and a plain-text palette
//! listing.

pub mod palette;
pub mod svg;

pub use palette::palette_listing;
pub use svg::{SvgMetadata, SvgOptions, to_svg};
