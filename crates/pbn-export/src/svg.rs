//! SVG export serializer.
//!
//! Converts a pipeline result into an SVG string using the [`svg`]
//! crate for document construction, XML escaping, and path data
//! formatting.
//!
//! Each live facet becomes one `<path>` element. The outline starts
//! with `M` and continues with quadratic `Q` commands whose control
//! point is the midpoint of two consecutive outline points, which
//! rounds off the staircase of the pixel walls. Labels are `<text>`
//! elements centred on each facet's label anchor.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Path, Title};
use svg::node::{Node, Text, Value};

use pbn_pipeline::color::to_hex;
use pbn_pipeline::{Facet, Point, ProcessResult};

/// Default label font size before digit and space scaling.
pub const DEFAULT_FONT_SIZE: f64 = 50.0;

/// Share of the label square a number may take up.
const LABEL_SPACE_FACTOR: f64 = 0.4;

/// Rendering switches for [`to_svg`].
#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    /// Scale applied to every coordinate and to the document size.
    pub size_multiplier: f64,
    /// Fill facets with their palette colour.
    pub fill: bool,
    /// Draw black facet outlines.
    pub stroke: bool,
    /// Outline width in output units.
    pub stroke_width: f64,
    /// Write the colour number of each facet at its label anchor.
    pub labels: bool,
    /// Largest label font size.
    pub font_size: f64,
    /// Smallest label font size, if any.
    pub min_font_size: Option<f64>,
    /// CSS colour of the label text.
    pub font_color: String,
    /// Number printed for palette index 0.
    pub label_start_number: usize,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            size_multiplier: 1.0,
            fill: true,
            stroke: true,
            stroke_width: 1.0,
            labels: true,
            font_size: DEFAULT_FONT_SIZE,
            min_font_size: None,
            font_color: String::from("black"),
            label_start_number: 0,
        }
    }
}

/// Metadata to embed in the SVG document.
///
/// When present, a `<title>`, `<desc>` and/or `<metadata>` element is
/// emitted immediately after the opening `<svg>` tag. Text values are
/// XML-escaped by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, typically the source image file stem.
    pub title: Option<&'a str>,

    /// Human-readable description, typically the main settings.
    pub description: Option<&'a str>,

    /// Serialized pipeline configuration, for reproducing the output.
    pub config_json: Option<&'a str>,
}

/// Build the `d` attribute for a closed outline.
///
/// Uses `M` for the first point, one `Q` per following point with the
/// control point at the midpoint of the previous and current point,
/// and closes with `Z`. The outline is closed back to its first point
/// if it does not already end there. Returns an empty string for an
/// empty outline.
#[must_use]
pub fn build_path_data(outline: &[Point], scale: f64) -> String {
    let Some(&first) = outline.first() else {
        return String::new();
    };
    let mut points = outline.to_vec();
    if points.last() != Some(&first) {
        points.push(first);
    }

    let mut data = Data::new().move_to((first.x * scale, first.y * scale));
    for pair in points.windows(2) {
        let (prev, current) = (pair[0], pair[1]);
        let control = prev.midpoint(current);
        data = data.quadratic_curve_to((
            control.x * scale,
            control.y * scale,
            current.x * scale,
            current.y * scale,
        ));
    }
    String::from(Value::from(data.close()))
}

/// Font size for a label: shrunk by digit count and capped by the
/// label square, then raised to the minimum if one is set.
#[must_use]
pub fn label_font_size(text: &str, side: f64, options: &SvgOptions) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let digits = text.chars().count().max(1) as f64;
    let size = (options.font_size / digits).min(side * LABEL_SPACE_FACTOR);
    options.min_font_size.map_or(size, |min| size.max(min))
}

/// Serialize a pipeline result into an SVG document string.
///
/// The document is `size_multiplier` times the image size. Facets with
/// no outline are skipped, as are labels whose anchor is not
/// plottable.
#[must_use]
pub fn to_svg(result: &ProcessResult, options: &SvgOptions, metadata: &SvgMetadata<'_>) -> String {
    let scale = options.size_multiplier;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let size = |side: u32| (f64::from(side) * scale).floor().max(0.0) as u32;
    let (w, h) = (size(result.dimensions.width), size(result.dimensions.height));

    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(Text::new(config_json));
        doc = doc.add(metadata_el);
    }

    let mut labels = Vec::new();
    for facet in result.facets.live_facets() {
        let d = build_path_data(&result.facets.full_path(facet.id), scale);
        if d.is_empty() {
            continue;
        }
        let color = result
            .color_map
            .palette
            .get(facet.color)
            .map_or_else(|| String::from("none"), |&c| to_hex(c));

        let stroke = if options.stroke {
            String::from("#000")
        } else if options.fill {
            color.clone()
        } else {
            String::from("none")
        };
        let fill = if options.fill { color } else { String::from("none") };

        doc = doc.add(
            Path::new()
                .set("data-facet-id", facet.id)
                .set("d", d)
                .set("stroke", stroke)
                .set("stroke-width", options.stroke_width)
                .set("fill", fill),
        );

        if options.labels
            && let Some(text) = label_element(facet, options)
        {
            labels.push(text);
        }
    }

    // Labels go last so no later facet fill covers them.
    for label in labels {
        doc = doc.add(label);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

fn label_element(facet: &Facet, options: &SvgOptions) -> Option<svg::node::element::Text> {
    let label = facet.label.filter(pbn_pipeline::LabelPlacement::is_plottable)?;
    let text = (facet.color + options.label_start_number).to_string();
    let side = label.width().min(label.height());
    let font_size = label_font_size(&text, side, options);
    let scale = options.size_multiplier;

    Some(
        svg::node::element::Text::new(text)
            .set("x", label.point.x * scale)
            .set("y", label.point.y * scale)
            .set("font-family", "Tahoma")
            .set("font-size", font_size * scale)
            .set("dominant-baseline", "middle")
            .set("text-anchor", "middle")
            .set("fill", options.font_color.as_str()),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pbn_pipeline::{PipelineConfig, RandomSeed, RgbaImage, process_image};

    use super::*;

    fn quadrants() -> ProcessResult {
        let image = RgbaImage::from_fn(20, 20, |x, y| match (x < 10, y < 10) {
            (true, true) => image::Rgba([255, 0, 0, 255]),
            (false, true) => image::Rgba([0, 255, 0, 255]),
            (true, false) => image::Rgba([0, 0, 255, 255]),
            (false, false) => image::Rgba([255, 255, 0, 255]),
        });
        let config = PipelineConfig {
            kmeans_clusters: 4,
            min_facet_size: 1,
            random_seed: RandomSeed::Fixed(2),
            ..PipelineConfig::default()
        };
        process_image(&image, &config, &mut |_, _| {}).unwrap()
    }

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ]
    }

    // --- build_path_data ---

    #[test]
    fn build_path_data_empty_outline() {
        assert_eq!(build_path_data(&[], 1.0), "");
    }

    #[test]
    fn build_path_data_uses_quadratic_segments() {
        let d = build_path_data(&square(), 1.0);
        assert!(d.starts_with("M0,0"));
        // Four sides: three to the remaining corners and one to close.
        assert_eq!(d.matches('Q').count(), 4);
        assert!(d.contains("Q1,0,2,0"));
        assert!(d.to_ascii_lowercase().ends_with('z'));
    }

    #[test]
    fn build_path_data_does_not_double_close() {
        let mut closed = square();
        closed.push(Point::new(0.0, 0.0));
        assert_eq!(build_path_data(&closed, 1.0), build_path_data(&square(), 1.0));
    }

    #[test]
    fn build_path_data_scales_coordinates() {
        let d = build_path_data(&square(), 3.0);
        assert!(d.contains("Q3,0,6,0"));
    }

    // --- labels ---

    #[test]
    fn label_font_size_divides_by_digits() {
        let options = SvgOptions::default();
        assert!((label_font_size("7", 1000.0, &options) - 50.0).abs() < 1e-12);
        assert!((label_font_size("12", 1000.0, &options) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn label_font_size_capped_by_space() {
        let options = SvgOptions::default();
        assert!((label_font_size("3", 10.0, &options) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn label_font_size_respects_minimum() {
        let options = SvgOptions {
            min_font_size: Some(6.0),
            ..SvgOptions::default()
        };
        assert!((label_font_size("3", 10.0, &options) - 6.0).abs() < 1e-12);
    }

    // --- to_svg ---

    #[test]
    fn one_path_per_live_facet() {
        let result = quadrants();
        let svg = to_svg(&result, &SvgOptions::default(), &SvgMetadata::default());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"viewBox="0 0 20 20""#));
        assert_eq!(svg.matches("<path").count(), result.facets.live_count());
        assert_eq!(svg.matches("data-facet-id").count(), 4);
        assert_eq!(svg.matches("<text").count(), 4);
        assert!(svg.contains(r##"stroke="#000""##));
    }

    #[test]
    fn size_multiplier_scales_document() {
        let result = quadrants();
        let options = SvgOptions {
            size_multiplier: 2.5,
            ..SvgOptions::default()
        };
        let svg = to_svg(&result, &options, &SvgMetadata::default());
        assert!(svg.contains(r#"width="50""#));
        assert!(svg.contains(r#"viewBox="0 0 50 50""#));
    }

    #[test]
    fn fill_only_strokes_with_fill_colour() {
        let result = quadrants();
        let options = SvgOptions {
            stroke: false,
            labels: false,
            ..SvgOptions::default()
        };
        let svg = to_svg(&result, &options, &SvgMetadata::default());
        assert!(!svg.contains(r##"stroke="#000""##));
        assert!(!svg.contains("<text"));
        for &color in &result.color_map.palette {
            let hex = to_hex(color);
            assert!(svg.contains(&format!(r#"stroke="{hex}""#)));
            assert!(svg.contains(&format!(r#"fill="{hex}""#)));
        }
    }

    #[test]
    fn outline_only_has_no_fill() {
        let result = quadrants();
        let options = SvgOptions {
            fill: false,
            labels: false,
            ..SvgOptions::default()
        };
        let svg = to_svg(&result, &options, &SvgMetadata::default());
        assert_eq!(svg.matches(r#"fill="none""#).count(), 4);
    }

    #[test]
    fn label_numbers_start_at_offset() {
        let result = quadrants();
        let options = SvgOptions {
            label_start_number: 1,
            ..SvgOptions::default()
        };
        let svg = to_svg(&result, &options, &SvgMetadata::default());
        for n in 1..=4 {
            assert!(svg.contains(&format!(">{n}</text>")));
        }
        assert!(!svg.contains(">0</text>"));
    }

    #[test]
    fn metadata_is_escaped() {
        let result = quadrants();
        let metadata = SvgMetadata {
            title: Some("a <b> & c"),
            description: Some("k=4"),
            config_json: Some(r#"{"kmeans_clusters":4}"#),
        };
        let svg = to_svg(&result, &SvgOptions::default(), &metadata);
        assert!(svg.contains("<title>a &lt;b&gt; &amp; c</title>"));
        assert!(svg.contains("<desc>k=4</desc>"));
        assert!(svg.contains("<metadata>"));
    }
}
