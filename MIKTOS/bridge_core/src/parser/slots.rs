use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{
    helper::{number, word_number, NormalizedCommand},
    vocabulary::{
        canonical_material, canonical_shape, color_pattern, material_pattern, named_color,
        ANIMATION_TYPES, LIGHTING_TYPES, MATERIALS, OPERATIONS, SHAPES, SHAPE_PATTERN,
    },
};
use crate::parameter::ParsedParameter;

const NUM: &str = r"(-?\d+(?:\.\d+)?)";

fn re(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{N}", NUM)).unwrap()
}

static SHAPE_RE: Lazy<Regex> = Lazy::new(|| re(SHAPE_PATTERN));
static MATERIAL_RE: Lazy<Regex> = Lazy::new(|| re(&material_pattern()));
static COLOR_RE: Lazy<Regex> = Lazy::new(|| re(&color_pattern()));
static HEX_RE: Lazy<Regex> = Lazy::new(|| re(r"#([0-9a-f]{6})\b"));
static RGB_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\brgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)"));
static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\bsize\s*(?:of\s+|=\s*|:\s*|to\s+)?{N}(?:\s*x\s*{N}\s*x\s*{N})?")
});
static DIMENSIONS_RE: Lazy<Regex> = Lazy::new(|| re(r"\b{N}\s*x\s*{N}\s*x\s*{N}\b"));
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(?:at|to|location|position)\s*(?:of\s+|=\s*|:\s*)?[(\[]?\s*{N}\s*,\s*{N}\s*,\s*{N}\s*[)\]]?")
});
static ORIGIN_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(?:at|to)\s+(?:the\s+)?(?:origin|center|centre)\b"));
static COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    re(&format!(
        r"\b(\d+|two|three|four|five|six|seven|eight|nine|ten|dozen)\s+(?:\w+\s+)?(?:{}|objects|copies|instances|lights)\b",
        SHAPE_PATTERN.trim_start_matches(r"\b").trim_end_matches(r"\b")
    ))
});
static TIMES_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(\d+)\s+times\b|\bcount\s*(?:of|=|:)?\s*(\d+)"));
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| re(r#"(?i)\b(?:named|called)\s+["']?([A-Za-z_][\w.\-]*)"#));
static SUBDIVISION_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(?:subdivi\w*|smooth\w*)\s+(?:\w+\s+)?(?:level\s+|levels\s+|by\s+|to\s+|x\s*)?{N}\b|\b{N}\s+(?:subdivision|subdivisions|levels?)\b|\blevel\s+{N}\b")
});
static SCALE_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(?:scale|resize)\s+(?:(?:it|this|that|them|the\s+\w+|[\w.]+)\s+)?(?:by|to)\s+(?:a\s+factor\s+of\s+)?{N}|\bscale\s*(?:=|:|of)\s*{N}|\b{N}\s*(?:x|times)\s+(?:bigger|larger)\b")
});
static RELATIVE_SCALE_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(bigger|larger|smaller)\b"));
static ROTATION_RE: Lazy<Regex> = Lazy::new(|| re(r"{N}\s*(?:degrees?|deg\b|°)"));
static INTENSITY_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(?:intensity|power|brightness|energy)\s*(?:of|=|:|to)?\s*{N}|\b{N}\s*(?:w|watts?)\b")
});
static STRENGTH_RE: Lazy<Regex> = Lazy::new(|| re(r"\bstrength\s*(?:of|=|:|to)?\s*{N}"));
static ROUGHNESS_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\brough(?:ness)?\s*(?:of|=|:|to)?\s*{N}"));
static METALLIC_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\bmetal(?:lic|ness)\s*(?:of|=|:|to)?\s*{N}"));
static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\b(\d+)\s*k\b|\b(\d{3,5})\s*(?:px|pixels)\b"));
static FRAME_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(?:from\s+)?frames?\s+{N}\s*(?:-|to|through|until)\s*(?:frame\s+)?{N}")
});
static FRAME_COUNT_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(?:for|over)\s+{N}\s+frames\b"));
static LIGHTING_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(three[- ]point|3[- ]point|studio|hdri|sky|sun|softbox|rim|spot|area|point)\b")
});
static OPERATION_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(move|translate|shift|position|rotate|turn|spin|scale|resize|grow|shrink|bigger|larger|smaller)\b")
});
static ANIMATION_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(rotat\w*|spin\w*|bounc\w*|orbit\w*|mov\w*|slid\w*|scal\w*|puls\w*|grow\w*)\b")
});
static ALL_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(all|everything)\b"));

fn span(caps: &Captures<'_>) -> (usize, usize) {
    caps.get(0).map_or((0, 0), |m| (m.start(), m.end()))
}

fn first_number(caps: &Captures<'_>) -> Option<f64> {
    caps.iter()
        .skip(1)
        .flatten()
        .find_map(|group| number(group.as_str()))
}

fn numbers(caps: &Captures<'_>) -> Vec<f64> {
    caps.iter()
        .skip(1)
        .flatten()
        .filter_map(|group| number(group.as_str()))
        .collect()
}

fn numeric_slot(
    out: &mut Vec<ParsedParameter>,
    pattern: &Regex,
    text: &str,
    name: &str,
    confidence: f32,
) {
    if let Some(caps) = pattern.captures(text) {
        if let Some(value) = first_number(&caps) {
            let (start, end) = span(&caps);
            out.push(ParsedParameter::numeric(name, value, confidence).with_span(start, end));
        }
    }
}

/// Extracts every recognisable slot except `target`, ordered by position.
#[must_use]
pub fn extract(cmd: &NormalizedCommand) -> Vec<ParsedParameter> {
    let text = cmd.folded.as_str();
    let mut out = Vec::new();

    if let Some(m) = SHAPE_RE.find(text) {
        if let Some(shape) = canonical_shape(m.as_str()) {
            out.push(
                ParsedParameter::enumerated("shape", shape, SHAPES, 0.95)
                    .with_span(m.start(), m.end()),
            );
        }
    }

    if let Some(m) = MATERIAL_RE.find(text) {
        if let Some(material) = canonical_material(m.as_str()) {
            out.push(
                ParsedParameter::enumerated("material", material, MATERIALS, 0.9)
                    .with_span(m.start(), m.end()),
            );
        }
    }

    extract_color(text, &mut out);
    extract_size(text, &mut out);
    extract_location(text, &mut out);
    extract_count(text, &mut out);

    if let Some(caps) = NAME_RE.captures(&cmd.cased) {
        if let Some(name) = caps.get(1) {
            let (start, end) = span(&caps);
            out.push(ParsedParameter::text("name", name.as_str(), 0.95).with_span(start, end));
        }
    }

    numeric_slot(&mut out, &SUBDIVISION_RE, text, "subdivisions", 0.9);
    extract_scale(text, &mut out);
    numeric_slot(&mut out, &ROTATION_RE, text, "rotation", 0.9);
    numeric_slot(&mut out, &INTENSITY_RE, text, "intensity", 0.85);
    numeric_slot(&mut out, &STRENGTH_RE, text, "strength", 0.85);
    numeric_slot(&mut out, &ROUGHNESS_RE, text, "roughness", 0.9);
    numeric_slot(&mut out, &METALLIC_RE, text, "metallic", 0.9);

    if let Some(caps) = RESOLUTION_RE.captures(text) {
        let (start, end) = span(&caps);
        let value = caps
            .get(1)
            .and_then(|k| number(k.as_str()))
            .map(|k| k * 1024.0)
            .or_else(|| caps.get(2).and_then(|px| number(px.as_str())));
        if let Some(value) = value {
            out.push(
                ParsedParameter::numeric("texture_resolution", value, 0.85).with_span(start, end),
            );
        }
    }

    extract_frames(text, &mut out);
    extract_lighting(text, &mut out);
    extract_operation(text, &out.clone(), &mut out);
    extract_animation(text, &mut out);

    if let Some(m) = ALL_RE.find(text) {
        out.push(ParsedParameter::flag("all", true, 0.9).with_span(m.start(), m.end()));
    }

    out.sort_by_key(|param| param.source_span.map_or(usize::MAX, |s| s.start));
    out
}

fn extract_color(text: &str, out: &mut Vec<ParsedParameter>) {
    if let Some(caps) = HEX_RE.captures(text) {
        let hex = &caps[1];
        let channel = |idx: usize| {
            u8::from_str_radix(&hex[idx..idx + 2], 16).map_or(0.0, |v| f64::from(v) / 255.0)
        };
        let (start, end) = span(&caps);
        out.push(
            ParsedParameter::vector("color", vec![channel(0), channel(2), channel(4), 1.0], 0.95)
                .with_span(start, end),
        );
        return;
    }
    if let Some(caps) = RGB_RE.captures(text) {
        let mut rgba: Vec<f64> = numbers(&caps)
            .into_iter()
            .map(|v| v.min(255.0) / 255.0)
            .collect();
        rgba.push(1.0);
        let (start, end) = span(&caps);
        out.push(ParsedParameter::vector("color", rgba, 0.95).with_span(start, end));
        return;
    }
    if let Some(m) = COLOR_RE.find(text) {
        if let Some(rgba) = named_color(m.as_str()) {
            out.push(
                ParsedParameter::vector("color", rgba.to_vec(), 0.9).with_span(m.start(), m.end()),
            );
        }
    }
}

fn extract_size(text: &str, out: &mut Vec<ParsedParameter>) {
    let caps = SIZE_RE.captures(text).or_else(|| DIMENSIONS_RE.captures(text));
    let Some(caps) = caps else {
        return;
    };
    let values = numbers(&caps);
    let (start, end) = span(&caps);
    let param = match values.as_slice() {
        [scalar] => ParsedParameter::numeric("size", *scalar, 0.9),
        [x, y, z] => ParsedParameter::vector("size", vec![*x, *y, *z], 0.9),
        _ => return,
    };
    out.push(param.with_span(start, end));
}

fn extract_location(text: &str, out: &mut Vec<ParsedParameter>) {
    if let Some(caps) = LOCATION_RE.captures(text) {
        let (start, end) = span(&caps);
        out.push(ParsedParameter::vector("location", numbers(&caps), 0.9).with_span(start, end));
    } else if let Some(m) = ORIGIN_RE.find(text) {
        out.push(
            ParsedParameter::vector("location", vec![0.0, 0.0, 0.0], 0.85)
                .with_span(m.start(), m.end()),
        );
    }
}

fn extract_count(text: &str, out: &mut Vec<ParsedParameter>) {
    if let Some(caps) = COUNT_RE.captures(text) {
        if let Some(value) = caps.get(1).and_then(|m| word_number(m.as_str())) {
            let (start, end) = span(&caps);
            out.push(ParsedParameter::numeric("count", value, 0.85).with_span(start, end));
            return;
        }
    }
    numeric_slot(out, &TIMES_RE, text, "count", 0.85);
}

fn extract_scale(text: &str, out: &mut Vec<ParsedParameter>) {
    if let Some(caps) = SCALE_RE.captures(text) {
        if let Some(value) = first_number(&caps) {
            let (start, end) = span(&caps);
            out.push(ParsedParameter::numeric("scale", value, 0.9).with_span(start, end));
            return;
        }
    }
    if let Some(m) = RELATIVE_SCALE_RE.find(text) {
        let factor = if m.as_str() == "smaller" { 0.5 } else { 1.5 };
        out.push(ParsedParameter::numeric("scale", factor, 0.5).with_span(m.start(), m.end()));
    }
}

fn extract_frames(text: &str, out: &mut Vec<ParsedParameter>) {
    if let Some(caps) = FRAME_RANGE_RE.captures(text) {
        let values = numbers(&caps);
        if let [first, last] = values.as_slice() {
            let (start, end) = span(&caps);
            out.push(ParsedParameter::numeric("frame_start", *first, 0.9).with_span(start, end));
            out.push(ParsedParameter::numeric("frame_end", *last, 0.9).with_span(start, end));
        }
    }
    numeric_slot(out, &FRAME_COUNT_RE, text, "frame_count", 0.9);
}

fn extract_lighting(text: &str, out: &mut Vec<ParsedParameter>) {
    let Some(m) = LIGHTING_RE.find(text) else {
        return;
    };
    let lighting = match m.as_str() {
        "three-point" | "three point" | "3-point" | "3 point" => "three_point",
        other => other,
    };
    if LIGHTING_TYPES.contains(&lighting) {
        out.push(
            ParsedParameter::enumerated("lighting_type", lighting, LIGHTING_TYPES, 0.9)
                .with_span(m.start(), m.end()),
        );
    }
}

fn extract_operation(text: &str, found: &[ParsedParameter], out: &mut Vec<ParsedParameter>) {
    let has = |name: &str| found.iter().any(|param| param.name == name);
    let from_verb = OPERATION_RE.find(text).map(|m| {
        let op = match m.as_str() {
            "rotate" | "turn" | "spin" => "rotate",
            "scale" | "resize" | "grow" | "shrink" | "bigger" | "larger" | "smaller" => "scale",
            _ => "move",
        };
        (op, m.start(), m.end())
    });
    let inferred = if has("rotation") {
        Some("rotate")
    } else if has("scale") {
        Some("scale")
    } else if has("location") {
        Some("move")
    } else {
        None
    };
    match (from_verb, inferred) {
        (Some((op, start, end)), _) => out.push(
            ParsedParameter::enumerated("operation", op, OPERATIONS, 0.9).with_span(start, end),
        ),
        (None, Some(op)) => out.push(ParsedParameter::enumerated("operation", op, OPERATIONS, 0.7)),
        (None, None) => {}
    }
}

fn extract_animation(text: &str, out: &mut Vec<ParsedParameter>) {
    let Some(m) = ANIMATION_RE.find(text) else {
        return;
    };
    let word = m.as_str();
    let kind = if word.starts_with("rotat") || word.starts_with("spin") {
        "rotation"
    } else if word.starts_with("bounc") {
        "bounce"
    } else if word.starts_with("orbit") {
        "orbit"
    } else if word.starts_with("scal") || word.starts_with("puls") || word.starts_with("grow") {
        "scale"
    } else {
        "location"
    };
    if ANIMATION_TYPES.contains(&kind) {
        out.push(
            ParsedParameter::enumerated("animation_type", kind, ANIMATION_TYPES, 0.8)
                .with_span(m.start(), m.end()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{ParameterKind, ParameterValue};
    use crate::parser::helper::normalize;

    fn slots(text: &str) -> Vec<ParsedParameter> {
        extract(&normalize(text))
    }

    fn value<'a>(params: &'a [ParsedParameter], name: &str) -> &'a ParameterValue {
        &params.iter().find(|p| p.name == name).unwrap().value
    }

    #[test]
    fn metallic_cube_with_dimensions() {
        let params = slots("create a metallic cube with size 2x2x2");
        assert_eq!(value(&params, "shape"), &ParameterValue::Text("cube".into()));
        assert_eq!(value(&params, "material"), &ParameterValue::Text("metallic".into()));
        assert_eq!(value(&params, "size"), &ParameterValue::Vector(vec![2.0, 2.0, 2.0]));
        let size = params.iter().find(|p| p.name == "size").unwrap();
        assert_eq!(size.resolved_kind(), ParameterKind::Vector);
        assert!(size.source_span.is_some());
    }

    #[test]
    fn colours_locations_and_counts() {
        let params = slots("add three red spheres at 1, 2.5, -3");
        assert_eq!(value(&params, "count"), &ParameterValue::Number(3.0));
        assert_eq!(
            value(&params, "color"),
            &ParameterValue::Vector(vec![1.0, 0.0, 0.0, 1.0])
        );
        assert_eq!(
            value(&params, "location"),
            &ParameterValue::Vector(vec![1.0, 2.5, -3.0])
        );
        let hex = slots("paint it #ff0000");
        assert_eq!(
            value(&hex, "color"),
            &ParameterValue::Vector(vec![1.0, 0.0, 0.0, 1.0])
        );
        let rgb = slots("paint it rgb(999, 0, 0)");
        assert_eq!(
            value(&rgb, "color"),
            &ParameterValue::Vector(vec![1.0, 0.0, 0.0, 1.0])
        );
    }

    #[test]
    fn transform_and_detail_slots() {
        let params = slots("rotate the cube 45 degrees");
        assert_eq!(value(&params, "rotation"), &ParameterValue::Number(45.0));
        assert_eq!(value(&params, "operation"), &ParameterValue::Text("rotate".into()));

        let params = slots("subdivide it to level 3");
        assert_eq!(value(&params, "subdivisions"), &ParameterValue::Number(3.0));

        let params = slots("scale it by 2");
        assert_eq!(value(&params, "scale"), &ParameterValue::Number(2.0));

        let params = slots("apply a wood material with 4k textures");
        assert_eq!(
            value(&params, "texture_resolution"),
            &ParameterValue::Number(4096.0)
        );
    }

    #[test]
    fn names_keep_their_case() {
        let params = slots("create a cube named HeroBox");
        assert_eq!(value(&params, "name"), &ParameterValue::Text("HeroBox".into()));
    }

    #[test]
    fn frames_and_lighting() {
        let params = slots("animate it spinning from frame 1 to 120");
        assert_eq!(value(&params, "frame_start"), &ParameterValue::Number(1.0));
        assert_eq!(value(&params, "frame_end"), &ParameterValue::Number(120.0));
        assert_eq!(value(&params, "animation_type"), &ParameterValue::Text("rotation".into()));

        let params = slots("set up three-point lighting with intensity 800");
        assert_eq!(
            value(&params, "lighting_type"),
            &ParameterValue::Text("three_point".into())
        );
        assert_eq!(value(&params, "intensity"), &ParameterValue::Number(800.0));
    }
}
