use once_cell::sync::Lazy;
use regex::Regex;

use crate::intent::IntentKind;

/// Weighted classification cue.
#[derive(Debug)]
pub struct Cue {
    /// Pattern matched against the folded command.
    pub pattern: Regex,
    /// Contribution when matched.
    pub weight: f32,
}

fn cue(pattern: &str, weight: f32) -> Cue {
    Cue {
        pattern: Regex::new(pattern).unwrap(),
        weight,
    }
}

const COLOR_WORDS: &str =
    "red|green|blue|yellow|orange|purple|violet|pink|white|black|gr[ae]y|brown|cyan|magenta|gold(?:en)?|silver";
const MATERIAL_WORDS: &str = "metallic|metal|glass|plastic|wood|wooden|fabric|cloth|chrome|rubber|emissive|glossy|matte|ceramic|stone|marble";

/// Primitive shapes the host can create.
pub const SHAPES: &[&str] = &[
    "cube",
    "sphere",
    "cylinder",
    "cone",
    "torus",
    "plane",
    "monkey",
    "icosphere",
    "circle",
    "grid",
];

/// Material presets.
pub const MATERIALS: &[&str] = &[
    "metallic", "glass", "plastic", "wood", "fabric", "chrome", "rubber", "emissive", "glossy",
    "matte", "ceramic", "stone", "marble", "gold", "silver",
];

/// Lighting rigs.
pub const LIGHTING_TYPES: &[&str] = &[
    "three_point",
    "studio",
    "hdri",
    "sky",
    "sun",
    "softbox",
    "rim",
    "spot",
    "area",
    "point",
];

/// Transform operations.
pub const OPERATIONS: &[&str] = &["move", "rotate", "scale"];

/// Animation presets.
pub const ANIMATION_TYPES: &[&str] = &["rotation", "location", "scale", "bounce", "orbit"];

/// Regex alternation matching shape nouns and their synonyms.
pub const SHAPE_PATTERN: &str =
    r"\b(cubes?|box(?:es)?|spheres?|balls?|cylinders?|cones?|torus|tori|donuts?|planes?|monkeys?|suzanne|ico ?spheres?|circles?|grids?)\b";

/// Maps a shape noun (possibly plural or a synonym) to its canonical name.
#[must_use]
pub fn canonical_shape(raw: &str) -> Option<&'static str> {
    let word = raw.trim().replace(' ', "");
    let shape = match word.as_str() {
        "cube" | "cubes" | "box" | "boxes" => "cube",
        "sphere" | "spheres" | "ball" | "balls" => "sphere",
        "cylinder" | "cylinders" => "cylinder",
        "cone" | "cones" => "cone",
        "torus" | "tori" | "donut" | "donuts" => "torus",
        "plane" | "planes" => "plane",
        "monkey" | "monkeys" | "suzanne" => "monkey",
        "icosphere" | "icospheres" => "icosphere",
        "circle" | "circles" => "circle",
        "grid" | "grids" => "grid",
        _ => return None,
    };
    Some(shape)
}

/// Maps a material word to its preset.
#[must_use]
pub fn canonical_material(raw: &str) -> Option<&'static str> {
    let material = match raw {
        "metallic" | "metal" => "metallic",
        "wood" | "wooden" => "wood",
        "fabric" | "cloth" => "fabric",
        "gold" | "golden" => "gold",
        other => return MATERIALS.iter().copied().find(|known| *known == other),
    };
    Some(material)
}

/// RGBA for a named colour.
#[must_use]
pub fn named_color(raw: &str) -> Option<[f64; 4]> {
    let rgb = match raw {
        "red" => [1.0, 0.0, 0.0],
        "green" => [0.0, 1.0, 0.0],
        "blue" => [0.0, 0.0, 1.0],
        "yellow" => [1.0, 1.0, 0.0],
        "orange" => [1.0, 0.5, 0.0],
        "purple" | "violet" => [0.5, 0.0, 0.5],
        "pink" => [1.0, 0.75, 0.8],
        "white" => [1.0, 1.0, 1.0],
        "black" => [0.0, 0.0, 0.0],
        "gray" | "grey" => [0.5, 0.5, 0.5],
        "brown" => [0.6, 0.3, 0.1],
        "cyan" => [0.0, 1.0, 1.0],
        "magenta" => [1.0, 0.0, 1.0],
        "gold" | "golden" => [1.0, 0.84, 0.0],
        "silver" => [0.75, 0.75, 0.75],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 1.0])
}

/// Regex alternation of colour words.
#[must_use]
pub fn color_pattern() -> String {
    format!(r"\b({COLOR_WORDS})\b")
}

/// Regex alternation of material words.
#[must_use]
pub fn material_pattern() -> String {
    format!(r"\b({MATERIAL_WORDS})\b")
}

/// Classification cues per intent kind.
pub static CUES: Lazy<Vec<(IntentKind, Vec<Cue>)>> = Lazy::new(|| {
    vec![
        (
            IntentKind::CreateObject,
            vec![
                cue(r"\b(create|add|make|build|spawn|generate|insert|place|new)\b", 0.6),
                cue(SHAPE_PATTERN, 0.5),
                cue(r"\b(a|an|another)\s+(cube|box|sphere|ball|cylinder|cone|torus|donut|plane|monkey)\b", 0.3),
            ],
        ),
        (
            IntentKind::ApplyMaterial,
            vec![
                cue(r"\b(material|texture|shader|finish)\b", 0.6),
                cue(r"\b(paint|color|colour|tint|shade)\b", 0.6),
                cue(&color_pattern(), 0.5),
                cue(&material_pattern(), 0.4),
                cue(
                    &format!(
                        r"\b(make|turn|set|paint)\s+(it|that|this|them|the\s+\w+|[\w.]+)\s+({COLOR_WORDS}|{MATERIAL_WORDS})\b"
                    ),
                    0.7,
                ),
            ],
        ),
        (
            IntentKind::Transform,
            vec![
                cue(r"\b(move|translate|shift|rotate|turn|scale|resize|grow|shrink|position)\b", 0.7),
                cue(r"\b(bigger|smaller|larger|taller|shorter)\b", 0.6),
                cue(r"\b(by|to)\s+-?\d", 0.2),
                cue(r"\b(degrees?|deg)\b|°", 0.3),
                cue(r"\blocation\b", 0.3),
            ],
        ),
        (
            IntentKind::Subdivide,
            vec![
                cue(r"\bsubdivi(de|sion|sions|ded)\b", 0.8),
                cue(r"\bsmooth(er|en)?\b", 0.5),
                cue(r"\blevels?\b", 0.2),
            ],
        ),
        (
            IntentKind::SetLighting,
            vec![
                cue(r"\b(light|lights|lighting|lamp|illuminate|illumination)\b", 0.7),
                cue(r"\b(three[- ]point|3[- ]point|studio|hdri|sky|sun|softbox|rim|spot|area)\b", 0.3),
            ],
        ),
        (
            IntentKind::Animate,
            vec![
                cue(r"\b(animate|animation|animated|keyframes?)\b", 0.8),
                cue(r"\bframes?\b", 0.4),
                cue(r"\b(bounce|bouncing|orbit|spin|spinning|wiggle)\b", 0.4),
            ],
        ),
        (
            IntentKind::Duplicate,
            vec![
                cue(r"\b(duplicate|copy|clone|replicate)\b", 0.8),
                cue(r"\b(array|copies)\b", 0.4),
            ],
        ),
        (
            IntentKind::Select,
            vec![cue(r"\b(select|pick|choose|highlight)\b", 0.8)],
        ),
        (
            IntentKind::DeleteObject,
            vec![cue(r"\b(delete|remove|erase|destroy|clear)\b", 0.8)],
        ),
        (
            IntentKind::QueryScene,
            vec![
                cue(r"\b(status|list|show|what|how many|describe|info|report)\b", 0.6),
                cue(r"\bscene\b", 0.3),
                cue(r"\?", 0.3),
            ],
        ),
    ]
});

/// Slots each intent kind accepts.
#[must_use]
pub const fn slots_for(kind: IntentKind) -> &'static [&'static str] {
    match kind {
        IntentKind::CreateObject => &[
            "shape",
            "material",
            "color",
            "size",
            "location",
            "count",
            "name",
            "subdivisions",
            "scale",
            "rotation",
            "roughness",
            "metallic",
            "texture_resolution",
        ],
        IntentKind::ApplyMaterial => &[
            "target",
            "material",
            "color",
            "roughness",
            "metallic",
            "strength",
            "texture_resolution",
        ],
        IntentKind::Transform => &["target", "operation", "location", "rotation", "scale"],
        IntentKind::Subdivide => &["target", "subdivisions"],
        IntentKind::SetLighting => &["lighting_type", "intensity", "color", "location"],
        IntentKind::Animate => &[
            "target",
            "animation_type",
            "frame_start",
            "frame_end",
            "frame_count",
        ],
        IntentKind::Duplicate => &["target", "count", "location"],
        IntentKind::Select | IntentKind::DeleteObject => &["target", "all"],
        IntentKind::QueryScene => &[],
    }
}

/// Completion templates and the options filling their placeholder.
pub const SUGGESTION_PATTERNS: &[(&str, &[&str])] = &[
    ("create a {}", &["cube", "sphere", "cylinder", "plane"]),
    ("apply a {} material", &["metallic", "glass", "plastic", "wood"]),
    ("set up {} lighting", &["three-point", "studio", "hdri"]),
    ("delete the selected object", &[]),
    ("scale by {}", &["2", "0.5", "1.5"]),
    ("rotate {} degrees", &["90", "45", "180"]),
    ("subdivide {} levels", &["2", "3", "4"]),
    ("animate it from frame 1 to {}", &["120", "250"]),
    ("duplicate it {} times", &["2", "3", "5"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_cover_every_kind_in_canonical_order() {
        let kinds: Vec<_> = CUES.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, IntentKind::ALL.to_vec());
    }

    #[test]
    fn synonyms_map_to_canonical_names() {
        assert_eq!(canonical_shape("boxes"), Some("cube"));
        assert_eq!(canonical_shape("ico sphere"), Some("icosphere"));
        assert_eq!(canonical_material("metal"), Some("metallic"));
        assert_eq!(canonical_material("glass"), Some("glass"));
        assert_eq!(canonical_material("velvet"), None);
        assert_eq!(named_color("grey"), Some([0.5, 0.5, 0.5, 1.0]));
    }
}
