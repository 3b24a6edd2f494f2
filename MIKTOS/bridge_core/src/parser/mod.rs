//! Natural-language command parser.
//!
//! Parsing is pure and deterministic: the same text and context always yield
//! the same intent kind, parameters and confidence.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::ParserConfig,
    context::SessionContext,
    intent::{Intent, IntentKind},
    parameter::ParsedParameter,
};

/// Text normalisation helpers.
pub mod helper;
/// Slot extraction.
pub mod slots;
/// Cue tables and closed vocabularies.
pub mod vocabulary;

use helper::{normalize, tokens, NormalizedCommand};
use vocabulary::{slots_for, CUES, SUGGESTION_PATTERNS};

const TIE_EPSILON: f32 = 1e-6;
const UNRESOLVED_REFERENCE_FACTOR: f32 = 0.6;
const CREATE_AT_REFERENCE_FACTOR: f32 = 0.5;

static PRONOUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(it|that one|this one|that|this|them|those|these|the last object|the last one|the previous object|last object|the selection|the selected objects|selected objects|selected)\b",
    )
    .unwrap()
});

static DEFINITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:the|that|this)\s+((?:last|previous)\s+)?([a-z][a-z0-9_]*)\b").unwrap()
});

static INDEFINITE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(a|an|another|new|\d+|two|three|four|five)\s+").unwrap());

const NON_OBJECT_NOUNS: &[&str] = &[
    "scene", "material", "texture", "color", "colour", "light", "lights", "lighting", "frame",
    "frames", "origin", "center", "centre", "size", "level", "same", "way", "x", "y", "z",
];

/// Why a command could not be turned into an executable intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ParseFailure {
    /// Input was empty or whitespace.
    EmptyCommand,
    /// Input exceeded the configured length.
    CommandTooLong {
        /// Characters received.
        length: usize,
        /// Configured maximum.
        max: usize,
    },
    /// No operation vocabulary matched.
    NoRecognizedOperation,
    /// Best candidate fell below the confidence threshold.
    LowConfidence {
        /// Candidate confidence.
        confidence: f32,
        /// Configured threshold.
        threshold: f32,
    },
    /// The command referred to an object the session does not know.
    UnresolvedReference {
        /// Reference phrase as typed.
        phrase: String,
    },
}

impl ParseFailure {
    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyCommand => "EMPTY_COMMAND",
            Self::CommandTooLong { .. } => "COMMAND_TOO_LONG",
            Self::NoRecognizedOperation => "UNRECOGNIZED_COMMAND",
            Self::LowConfidence { .. } => "LOW_CONFIDENCE",
            Self::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
        }
    }

    /// Human-readable clarification prompt.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::EmptyCommand => "empty command: please type what you want to do".into(),
            Self::CommandTooLong { length, max } => {
                format!("command is {length} characters long; the limit is {max}")
            }
            Self::NoRecognizedOperation => {
                "could not recognise an operation; try e.g. 'create a cube'".into()
            }
            Self::LowConfidence {
                confidence,
                threshold,
            } => format!(
                "not sure what you meant (confidence {confidence:.2} < {threshold:.2}); please rephrase"
            ),
            Self::UnresolvedReference { phrase } => {
                format!("could not tell which object '{phrase}' refers to; please name it")
            }
        }
    }
}

/// Result of parsing one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    /// Intent ready for safety validation.
    Resolved(Intent),
    /// Command needs clarification.
    Unresolved {
        /// Diagnostic.
        failure: ParseFailure,
        /// Best candidate, when classification got that far.
        candidate: Option<Intent>,
    },
}

impl ParseOutcome {
    /// Resolved intent, if any.
    #[must_use]
    pub const fn intent(&self) -> Option<&Intent> {
        match self {
            Self::Resolved(intent) => Some(intent),
            Self::Unresolved { .. } => None,
        }
    }

    /// Failure, if unresolved.
    #[must_use]
    pub const fn failure(&self) -> Option<&ParseFailure> {
        match self {
            Self::Resolved(_) => None,
            Self::Unresolved { failure, .. } => Some(failure),
        }
    }
}

#[derive(Debug, Clone)]
enum Reference {
    Resolved(String),
    Unresolvable(String),
    Absent,
}

/// Converts free text plus session context into intents.
#[derive(Debug, Clone)]
pub struct CommandParser {
    config: ParserConfig,
}

impl CommandParser {
    /// Creates a parser.
    #[must_use]
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Configured confidence threshold.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.config.confidence_threshold
    }

    /// Parses `text`. Never fails: problems are reported as
    /// [`ParseOutcome::Unresolved`].
    #[must_use]
    pub fn parse(&self, text: &str, context: &SessionContext) -> ParseOutcome {
        if text.trim().is_empty() {
            return unresolved(ParseFailure::EmptyCommand, None);
        }
        let length = text.chars().count();
        if length > self.config.max_command_length {
            return unresolved(
                ParseFailure::CommandTooLong {
                    length,
                    max: self.config.max_command_length,
                },
                None,
            );
        }

        let cmd = normalize(text);
        let extracted = slots::extract(&cmd);
        let has_shape = extracted.iter().any(|param| param.name == "shape");
        let reference = find_reference(&cmd, context);
        let pronoun_aimed = PRONOUN_RE.is_match(&cmd.folded) || is_definite(&cmd, context);
        let indefinite_shape = extracted
            .iter()
            .find(|param| param.name == "shape")
            .and_then(|param| param.source_span)
            .is_some_and(|shape| INDEFINITE_RE.is_match(&cmd.folded[..shape.start]));

        let mut candidates: Vec<(IntentKind, f32)> = CUES
            .iter()
            .filter_map(|(kind, cues)| {
                let miss = cues
                    .iter()
                    .filter(|cue| cue.pattern.is_match(&cmd.folded))
                    .fold(1.0_f32, |acc, cue| acc * (1.0 - cue.weight));
                let mut confidence = 1.0 - miss;
                if confidence <= 0.0 {
                    return None;
                }
                if *kind == IntentKind::CreateObject
                    && pronoun_aimed
                    && !(has_shape && indefinite_shape)
                {
                    confidence *= CREATE_AT_REFERENCE_FACTOR;
                }
                if needs_reference(*kind)
                    && matches!(reference, Reference::Unresolvable(_))
                {
                    confidence *= UNRESOLVED_REFERENCE_FACTOR;
                }
                Some((*kind, confidence))
            })
            .collect();

        if candidates.is_empty() {
            return unresolved(ParseFailure::NoRecognizedOperation, None);
        }

        candidates.sort_by(|a, b| compare_candidates(*a, *b, context));
        let (kind, confidence) = candidates[0];

        let mut intent = Intent::new(kind, confidence, text.trim());
        intent.confirmed = cmd.confirmed;
        let allowed = slots_for(kind);
        intent.parameters = extracted
            .into_iter()
            .filter(|param| allowed.contains(&param.name.as_str()))
            .collect();

        if needs_reference(kind) {
            match &reference {
                Reference::Resolved(target) => {
                    intent
                        .parameters
                        .insert(0, ParsedParameter::text("target", target.clone(), 0.95));
                }
                Reference::Unresolvable(phrase) => {
                    return unresolved(
                        ParseFailure::UnresolvedReference {
                            phrase: phrase.clone(),
                        },
                        Some(intent),
                    );
                }
                Reference::Absent if intent.parameter("all").is_some() => {}
                Reference::Absent => {
                    if let Some(last) = &context.last_object_reference {
                        intent
                            .parameters
                            .insert(0, ParsedParameter::text("target", last.clone(), 0.7));
                    } else if kind.requires_target() {
                        intent.confidence *= UNRESOLVED_REFERENCE_FACTOR;
                    }
                }
            }
        }

        if intent.confidence < self.config.confidence_threshold {
            let failure = ParseFailure::LowConfidence {
                confidence: intent.confidence,
                threshold: self.config.confidence_threshold,
            };
            return unresolved(failure, Some(intent));
        }
        ParseOutcome::Resolved(intent)
    }

    /// Completion suggestions for a partial command, at most five.
    #[must_use]
    pub fn suggest(&self, partial: &str) -> Vec<String> {
        let folded = partial.trim().to_lowercase();
        if folded.is_empty() {
            return Vec::new();
        }
        let words: Vec<&str> = folded.split_whitespace().collect();
        SUGGESTION_PATTERNS
            .iter()
            .filter(|(template, _)| {
                let head = template.split_whitespace().next().unwrap_or_default();
                words.iter().any(|word| {
                    template.split_whitespace().any(|part| part == *word)
                        || head.starts_with(word)
                })
            })
            .map(|(template, options)| {
                let option = options
                    .iter()
                    .find(|option| folded.contains(**option))
                    .or_else(|| options.first())
                    .copied()
                    .unwrap_or_default();
                template.replace("{}", option)
            })
            .take(5)
            .collect()
    }
}

fn unresolved(failure: ParseFailure, candidate: Option<Intent>) -> ParseOutcome {
    ParseOutcome::Unresolved { failure, candidate }
}

const fn needs_reference(kind: IntentKind) -> bool {
    kind.requires_target() || matches!(kind, IntentKind::Select)
}

/// Highest confidence first; exact ties go to the most recently used kind,
/// then to canonical order.
fn compare_candidates(
    a: (IntentKind, f32),
    b: (IntentKind, f32),
    context: &SessionContext,
) -> std::cmp::Ordering {
    if (a.1 - b.1).abs() > TIE_EPSILON {
        return b.1.total_cmp(&a.1);
    }
    let rank_a = context.last_used_rank(a.0).unwrap_or(usize::MAX);
    let rank_b = context.last_used_rank(b.0).unwrap_or(usize::MAX);
    rank_a.cmp(&rank_b).then_with(|| a.0.cmp(&b.0))
}

fn is_definite(cmd: &NormalizedCommand, context: &SessionContext) -> bool {
    DEFINITE_RE.captures_iter(&cmd.folded).any(|caps| {
        caps.get(2)
            .is_some_and(|noun| context.resolve_reference(noun.as_str()).is_some())
    })
}

fn find_reference(cmd: &NormalizedCommand, context: &SessionContext) -> Reference {
    for token in tokens(&cmd.cased) {
        if token.is_empty() {
            continue;
        }
        if context.scene_objects.contains(token) || context.variable_bindings.contains_key(token)
        {
            if let Some(name) = context.resolve_reference(token) {
                return Reference::Resolved(name);
            }
        }
    }

    if let Some(m) = PRONOUN_RE.find(&cmd.folded) {
        return context
            .resolve_reference(m.as_str())
            .map_or_else(
                || Reference::Unresolvable(m.as_str().to_string()),
                Reference::Resolved,
            );
    }

    for caps in DEFINITE_RE.captures_iter(&cmd.folded) {
        let Some(noun) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        if NON_OBJECT_NOUNS.contains(&noun) {
            continue;
        }
        let phrase = caps.get(0).map_or(noun, |m| m.as_str());
        let lookup = if caps.get(1).is_some() {
            format!("last {noun}")
        } else {
            noun.to_string()
        };
        let singular = lookup.strip_suffix('s').unwrap_or(&lookup);
        return context
            .resolve_reference(&lookup)
            .or_else(|| context.resolve_reference(singular))
            .map_or_else(|| Reference::Unresolvable(phrase.to_string()), Reference::Resolved);
    }
    Reference::Absent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{ParameterKind, ParameterValue};

    fn parser() -> CommandParser {
        CommandParser::new(&ParserConfig::default())
    }

    fn resolved(outcome: ParseOutcome) -> Intent {
        match outcome {
            ParseOutcome::Resolved(intent) => intent,
            ParseOutcome::Unresolved { failure, .. } => panic!("unresolved: {failure:?}"),
        }
    }

    #[test]
    fn empty_input_is_unresolved() {
        let ctx = SessionContext::new("s", 10);
        for text in ["", "   ", "\n\t"] {
            let outcome = parser().parse(text, &ctx);
            assert_eq!(outcome.failure(), Some(&ParseFailure::EmptyCommand));
            assert_eq!(outcome.failure().unwrap().code(), "EMPTY_COMMAND");
        }
    }

    #[test]
    fn overlong_input_is_unresolved() {
        let config = ParserConfig {
            max_command_length: 10,
            ..ParserConfig::default()
        };
        let outcome = CommandParser::new(&config).parse("create a very large cube", &SessionContext::new("s", 1));
        assert!(matches!(
            outcome.failure(),
            Some(ParseFailure::CommandTooLong { length: 24, max: 10 })
        ));
    }

    #[test]
    fn gibberish_is_unrecognized() {
        let outcome = parser().parse("qwerty zxcv", &SessionContext::new("s", 1));
        assert_eq!(outcome.failure(), Some(&ParseFailure::NoRecognizedOperation));
    }

    #[test]
    fn metallic_cube_scenario() {
        let ctx = SessionContext::new("s", 10);
        let intent = resolved(parser().parse("create a metallic cube with size 2x2x2", &ctx));
        assert_eq!(intent.kind, IntentKind::CreateObject);
        assert!(intent.confidence >= 0.6);
        let names: Vec<_> = intent.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["material", "shape", "size"]);
        assert_eq!(intent.text("shape"), Some("cube"));
        assert_eq!(intent.text("material"), Some("metallic"));
        assert_eq!(
            intent.parameter("size").unwrap().value,
            ParameterValue::Vector(vec![2.0, 2.0, 2.0])
        );
        assert_eq!(
            intent.parameter("shape").unwrap().resolved_kind(),
            ParameterKind::Enum
        );
    }

    #[test]
    fn pronoun_resolves_to_last_object() {
        let ctx = SessionContext::new("s", 10).with_last_object("Cube.001");
        let intent = resolved(parser().parse("make it red", &ctx));
        assert_eq!(intent.kind, IntentKind::ApplyMaterial);
        assert_eq!(intent.target(), Some("Cube.001"));
        assert!(intent.confidence > 0.6);
        assert!(intent.parameter("color").is_some());
    }

    #[test]
    fn unresolvable_pronoun_asks_for_clarification() {
        let ctx = SessionContext::new("s", 10);
        let outcome = parser().parse("make it red", &ctx);
        match outcome {
            ParseOutcome::Unresolved { failure, candidate } => {
                assert_eq!(failure.code(), "UNRESOLVED_REFERENCE");
                assert_eq!(candidate.unwrap().kind, IntentKind::ApplyMaterial);
            }
            ParseOutcome::Resolved(intent) => panic!("unexpected {intent:?}"),
        }
    }

    #[test]
    fn definite_noun_and_explicit_name() {
        let ctx = SessionContext::new("s", 10).with_scene_objects(["Cube", "Sphere", "Cube.001"]);
        let intent = resolved(parser().parse("rotate the sphere 90 degrees", &ctx));
        assert_eq!(intent.kind, IntentKind::Transform);
        assert_eq!(intent.target(), Some("Sphere"));
        assert_eq!(intent.number("rotation"), Some(90.0));

        let intent = resolved(parser().parse("subdivide Cube to level 2", &ctx));
        assert_eq!(intent.kind, IntentKind::Subdivide);
        assert_eq!(intent.target(), Some("Cube"));
        assert_eq!(intent.number("subdivisions"), Some(2.0));
    }

    #[test]
    fn confirmation_token_marks_intent() {
        let ctx = SessionContext::new("s", 10).with_last_object("Cube");
        let intent = resolved(parser().parse("delete the cube, confirm", &ctx));
        assert_eq!(intent.kind, IntentKind::DeleteObject);
        assert!(intent.confirmed);
        assert_eq!(intent.target(), Some("Cube"));
        let intent = resolved(parser().parse("delete it", &ctx));
        assert!(!intent.confirmed);
    }

    #[test]
    fn exact_ties_prefer_recent_then_canonical() {
        let ctx = SessionContext::new("s", 10);
        let a = (IntentKind::Select, 0.8);
        let b = (IntentKind::Duplicate, 0.8);
        assert_eq!(
            compare_candidates(a, b, &ctx),
            std::cmp::Ordering::Greater
        );

        let mut ctx = SessionContext::new("s", 10);
        let record = crate::skills::SkillResult::succeeded("ok");
        ctx.update_after_dispatch(
            &Intent::new(IntentKind::Select, 0.9, "select"),
            &[],
            &record,
        );
        assert_eq!(compare_candidates(a, b, &ctx), std::cmp::Ordering::Less);
        assert_eq!(
            compare_candidates((IntentKind::QueryScene, 0.9), a, &ctx),
            std::cmp::Ordering::Less
        );
    }

    #[test]
    fn lighting_beats_generic_creation() {
        let ctx = SessionContext::new("s", 10);
        let intent = resolved(parser().parse("create a three-point lighting setup", &ctx));
        assert_eq!(intent.kind, IntentKind::SetLighting);
        assert_eq!(intent.text("lighting_type"), Some("three_point"));
    }

    #[test]
    fn parsing_is_deterministic() {
        let ctx = SessionContext::new("s", 10).with_last_object("Cube");
        let first = resolved(parser().parse("scale it by 2", &ctx));
        let second = resolved(parser().parse("scale it by 2", &ctx));
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.parameters, second.parameters);
        assert!((first.confidence - second.confidence).abs() < f32::EPSILON);
    }

    #[test]
    fn suggestions_complete_templates() {
        let suggestions = parser().suggest("create");
        assert_eq!(suggestions.first().map(String::as_str), Some("create a cube"));
        let suggestions = parser().suggest("rotate 45");
        assert!(suggestions.contains(&"rotate 45 degrees".to_string()));
        assert!(parser().suggest("  ").is_empty());
    }
}
