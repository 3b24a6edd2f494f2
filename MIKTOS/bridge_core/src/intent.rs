use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parameter::ParsedParameter;

/// Recognised operation classes, declared in canonical tie-break order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    /// Add a new object to the scene.
    CreateObject,
    /// Assign a material or colour.
    ApplyMaterial,
    /// Move, rotate or scale.
    Transform,
    /// Add subdivision levels.
    Subdivide,
    /// Build a lighting setup.
    SetLighting,
    /// Keyframe an animation.
    Animate,
    /// Copy existing objects.
    Duplicate,
    /// Change the active selection.
    Select,
    /// Remove objects.
    DeleteObject,
    /// Report scene state.
    QueryScene,
}

impl IntentKind {
    /// Every kind in canonical order.
    pub const ALL: [Self; 10] = [
        Self::CreateObject,
        Self::ApplyMaterial,
        Self::Transform,
        Self::Subdivide,
        Self::SetLighting,
        Self::Animate,
        Self::Duplicate,
        Self::Select,
        Self::DeleteObject,
        Self::QueryScene,
    ];

    /// Stable upper-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreateObject => "CREATE_OBJECT",
            Self::ApplyMaterial => "APPLY_MATERIAL",
            Self::Transform => "TRANSFORM",
            Self::Subdivide => "SUBDIVIDE",
            Self::SetLighting => "SET_LIGHTING",
            Self::Animate => "ANIMATE",
            Self::Duplicate => "DUPLICATE",
            Self::Select => "SELECT",
            Self::DeleteObject => "DELETE_OBJECT",
            Self::QueryScene => "QUERY_SCENE",
        }
    }

    /// Parses a label produced by [`IntentKind::label`].
    #[must_use]
    pub fn from_label(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(raw.trim()))
    }

    /// Irreversible operations gated behind confirmation.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::DeleteObject)
    }

    /// Operations that add objects to the scene.
    #[must_use]
    pub const fn creates_objects(self) -> bool {
        matches!(self, Self::CreateObject | Self::Duplicate)
    }

    /// Operations whose affected objects become the active selection.
    #[must_use]
    pub const fn is_selection_scoped(self) -> bool {
        matches!(self, Self::Select)
    }

    /// Operations acting on an existing object.
    #[must_use]
    pub const fn requires_target(self) -> bool {
        matches!(
            self,
            Self::ApplyMaterial
                | Self::Transform
                | Self::Subdivide
                | Self::Animate
                | Self::Duplicate
                | Self::DeleteObject
        )
    }
}

/// One interpreted user command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    /// Identifier for tracing.
    pub id: Uuid,
    /// Operation class.
    pub kind: IntentKind,
    /// Classification certainty in `[0, 1]`.
    pub confidence: f32,
    /// Extracted arguments in the order they were found.
    pub parameters: Vec<ParsedParameter>,
    /// Command text as typed.
    pub raw_text: String,
    /// Caller confirmed destructive effects.
    #[serde(default)]
    pub confirmed: bool,
}

impl Intent {
    /// Creates an intent without parameters.
    #[must_use]
    pub fn new(kind: IntentKind, confidence: f32, raw_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            parameters: Vec::new(),
            raw_text: raw_text.into(),
            confirmed: false,
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: ParsedParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Marks the intent confirmed.
    #[must_use]
    pub const fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Operation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.label()
    }

    /// First parameter called `name`.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParsedParameter> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Numeric value of `name`.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.parameter(name).and_then(ParsedParameter::as_f64)
    }

    /// Text value of `name`.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.parameter(name).and_then(ParsedParameter::as_text)
    }

    /// Resolved target object.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.text("target")
    }

    /// Whether the intent needs confirmation before running.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        self.kind.is_destructive()
    }

    /// Number of skill operations this intent expands to.
    ///
    /// Creation chains a material step when a material or colour is given
    /// and a subdivision step when a level is given.
    #[must_use]
    pub fn planned_operations(&self) -> usize {
        match self.kind {
            IntentKind::CreateObject => {
                let mut steps = 1;
                if self.parameter("material").is_some() || self.parameter("color").is_some() {
                    steps += 1;
                }
                if self.parameter("subdivisions").is_some() {
                    steps += 1;
                }
                steps
            }
            _ => 1,
        }
    }
}
