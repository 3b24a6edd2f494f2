use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{
    intent::{Intent, IntentKind},
    parameter::{ParameterValue, ParsedParameter},
    skills::SkillResult,
};

const LAST_OBJECT_WORDS: &[&str] = &[
    "it",
    "that",
    "this",
    "last",
    "last object",
    "previous",
    "previous object",
    "object",
    "last one",
    "that one",
    "this one",
];

const SELECTION_WORDS: &[&str] = &["selected", "selection", "them", "those", "these", "selected objects"];

/// Compact record of one dispatched command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// Operation class.
    pub intent: IntentKind,
    /// Command text.
    pub raw_text: String,
    /// Objects the command touched.
    pub objects: Vec<String>,
    /// Completion time.
    pub recorded_at: DateTime<Utc>,
}

/// Short-term conversational state of one session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Owning session.
    pub session_id: String,
    /// Object most recently created or acted upon.
    pub last_object_reference: Option<String>,
    /// Objects currently selected.
    pub active_selection: IndexSet<String>,
    /// User-defined names.
    pub variable_bindings: IndexMap<String, ParameterValue>,
    /// Objects known to exist, oldest first.
    pub scene_objects: IndexSet<String>,
    command_history: VecDeque<HistoryRecord>,
    history_capacity: usize,
}

impl SessionContext {
    /// Creates an empty context keeping at most `history_capacity` records.
    #[must_use]
    pub fn new(session_id: impl Into<String>, history_capacity: usize) -> Self {
        let history_capacity = history_capacity.max(1);
        Self {
            session_id: session_id.into(),
            last_object_reference: None,
            active_selection: IndexSet::new(),
            variable_bindings: IndexMap::new(),
            scene_objects: IndexSet::new(),
            command_history: VecDeque::with_capacity(history_capacity),
            history_capacity,
        }
    }

    /// Seeds a known object and makes it the last reference.
    #[must_use]
    pub fn with_last_object(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.scene_objects.insert(name.clone());
        self.last_object_reference = Some(name);
        self
    }

    /// Seeds known objects without changing the last reference.
    #[must_use]
    pub fn with_scene_objects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scene_objects.extend(names.into_iter().map(Into::into));
        self
    }

    /// History, most recent last.
    pub fn command_history(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.command_history.iter()
    }

    /// Number of retained history records.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.command_history.len()
    }

    /// Maximum retained history records.
    #[must_use]
    pub const fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// How recently `kind` was dispatched: `0` for the latest command.
    #[must_use]
    pub fn last_used_rank(&self, kind: IntentKind) -> Option<usize> {
        self.command_history
            .iter()
            .rev()
            .position(|record| record.intent == kind)
    }

    /// Binds a user-defined name.
    pub fn bind(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.variable_bindings.insert(name.into(), value);
    }

    /// Removes a binding.
    pub fn unbind(&mut self, name: &str) -> Option<ParameterValue> {
        self.variable_bindings.shift_remove(name)
    }

    /// Resolves a reference phrase to an object identifier.
    ///
    /// Accepts pronouns (`it`, `that`, `the last object`), selection words,
    /// bound names, exact object names, and type nouns such as `the cube`,
    /// which resolve to the most recent object whose name starts with the
    /// noun.
    #[must_use]
    pub fn resolve_reference(&self, token: &str) -> Option<String> {
        let trimmed = token.trim();
        let lowered = trimmed.to_lowercase();
        let phrase = lowered
            .strip_prefix("the ")
            .unwrap_or(&lowered)
            .trim()
            .to_string();
        if phrase.is_empty() {
            return None;
        }
        if LAST_OBJECT_WORDS.contains(&phrase.as_str()) {
            return self.last_object_reference.clone();
        }
        if SELECTION_WORDS.contains(&phrase.as_str()) {
            return self.active_selection.last().cloned();
        }
        if let Some(ParameterValue::Text(bound)) = self.variable_bindings.get(trimmed) {
            return Some(bound.clone());
        }
        if let Some(name) = self.scene_objects.get(trimmed) {
            return Some(name.clone());
        }
        if let Some(name) = self
            .scene_objects
            .iter()
            .rev()
            .find(|name| name.to_lowercase() == phrase)
        {
            return Some(name.clone());
        }
        let noun = phrase
            .strip_prefix("last ")
            .or_else(|| phrase.strip_prefix("previous "))
            .unwrap_or(&phrase);
        self.scene_objects
            .iter()
            .rev()
            .find(|name| name.to_lowercase().starts_with(noun))
            .cloned()
    }

    /// Objects addressed by a selection word, or the last object when
    /// nothing is selected.
    #[must_use]
    pub fn resolve_selection(&self) -> Vec<String> {
        if self.active_selection.is_empty() {
            self.last_object_reference.iter().cloned().collect()
        } else {
            self.active_selection.iter().cloned().collect()
        }
    }

    /// Folds a finished dispatch into the context. Failed dispatches leave
    /// the context untouched.
    ///
    /// `parameters` are the parameters that were actually executed, i.e.
    /// after any safety correction. The newest created object, else the first
    /// surviving affected one, becomes `last_object_reference`.
    pub fn update_after_dispatch(
        &mut self,
        intent: &Intent,
        parameters: &[ParsedParameter],
        result: &SkillResult,
    ) {
        if !result.success {
            return;
        }
        for removed in &result.objects_removed {
            self.scene_objects.shift_remove(removed);
            self.active_selection.shift_remove(removed);
            self.variable_bindings
                .retain(|_, value| value.as_text() != Some(removed.as_str()));
        }
        if self
            .last_object_reference
            .as_ref()
            .is_some_and(|name| result.objects_removed.contains(name))
        {
            self.last_object_reference = self.scene_objects.last().cloned();
        }
        self.scene_objects
            .extend(result.objects_created.iter().cloned());

        let primary = result.objects_created.last().cloned().or_else(|| {
            result
                .object_names_affected
                .iter()
                .find(|name| !result.objects_removed.contains(name))
                .cloned()
        });
        if let Some(primary) = &primary {
            self.scene_objects.insert(primary.clone());
            self.last_object_reference = Some(primary.clone());
        }

        if intent.kind.is_selection_scoped() {
            self.active_selection.extend(
                result
                    .object_names_affected
                    .iter()
                    .filter(|name| !result.objects_removed.contains(name))
                    .cloned(),
            );
        }

        if let (Some(alias), Some(created)) = (
            parameters
                .iter()
                .find(|param| param.name == "name")
                .and_then(ParsedParameter::as_text),
            result.objects_created.first(),
        ) {
            self.bind(alias, ParameterValue::Text(created.clone()));
        }

        if self.command_history.len() == self.history_capacity {
            self.command_history.pop_front();
        }
        self.command_history.push_back(HistoryRecord {
            intent: intent.kind,
            raw_text: intent.raw_text.clone(),
            objects: result.object_names_affected.clone(),
            recorded_at: Utc::now(),
        });
    }

    /// Serialisable copy for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            last_object_reference: self.last_object_reference.clone(),
            active_selection: self.active_selection.iter().cloned().collect(),
            variable_bindings: self.variable_bindings.clone(),
            scene_objects: self.scene_objects.iter().cloned().collect(),
            command_history: self.command_history.iter().cloned().collect(),
        }
    }
}

/// Exported view of a [`SessionContext`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    /// Owning session.
    pub session_id: String,
    /// Object most recently created or acted upon.
    pub last_object_reference: Option<String>,
    /// Selected objects.
    pub active_selection: Vec<String>,
    /// User-defined names.
    pub variable_bindings: IndexMap<String, ParameterValue>,
    /// Known objects.
    pub scene_objects: Vec<String>,
    /// Dispatched commands, oldest first.
    pub command_history: Vec<HistoryRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(objects: &[&str]) -> SkillResult {
        let names: Vec<String> = objects.iter().map(|name| (*name).to_string()).collect();
        SkillResult {
            objects_created: names.clone(),
            object_names_affected: names,
            ..SkillResult::succeeded("ok")
        }
    }

    #[test]
    fn resolves_pronouns_and_nouns() {
        let ctx = SessionContext::new("s", 10)
            .with_scene_objects(["Cube", "Sphere"])
            .with_last_object("Cube.001");
        assert_eq!(ctx.resolve_reference("it").as_deref(), Some("Cube.001"));
        assert_eq!(ctx.resolve_reference("the last object").as_deref(), Some("Cube.001"));
        assert_eq!(ctx.resolve_reference("the cube").as_deref(), Some("Cube.001"));
        assert_eq!(ctx.resolve_reference("sphere").as_deref(), Some("Sphere"));
        assert_eq!(ctx.resolve_reference("Cube").as_deref(), Some("Cube"));
        assert_eq!(ctx.resolve_reference("the torus"), None);
        assert_eq!(SessionContext::new("s", 1).resolve_reference("it"), None);
    }

    #[test]
    fn successful_dispatch_updates_state() {
        let mut ctx = SessionContext::new("s", 10);
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "create a cube named hero");
        let params = vec![ParsedParameter::text("name", "hero", 0.9)];
        ctx.update_after_dispatch(&intent, &params, &created(&["hero"]));
        assert_eq!(ctx.last_object_reference.as_deref(), Some("hero"));
        assert_eq!(ctx.resolve_reference("hero").as_deref(), Some("hero"));
        assert_eq!(ctx.last_used_rank(IntentKind::CreateObject), Some(0));
        assert!(ctx.active_selection.is_empty());
    }

    #[test]
    fn newest_created_object_becomes_the_reference() {
        let mut ctx = SessionContext::new("s", 10);
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "create three cubes");
        ctx.update_after_dispatch(&intent, &[], &created(&["Cube", "Cube.001", "Cube.002"]));
        assert_eq!(ctx.last_object_reference.as_deref(), Some("Cube.002"));
        assert_eq!(ctx.resolve_reference("it").as_deref(), Some("Cube.002"));
        assert_eq!(ctx.scene_objects.len(), 3);
    }

    #[test]
    fn failed_dispatch_is_ignored() {
        let mut ctx = SessionContext::new("s", 10);
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "create a cube");
        ctx.update_after_dispatch(&intent, &[], &SkillResult::failed("boom", None));
        assert_eq!(ctx.history_len(), 0);
        assert!(ctx.last_object_reference.is_none());
    }

    #[test]
    fn history_is_fifo_bounded() {
        let mut ctx = SessionContext::new("s", 2);
        for (idx, kind) in [IntentKind::CreateObject, IntentKind::Transform, IntentKind::Select]
            .into_iter()
            .enumerate()
        {
            let intent = Intent::new(kind, 0.9, format!("cmd {idx}"));
            ctx.update_after_dispatch(&intent, &[], &created(&[]));
        }
        let texts: Vec<_> = ctx.command_history().map(|r| r.raw_text.clone()).collect();
        assert_eq!(texts, vec!["cmd 1".to_string(), "cmd 2".to_string()]);
        assert_eq!(ctx.last_used_rank(IntentKind::CreateObject), None);
        assert_eq!(ctx.last_used_rank(IntentKind::Transform), Some(1));
    }

    #[test]
    fn selection_and_deletion() {
        let mut ctx = SessionContext::new("s", 10).with_scene_objects(["Cube", "Sphere"]);
        let select = Intent::new(IntentKind::Select, 0.9, "select cube and sphere");
        let result = SkillResult {
            object_names_affected: vec!["Cube".into(), "Sphere".into()],
            ..SkillResult::succeeded("selected")
        };
        ctx.update_after_dispatch(&select, &[], &result);
        assert_eq!(ctx.resolve_selection(), vec!["Cube".to_string(), "Sphere".to_string()]);

        let delete = Intent::new(IntentKind::DeleteObject, 0.9, "delete the cube");
        let removed = SkillResult {
            object_names_affected: vec!["Cube".into()],
            objects_removed: vec!["Cube".into()],
            ..SkillResult::succeeded("deleted")
        };
        ctx.last_object_reference = Some("Cube".into());
        ctx.update_after_dispatch(&delete, &[], &removed);
        assert!(!ctx.scene_objects.contains("Cube"));
        assert_eq!(ctx.active_selection.len(), 1);
        assert_eq!(ctx.last_object_reference.as_deref(), Some("Sphere"));
    }
}
