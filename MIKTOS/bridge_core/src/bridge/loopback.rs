use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{BridgeAdapter, BridgeError, BridgeParams, BridgeResponse};
use crate::parameter::ParameterValue;

/// Object held by the simulated scene.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackObject {
    /// Primitive or light type.
    pub kind: String,
    /// Properties applied by later operations.
    pub properties: IndexMap<String, ParameterValue>,
}

#[derive(Debug, Default)]
struct SceneState {
    objects: IndexMap<String, LoopbackObject>,
    selection: Vec<String>,
    operations: Vec<String>,
    scripted: VecDeque<BridgeError>,
    failing: IndexMap<String, BridgeError>,
}

/// In-process host simulating a scene with host-style object names
/// (`Cube`, `Cube.001`, ...).
///
/// Failures can be scripted for tests, either once per call
/// ([`LoopbackBridge::fail_next`]) or persistently for one operation
/// ([`LoopbackBridge::fail_operation`]).
#[derive(Debug, Default)]
pub struct LoopbackBridge {
    state: Mutex<SceneState>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl LoopbackBridge {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, e.g. to exercise timeouts.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seeds existing objects.
    #[must_use]
    pub fn with_objects<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock();
            for name in names {
                let name = name.into();
                let kind = base_name(&name).to_lowercase();
                state.objects.insert(
                    name,
                    LoopbackObject {
                        kind,
                        properties: IndexMap::new(),
                    },
                );
            }
        }
        self
    }

    /// Fails the next call with `error`. Queued errors are consumed in order.
    pub fn fail_next(&self, error: BridgeError) {
        self.state.lock().scripted.push_back(error);
    }

    /// Fails every call to `operation` until [`LoopbackBridge::heal`].
    pub fn fail_operation(&self, operation: impl Into<String>, error: BridgeError) {
        self.state.lock().failing.insert(operation.into(), error);
    }

    /// Clears persistent failures.
    pub fn heal(&self) {
        self.state.lock().failing.clear();
    }

    /// Calls received, failed ones included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Operation names in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    /// Object names in creation order.
    #[must_use]
    pub fn object_names(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    /// Copy of one object.
    #[must_use]
    pub fn object(&self, name: &str) -> Option<LoopbackObject> {
        self.state.lock().objects.get(name).cloned()
    }
}

#[async_trait]
impl BridgeAdapter for LoopbackBridge {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &BridgeParams,
    ) -> Result<BridgeResponse, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock();
        state.operations.push(operation.to_string());
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }
        if let Some(error) = state.failing.get(operation) {
            return Err(error.clone());
        }
        state.apply(operation, params)
    }
}

impl SceneState {
    fn apply(
        &mut self,
        operation: &str,
        params: &BridgeParams,
    ) -> Result<BridgeResponse, BridgeError> {
        match operation {
            "create_primitive" => self.create_primitive(params),
            "apply_material" => self.modify(
                params,
                "material",
                &["material", "color", "roughness", "metallic", "strength", "texture_resolution"],
            ),
            "apply_subdivision" => self.modify(params, "subdivision", &["subdivisions"]),
            "transform_object" => self.modify(
                params,
                "transform",
                &["operation", "location", "rotation", "scale"],
            ),
            "animate_object" => self.modify(
                params,
                "animation",
                &["animation_type", "frame_start", "frame_end", "frame_count"],
            ),
            "setup_lighting" => Ok(self.setup_lighting(params)),
            "duplicate_object" => self.duplicate(params),
            "select_objects" => self.select(params),
            "delete_objects" => self.delete(params),
            "scene_status" => Ok(self.status()),
            other => Err(BridgeError::Rejected(format!("unknown operation type: {other}"))),
        }
    }

    fn next_name(&self, base: &str) -> String {
        if !self.objects.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|idx| format!("{base}.{idx:03}"))
            .find(|candidate| !self.objects.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn insert(&mut self, base: &str, kind: &str, properties: IndexMap<String, ParameterValue>) -> String {
        let name = self.next_name(base);
        self.objects.insert(
            name.clone(),
            LoopbackObject {
                kind: kind.to_string(),
                properties,
            },
        );
        name
    }

    fn create_primitive(&mut self, params: &BridgeParams) -> Result<BridgeResponse, BridgeError> {
        let shape = text(params, "shape").unwrap_or("cube").to_lowercase();
        let count = count(params);
        let base = text(params, "name").map_or_else(|| title_case(&shape), str::to_string);
        let properties: IndexMap<String, ParameterValue> = params
            .iter()
            .filter(|(key, _)| matches!(key.as_str(), "size" | "location" | "rotation" | "scale"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let created: Vec<String> = (0..count)
            .map(|_| self.insert(&base, &shape, properties.clone()))
            .collect();
        Ok(BridgeResponse {
            message: format!("created {}", created.join(", ")),
            objects_affected: created.clone(),
            data: json!({ "object_name": created.first() }),
            objects_created: created,
            ..BridgeResponse::default()
        })
    }

    fn target(&self, params: &BridgeParams) -> Result<String, BridgeError> {
        let target = text(params, "target")
            .ok_or_else(|| BridgeError::Rejected("operation needs a target object".into()))?;
        if self.objects.contains_key(target) {
            Ok(target.to_string())
        } else {
            Err(BridgeError::Rejected(format!("object not found: {target}")))
        }
    }

    fn modify(&mut self, params: &BridgeParams, what: &str, keys: &[&str]) -> Result<BridgeResponse, BridgeError> {
        let target = self.target(params)?;
        if let Some(object) = self.objects.get_mut(&target) {
            for key in keys {
                if let Some(value) = params.get(*key) {
                    object.properties.insert((*key).to_string(), value.clone());
                }
            }
        }
        Ok(BridgeResponse {
            message: format!("applied {what} to {target}"),
            data: json!({ "object_name": target }),
            objects_affected: vec![target],
            ..BridgeResponse::default()
        })
    }

    fn setup_lighting(&mut self, params: &BridgeParams) -> BridgeResponse {
        let rig = text(params, "lighting_type").unwrap_or("three_point").to_string();
        let bases: &[&str] = match rig.as_str() {
            "three_point" | "studio" => &["Key_Light", "Fill_Light", "Rim_Light"],
            "sun" | "sky" | "hdri" => &["Sun"],
            _ => &["Light"],
        };
        let mut properties = IndexMap::new();
        for key in ["intensity", "color", "location"] {
            if let Some(value) = params.get(key) {
                properties.insert(key.to_string(), value.clone());
            }
        }
        let created: Vec<String> = bases
            .iter()
            .map(|base| self.insert(base, "light", properties.clone()))
            .collect();
        BridgeResponse {
            message: format!("{rig} lighting with {} light(s)", created.len()),
            objects_affected: created.clone(),
            objects_created: created,
            ..BridgeResponse::default()
        }
    }

    fn duplicate(&mut self, params: &BridgeParams) -> Result<BridgeResponse, BridgeError> {
        let source = self.target(params)?;
        let template = self.objects.get(&source).cloned().ok_or_else(|| {
            BridgeError::Rejected(format!("object not found: {source}"))
        })?;
        let base = base_name(&source).to_string();
        let created: Vec<String> = (0..count(params))
            .map(|_| self.insert(&base, &template.kind, template.properties.clone()))
            .collect();
        Ok(BridgeResponse {
            message: format!("duplicated {source} as {}", created.join(", ")),
            objects_affected: created.clone(),
            objects_created: created,
            ..BridgeResponse::default()
        })
    }

    fn addressed(&self, params: &BridgeParams) -> Result<Vec<String>, BridgeError> {
        if params.get("all").and_then(ParameterValue::as_flag) == Some(true) {
            return Ok(self.objects.keys().cloned().collect());
        }
        let mut names: Vec<String> = Vec::new();
        if let Some(target) = text(params, "target") {
            names.push(target.to_string());
        }
        if let Some(ParameterValue::Raw(Value::Array(items))) = params.get("targets") {
            names.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if names.is_empty() {
            return Err(BridgeError::Rejected("no objects addressed".into()));
        }
        if let Some(missing) = names.iter().find(|name| !self.objects.contains_key(*name)) {
            return Err(BridgeError::Rejected(format!("object not found: {missing}")));
        }
        Ok(names)
    }

    fn select(&mut self, params: &BridgeParams) -> Result<BridgeResponse, BridgeError> {
        let names = self.addressed(params)?;
        self.selection.clone_from(&names);
        Ok(BridgeResponse {
            message: format!("selected {}", names.join(", ")),
            objects_affected: names,
            ..BridgeResponse::default()
        })
    }

    fn delete(&mut self, params: &BridgeParams) -> Result<BridgeResponse, BridgeError> {
        let names = self.addressed(params)?;
        for name in &names {
            self.objects.shift_remove(name);
        }
        self.selection.retain(|name| !names.contains(name));
        Ok(BridgeResponse {
            message: format!("deleted {}", names.join(", ")),
            objects_affected: names.clone(),
            objects_removed: names,
            ..BridgeResponse::default()
        })
    }

    fn status(&self) -> BridgeResponse {
        let objects: Vec<Value> = self
            .objects
            .iter()
            .map(|(name, object)| json!({ "name": name, "type": object.kind }))
            .collect();
        BridgeResponse {
            message: format!("{} object(s) in scene", objects.len()),
            data: json!({ "objects": objects, "selected": self.selection }),
            ..BridgeResponse::default()
        }
    }
}

fn text<'a>(params: &'a BridgeParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(ParameterValue::as_text)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count(params: &BridgeParams) -> usize {
    params
        .get("count")
        .and_then(ParameterValue::as_f64)
        .filter(|value| value.is_finite() && *value >= 1.0)
        .map_or(1, |value| value.round() as usize)
}

fn base_name(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((base, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => base,
        _ => name,
    }
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, ParameterValue)]) -> BridgeParams {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn names_follow_host_suffix_convention() {
        let bridge = LoopbackBridge::new();
        let cube = params(&[("shape", ParameterValue::Text("cube".into()))]);
        let first = bridge.execute("create_primitive", &cube).await.unwrap();
        let second = bridge.execute("create_primitive", &cube).await.unwrap();
        assert_eq!(first.objects_created, vec!["Cube"]);
        assert_eq!(second.objects_created, vec!["Cube.001"]);

        let dup = params(&[
            ("target", ParameterValue::Text("Cube.001".into())),
            ("count", ParameterValue::Number(2.0)),
        ]);
        let copies = bridge.execute("duplicate_object", &dup).await.unwrap();
        assert_eq!(copies.objects_created, vec!["Cube.002", "Cube.003"]);
        assert_eq!(bridge.call_count(), 3);
    }

    #[tokio::test]
    async fn missing_targets_are_rejected() {
        let bridge = LoopbackBridge::new();
        let err = bridge
            .execute(
                "apply_material",
                &params(&[("target", ParameterValue::Text("Ghost".into()))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(_)));
        let err = bridge.execute("warp_reality", &BridgeParams::new()).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn delete_accepts_target_lists_and_all() {
        let bridge = LoopbackBridge::new().with_objects(["Cube", "Sphere", "Cone"]);
        let listed = params(&[(
            "targets",
            ParameterValue::Raw(json!(["Cube", "Sphere"])),
        )]);
        let removed = bridge.execute("delete_objects", &listed).await.unwrap();
        assert_eq!(removed.objects_removed, vec!["Cube", "Sphere"]);
        assert_eq!(bridge.object_names(), vec!["Cone"]);

        let all = params(&[("all", ParameterValue::Flag(true))]);
        bridge.execute("delete_objects", &all).await.unwrap();
        assert!(bridge.object_names().is_empty());
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let bridge = LoopbackBridge::new();
        bridge.fail_next(BridgeError::ConnectionReset("dropped".into()));
        let status = BridgeParams::new();
        assert!(bridge.execute("scene_status", &status).await.is_err());
        assert!(bridge.execute("scene_status", &status).await.is_ok());

        bridge.fail_operation("scene_status", BridgeError::Unavailable("down".into()));
        assert!(bridge.execute("scene_status", &status).await.is_err());
        bridge.heal();
        assert!(bridge.execute("scene_status", &status).await.is_ok());
        assert_eq!(bridge.operations().len(), 4);
    }

    #[tokio::test]
    async fn three_point_rig_creates_three_lights() {
        let bridge = LoopbackBridge::new();
        let rig = params(&[("lighting_type", ParameterValue::Text("three_point".into()))]);
        let response = bridge.execute("setup_lighting", &rig).await.unwrap();
        assert_eq!(response.objects_created, vec!["Key_Light", "Fill_Light", "Rim_Light"]);
        assert_eq!(bridge.object("Key_Light").unwrap().kind, "light");
    }
}
