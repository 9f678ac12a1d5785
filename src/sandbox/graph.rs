//! The virtual object graph standing in for the host API.
//!
//! Objects live in an arena and refer to each other by [`ObjectId`]. Reading a
//! key that was never set materializes a child object named after the key, so
//! every path a script walks (`game.Workspace.Foo.Bar`) resolves to something.
//! [`TracedGraph`] wraps a graph and records every read and write.

use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Map, Value};

use crate::sandbox::trace::{TraceKind, TraceRecorder};
use crate::sandbox::vector::Vec3;

/// Index of an object in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A value stored under a property key.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Vector(Vec3),
    Object(ObjectId),
}

impl PropertyValue {
    /// The type tag recorded for property writes.
    pub fn type_tag(&self) -> &'static str {
        match self {
            PropertyValue::Nil => "nil",
            PropertyValue::Bool(_) => "boolean",
            PropertyValue::Number(_) => "number",
            PropertyValue::String(_) => "string",
            PropertyValue::Vector(_) => "vector",
            PropertyValue::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            PropertyValue::Object(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(v: Vec3) -> Self {
        PropertyValue::Vector(v)
    }
}

impl From<ObjectId> for PropertyValue {
    fn from(v: ObjectId) -> Self {
        PropertyValue::Object(v)
    }
}

/// A named node in the mock host-API tree.
#[derive(Debug, Clone)]
pub struct VirtualObject {
    pub name: String,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Back-reference only; the arena owns every object.
    pub parent: Option<ObjectId>,
}

/// Keyed read/write access to virtual objects.
pub trait PropertyAccess {
    /// Read `key`, materializing a child object if it is unset.
    fn get(&mut self, id: ObjectId, key: &str) -> PropertyValue;

    /// Write `key`.
    fn set(&mut self, id: ObjectId, key: &str, value: PropertyValue);
}

/// Arena of virtual objects.
#[derive(Debug, Default)]
pub struct VirtualGraph {
    objects: Vec<VirtualObject>,
}

impl VirtualGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parentless object with the given initial properties.
    pub fn create<K, I>(&mut self, name: &str, properties: I) -> ObjectId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PropertyValue)>,
    {
        self.insert(name, properties, None)
    }

    /// Create an object under `parent`. The parent's properties are not touched.
    pub fn create_child<K, I>(&mut self, parent: ObjectId, name: &str, properties: I) -> ObjectId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PropertyValue)>,
    {
        self.insert(name, properties, Some(parent))
    }

    fn insert<K, I>(&mut self, name: &str, properties: I, parent: Option<ObjectId>) -> ObjectId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PropertyValue)>,
    {
        let id = ObjectId(self.objects.len());
        self.objects.push(VirtualObject {
            name: name.to_string(),
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            parent,
        });
        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&VirtualObject> {
        self.objects.get(id.0)
    }

    /// Name of an object, or an empty string for ids from another graph.
    pub fn name(&self, id: ObjectId) -> &str {
        self.object(id).map(|o| o.name.as_str()).unwrap_or("")
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.object(id).and_then(|o| o.parent)
    }

    /// Clear the parent link and the `Parent` property.
    pub fn detach(&mut self, id: ObjectId) {
        if let Some(object) = self.objects.get_mut(id.0) {
            object.parent = None;
            object.properties.insert("Parent".to_string(), PropertyValue::Nil);
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize the subtree rooted at `id` without tracing.
    ///
    /// Nil properties are omitted, vectors become `{x, y, z}` and objects that
    /// were already visited on the current path are rendered as
    /// `"<VirtualObject:Name>"`.
    pub fn snapshot(&self, id: ObjectId) -> Value {
        let mut path = HashSet::new();
        self.snapshot_inner(id, &mut path)
    }

    fn snapshot_inner(&self, id: ObjectId, path: &mut HashSet<ObjectId>) -> Value {
        let Some(object) = self.object(id) else {
            return Value::Null;
        };
        if !path.insert(id) {
            return Value::String(format!("<VirtualObject:{}>", object.name));
        }

        let mut map = Map::new();
        for (key, value) in &object.properties {
            let rendered = match value {
                PropertyValue::Nil => continue,
                PropertyValue::Bool(b) => json!(b),
                PropertyValue::Number(n) => json!(n),
                PropertyValue::String(s) => json!(s),
                PropertyValue::Vector(v) => json!({ "x": v.x, "y": v.y, "z": v.z }),
                PropertyValue::Object(child) => self.snapshot_inner(*child, path),
            };
            map.insert(key.clone(), rendered);
        }

        path.remove(&id);
        Value::Object(map)
    }
}

impl PropertyAccess for VirtualGraph {
    fn get(&mut self, id: ObjectId, key: &str) -> PropertyValue {
        let Some(object) = self.objects.get(id.0) else {
            return PropertyValue::Nil;
        };
        if let Some(value) = object.properties.get(key) {
            return value.clone();
        }

        let child = self.create_child::<String, _>(id, key, []);
        self.objects[id.0]
            .properties
            .insert(key.to_string(), PropertyValue::Object(child));
        PropertyValue::Object(child)
    }

    fn set(&mut self, id: ObjectId, key: &str, value: PropertyValue) {
        let Some(object) = self.objects.get_mut(id.0) else {
            return;
        };
        if key == "Parent" {
            object.parent = value.as_object();
        }
        object.properties.insert(key.to_string(), value);
    }
}

/// Decorator that records every access on the wrapped graph.
pub struct TracedGraph<'a> {
    graph: &'a mut VirtualGraph,
    recorder: &'a mut TraceRecorder,
}

impl<'a> TracedGraph<'a> {
    pub fn new(graph: &'a mut VirtualGraph, recorder: &'a mut TraceRecorder) -> Self {
        Self { graph, recorder }
    }

    pub fn graph(&self) -> &VirtualGraph {
        self.graph
    }

    /// Destroy an instance: records `InstanceDestroy` and detaches it.
    pub fn destroy(&mut self, id: ObjectId) {
        let class = self.graph.name(id).to_string();
        self.recorder
            .record(TraceKind::InstanceDestroy, json!({ "class": class }));
        self.graph.detach(id);
    }
}

impl PropertyAccess for TracedGraph<'_> {
    fn get(&mut self, id: ObjectId, key: &str) -> PropertyValue {
        self.recorder.record(
            TraceKind::PropertyAccess,
            json!({ "object": self.graph.name(id), "property": key }),
        );
        self.graph.get(id, key)
    }

    fn set(&mut self, id: ObjectId, key: &str, value: PropertyValue) {
        self.recorder.record(
            TraceKind::PropertySet,
            json!({
                "object": self.graph.name(id),
                "property": key,
                "value_type": value.type_tag(),
            }),
        );
        self.graph.set(id, key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_key_materializes_once() {
        let mut graph = VirtualGraph::new();
        let mut recorder = TraceRecorder::new();
        let root = graph.create::<&str, _>("Game", []);

        let mut traced = TracedGraph::new(&mut graph, &mut recorder);
        let first = traced.get(root, "Unseen");
        let second = traced.get(root, "Unseen");

        assert_eq!(first, second);
        let child = first.as_object().unwrap();
        assert_eq!(graph.name(child), "Unseen");
        assert_eq!(graph.parent(child), Some(root));
        assert_eq!(recorder.count(TraceKind::PropertyAccess), 2);
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_stored_value_is_returned() {
        let mut graph = VirtualGraph::new();
        let obj = graph.create("Humanoid", [("Health", PropertyValue::Number(100.0))]);

        assert_eq!(graph.get(obj, "Health"), PropertyValue::Number(100.0));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_set_records_type_tag() {
        let mut graph = VirtualGraph::new();
        let mut recorder = TraceRecorder::new();
        let obj = graph.create::<&str, _>("Part", []);

        let mut traced = TracedGraph::new(&mut graph, &mut recorder);
        traced.set(obj, "Anchored", true.into());
        assert_eq!(traced.get(obj, "Anchored"), PropertyValue::Bool(true));

        let event = &recorder.events()[0];
        assert_eq!(event.kind, TraceKind::PropertySet);
        assert_eq!(event.payload["object"], "Part");
        assert_eq!(event.payload["property"], "Anchored");
        assert_eq!(event.payload["value_type"], "boolean");
    }

    #[test]
    fn test_setting_parent_updates_link() {
        let mut graph = VirtualGraph::new();
        let workspace = graph.create::<&str, _>("Workspace", []);
        let part = graph.create::<&str, _>("Part", []);

        graph.set(part, "Parent", workspace.into());
        assert_eq!(graph.parent(part), Some(workspace));

        let mut recorder = TraceRecorder::new();
        TracedGraph::new(&mut graph, &mut recorder).destroy(part);
        assert_eq!(graph.parent(part), None);
        assert_eq!(recorder.events()[0].payload["class"], "Part");
    }

    #[test]
    fn test_snapshot_omits_nil_and_handles_cycles() {
        let mut graph = VirtualGraph::new();
        let game = graph.create("Game", [("Parent", PropertyValue::Nil)]);
        let workspace = graph.create_child(game, "Workspace", [("Size", Vec3::ONE.into())]);
        graph.set(game, "Workspace", workspace.into());
        graph.set(workspace, "Root", game.into());

        let snap = graph.snapshot(game);
        assert!(snap.get("Parent").is_none());
        assert_eq!(snap["Workspace"]["Size"]["x"], 1.0);
        assert_eq!(snap["Workspace"]["Root"], "<VirtualObject:Game>");
    }
}
