//! Pre-built host-API template seeded into every session graph.

use crate::sandbox::graph::{ObjectId, PropertyAccess, PropertyValue, VirtualGraph};
use crate::sandbox::vector::Vec3;

/// Services created under the root `Game` object.
pub const SERVICES: &[&str] = &["Workspace", "Players", "Lighting"];

/// Class archetypes with a canonical default property set.
pub const ARCHETYPES: &[&str] = &["Part", "Script", "Humanoid"];

/// Default properties for a known archetype.
pub fn archetype_defaults(class: &str) -> Option<Vec<(&'static str, PropertyValue)>> {
    let defaults = match class {
        "Part" => vec![
            ("Size", PropertyValue::Vector(Vec3::ONE)),
            ("BrickColor", PropertyValue::from("Bright green")),
        ],
        "Script" => vec![
            ("Source", PropertyValue::from("")),
            ("Disabled", PropertyValue::Bool(false)),
        ],
        "Humanoid" => vec![
            ("Health", PropertyValue::Number(100.0)),
            ("WalkSpeed", PropertyValue::Number(16.0)),
        ],
        _ => return None,
    };
    Some(defaults)
}

/// Handles to the well-known objects of an installed host API.
#[derive(Debug, Clone, Copy)]
pub struct HostApi {
    pub game: ObjectId,
}

impl HostApi {
    /// Install the `Game` root and its services into `graph`.
    pub fn install(graph: &mut VirtualGraph) -> Self {
        let game = graph.create("Game", [("Name", PropertyValue::from("Game"))]);
        for service in SERVICES {
            let id = graph.create_child(game, service, [("Name", PropertyValue::from(*service))]);
            graph.set(game, service, id.into());
        }
        Self { game }
    }

    /// Create a fresh instance of `class`.
    ///
    /// Unknown classes still succeed and only carry `Name` and `Parent`.
    pub fn create_instance(&self, graph: &mut VirtualGraph, class: &str) -> ObjectId {
        let mut properties = vec![
            ("Name", PropertyValue::from(class)),
            ("Parent", PropertyValue::Nil),
        ];
        properties.extend(archetype_defaults(class).unwrap_or_default());
        graph.create(class, properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_creates_services() {
        let mut graph = VirtualGraph::new();
        let api = HostApi::install(&mut graph);

        for service in SERVICES {
            let id = graph.get(api.game, service).as_object().unwrap();
            assert_eq!(graph.name(id), *service);
        }
        assert_eq!(graph.len(), 1 + SERVICES.len());
    }

    #[test]
    fn test_known_archetype_defaults() {
        let mut graph = VirtualGraph::new();
        let api = HostApi::install(&mut graph);
        let humanoid = api.create_instance(&mut graph, "Humanoid");

        assert_eq!(graph.get(humanoid, "Health"), PropertyValue::Number(100.0));
        assert_eq!(graph.get(humanoid, "WalkSpeed"), PropertyValue::Number(16.0));
        assert_eq!(graph.get(humanoid, "Name"), PropertyValue::from("Humanoid"));
        assert_eq!(graph.get(humanoid, "Parent"), PropertyValue::Nil);

        for class in ARCHETYPES {
            assert!(archetype_defaults(class).is_some(), "{class} has no defaults");
        }
    }

    #[test]
    fn test_unknown_archetype_is_bare() {
        let mut graph = VirtualGraph::new();
        let api = HostApi::install(&mut graph);
        let model = api.create_instance(&mut graph, "Model");

        let object = graph.object(model).unwrap();
        assert_eq!(object.properties.len(), 2);
        assert!(archetype_defaults("Model").is_none());
    }
}
