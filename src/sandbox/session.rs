//! One sandbox session: a host-API graph plus the recorder that traces it.

use serde_json::Value;

use crate::sandbox::graph::{ObjectId, TracedGraph, VirtualGraph};
use crate::sandbox::host_api::HostApi;
use crate::sandbox::trace::{SharedTrace, TraceEvent, TraceRecorder};

/// State owned by a single execution. Never shared between executions.
#[derive(Debug)]
pub struct SandboxSession {
    graph: VirtualGraph,
    api: HostApi,
    trace: SharedTrace,
}

impl SandboxSession {
    /// Create a session with the host API installed and a fresh clock.
    pub fn new() -> Self {
        let mut graph = VirtualGraph::new();
        let api = HostApi::install(&mut graph);
        Self {
            graph,
            api,
            trace: SharedTrace::new(TraceRecorder::new()),
        }
    }

    /// The `Game` root object.
    pub fn game(&self) -> ObjectId {
        self.api.game
    }

    pub fn graph(&self) -> &VirtualGraph {
        &self.graph
    }

    pub fn trace(&self) -> &SharedTrace {
        &self.trace
    }

    /// Create a host instance of `class` (untraced).
    pub fn create_instance(&mut self, class: &str) -> ObjectId {
        self.api.create_instance(&mut self.graph, class)
    }

    /// Run `f` against a traced view of the graph.
    pub fn with_traced<R>(&mut self, f: impl FnOnce(&mut TracedGraph<'_>) -> R) -> R {
        let mut recorder = self.trace.lock();
        let mut traced = TracedGraph::new(&mut self.graph, &mut recorder);
        f(&mut traced)
    }

    /// Read-only serialization of the host-API root.
    pub fn root_snapshot(&self) -> Value {
        self.graph.snapshot(self.api.game)
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.trace.snapshot()
    }
}

impl Default for SandboxSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::graph::{PropertyAccess, PropertyValue};
    use crate::sandbox::trace::TraceKind;

    #[test]
    fn test_traced_access_through_session() {
        let mut session = SandboxSession::new();
        let game = session.game();
        let part = session.create_instance("Part");

        session.with_traced(|g| {
            let workspace = g.get(game, "Workspace").as_object().unwrap();
            g.set(part, "Parent", PropertyValue::Object(workspace));
            g.destroy(part);
        });

        let kinds: Vec<_> = session.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TraceKind::PropertyAccess,
                TraceKind::PropertySet,
                TraceKind::InstanceDestroy
            ]
        );
    }

    #[test]
    fn test_root_snapshot_is_untraced() {
        let session = SandboxSession::new();
        let snap = session.root_snapshot();

        assert!(snap["Workspace"].is_object());
        assert!(snap["Players"].is_object());
        assert_eq!(snap["Workspace"]["Name"], "Workspace");
        assert!(session.events().is_empty());
    }
}
