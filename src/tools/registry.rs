//! Tool registry
//!
//! The registry holds the current `ToolSnapshot`. Snapshots are immutable;
//! a reload builds a new one and swaps it in atomically, so readers always see
//! either the old set or the new set in full.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use super::descriptor::ToolDescriptor;
use crate::core::SynthesisError;

/// Immutable set of tools, addressable by name
#[derive(Debug)]
pub struct ToolSnapshot {
    /// Declared version of the API the tools were built from
    api_version: String,

    /// Tools in synthesis order
    tools: Vec<Arc<ToolDescriptor>>,

    /// Name -> position in `tools`
    index: HashMap<String, usize>,

    /// Install count of the registry when this snapshot went in
    generation: u64,
}

impl ToolSnapshot {
    /// Build a snapshot, rejecting duplicate names
    pub fn new(
        api_version: impl Into<String>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<Self, SynthesisError> {
        let mut index = HashMap::with_capacity(tools.len());

        for (position, tool) in tools.iter().enumerate() {
            if let Some(&existing) = index.get(&tool.name) {
                let first: &ToolDescriptor = &tools[existing];
                return Err(SynthesisError::NameCollision {
                    name: tool.name.clone(),
                    first: first.operation_label(),
                    second: tool.operation_label(),
                });
            }
            index.insert(tool.name.clone(), position);
        }

        Ok(Self {
            api_version: api_version.into(),
            tools: tools.into_iter().map(Arc::new).collect(),
            index,
            generation: 0,
        })
    }

    /// A snapshot with no tools
    pub fn empty() -> Self {
        Self {
            api_version: String::new(),
            tools: Vec::new(),
            index: HashMap::new(),
            generation: 0,
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    /// All tools in synthesis order
    pub fn tools(&self) -> &[Arc<ToolDescriptor>] {
        &self.tools
    }

    /// Get the list of tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// 0 for the initial snapshot, then 1, 2, ... per install
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Get the number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Holder of the current snapshot
pub struct ToolRegistry {
    current: ArcSwap<ToolSnapshot>,

    /// Serializes installers so generations stay gapless; readers never take it
    install_lock: Mutex<()>,
}

impl ToolRegistry {
    /// Create a registry serving `initial`
    pub fn new(mut initial: ToolSnapshot) -> Self {
        tracing::info!(
            "[ToolRegistry] Installed initial snapshot with {} tools",
            initial.len()
        );
        initial.generation = 0;
        Self {
            current: ArcSwap::from_pointee(initial),
            install_lock: Mutex::new(()),
        }
    }

    /// The latest installed snapshot
    ///
    /// Never blocks; the returned snapshot stays valid after a later install.
    pub fn current(&self) -> Arc<ToolSnapshot> {
        self.current.load_full()
    }

    /// Atomically replace the current snapshot
    ///
    /// The snapshot is stamped with its generation before it becomes visible.
    pub fn install(&self, mut snapshot: ToolSnapshot) -> Arc<ToolSnapshot> {
        let _guard = self
            .install_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        snapshot.generation = self.current.load().generation + 1;
        let snapshot = Arc::new(snapshot);
        let previous = self.current.swap(snapshot.clone());

        tracing::info!(
            "[ToolRegistry] Installed snapshot #{} ({} tools, was {})",
            snapshot.generation,
            snapshot.len(),
            previous.len()
        );

        snapshot
    }

    /// Number of installs since creation
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(ToolSnapshot::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::HttpMethod;
    use crate::tools::descriptor::HttpBinding;
    use serde_json::Map;

    fn tool(name: &str, path: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: String::new(),
            input_schema: Map::new(),
            output_schema: None,
            binding: HttpBinding {
                method: HttpMethod::Get,
                path_template: path.into(),
                arguments: vec![],
                body: None,
            },
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::default();
        assert!(registry.current().is_empty());
        assert_eq!(registry.generation(), 0);
        assert!(registry.current().get("nonexistent").is_none());
    }

    #[test]
    fn test_snapshot_lookup_keeps_order() {
        let snapshot =
            ToolSnapshot::new("1.0", vec![tool("b_tool", "/b"), tool("a_tool", "/a")]).unwrap();
        assert_eq!(snapshot.tool_names(), vec!["b_tool", "a_tool"]);
        assert_eq!(snapshot.get("a_tool").unwrap().binding.path_template, "/a");
        assert_eq!(snapshot.api_version(), "1.0");
    }

    #[test]
    fn test_snapshot_rejects_duplicates() {
        let err = ToolSnapshot::new("1.0", vec![tool("same", "/a"), tool("same", "/b")])
            .unwrap_err();
        assert_eq!(
            err,
            SynthesisError::NameCollision {
                name: "same".into(),
                first: "GET /a".into(),
                second: "GET /b".into(),
            }
        );
    }

    #[test]
    fn test_install_swaps_whole_snapshot() {
        let registry = ToolRegistry::new(ToolSnapshot::new("1", vec![tool("old", "/old")]).unwrap());
        let before = registry.current();

        let installed = registry.install(
            ToolSnapshot::new("2", vec![tool("new_a", "/a"), tool("new_b", "/b")]).unwrap(),
        );

        // The reader holding the old snapshot still sees it in full
        assert_eq!(before.tool_names(), vec!["old"]);

        let after = registry.current();
        assert!(Arc::ptr_eq(&after, &installed));
        assert_eq!(after.tool_names(), vec!["new_a", "new_b"]);
        assert_eq!(before.generation(), 0);
        assert_eq!(installed.generation(), 1);
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_generation_travels_with_the_snapshot() {
        let registry = Arc::new(ToolRegistry::default());

        let installers: Vec<_> = (0..4)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let version = format!("{}.{}", worker, i);
                            registry
                                .install(ToolSnapshot::new(version, vec![]).unwrap())
                                .generation()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..2_000 {
                        let generation = registry.current().generation();
                        assert!(generation >= last, "generation went backwards");
                        last = generation;
                    }
                })
            })
            .collect();

        let mut seen: Vec<u64> = installers
            .into_iter()
            .flat_map(|installer| installer.join().unwrap())
            .collect();
        for reader in readers {
            reader.join().unwrap();
        }

        seen.sort_unstable();
        assert_eq!(seen, (1..=200).collect::<Vec<_>>());
        assert_eq!(registry.generation(), 200);
        assert_eq!(registry.current().generation(), 200);
    }

    #[test]
    fn test_concurrent_readers_never_see_a_mix() {
        let registry = Arc::new(ToolRegistry::new(
            ToolSnapshot::new("0", vec![tool("v0_a", "/a"), tool("v0_b", "/b")]).unwrap(),
        ));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = registry.current();
                        let prefix = format!("v{}_", snapshot.api_version());
                        for name in snapshot.tool_names() {
                            assert!(name.starts_with(&prefix));
                        }
                    }
                })
            })
            .collect();

        for version in 1..200 {
            registry.install(
                ToolSnapshot::new(
                    version.to_string(),
                    vec![
                        tool(&format!("v{}_a", version), "/a"),
                        tool(&format!("v{}_b", version), "/b"),
                    ],
                )
                .unwrap(),
            );
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
