// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A single tool's discovery metadata, cached from the tool server's
/// discovery response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// The discovered tool catalogue, treated as authoritative until the next
/// `discover()` refresh. Carries a `generation` counter bumped on every
/// refresh so a caller holding a cloned snapshot across a fatal reconnect can
/// tell its view is stale without re-querying the transport.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalogue {
    pub generation: u64,
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalogue {
    pub fn new(generation: u64, tools: Vec<ToolDescriptor>) -> Self {
        Self { generation, tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }
}

/// An optional per-call restriction on which tool names may be invoked,
/// derived from an agent's allow-list. `None` means unfiltered — every
/// catalogued tool is callable.
#[derive(Debug, Clone, Default)]
pub struct AllowList(pub Option<std::collections::HashSet<String>>);

impl AllowList {
    pub fn unfiltered() -> Self {
        Self(None)
    }

    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self(Some(names.into_iter().collect()))
    }

    pub fn allows(&self, name: &str) -> bool {
        match &self.0 {
            None => true,
            Some(set) => set.contains(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            input_schema: serde_json::json!({}),
        }
    }

    #[test]
    fn catalogue_lookup() {
        let cat = ToolCatalogue::new(1, vec![desc("search"), desc("shell")]);
        assert!(cat.contains("search"));
        assert!(!cat.contains("unknown"));
    }

    #[test]
    fn unfiltered_allow_list_allows_everything() {
        let allow = AllowList::unfiltered();
        assert!(allow.allows("anything"));
    }

    #[test]
    fn restricted_allow_list_rejects_unlisted_names() {
        let allow = AllowList::from_names(["search".to_string()]);
        assert!(allow.allows("search"));
        assert!(!allow.allows("shell"));
    }
}
