//! Coordination groups
//!
//! Every component belongs to exactly one group. Components in the same
//! group are always released together at the same version.

use std::collections::HashMap;

use gantry_core::config::Settings;

/// Index of a group in [`CoordinationGroups`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(usize);

impl GroupId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Arena of coordination groups, fixed once built
#[derive(Debug, Clone, Default)]
pub struct CoordinationGroups {
    members: Vec<Vec<String>>,
    by_component: HashMap<String, GroupId>,
}

impl CoordinationGroups {
    /// Partition the configured components
    ///
    /// With `coordinate_versions` every component shares one group.
    /// Otherwise each configured group is used as-is and every remaining
    /// component gets a group of its own. Group order follows the first
    /// member's position in the component list.
    pub fn build(settings: &Settings) -> Self {
        let mut groups = Self::default();
        let names: Vec<&str> = settings.components.iter().map(|c| c.name.as_str()).collect();

        if settings.coordinate_versions {
            if !names.is_empty() {
                groups.add(names.iter().map(|n| n.to_string()).collect());
            }
            return groups;
        }

        for name in &names {
            if groups.by_component.contains_key(*name) {
                continue;
            }
            let configured = settings
                .coordination_groups
                .iter()
                .find(|g| g.iter().any(|m| m == name));
            match configured {
                Some(group) => {
                    // Members in component order
                    let members = names
                        .iter()
                        .filter(|n| group.iter().any(|m| m == *n))
                        .map(|n| n.to_string())
                        .collect();
                    groups.add(members);
                }
                None => groups.add(vec![name.to_string()]),
            }
        }

        groups
    }

    fn add(&mut self, members: Vec<String>) {
        let id = GroupId(self.members.len());
        for member in &members {
            self.by_component.insert(member.clone(), id);
        }
        self.members.push(members);
    }

    /// Group of a component
    pub fn group_of(&self, component: &str) -> Option<GroupId> {
        self.by_component.get(component).copied()
    }

    /// Members of a group, in component order
    pub fn members(&self, id: GroupId) -> &[String] {
        &self.members[id.0]
    }

    /// Every group id, in order
    pub fn ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.members.len()).map(GroupId)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::config::{ComponentKind, ComponentSettings};

    fn settings(names: &[&str], groups: &[&[&str]]) -> Settings {
        Settings {
            components: names
                .iter()
                .map(|n| ComponentSettings::new(*n, ComponentKind::Crate))
                .collect(),
            coordination_groups: groups
                .iter()
                .map(|g| g.iter().map(|s| s.to_string()).collect())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ungrouped_components_get_own_group() {
        let groups = CoordinationGroups::build(&settings(&["a", "b", "c"], &[&["c", "a"]]));
        assert_eq!(groups.len(), 2);

        let ac = groups.group_of("a").unwrap();
        assert_eq!(groups.group_of("c"), Some(ac));
        assert_eq!(groups.members(ac), &["a".to_string(), "c".to_string()]);

        let b = groups.group_of("b").unwrap();
        assert_ne!(ac, b);
        assert_eq!(groups.ids().collect::<Vec<_>>(), vec![ac, b]);
    }

    #[test]
    fn test_coordinate_versions_uses_one_group() {
        let mut s = settings(&["a", "b", "c"], &[&["a", "b"]]);
        s.coordinate_versions = true;
        let groups = CoordinationGroups::build(&s);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.members(groups.group_of("b").unwrap()).len(), 3);
    }

    #[test]
    fn test_unknown_component() {
        let groups = CoordinationGroups::build(&settings(&["a"], &[]));
        assert_eq!(groups.group_of("zzz"), None);
    }
}
