use super::tables::{get_table, ALL_TABLES};
use super::types::TableSchema;
use std::collections::{HashMap, HashSet, VecDeque};

/// Resolves table dependencies for filtering
pub struct DependencyResolver {
    /// Map of table name -> tables it references
    deps: HashMap<&'static str, HashSet<&'static str>>,
    /// Map of table name -> tables that reference it
    reverse_deps: HashMap<&'static str, HashSet<&'static str>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        let mut deps: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        let mut reverse_deps: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();

        for table in ALL_TABLES {
            let table_deps = table.dependencies();
            deps.insert(table.name, table_deps.clone());

            for dep in table_deps {
                reverse_deps.entry(dep).or_default().insert(table.name);
            }
        }

        Self { deps, reverse_deps }
    }

    /// Requested tables plus every table they reference, in dependency order
    pub fn resolve_includes(
        &self,
        requested: &[&str],
    ) -> Result<Vec<&'static TableSchema>, String> {
        let included = self.closure(requested, &self.deps)?;
        Ok(Self::ordered(&included))
    }

    /// All tables except the excluded ones and anything referencing them
    pub fn resolve_excludes(&self, excluded: &[&str]) -> Result<Vec<&'static TableSchema>, String> {
        let dropped = self.closure(excluded, &self.reverse_deps)?;
        let remaining: HashSet<&str> = ALL_TABLES
            .iter()
            .map(|t| t.name)
            .filter(|name| !dropped.contains(name))
            .collect();
        Ok(Self::ordered(&remaining))
    }

    /// Return all tables in dependency order
    pub fn all_tables_ordered(&self) -> Vec<&'static TableSchema> {
        ALL_TABLES.to_vec()
    }

    /// Transitive closure of `start` over `edges`, validating every name
    fn closure(
        &self,
        start: &[&str],
        edges: &HashMap<&'static str, HashSet<&'static str>>,
    ) -> Result<HashSet<&'static str>, String> {
        let mut seen: HashSet<&'static str> = HashSet::new();
        let mut queue: VecDeque<&'static str> = VecDeque::new();

        for name in start {
            let table = get_table(name).ok_or_else(|| format!("Unknown table: {}", name))?;
            queue.push_back(table.name);
        }

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(next) = edges.get(name) {
                queue.extend(next.iter().copied().filter(|n| !seen.contains(n)));
            }
        }

        Ok(seen)
    }

    // ALL_TABLES is already parents-first
    fn ordered(names: &HashSet<&str>) -> Vec<&'static TableSchema> {
        ALL_TABLES
            .iter()
            .copied()
            .filter(|t| names.contains(t.name))
            .collect()
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tables: &[&TableSchema]) -> Vec<&'static str> {
        tables.iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_all_tables_parents_first() {
        let order = names(ALL_TABLES);
        for table in ALL_TABLES {
            let pos = order.iter().position(|&n| n == table.name).unwrap();
            for dep in table.dependencies() {
                let dep_pos = order.iter().position(|&n| n == dep).unwrap();
                assert!(dep_pos < pos, "{} must come before {}", dep, table.name);
            }
        }
    }

    #[test]
    fn test_resolve_songplays_includes_dimensions() {
        let resolver = DependencyResolver::new();
        let tables = resolver.resolve_includes(&["songplays"]).unwrap();
        assert_eq!(
            names(&tables),
            vec!["artists", "songs", "users", "time", "songplays"]
        );
    }

    #[test]
    fn test_resolve_songs_pulls_artists() {
        let resolver = DependencyResolver::new();
        let tables = resolver.resolve_includes(&["songs"]).unwrap();
        assert_eq!(names(&tables), vec!["artists", "songs"]);
    }

    #[test]
    fn test_exclude_cascades_to_referencing_tables() {
        let resolver = DependencyResolver::new();
        let tables = resolver.resolve_excludes(&["artists"]).unwrap();
        assert_eq!(names(&tables), vec!["users", "time"]);

        let tables = resolver.resolve_excludes(&["songplays"]).unwrap();
        assert_eq!(names(&tables), vec!["artists", "songs", "users", "time"]);
    }

    #[test]
    fn test_unknown_table_error() {
        let resolver = DependencyResolver::new();
        assert!(resolver.resolve_includes(&["nonexistent"]).is_err());
        assert!(resolver.resolve_excludes(&["nonexistent"]).is_err());
    }
}
