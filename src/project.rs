use std::{
    collections::{BTreeMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
};

use serde::Serialize;
use tracing::info;

use crate::{
    error::{Error, Result},
    store::{IndexStore, ProjectDependency},
};

/// Stable identifier for a registered project, derived from its
/// filesystem path.
pub fn project_id_for_path(path: &str) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub project_id: String,
    pub name: String,
    pub dependency_count: usize,
}

/// Register (or re-register) a project and its dependency snapshot.
///
/// The dependency set is replaced wholesale: packages dropped from the
/// manifest disappear from the index too. Preferences are created with
/// defaults on first registration and left alone afterwards.
pub fn register_project(
    store: &IndexStore,
    name: &str,
    path: &str,
    dependencies: &[(String, String)],
    ecosystem: Option<&str>,
) -> Result<Registration> {
    if name.trim().is_empty() || path.trim().is_empty() {
        return Err(Error::validation("a project needs a name and a path"));
    }
    for (package, version) in dependencies {
        if package.trim().is_empty() || version.trim().is_empty() {
            return Err(Error::validation(
                "each dependency needs a package name and a version",
            ));
        }
    }

    let ecosystem = ecosystem.unwrap_or("npm");
    let project_id = project_id_for_path(path);
    store.upsert_project(&project_id, name, path)?;

    let mut batch = store.begin_batch()?;
    batch.delete_project_dependencies(&project_id)?;
    for (package, version) in dependencies {
        batch.insert_project_dependency(
            &project_id,
            &ProjectDependency {
                package: package.clone(),
                version: version.clone(),
                ecosystem: ecosystem.to_string(),
            },
        )?;
    }
    batch.commit()?;

    store.ensure_preferences(&project_id)?;
    info!(
        "registered project {name} ({project_id}) with {} dependencies",
        dependencies.len()
    );

    Ok(Registration {
        project_id,
        name: name.to_string(),
        dependency_count: dependencies.len(),
    })
}

/// The declared dependencies of a project as a package → version map,
/// or `None` when the project is unknown or declares nothing. Callers
/// use `None` to fall back to unscoped search.
pub fn dependency_map(
    store: &IndexStore,
    project_id: &str,
) -> Result<Option<BTreeMap<String, String>>> {
    if store.get_project(project_id)?.is_none() {
        return Ok(None);
    }
    let deps = store.project_dependencies(project_id)?;
    if deps.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        deps.into_iter().map(|d| (d.package, d.version)).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, IndexStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&tmp.path().join("index.redb")).unwrap();
        (tmp, store)
    }

    fn deps(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(p, v)| (p.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn id_is_stable_per_path() {
        assert_eq!(
            project_id_for_path("/work/demo"),
            project_id_for_path("/work/demo")
        );
        assert_ne!(
            project_id_for_path("/work/demo"),
            project_id_for_path("/work/other")
        );
        assert_eq!(project_id_for_path("/work/demo").len(), 16);
    }

    #[test]
    fn registration_round_trip() {
        let (_tmp, store) = test_store();
        let reg = register_project(
            &store,
            "demo",
            "/work/demo",
            &deps(&[("react", "18.2.0"), ("vue", "3.4.0")]),
            None,
        )
        .unwrap();
        assert_eq!(reg.dependency_count, 2);

        let project = store.get_project(&reg.project_id).unwrap().unwrap();
        assert_eq!(project.name, "demo");
        assert_eq!(project.path, "/work/demo");

        let map = dependency_map(&store, &reg.project_id).unwrap().unwrap();
        assert_eq!(map.get("react").map(String::as_str), Some("18.2.0"));
        assert_eq!(map.len(), 2);

        // Preferences come into existence with defaults.
        let prefs = store.get_preferences(&reg.project_id).unwrap().unwrap();
        assert_eq!(prefs.max_search_results, 5);
    }

    #[test]
    fn re_registration_replaces_the_dependency_set() {
        let (_tmp, store) = test_store();
        let first = register_project(
            &store,
            "demo",
            "/work/demo",
            &deps(&[("react", "18.2.0"), ("vue", "3.4.0")]),
            None,
        )
        .unwrap();
        let second = register_project(
            &store,
            "demo",
            "/work/demo",
            &deps(&[("node", "20.1.4")]),
            None,
        )
        .unwrap();
        assert_eq!(first.project_id, second.project_id);

        let map = dependency_map(&store, &first.project_id).unwrap().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("node"));
    }

    #[test]
    fn ecosystem_label_defaults_to_npm() {
        let (_tmp, store) = test_store();
        let reg = register_project(
            &store,
            "demo",
            "/work/demo",
            &deps(&[("serde", "1.0.200")]),
            Some("cargo"),
        )
        .unwrap();

        let stored = store.project_dependencies(&reg.project_id).unwrap();
        assert_eq!(stored[0].ecosystem, "cargo");

        register_project(
            &store,
            "demo",
            "/work/demo",
            &deps(&[("react", "18.2.0")]),
            None,
        )
        .unwrap();
        let stored = store.project_dependencies(&reg.project_id).unwrap();
        assert_eq!(stored[0].ecosystem, "npm");
    }

    #[test]
    fn blank_inputs_are_rejected() {
        let (_tmp, store) = test_store();
        assert!(register_project(&store, "", "/work/demo", &[], None).is_err());
        assert!(register_project(&store, "demo", " ", &[], None).is_err());
        assert!(
            register_project(
                &store,
                "demo",
                "/work/demo",
                &deps(&[("", "1")]),
                None
            )
            .is_err()
        );
    }

    #[test]
    fn missing_or_empty_projects_yield_no_map() {
        let (_tmp, store) = test_store();
        assert!(dependency_map(&store, "unknown").unwrap().is_none());

        let reg =
            register_project(&store, "bare", "/work/bare", &[], None).unwrap();
        assert!(dependency_map(&store, &reg.project_id).unwrap().is_none());
    }
}
