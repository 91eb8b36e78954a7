//! Deterministic compile ordering of resolved library packages.
//!
//! Packages arrive in first-seen binary-reference order and are folded into
//! a result list one at a time. The insertion rule keeps every package
//! after the packages it declares a dependency on, and relocates
//! already-placed dependents that would otherwise compile too early.
//! Earlier packages' sources become visible to later ones, so the output is
//! the final package compile order.
//!
//! Mutually dependent packages (a declared cycle) are not detected; the
//! later arrival wins its preferred position.

use crate::cracker::LibraryPackage;

/// Arrival-order insertion sort over package dependency declarations.
#[derive(Debug)]
pub struct DependencyOrderer;

impl DependencyOrderer {
    /// Order `packages` so that declared dependencies precede their dependents.
    ///
    /// For each new package P, the result list is scanned from the back for
    /// the last entry P declares a dependency on:
    ///
    /// - no such entry: P is prepended to the front;
    /// - entry found at position `i`: P is inserted immediately after it,
    ///   and every entry before position `i` that declares a dependency on
    ///   P moves to immediately after P, relative order preserved.
    ///
    /// The same arrival order always produces the same output. Packages
    /// with dependency ids that resolve to nothing in the list are still
    /// included, placed best-effort.
    #[must_use]
    pub fn order(packages: Vec<LibraryPackage>) -> Vec<LibraryPackage> {
        let mut result: Vec<LibraryPackage> = Vec::with_capacity(packages.len());

        for package in packages {
            let anchor = result
                .iter()
                .rposition(|entry| package.dependencies.iter().any(|dep| *dep == entry.id));

            match anchor {
                None => result.insert(0, package),
                Some(0) => result.insert(1, package),
                Some(i) => {
                    let after = result.split_off(i + 1);
                    let mut head = std::mem::take(&mut result);
                    let entry = head.pop().unwrap_or_else(|| unreachable!());

                    let (movers, stayers): (Vec<_>, Vec<_>) = head
                        .into_iter()
                        .partition(|x| x.dependencies.iter().any(|dep| *dep == package.id));

                    result = stayers;
                    result.push(entry);
                    result.push(package);
                    result.extend(movers);
                    result.extend(after);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn package(id: &str, dependencies: &[&str]) -> LibraryPackage {
        LibraryPackage {
            id: id.to_string(),
            version: "1.0.0".to_string(),
            manifest_path: PathBuf::from(format!("{id}.nuspec")),
            library_project_path: PathBuf::from(format!("{id}.fsproj")),
            binary_path: PathBuf::from(format!("{id}.dll")),
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
            source_paths: Vec::new(),
        }
    }

    fn ids(packages: &[LibraryPackage]) -> Vec<&str> {
        packages.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_chain_in_arrival_order() {
        let ordered = DependencyOrderer::order(vec![
            package("A", &[]),
            package("B", &["A"]),
            package("C", &["B"]),
        ]);
        assert_eq!(ids(&ordered), ["A", "B", "C"]);
    }

    #[test]
    fn test_dependency_arriving_after_dependent() {
        let ordered = DependencyOrderer::order(vec![package("B", &["A"]), package("A", &[])]);
        assert_eq!(ids(&ordered), ["A", "B"]);
    }

    #[test]
    fn test_dependent_relocated_behind_late_arrival() {
        // X arrives first and is parked at the front; once P lands after its
        // own dependency E, X must move behind P.
        let ordered = DependencyOrderer::order(vec![
            package("E", &[]),
            package("X", &["P"]),
            package("P", &["E"]),
        ]);
        assert_eq!(ids(&ordered), ["E", "P", "X"]);
    }

    #[test]
    fn test_dependencies_always_precede_dependents() {
        let arrivals = vec![
            package("App.Ui", &["App.Core", "App.Json"]),
            package("App.Json", &["App.Core"]),
            package("App.Core", &[]),
            package("App.Http", &["App.Core", "App.Json"]),
        ];
        let ordered = DependencyOrderer::order(arrivals);

        for (i, p) in ordered.iter().enumerate() {
            for dep in &p.dependencies {
                let dep_pos = ordered.iter().position(|q| q.id == *dep);
                if let Some(dep_pos) = dep_pos {
                    assert!(dep_pos < i, "{dep} must precede {}", p.id);
                }
            }
        }
    }

    #[test]
    fn test_deterministic_across_runs() {
        let arrivals = || {
            vec![
                package("C", &["B"]),
                package("A", &[]),
                package("B", &["A"]),
                package("D", &["A", "C"]),
            ]
        };
        let first = DependencyOrderer::order(arrivals());
        let second = DependencyOrderer::order(arrivals());
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_unresolved_dependency_still_included() {
        let ordered = DependencyOrderer::order(vec![
            package("A", &["NotInList"]),
            package("B", &["A"]),
        ]);
        assert_eq!(ids(&ordered), ["A", "B"]);
    }

    #[test]
    fn test_mutual_dependency_last_write_wins() {
        let ordered = DependencyOrderer::order(vec![package("A", &["B"]), package("B", &["A"])]);
        // No cycle detection; B lands after its declared dependency A.
        assert_eq!(ids(&ordered), ["A", "B"]);
    }
}
