use std::collections::HashSet;

/// Paths that bypass analytics and metrics.
///
/// Entries ending in `*` match by prefix, everything else exactly.
#[derive(Debug, Clone, Default)]
pub struct ExemptPaths {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl ExemptPaths {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) => paths.prefixes.push(prefix.to_string()),
                None => {
                    paths.exact.insert(pattern.to_string());
                }
            }
        }
        paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.exact.contains(path) || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}
