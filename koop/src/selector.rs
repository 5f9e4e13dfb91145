//! Command line addressing of objects: `<cluster> <namespace> <kind> <name>`.

use std::fmt::Display;

use anyhow::Result;
use koop_core::Registry;

/// One level of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sel {
    /// Every value currently valid at this level.
    All,
    Named(String),
}

impl Sel {
    /// `-` and `*` select everything; anything else is a literal.
    pub fn parse(s: &str) -> Sel {
        match s {
            "-" | "*" => Sel::All,
            s => Sel::Named(s.to_string()),
        }
    }
}

impl Display for Sel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sel::All => f.write_str("-"),
            Sel::Named(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub cluster: Sel,
    pub namespace: Sel,
    pub kind: Sel,
    pub name: Sel,
}

impl Selector {
    pub fn parse(cluster: &str, namespace: &str, kind: &str, name: &str) -> Selector {
        Selector {
            cluster: Sel::parse(cluster),
            namespace: Sel::parse(namespace),
            kind: Sel::parse(kind),
            name: Sel::parse(name),
        }
    }

    /// Check what can be checked without touching a cluster or the file
    /// tree: an explicit kind must be registered.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        if let Sel::Named(kind) = &self.kind {
            registry.find(kind)?;
        }
        Ok(())
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.cluster, self.namespace, self.kind, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koop_core::UnknownKind;

    #[test]
    fn test_parse_wildcards() {
        assert_eq!(Sel::parse("-"), Sel::All);
        assert_eq!(Sel::parse("*"), Sel::All);
        assert_eq!(Sel::parse("--"), Sel::Named("--".to_string()));
        assert_eq!(Sel::parse("web"), Sel::Named("web".to_string()));
    }

    #[test]
    fn test_display() {
        let sel = Selector::parse("prod", "*", "deployment", "-");
        assert_eq!(sel.to_string(), "prod/-/deployment/-");
    }

    #[test]
    fn test_validate_unknown_kind() {
        let registry = Registry::builtin();
        let err = Selector::parse("-", "-", "widget", "-")
            .validate(&registry)
            .unwrap_err();
        let unknown = err.downcast_ref::<UnknownKind>().unwrap();
        assert_eq!(unknown.kind, "widget");
        assert!(err.to_string().contains("deployment, statefulset"));
    }

    #[test]
    fn test_validate_wildcard_kind() {
        let registry = Registry::builtin();
        assert!(Selector::parse("-", "-", "-", "-")
            .validate(&registry)
            .is_ok());
        assert!(Selector::parse("a", "b", "secret", "c")
            .validate(&registry)
            .is_ok());
    }
}
