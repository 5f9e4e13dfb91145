//! Conversion between the machine form of an object (JSON) and the form
//! stored on disk (YAML).

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// One object, as a schemaless tree.
pub type Document = Value;

/// Parse a stored YAML file into a document.
///
/// The root must be a mapping. Mapping keys must be strings; YAML allows
/// integer or composite keys, but those have no JSON equivalent and are
/// rejected rather than silently stringified.
pub fn from_yaml(text: &str) -> Result<Document> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).context("parsing YAML")?;
    check_keys(&yaml, "")?;
    let doc: Document = serde_json::to_value(&yaml).context("converting YAML to JSON")?;
    match doc {
        Value::Object(_) => Ok(doc),
        Value::Null => bail!("document is empty"),
        _ => bail!("document root must be a mapping"),
    }
}

fn check_keys(value: &serde_yaml::Value, at: &str) -> Result<()> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    other => bail!("unsupported non-string key {:?} at '{}'", other, at),
                };
                check_keys(v, &format!("{}/{}", at, key))?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                check_keys(item, &format!("{}/{}", at, i))?;
            }
            Ok(())
        }
        serde_yaml::Value::Tagged(tagged) => check_keys(&tagged.value, at),
        _ => Ok(()),
    }
}

/// Render a document as YAML, keys in lexicographic order.
pub fn to_yaml(doc: &Document) -> Result<String> {
    serde_yaml::to_string(doc).context("rendering YAML")
}
