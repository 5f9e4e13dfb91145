use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};

const PREFIX: &str = "cluster-";
const SUFFIX: &str = ".yaml";

/// A directory of cluster connection profiles, one kubeconfig file per
/// cluster, named `cluster-<name>.yaml`.
#[derive(Debug, Clone)]
pub struct Profiles {
    dir: PathBuf,
}

impl Profiles {
    pub fn new<P: AsRef<Path>>(dir: P) -> Profiles {
        Profiles {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of all clusters with a profile, sorted.
    pub fn clusters(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).with_context(|| {
            format!("reading cluster profile directory {}", self.dir.display())
        })?;
        let mut clusters = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(cluster) = file_name
                .strip_prefix(PREFIX)
                .and_then(|rest| rest.strip_suffix(SUFFIX))
            {
                if !cluster.is_empty() {
                    clusters.push(cluster.to_string());
                }
            }
        }
        clusters.sort();
        Ok(clusters)
    }

    /// The profile file of `cluster`, which must exist.
    pub fn path(&self, cluster: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}{}{}", PREFIX, cluster, SUFFIX));
        match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => Ok(path),
            Ok(_) => bail!("cluster profile {} is not a file", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => bail!(
                "unknown cluster profile '{}': {} does not exist",
                cluster,
                path.display()
            ),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}
