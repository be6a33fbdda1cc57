//! Folder mappings: which local folder tree is uploaded to which remote folder.

use anyhow::{Context, anyhow};

static MAPPING_RE: std::sync::LazyLock<Result<regex::Regex, regex::Error>> =
    std::sync::LazyLock::new(|| {
        regex::Regex::new(r"^(?P<local>[^=]+)=(?P<remote>[^:]+)(?::(?P<scope>[^:]+))?$")
    });

/// One local folder uploaded into one remote folder.
///
/// `scope` optionally narrows the mapping to the part of the local tree below a relative
/// prefix, e.g. `LOCAL=REMOTE:public` uploads only `LOCAL/public/...` (to `REMOTE/public/...`).
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct FolderMapping {
    pub local: std::path::PathBuf,
    pub remote: std::path::PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<std::path::PathBuf>,
}

impl FolderMapping {
    pub fn new(
        local: impl Into<std::path::PathBuf>,
        remote: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            scope: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<std::path::PathBuf>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.local.as_os_str().is_empty() {
            return Err(anyhow!("local folder of a mapping must not be empty"));
        }
        if !self.remote.is_absolute() {
            return Err(anyhow!(
                "remote folder must be absolute: {}",
                self.remote.display()
            ));
        }
        if let Some(scope) = &self.scope {
            let plain = scope
                .components()
                .all(|component| matches!(component, std::path::Component::Normal(_)));
            if scope.as_os_str().is_empty() || !plain {
                return Err(anyhow!(
                    "scope must be a relative path without '..': {}",
                    scope.display()
                ));
            }
        }
        Ok(())
    }

    /// Whether `relative` (a path relative to the local root) is uploaded by this mapping.
    #[must_use]
    pub fn covers(&self, relative: &std::path::Path) -> bool {
        self.scope
            .as_deref()
            .is_none_or(|scope| relative.starts_with(scope))
    }
}

impl std::str::FromStr for FolderMapping {
    type Err = anyhow::Error;

    /// Parses `LOCAL=REMOTE` or `LOCAL=REMOTE:SCOPE`.
    fn from_str(arg: &str) -> anyhow::Result<Self> {
        let re = MAPPING_RE
            .as_ref()
            .map_err(|error| anyhow!("invalid mapping pattern: {error}"))?;
        let captures = re
            .captures(arg)
            .ok_or_else(|| anyhow!("expected LOCAL=REMOTE[:SCOPE], got {arg:?}"))?;
        let (Some(local), Some(remote)) = (captures.name("local"), captures.name("remote")) else {
            return Err(anyhow!("expected LOCAL=REMOTE[:SCOPE], got {arg:?}"));
        };
        let mapping = FolderMapping {
            local: local.as_str().into(),
            remote: remote.as_str().into(),
            scope: captures.name("scope").map(|m| m.as_str().into()),
        };
        mapping.validate()?;
        Ok(mapping)
    }
}

/// Reads a JSON array of mappings, e.g.
/// `[{"local": "site/build", "remote": "/var/www", "scope": "public"}]`.
pub fn load_mappings(path: &std::path::Path) -> anyhow::Result<Vec<FolderMapping>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading mappings file {:?}", path))?;
    let mappings: Vec<FolderMapping> = serde_json::from_str(&contents)
        .with_context(|| format!("failed parsing mappings file {:?}", path))?;
    for mapping in &mappings {
        mapping
            .validate()
            .with_context(|| format!("invalid mapping in {:?}", path))?;
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_mapping() -> anyhow::Result<()> {
        let mapping: FolderMapping = "site/build=/var/www".parse()?;
        assert_eq!(mapping, FolderMapping::new("site/build", "/var/www"));
        Ok(())
    }

    #[test]
    fn parse_scoped_mapping() -> anyhow::Result<()> {
        let mapping: FolderMapping = "/a=/b:public/img".parse()?;
        assert_eq!(mapping, FolderMapping::new("/a", "/b").with_scope("public/img"));
        Ok(())
    }

    #[test]
    fn parse_many_mappings_with_one_pattern() -> anyhow::Result<()> {
        assert!(MAPPING_RE.is_ok());
        for k in 0..100 {
            let mapping: FolderMapping = format!("src{k}=/dst{k}").parse()?;
            assert_eq!(mapping, FolderMapping::new(format!("src{k}"), format!("/dst{k}")));
        }
        Ok(())
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("no-separator".parse::<FolderMapping>().is_err());
        assert!("/a=relative/b".parse::<FolderMapping>().is_err());
        assert!("/a=/b:../escape".parse::<FolderMapping>().is_err());
        assert!("/a=/b:/absolute".parse::<FolderMapping>().is_err());
        assert!("=/b".parse::<FolderMapping>().is_err());
    }

    #[test]
    fn scope_is_component_wise() {
        let mapping = FolderMapping::new("/a", "/b").with_scope("pub");
        assert!(mapping.covers(std::path::Path::new("pub")));
        assert!(mapping.covers(std::path::Path::new("pub/x.txt")));
        assert!(!mapping.covers(std::path::Path::new("public/x.txt")));
        assert!(!mapping.covers(std::path::Path::new("other")));
        assert!(FolderMapping::new("/a", "/b").covers(std::path::Path::new("anything")));
    }

    #[test]
    fn load_from_json() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("mappings.json");
        std::fs::write(
            &path,
            r#"[{"local": "/a", "remote": "/b"}, {"local": "/c", "remote": "/d", "scope": "x"}]"#,
        )?;
        let mappings = load_mappings(&path)?;
        assert_eq!(
            mappings,
            vec![
                FolderMapping::new("/a", "/b"),
                FolderMapping::new("/c", "/d").with_scope("x"),
            ]
        );
        std::fs::write(&path, r#"[{"local": "/a", "remote": "b"}]"#)?;
        assert!(load_mappings(&path).is_err());
        Ok(())
    }
}
