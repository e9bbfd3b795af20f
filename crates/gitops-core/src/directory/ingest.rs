//! Promotion of raw files into the managed zone

use gitops_fs::{LayoutPath, NormalizedPath, io};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::{DiscoveredResource, parse_documents};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Pending files archived into `raw/processed`
    pub processed: Vec<String>,
    /// Pending files moved into `raw/errors`, with the reason
    pub failed: Vec<(String, String)>,
    /// Managed files written, relative to the fabric directory
    pub written: Vec<String>,
}

impl IngestionReport {
    pub fn changed(&self) -> bool {
        !self.processed.is_empty() || !self.failed.is_empty()
    }
}

/// Moves files from `raw/pending` into the managed zone of a working tree.
pub trait IngestionPipeline: Send + Sync {
    /// Ingest everything pending below the fabric directory `base`.
    fn ingest(&self, base: &NormalizedPath) -> Result<IngestionReport>;
}

/// Managed directory receiving resources of `kind`.
pub fn managed_dir_for(kind: &str) -> Option<LayoutPath> {
    match kind {
        "VPC" => Some(LayoutPath::ManagedVpcs),
        "Connection" => Some(LayoutPath::ManagedConnections),
        "Switch" => Some(LayoutPath::ManagedSwitches),
        "Server" => Some(LayoutPath::ManagedServers),
        "SwitchGroup" => Some(LayoutPath::ManagedSwitchGroups),
        _ => None,
    }
}

/// Routes each YAML document by `kind` into `managed/<dir>/<name>.yaml`.
///
/// A file is only promoted when every document in it can be routed; otherwise
/// nothing from it is written and it moves to `raw/errors`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KindRoutingPipeline;

impl KindRoutingPipeline {
    fn route(content: &str) -> std::result::Result<Vec<(String, String)>, String> {
        let documents = parse_documents(content).map_err(|e| format!("invalid YAML: {e}"))?;
        if documents.is_empty() {
            return Err("no documents".to_string());
        }
        documents
            .iter()
            .map(|document| -> std::result::Result<(String, String), String> {
                let resource = DiscoveredResource::from_yaml(document)
                    .ok_or_else(|| "document without kind or metadata.name".to_string())?;
                let dir = managed_dir_for(&resource.kind)
                    .ok_or_else(|| format!("unsupported kind '{}'", resource.kind))?;
                let text = serde_yaml::to_string(document).map_err(|e| e.to_string())?;
                Ok((format!("{dir}/{}.yaml", resource.name), text))
            })
            .collect()
    }
}

impl IngestionPipeline for KindRoutingPipeline {
    fn ingest(&self, base: &NormalizedPath) -> Result<IngestionReport> {
        let pending = base.join(LayoutPath::RawPending.as_str());
        let mut report = IngestionReport::default();
        if !pending.is_dir() {
            return Ok(report);
        }

        for file in io::list_files(&pending, &[])? {
            if file.file_name() == Some(LayoutPath::GitKeep.as_str()) {
                continue;
            }
            let source = pending.join(file.as_str());
            let routed = io::read_text(&source)
                .map_err(|e| e.to_string())
                .and_then(|content| Self::route(&content));

            match routed {
                Ok(outputs) => {
                    for (relative, text) in outputs {
                        io::write_text(&base.join(&relative), &text)?;
                        report.written.push(relative);
                    }
                    let target = base.join(LayoutPath::RawProcessed.as_str()).join(file.as_str());
                    io::move_file(&source, &target)?;
                    report.processed.push(file.as_str().to_string());
                }
                Err(reason) => {
                    tracing::warn!(file = %file, reason = %reason, "Raw file rejected");
                    let target = base.join(LayoutPath::RawErrors.as_str()).join(file.as_str());
                    io::move_file(&source, &target)?;
                    report.failed.push((file.as_str().to_string(), reason));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("VPC", Some(LayoutPath::ManagedVpcs))]
    #[case("SwitchGroup", Some(LayoutPath::ManagedSwitchGroups))]
    #[case("Server", Some(LayoutPath::ManagedServers))]
    #[case("ConfigMap", None)]
    fn routes_kinds(#[case] kind: &str, #[case] expected: Option<LayoutPath>) {
        assert_eq!(managed_dir_for(kind), expected);
    }

    #[test]
    fn promotes_routable_files_and_rejects_the_rest() {
        let temp = TempDir::new().unwrap();
        let base = NormalizedPath::new(temp.path());
        io::write_text(&base.join("raw/pending/.gitkeep"), "").unwrap();
        io::write_text(
            &base.join("raw/pending/net.yaml"),
            "kind: VPC\nmetadata:\n  name: vpc-1\n---\nkind: Switch\nmetadata:\n  name: leaf-1\n",
        )
        .unwrap();
        io::write_text(
            &base.join("raw/pending/mixed.yaml"),
            "kind: Server\nmetadata:\n  name: s1\n---\nkind: ConfigMap\nmetadata:\n  name: cm\n",
        )
        .unwrap();

        let report = KindRoutingPipeline.ingest(&base).unwrap();

        assert_eq!(report.processed, vec!["net.yaml".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "mixed.yaml");
        assert!(report.failed[0].1.contains("ConfigMap"));
        assert_eq!(
            report.written,
            vec!["managed/vpcs/vpc-1.yaml".to_string(), "managed/switches/leaf-1.yaml".to_string()]
        );
        assert!(base.join("raw/processed/net.yaml").is_file());
        assert!(base.join("raw/errors/mixed.yaml").is_file());
        assert!(!base.join("managed/servers/s1.yaml").exists());
        assert!(base.join("raw/pending/.gitkeep").is_file());
    }
}
