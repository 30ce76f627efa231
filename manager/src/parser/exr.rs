//! eXR (NCS6K) parser. Active and committed output is grouped per node:
//!
//! ```text
//! Node 0/RP0/CPU0 [RP]
//!     Boot Partition: xr_lv36
//!     Active Packages: 2
//!         ncs6k-xr-5.2.1 version=5.2.1 [Boot image]
//!         ncs6k-5.2.1.CSCur01489-1.0.0
//! ```
//!
//! Inactive output is a flat list under `N inactive package(s) found:`.

use super::{cross_reference, push_unique, Inventory, PackageParser};
use crate::database::{Package, PackageState};
use crate::errors::DeviceError;

const PACKAGE_PREFIXES: &[&str] = &["ncs", "asr9k"];

#[derive(Debug, Default, Clone)]
pub struct ExrPackageParser;

impl ExrPackageParser {
    fn parse_inactive(output: &str) -> Option<Vec<Package>> {
        let mut lines = output.lines();
        lines.by_ref().find(|line| line.contains("package"))?;

        let mut packages = Vec::new();
        for line in lines {
            let name = line.trim();
            if name.is_empty() {
                break;
            }
            push_unique(&mut packages, "", name, PackageState::Inactive);
        }
        Some(packages)
    }

    /// Union of the packages listed under every `Node` section
    fn parse_per_node(output: &str, state: PackageState) -> Option<Vec<Package>> {
        let mut seen_node = false;
        let mut packages = Vec::new();

        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.starts_with("Node") {
                seen_node = true;
                continue;
            }
            if !seen_node || !PACKAGE_PREFIXES.iter().any(|p| line.starts_with(p)) {
                continue;
            }
            // "ncs6k-xr-5.2.1 version=5.2.1 [Boot image]"
            if let Some(name) = line.split_whitespace().next() {
                push_unique(&mut packages, "", name, state);
            }
        }

        seen_node.then_some(packages)
    }

    /// `ncs6k-xr-5.2.1` gives (`ncs6k`, `5.2.1`)
    fn platform_and_version(packages: &[Package]) -> Option<(String, String)> {
        packages
            .iter()
            .filter(|p| p.state != PackageState::Inactive)
            .find_map(|p| {
                let tokens: Vec<&str> = p.name.split('-').collect();
                match tokens.as_slice() {
                    [platform, "xr", version] => Some((platform.to_string(), version.to_string())),
                    _ => None,
                }
            })
    }
}

impl PackageParser for ExrPackageParser {
    fn parse(
        &self,
        inactive: &str,
        active: &str,
        committed: &str,
    ) -> Result<Inventory, DeviceError> {
        let inactive_list = Self::parse_inactive(inactive);
        let active_list = Self::parse_per_node(active, PackageState::Active);
        let committed_list = Self::parse_per_node(committed, PackageState::ActiveCommitted);

        if active_list.is_none() && inactive_list.is_none() && committed_list.is_none() {
            return Err(DeviceError::parser("eXR show install output"));
        }

        let packages = cross_reference(
            active_list.unwrap_or_default(),
            inactive_list.unwrap_or_default(),
            &committed_list.unwrap_or_default(),
        );
        let (software_platform, software_version) = match Self::platform_and_version(&packages) {
            Some((platform, version)) => (Some(platform), Some(version)),
            None => (None, None),
        };

        Ok(Inventory {
            packages,
            software_platform,
            software_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE: &str = "\
Node 0/RP0/CPU0 [RP]
    Boot Partition: xr_lv36
    Active Packages: 2
        ncs6k-xr-5.2.1 version=5.2.1 [Boot image]
        ncs6k-5.2.1.CSCur01489-1.0.0

Node 0/RP1/CPU0 [RP]
    Boot Partition: xr_lv36
    Active Packages: 3
        ncs6k-xr-5.2.1 version=5.2.1 [Boot image]
        ncs6k-5.2.1.CSCur01489-1.0.0
        ncs6k-mpls-5.2.1
";

    const COMMITTED: &str = "\
Node 0/RP0/CPU0 [RP]
    Committed Packages: 1
        ncs6k-xr-5.2.1 version=5.2.1 [Boot image]
";

    const INACTIVE: &str = "\
2 inactive package(s) found:
    ncs6k-mcast-5.2.1
    ncs6k-xr-5.2.1

";

    #[test]
    fn merges_nodes_and_cross_references() {
        let inventory = ExrPackageParser.parse(INACTIVE, ACTIVE, COMMITTED).unwrap();

        assert_eq!(
            inventory.find("ncs6k-xr-5.2.1").unwrap().state,
            PackageState::ActiveCommitted
        );
        assert_eq!(
            inventory.find("ncs6k-mpls-5.2.1").unwrap().state,
            PackageState::Active
        );
        assert_eq!(
            inventory.find("ncs6k-mcast-5.2.1").unwrap().state,
            PackageState::Inactive
        );
        // active first, then inactive; the duplicate inactive entry is kept as its own record
        assert_eq!(inventory.packages.len(), 5);
        assert_eq!(inventory.software_platform.as_deref(), Some("ncs6k"));
        assert_eq!(inventory.software_version.as_deref(), Some("5.2.1"));
    }

    #[test]
    fn no_recognizable_section_is_a_parser_error() {
        assert!(ExrPackageParser.parse("", "garbage", "").is_err());
    }
}
