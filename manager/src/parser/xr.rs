//! Classic IOS-XR (ASR9K, CRS) `show install ... summary` parser.
//!
//! ```text
//! Active Packages:
//!     disk0:asr9k-mini-px-4.2.1
//!     disk0:asr9k-px-4.2.1.CSCtz89449-1.0.0
//!
//! ```

use super::{cross_reference, push_unique, Inventory, PackageParser};
use crate::database::{Package, PackageState};
use crate::errors::DeviceError;

#[derive(Debug, Default, Clone)]
pub struct XrPackageParser;

impl XrPackageParser {
    /// Package lines after the `Packages` header, up to the first blank line.
    /// `None` when the header is missing.
    fn parse_list(output: &str, state: PackageState) -> Option<Vec<Package>> {
        let mut lines = output.lines();
        lines.by_ref().find(|line| line.contains("Packages"))?;

        let mut packages = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            let (location, name) = match line.split_once(':') {
                Some((location, name)) => (location.trim(), name.trim()),
                None => ("", line),
            };
            push_unique(&mut packages, location, name, state);
        }
        Some(packages)
    }

    /// `asr9k-mini-px-4.2.1` gives (`asr9k-px`, `4.2.1`). Only the first
    /// mini package is looked at.
    pub fn platform_and_version(packages: &[Package]) -> Option<(String, String)> {
        let mini = packages.iter().find(|p| p.name.contains("-mini-"))?;
        let tokens: Vec<&str> = mini.name.split('-').collect();
        (tokens.len() == 4).then(|| (format!("{}-{}", tokens[0], tokens[2]), tokens[3].to_string()))
    }
}

impl PackageParser for XrPackageParser {
    fn parse(
        &self,
        inactive: &str,
        active: &str,
        committed: &str,
    ) -> Result<Inventory, DeviceError> {
        let inactive_list = Self::parse_list(inactive, PackageState::Inactive);
        let active_list = Self::parse_list(active, PackageState::Active);
        let committed_list = Self::parse_list(committed, PackageState::ActiveCommitted);

        if inactive_list.is_none() && active_list.is_none() && committed_list.is_none() {
            return Err(DeviceError::parser("show install summary output"));
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

    #[test]
    fn committed_packages_are_cross_referenced() {
        let active = "Active Packages:\n  disk0:asr9k-px-4.2.1\n  disk0:asr9k-mini-px-4.2.1\n\n";
        let inactive = "Inactive Packages:\n  disk0:asr9k-fpd-px-4.2.1\n  disk0:asr9k-mgbl-px-4.2.1\n";
        let committed =
            "Committed Packages:\n  disk0:asr9k-mini-px-4.2.1\n  disk0:asr9k-fpd-px-4.2.1\n";

        let inventory = XrPackageParser.parse(inactive, active, committed).unwrap();

        let state = |name: &str| inventory.find(name).unwrap().state;
        assert_eq!(state("asr9k-px-4.2.1"), PackageState::Active);
        assert_eq!(state("asr9k-mini-px-4.2.1"), PackageState::ActiveCommitted);
        assert_eq!(state("asr9k-fpd-px-4.2.1"), PackageState::InactiveCommitted);
        assert_eq!(state("asr9k-mgbl-px-4.2.1"), PackageState::Inactive);
        assert_eq!(inventory.packages.len(), 4);
    }

    #[test]
    fn lines_after_blank_are_ignored() {
        let active = "Packages:\ndisk0:a-1\n\nSome trailer\ndisk0:b-1\n";
        let inventory = XrPackageParser.parse("", active, "").unwrap();
        assert_eq!(inventory.packages.len(), 1);
        assert_eq!(inventory.packages[0].location, "disk0");
    }

    #[test]
    fn package_without_location() {
        let active = "Packages:\nasr9k-mini-px-5.3.3\n";
        let inventory = XrPackageParser.parse("", active, "").unwrap();
        assert_eq!(inventory.packages[0].location, "");
        assert_eq!(inventory.software_platform.as_deref(), Some("asr9k-px"));
        assert_eq!(inventory.software_version.as_deref(), Some("5.3.3"));
    }

    #[test]
    fn mini_with_extra_tokens_gives_no_version() {
        let packages = vec![Package {
            location: "disk0".into(),
            name: "asr9k-mini-px-4.2.1-extra".into(),
            state: PackageState::Active,
        }];
        assert_eq!(XrPackageParser::platform_and_version(&packages), None);
    }

    #[test]
    fn same_package_on_two_disks_is_kept_twice() {
        let active = "Active Packages:\n  disk0:asr9k-px-4.2.1\n  disk1:asr9k-px-4.2.1\n";
        let committed = "Committed Packages:\n  disk1:asr9k-px-4.2.1\n";

        let inventory = XrPackageParser.parse("", active, committed).unwrap();

        assert_eq!(inventory.packages.len(), 2);
        let on = |location: &str| {
            inventory
                .packages
                .iter()
                .find(|p| p.location == location)
                .unwrap()
                .state
        };
        assert_eq!(on("disk0"), PackageState::Active);
        assert_eq!(on("disk1"), PackageState::ActiveCommitted);
    }

    #[test]
    fn first_mini_package_decides_the_version() {
        let packages = vec![
            Package {
                location: "disk0".into(),
                name: "asr9k-mini-px-4.2.1-extra".into(),
                state: PackageState::Active,
            },
            Package {
                location: "disk0".into(),
                name: "asr9k-mini-px-5.3.3".into(),
                state: PackageState::Active,
            },
        ];
        assert_eq!(XrPackageParser::platform_and_version(&packages), None);
    }

    #[test]
    fn output_without_header_is_a_parser_error() {
        let err = XrPackageParser
            .parse("% Invalid input", "% Invalid input", "")
            .unwrap_err();
        assert_eq!(err.kind(), "ParserError");
    }
}
