//! Package parsers: turn `show install` output into the normalized package set.

pub mod exr;
pub mod platform_matcher;
pub mod xr;

pub use exr::ExrPackageParser;
pub use platform_matcher::{PackageType, PlatformMatcher, SoftwarePlatform};
pub use xr::XrPackageParser;

use crate::database::{Package, PackageState};
use crate::errors::DeviceError;

/// Parsed inventory of one host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub packages: Vec<Package>,
    pub software_platform: Option<String>,
    pub software_version: Option<String>,
}

impl Inventory {
    pub fn find(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }
}

pub trait PackageParser: Send + Sync {
    /// Parses the three `show install` outputs. Fails when none of them has
    /// the shape the parser expects.
    fn parse(&self, inactive: &str, active: &str, committed: &str)
        -> Result<Inventory, DeviceError>;
}

/// Rewrites the state of every package also found in the committed list and
/// returns the active packages followed by the inactive ones.
pub(crate) fn cross_reference(
    active: Vec<Package>,
    inactive: Vec<Package>,
    committed: &[Package],
) -> Vec<Package> {
    let is_committed = |p: &Package| {
        committed
            .iter()
            .any(|c| c.location == p.location && c.name == p.name)
    };
    active
        .into_iter()
        .chain(inactive)
        .map(|mut package| {
            if is_committed(&package) {
                package.state = package.state.committed();
            }
            package
        })
        .collect()
}

/// Adds a package unless the list already holds it at the same location
pub(crate) fn push_unique(list: &mut Vec<Package>, location: &str, name: &str, state: PackageState) {
    if list.iter().any(|p| p.location == location && p.name == name) {
        return;
    }
    list.push(Package {
        location: location.to_string(),
        name: name.to_string(),
        state,
    });
}
