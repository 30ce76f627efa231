//! Maps a package file name to its platform and release.
//!
//! The table is ordered: SMU patterns come before the package patterns of the
//! same family, and `ncs6k-sysadmin` before plain `ncs6k`.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageType {
    Asr9kPxSmu,
    Asr9kPxServicePack,
    Asr9kPSmu,
    Asr9kPPackage,
    Asr9kPxPackage,
    CrsPxSmu,
    CrsPSmu,
    CrsPxPackage,
    CrsPPackage,
    Ncs6kSysadminSmu,
    Ncs6kSysadminPackage,
    Ncs6kSmu,
    Ncs6kPackage,
    Asr9kPxTar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftwarePlatform {
    Asr9kP,
    Asr9kPx,
    CrsP,
    CrsPx,
    Ncs6k,
    Ncs6kSysadmin,
    Unknown,
}

impl SoftwarePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoftwarePlatform::Asr9kP => "asr9k_p",
            SoftwarePlatform::Asr9kPx => "asr9k_px",
            SoftwarePlatform::CrsP => "crs_p",
            SoftwarePlatform::CrsPx => "crs_px",
            SoftwarePlatform::Ncs6k => "ncs6k",
            SoftwarePlatform::Ncs6kSysadmin => "ncs6k_sysadmin",
            SoftwarePlatform::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for SoftwarePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PackageType {
    pub fn platform(&self) -> SoftwarePlatform {
        match self {
            PackageType::Asr9kPSmu | PackageType::Asr9kPPackage => SoftwarePlatform::Asr9kP,
            PackageType::Asr9kPxSmu
            | PackageType::Asr9kPxServicePack
            | PackageType::Asr9kPxPackage
            | PackageType::Asr9kPxTar => SoftwarePlatform::Asr9kPx,
            PackageType::CrsPxSmu | PackageType::CrsPxPackage => SoftwarePlatform::CrsPx,
            PackageType::CrsPSmu | PackageType::CrsPPackage => SoftwarePlatform::CrsP,
            PackageType::Ncs6kSmu | PackageType::Ncs6kPackage => SoftwarePlatform::Ncs6k,
            PackageType::Ncs6kSysadminSmu | PackageType::Ncs6kSysadminPackage => {
                SoftwarePlatform::Ncs6kSysadmin
            }
        }
    }

    pub fn is_smu(&self) -> bool {
        matches!(
            self,
            PackageType::Asr9kPxSmu
                | PackageType::Asr9kPSmu
                | PackageType::CrsPxSmu
                | PackageType::CrsPSmu
                | PackageType::Ncs6kSysadminSmu
                | PackageType::Ncs6kSmu
        )
    }
}

/// Ordered pattern table, anchored at the start of the name. A leading
/// `disk0:` style location is allowed by the `\S*` prefix.
const PATTERNS: &[(PackageType, &str)] = &[
    // asr9k-px-4.2.3.CSCtz89449
    (PackageType::Asr9kPxSmu, r"^\S*asr9k-px-\d+\.\d+\.\d+\.CSC\S*"),
    // asr9k-px-4.3.2.sp-1.0.0, asr9k-px-4.3.2.k9-sp-1.0.0
    (PackageType::Asr9kPxServicePack, r"^\S*asr9k-px-\d+\.\d+\.\d+\.\S*sp\S*"),
    // asr9k-p-4.2.3.CSCtz89449
    (PackageType::Asr9kPSmu, r"^\S*asr9k-p-\d+\.\d+\.\d+\.CSC\S*"),
    // asr9k-mini-p-4.2.1
    (PackageType::Asr9kPPackage, r"^\S*asr9k-\S*-p-\d+\.\d+\.\d+\S*"),
    // asr9k-mini-px-4.2.1
    (PackageType::Asr9kPxPackage, r"^\S*asr9k-\S*-px-\d+\.\d+\.\d+\S*"),
    // hfr-px-4.2.3.CSCtz89449
    (PackageType::CrsPxSmu, r"^\S*hfr-px-\d+\.\d+\.\d+\.CSC\S*"),
    // hfr-p-4.2.3.CSCtz89449
    (PackageType::CrsPSmu, r"^\S*hfr-p-\d+\.\d+\.\d+\.CSC\S*"),
    // hfr-mini-px-4.2.1
    (PackageType::CrsPxPackage, r"^\S*hfr-\S*-px-\d+\.\d+\.\d+\S*"),
    // hfr-mini-p-4.2.1
    (PackageType::CrsPPackage, r"^\S*hfr-\S*-p-\d+\.\d+\.\d+\S*"),
    // ncs6k-sysadmin-5.0.0.CSCul30161
    (PackageType::Ncs6kSysadminSmu, r"^\S*ncs6k-sysadmin-\d+\.\d+\.\d+\.CSC\S*"),
    // ncs6k-sysadmin-mcast-5.0.1
    (PackageType::Ncs6kSysadminPackage, r"^\S*ncs6k-sysadmin-\S*-\d+\.\d+\.\d+\S*"),
    // ncs6k-5.0.1.CSCul51055-0.0.2.i
    (PackageType::Ncs6kSmu, r"^\S*ncs6k-\d+\.\d+\.\d+\.CSC\S*"),
    // ncs6k-mcast-5.0.1
    (PackageType::Ncs6kPackage, r"^\S*ncs6k-\S*-\d+\.\d+\.\d+\S*"),
    // ASR9K-iosxr-px-k9-5.3.0.tar, ASR9K-iosxr-px-5.3.1-bridge_smus.tar
    (PackageType::Asr9kPxTar, r"^\S*ASR9K-iosxr-px\S*-\d+\.\d+\.\d+\S*\.tar"),
];

pub struct PlatformMatcher {
    table: Vec<(PackageType, Regex)>,
    release: Regex,
}

impl PlatformMatcher {
    pub fn new() -> Result<Self> {
        let table = PATTERNS
            .iter()
            .map(|(kind, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*kind, re))
                    .with_context(|| format!("invalid package pattern {}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table,
            release: Regex::new(r"\d+\.\d+\.\d+")?,
        })
    }

    /// First table entry whose pattern matches the name
    pub fn package_type(&self, name: &str) -> Option<PackageType> {
        self.table
            .iter()
            .find(|(_, re)| re.is_match(name))
            .map(|(kind, _)| *kind)
    }

    pub fn platform(&self, name: &str) -> SoftwarePlatform {
        self.package_type(name)
            .map(|kind| kind.platform())
            .unwrap_or(SoftwarePlatform::Unknown)
    }

    /// First dotted triple in a recognized name, `unknown` otherwise
    pub fn release(&self, name: &str) -> String {
        if self.package_type(name).is_none() {
            return UNKNOWN.to_string();
        }
        self.release
            .find(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn is_smu(&self, name: &str) -> bool {
        self.package_type(name).map(|k| k.is_smu()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("asr9k-px-4.3.2.CSCtz89449.pie", SoftwarePlatform::Asr9kPx, "4.3.2")]
    #[case("disk0:asr9k-mini-px-4.2.1", SoftwarePlatform::Asr9kPx, "4.2.1")]
    #[case("disk0:asr9k-mini-p-4.2.1", SoftwarePlatform::Asr9kP, "4.2.1")]
    #[case("asr9k-p-4.2.3.CSCtz89449", SoftwarePlatform::Asr9kP, "4.2.3")]
    #[case("asr9k-px-5.2.2.sp1.pie", SoftwarePlatform::Asr9kPx, "5.2.2")]
    #[case("ASR9K-iosxr-px-k9-5.3.1.tar", SoftwarePlatform::Asr9kPx, "5.3.1")]
    #[case("ASR9K-iosxr-px-5.3.1-bridge_smus.tar", SoftwarePlatform::Asr9kPx, "5.3.1")]
    #[case("hfr-mini-px-4.2.1", SoftwarePlatform::CrsPx, "4.2.1")]
    #[case("hfr-p-4.2.3.CSCtz89449", SoftwarePlatform::CrsP, "4.2.3")]
    #[case("ncs6k-sysadmin-5.0.0.CSCul30161", SoftwarePlatform::Ncs6kSysadmin, "5.0.0")]
    #[case("ncs6k-sysadmin-mcast-5.0.1", SoftwarePlatform::Ncs6kSysadmin, "5.0.1")]
    #[case("ncs6k-5.0.1.CSCul51055-0.0.2.i", SoftwarePlatform::Ncs6k, "5.0.1")]
    #[case("ncs6k-mcast-5.0.1", SoftwarePlatform::Ncs6k, "5.0.1")]
    fn recognizes_platform_and_release(
        #[case] name: &str,
        #[case] platform: SoftwarePlatform,
        #[case] release: &str,
    ) {
        let matcher = PlatformMatcher::new().unwrap();
        assert_eq!(matcher.platform(name), platform);
        assert_eq!(matcher.release(name), release);
    }

    #[test]
    fn smu_wins_over_package_pattern() {
        let matcher = PlatformMatcher::new().unwrap();
        assert_eq!(
            matcher.package_type("ncs6k-5.0.1.CSCul51055-0.0.2.i"),
            Some(PackageType::Ncs6kSmu)
        );
        assert_eq!(
            matcher.package_type("ncs6k-sysadmin-5.0.0.CSCul30161"),
            Some(PackageType::Ncs6kSysadminSmu)
        );
        assert!(matcher.is_smu("asr9k-px-4.3.2.CSCtz89449.pie"));
        assert!(!matcher.is_smu("asr9k-mini-px-4.3.2.pie"));
    }

    #[test]
    fn unrecognized_names_are_unknown() {
        let matcher = PlatformMatcher::new().unwrap();
        assert_eq!(matcher.platform("README.txt"), SoftwarePlatform::Unknown);
        assert_eq!(matcher.release("junos-18.1.1.tgz"), UNKNOWN);
    }
}
