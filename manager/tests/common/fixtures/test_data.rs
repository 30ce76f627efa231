//! Common test data and constants

use std::time::Duration;

use upgrade_manager::handlers::DeviceTimeouts;

/// Timeouts small enough that failing paths finish quickly
pub fn fast_timeouts() -> DeviceTimeouts {
    DeviceTimeouts {
        connect: Duration::from_secs(2),
        command: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        operation: Duration::from_secs(5),
    }
}

/// Test credential key for the encrypted password columns
pub const CREDENTIAL_KEY: &str = "test-credential-key";

/// Common test host names
pub mod hosts {
    pub const PE1: &str = "pe1";
    pub const PE2: &str = "pe2";
    pub const NCS: &str = "ncs6k-1";
    pub const UNREACHABLE: &str = "pe-down";
}

/// Device login used by the fake routers
pub mod login {
    pub const USERNAME: &str = "cisco";
    pub const PASSWORD: &str = "s3cret";
}

/// Package file names as they appear in a repository
pub mod packages {
    pub const SMU_PIE: &str = "asr9k-px-5.3.3.CSCuz12345.pie";
    pub const MGBL_PIE: &str = "asr9k-mgbl-px-5.3.3.pie";
    pub const BASE_TAR: &str = "ASR9K-iosxr-px-k9-5.3.3.tar";
    pub const NCS_SMU: &str = "ncs6k-5.2.1.CSCul51055-0.0.2.i";
}

/// Canned `show install` output of a classic IOS-XR router
pub mod outputs {
    pub const ACTIVE_SUMMARY: &str = "Default Profile:\n  SDRs:\n    Owner\n  Active Packages:\n    disk0:asr9k-mini-px-5.3.3\n    disk0:asr9k-mpls-px-5.3.3\n    disk0:asr9k-px-5.3.3.CSCuz12345-1.0.0\n\n";

    pub const INACTIVE_SUMMARY: &str = "Default Profile:\n  SDRs:\n    Owner\n  Inactive Packages:\n    disk0:asr9k-mgbl-px-5.3.3\n\n";

    pub const COMMITTED_SUMMARY: &str = "Default Profile:\n  SDRs:\n    Owner\n  Committed Packages:\n    disk0:asr9k-mini-px-5.3.3\n    disk0:asr9k-mpls-px-5.3.3\n\n";

    pub const ADD_STARTED: &str = "Install operation 12 '(admin) install add source tftp://10.1.1.1/images asr9k-px-5.3.3.CSCuz12345.pie async' started by user 'cisco' via CLI at 10:00:00 UTC Mon Oct 19 2026.\nThe install operation will continue asynchronously.";

    pub const ADD_REJECTED: &str = "Error:  Cannot proceed with the add operation because there is another\nError:  install operation in progress.";

    pub const ACTIVATE_STARTED: &str = "Install operation 13 '(admin) install activate id 12 prompt-level none async' started by user 'cisco' via CLI.\nThe install operation will continue asynchronously.";

    pub const REQUEST_RUNNING: &str = "Install operation 12 '(admin) install add' started by user 'cisco'\nThe operation is 40% complete";

    pub const NO_REQUESTS: &str = "There are no install requests in operation.";

    pub const LOG_12_OK: &str = "Install operation 12 started by user 'cisco'\nInstall operation 12 completed successfully at 10:04:00 UTC";

    pub const LOG_12_FAILED: &str = "Install operation 12 started by user 'cisco'\nInstall operation 12 failed at 10:04:00 UTC\nError: could not copy the package";

    pub const LOG_13_OK: &str = "Install operation 13 started by user 'cisco'\nInstall operation 13 completed successfully";

    pub const LOG_13_FAILED: &str = "Install operation 13 started by user 'cisco'\nInstall operation 13 failed at 10:09:00 UTC\nError: package asr9k-mgbl-px-5.3.3 is incompatible with the active software";

    pub const LOG_13_PARALLEL_RELOAD: &str = "Install operation 13 started by user 'cisco'\n  Install method: Parallel Reload\nInstall operation 13 completed successfully";

    pub const PLATFORM_BOOTING: &str = "Node            Type                      State            Config State\n0/RSP0/CPU0     A9K-RSP440-SE(Active)     IOS XR RUN       PWR,NSHUT,MON\n0/0/CPU0        A9K-MOD80-SE              BOOTING          PWR,NSHUT,MON";

    pub const PLATFORM_RUNNING: &str = "Node            Type                      State            Config State\n0/RSP0/CPU0     A9K-RSP440-SE(Active)     IOS XR RUN       PWR,NSHUT,MON\n0/0/CPU0        A9K-MOD80-SE              IOS XR RUN       PWR,NSHUT,MON";

    pub const PLATFORM_VM_READY: &str = "Node location       Card type          VM IP address   VM status     Band\n0/RSP0/CPU0         A9K-RSP880-SE      192.0.0.4       FINAL Band    Ready";

    pub const INCONSISTENCY_CLEARED: &str = "Creating any missing inconsistency alarms ...OK";

    pub const MIGRATED_CONFIG_LISTING: &str = "Directory of harddisk:\n   65 -rwx  4096  Mon Oct 19 10:00:00 2026  iosxr.cfg";

    pub const MIGRATED_CONFIG_LOADED: &str = "Loading.\n4096 bytes parsed in 1 sec (4096)bytes/sec";

    pub const RUNNING_CONFIG_BEFORE: &str = "hostname pe1\ninterface Loopback0\n ipv4 address 10.0.0.1 255.255.255.255\n!\nend";

    pub const RUNNING_CONFIG_AFTER: &str = "hostname pe1\ninterface Loopback0\n ipv4 address 10.0.0.1 255.255.255.255\n!\nmpls ldp\n!\nend";

    pub const SHOW_VERSION_XR5: &str = "Cisco IOS XR Software, Version 5.3.3[Default]\nCopyright (c) 2016 by Cisco Systems, Inc.";

    pub const SHOW_VERSION_EXR: &str = "Cisco IOS XR Software, Version 6.1.2\nCopyright (c) 2013-2016 by Cisco Systems, Inc.";
}
