//! Prompt regexes per operating system family.
//!
//! Every prompt pattern is anchored at end of buffer (`\z`) and preceded by a
//! newline or the start of the buffer, so text that merely mentions a prompt
//! inside command output never matches.

use anyhow::{Context, Result};
use regex::Regex;

use crate::transport::LoginPatterns;

#[derive(Debug, Clone)]
pub struct PromptSet {
    /// `RP/0/RSP0/CPU0:router#`
    pub exec: Regex,
    /// `RP/0/RSP0/CPU0:router(admin)#` or `sysadmin-vm:0_RP0#`
    pub admin: Regex,
    /// `RP/0/RSP0/CPU0:router(config)#`, `(admin-config)#`
    pub config: Regex,
    /// Markers printed when the device rejects command text
    pub syntax_error: Regex,
    pub login: LoginPatterns,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid prompt pattern {}", pattern))
}

fn login_patterns() -> Result<LoginPatterns> {
    Ok(LoginPatterns {
        username: compile(r"(?i)(?:username|login):\s*\z")?,
        password: compile(r"(?i)password:\s*\z")?,
        auth_failed: compile(
            r"(?i)(?:% authentication failed|login incorrect|permission denied|access denied)",
        )?,
        unable_to_connect: compile(
            r"(?i)(?:connection refused|unable to connect|connection timed out|no route to host|host is unreachable|could not resolve)",
        )?,
        press_return: compile(
            r"(?i)(?:press return to get started[^\n]*|escape character is [^\n]*)\s*\z",
        )?,
        host_key_confirm: compile(r"(?i)are you sure you want to continue connecting.*\?\s*\z")?,
        shell_prompt: compile(r"(?:\A|\n)[^\n]*[>#$%]\s*\z")?,
    })
}

fn syntax_error() -> Result<Regex> {
    compile(r"% (?:Invalid input detected|Incomplete command|Ambiguous command)[^\n]*")
}

impl PromptSet {
    /// Classic IOS-XR (ASR9K, CRS): admin mode is a sub-mode of the same shell
    pub fn classic_xr() -> Result<Self> {
        Ok(Self {
            exec: compile(r"(?:\A|\n)[\w-]+/\w+/\w+/\w+:[^()\n#]*#\s*\z")?,
            admin: compile(r"(?:\A|\n)[\w-]+/\w+/\w+/\w+:[^()\n#]*\(admin\)#\s*\z")?,
            config: compile(r"(?:\A|\n)[\w-]+/\w+/\w+/\w+:[^()\n#]*\((?:admin-)?config[^)\n]*\)#\s*\z")?,
            syntax_error: syntax_error()?,
            login: login_patterns()?,
        })
    }

    /// eXR (NCS6K, migrated ASR9K): `admin` opens the sysadmin VM
    pub fn exr() -> Result<Self> {
        Ok(Self {
            exec: compile(r"(?:\A|\n)[\w-]+/\w+/\w+/\w+:[^()\n#]*#\s*\z")?,
            admin: compile(r"(?:\A|\n)sysadmin-vm:[\w/]+#\s*\z")?,
            config: compile(
                r"(?:\A|\n)(?:[\w-]+/\w+/\w+/\w+:[^()\n#]*|sysadmin-vm:[\w/]+)\(config[^)\n]*\)#\s*\z",
            )?,
            syntax_error: syntax_error()?,
            login: login_patterns()?,
        })
    }
}
