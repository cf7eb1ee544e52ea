//! Fake analysis tools
//!
//! Each tool is replaced by a small shell script in a temp directory so the
//! suite runs without any real analyzer installed.

use super::constants::*;
use blockchain_vuln_analyzer::analysis::ToolOverride;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Slither reports findings through a non-zero exit status.
const FAKE_SLITHER: &str = r#"#!/bin/sh
cat <<'JSON'
{
  "success": true,
  "error": null,
  "results": {
    "detectors": [
      {
        "check": "reentrancy-eth",
        "impact": "High",
        "confidence": "Medium",
        "description": "Reentrancy in Vault.withdraw() (Contract.sol#10-15)",
        "elements": [
          {"source_mapping": {"filename_relative": "Contract.sol", "lines": [10, 11, 12, 13, 14, 15]}}
        ]
      },
      {
        "check": "low-level-calls",
        "impact": "Informational",
        "confidence": "High",
        "description": "Low level call in Vault.withdraw()",
        "elements": []
      }
    ]
  }
}
JSON
exit 255
"#;

const FAKE_MYTHRIL: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/mythril.args"
cat <<'JSON'
{"success": true, "error": null, "issues": [{"title": "External Call To User-Supplied Address", "swc-id": "107", "severity": "Medium", "description": "A call to a user-supplied address is executed.", "filename": "Contract.sol", "lineno": 12}]}
JSON
"#;

const FAKE_MAIAN: &str = r#"#!/bin/sh
echo "Traceback (most recent call last): solc not found" >&2
exit 1
"#;

const FAKE_MANTICORE: &str = r#"#!/bin/sh
echo "Generated testcase No. 0 - STOP"
echo "Generated testcase No. 1 - REVERT (assertion failed in withdraw)"
echo "Results in ./mcore_x1"
"#;

/// Fake tools on disk, removed when dropped.
pub struct FakeTools {
    dir: TempDir,
}

impl FakeTools {
    pub fn install() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("fake-tools-").tempdir()?;
        let slow_echidna = format!(
            "#!/bin/sh\nsleep {} &\necho $! > \"$(dirname \"$0\")/echidna.pid\"\nwait\necho '{{\"success\": true, \"tests\": []}}'\n",
            SLOW_TOOL_SLEEP_SECS
        );

        write_script(dir.path(), "slither", FAKE_SLITHER)?;
        write_script(dir.path(), "myth", FAKE_MYTHRIL)?;
        write_script(dir.path(), "echidna", &slow_echidna)?;
        write_script(dir.path(), "maian", FAKE_MAIAN)?;
        write_script(dir.path(), "manticore", FAKE_MANTICORE)?;

        Ok(Self { dir })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Arguments of every fake mythril invocation so far, one line per run.
    pub fn mythril_invocations(&self) -> Vec<String> {
        fs::read_to_string(self.path("mythril.args"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Pid of the `sleep` the slow echidna fake left in the background.
    pub fn echidna_helper_pid(&self) -> Option<u32> {
        fs::read_to_string(self.path("echidna.pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Tool configuration pointing every built-in tool at its fake.
    pub fn overrides(&self) -> BTreeMap<String, ToolOverride> {
        let command = |name: &str| Some(vec![self.path(name).to_string_lossy().into_owned()]);

        let mut overrides = BTreeMap::new();
        overrides.insert(
            SLITHER.to_string(),
            ToolOverride {
                command: command("slither"),
                ..Default::default()
            },
        );
        overrides.insert(
            MYTHRIL.to_string(),
            ToolOverride {
                command: command("myth"),
                ..Default::default()
            },
        );
        overrides.insert(
            ECHIDNA.to_string(),
            ToolOverride {
                command: command("echidna"),
                timeout: Some(Duration::from_secs(SLOW_TOOL_TIMEOUT_SECS)),
                enabled: None,
            },
        );
        overrides.insert(
            MAIAN.to_string(),
            ToolOverride {
                command: command("maian"),
                ..Default::default()
            },
        );
        overrides.insert(
            MANTICORE.to_string(),
            ToolOverride {
                command: command("manticore"),
                ..Default::default()
            },
        );
        overrides
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> std::io::Result<()> {
    let path = dir.join(name);
    fs::write(&path, body)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
}

/// True while `pid` exists and is not a zombie.
pub fn process_is_running(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}
