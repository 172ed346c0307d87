//! Common test utilities and fixtures
//!
//! Every command runs inside its own temporary directory with `HOME`,
//! the config search paths and the agent resource directory pointed into
//! it, so tests never see the developer's real configuration or agent.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// A credential with the canonical v4 shape
pub const VALID_KEY: &str = "12345678-1234-4123-8123-123456789012";

/// Variables that would leak the developer's setup into a test
const ISOLATED_VARS: &[&str] = &[
    "NOTES_WAKATIME_CONFIG",
    "NOTES_WAKATIME_API_KEY",
    "NOTES_WAKATIME_ANALYTICS",
    "NOTES_WAKATIME_HOST_APP",
    "NOTES_WAKATIME_HOST_VERSION",
    "NOTES_WAKATIME_IDLE_REFRESH_MS",
    "NOTES_WAKATIME_DEDUPE_WINDOW_MS",
    "NOTES_WAKATIME_RELEASES_URL",
    "NOTES_WAKATIME_DOWNLOAD_PREFIX",
    "NOTES_WAKATIME_LOG_LEVEL",
    "NOTES_WAKATIME_LOG_FILE",
    "NOTES_WAKATIME_LOG_JSON",
    "NOTES_WAKATIME_ENV",
    "WAKATIME_HOME",
    "RUST_LOG",
];

pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self {
            dir: TempDir::new().unwrap(),
        };
        fs::create_dir_all(env.resource_dir()).unwrap();
        env
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the agent is looked for and installed
    pub fn resource_dir(&self) -> PathBuf {
        self.path().join("agent")
    }

    /// Agent binary path for the platform running the tests
    pub fn agent_binary(&self) -> PathBuf {
        self.resource_dir().join(agent_binary_name())
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_config(&self, content: &str) -> PathBuf {
        self.write("config.toml", content)
    }

    /// Install a shell script as the agent; it appends its arguments to `calls.log`
    #[cfg(unix)]
    pub fn install_fake_agent(&self, exit_code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let calls = self.path().join("calls.log");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> \"{}\"\nexit {}\n",
            calls.display(),
            exit_code
        );
        let binary = self.agent_binary();
        fs::write(&binary, script).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        calls
    }

    /// Lines the fake agent recorded, one per invocation
    pub fn agent_calls(&self) -> Vec<String> {
        match fs::read_to_string(self.path().join("calls.log")) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The binary under test, isolated into this environment
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("notes-wakatime").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("NOTES_WAKATIME_RESOURCE_DIR", self.resource_dir())
            .env("NOTES_WAKATIME_AUTO_INSTALL", "false");
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd
    }
}

/// `wakatime-cli-<os>-<arch>[.exe]` for the platform running the tests
pub fn agent_binary_name() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    };
    let name = format!("wakatime-cli-{}-{}", os, arch);
    if os == "windows" {
        format!("{}.exe", name)
    } else {
        name
    }
}

/// Host messages as JSON lines
pub fn event_lines(messages: &[&str]) -> String {
    let mut out = messages.join("\n");
    out.push('\n');
    out
}
