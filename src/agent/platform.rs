//! Platform naming, home directory and resource directory resolution
//!
//! The agent is published per `<platform>-<architecture>` using Go's naming,
//! so the Rust target names are normalized before building file names and
//! download URLs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logger::Logger;

/// Base name of the agent binary and its archives
pub const AGENT_NAME: &str = "wakatime-cli";

/// Environment variable overriding the agent's home directory
pub const HOME_VAR: &str = "WAKATIME_HOME";

/// Directory under the home directory that holds the agent
pub const RESOURCE_DIR_NAME: &str = ".wakatime";

/// Platform/architecture pairs the agent is published for
pub const SUPPORTED_COMBINATIONS: &[&str] = &[
    "darwin-amd64",
    "darwin-arm64",
    "freebsd-386",
    "freebsd-amd64",
    "freebsd-arm",
    "linux-386",
    "linux-amd64",
    "linux-arm",
    "linux-arm64",
    "netbsd-386",
    "netbsd-amd64",
    "netbsd-arm",
    "openbsd-386",
    "openbsd-amd64",
    "openbsd-arm",
    "openbsd-arm64",
    "windows-386",
    "windows-amd64",
    "windows-arm64",
];

/// Normalized platform and architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: normalize_os(os),
            arch: normalize_arch(arch),
        }
    }

    /// Platform this binary was built for
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// `<os>-<arch>`, as used in release names
    pub fn combination(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_COMBINATIONS.contains(&self.combination().as_str())
    }

    /// Archive and binary name without extension, e.g. `wakatime-cli-linux-amd64`
    pub fn artifact_stem(&self) -> String {
        format!("{}-{}", AGENT_NAME, self.combination())
    }

    /// Binary file name, with `.exe` on Windows
    pub fn binary_name(&self) -> String {
        if self.is_windows() {
            format!("{}.exe", self.artifact_stem())
        } else {
            self.artifact_stem()
        }
    }

    /// Environment variable holding the user's home on this platform
    pub fn home_var(&self) -> &'static str {
        if self.is_windows() {
            "USERPROFILE"
        } else {
            "HOME"
        }
    }
}

/// `win32`/`windows` become `windows`, `macos` becomes `darwin`, anything else passes through
pub fn normalize_os(os: &str) -> String {
    match os {
        "win32" | "windows" => "windows".to_string(),
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

/// `*32*` and `x86` become `386`, `*x64*` and `x86_64` become `amd64`, `aarch64` becomes `arm64`
pub fn normalize_arch(arch: &str) -> String {
    if arch.contains("32") || arch == "x86" {
        "386".to_string()
    } else if arch.contains("x64") || arch == "x86_64" {
        "amd64".to_string()
    } else if arch == "aarch64" {
        "arm64".to_string()
    } else {
        arch.to_string()
    }
}

/// Resolve the agent home directory from an environment snapshot.
///
/// `WAKATIME_HOME` wins when it is non-blank and exists, then the platform
/// home variable, then `cwd`.
pub fn resolve_home_dir(env: &HashMap<String, String>, platform: &Platform, cwd: &Path) -> PathBuf {
    if let Some(home) = env.get(HOME_VAR) {
        let home = home.trim();
        if !home.is_empty() && Path::new(home).exists() {
            return PathBuf::from(home);
        }
    }

    match env.get(platform.home_var()) {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => cwd.to_path_buf(),
    }
}

/// Home directory from the live process environment
pub fn home_dir(platform: &Platform) -> PathBuf {
    let env: HashMap<String, String> = std::env::vars().collect();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_home_dir(&env, platform, &cwd)
}

/// Create the resource directory if needed; failures are logged, the path is returned either way
pub fn ensure_resource_dir(dir: &Path, logger: &dyn Logger) -> PathBuf {
    if let Err(e) = fs::create_dir_all(dir) {
        logger.error_with_cause(
            &format!("Failed to create resource directory {}", dir.display()),
            &e,
        );
    }
    dir.to_path_buf()
}

/// Copy of `ambient` with the agent home pinned when nothing tells the agent where home is.
///
/// Only on non-Windows platforms, and only when neither `WAKATIME_HOME` nor
/// `HOME` is set, so that the agent stores its state next to the binary the
/// installer placed.
pub fn build_invocation_environment(
    ambient: HashMap<String, String>,
    platform: &Platform,
    cwd: &Path,
) -> HashMap<String, String> {
    let mut env = ambient;
    if !platform.is_windows() && !env.contains_key(HOME_VAR) && !env.contains_key("HOME") {
        let home = resolve_home_dir(&env, platform, cwd);
        env.insert(HOME_VAR.to_string(), home.to_string_lossy().into_owned());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLogger;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_os() {
        assert_eq!(normalize_os("win32"), "windows");
        assert_eq!(normalize_os("windows"), "windows");
        assert_eq!(normalize_os("macos"), "darwin");
        assert_eq!(normalize_os("linux"), "linux");
        assert_eq!(normalize_os("freebsd"), "freebsd");
    }

    #[test]
    fn test_normalize_arch() {
        assert_eq!(normalize_arch("ia32"), "386");
        assert_eq!(normalize_arch("x86"), "386");
        assert_eq!(normalize_arch("x64"), "amd64");
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("arm"), "arm");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[test]
    fn test_binary_name() {
        assert_eq!(Platform::new("linux", "x86_64").binary_name(), "wakatime-cli-linux-amd64");
        assert_eq!(
            Platform::new("windows", "x86_64").binary_name(),
            "wakatime-cli-windows-amd64.exe"
        );
        assert_eq!(Platform::new("macos", "aarch64").binary_name(), "wakatime-cli-darwin-arm64");
    }

    #[test]
    fn test_supported_combinations() {
        assert!(Platform::new("linux", "x86_64").is_supported());
        assert!(Platform::new("macos", "aarch64").is_supported());
        assert!(!Platform::new("linux", "riscv64").is_supported());
        assert!(!Platform::new("darwin", "386").is_supported());
    }

    #[test]
    fn test_resolve_home_prefers_existing_override() {
        let dir = TempDir::new().unwrap();
        let override_dir = dir.path().to_str().unwrap();
        let linux = Platform::new("linux", "x86_64");
        let env = env(&[(HOME_VAR, &format!("  {}  ", override_dir)), ("HOME", "/home/me")]);

        assert_eq!(resolve_home_dir(&env, &linux, Path::new("/cwd")), dir.path());
    }

    #[test]
    fn test_resolve_home_skips_missing_override() {
        let linux = Platform::new("linux", "x86_64");
        let env = env(&[(HOME_VAR, "/definitely/not/here"), ("HOME", "/home/me")]);
        assert_eq!(
            resolve_home_dir(&env, &linux, Path::new("/cwd")),
            PathBuf::from("/home/me")
        );

        let blank = self::env(&[(HOME_VAR, "   ")]);
        assert_eq!(resolve_home_dir(&blank, &linux, Path::new("/cwd")), PathBuf::from("/cwd"));
    }

    #[test]
    fn test_resolve_home_windows_uses_userprofile() {
        let windows = Platform::new("windows", "x86_64");
        let env = env(&[("USERPROFILE", "C:\\Users\\me"), ("HOME", "/ignored")]);
        assert_eq!(
            resolve_home_dir(&env, &windows, Path::new("C:\\cwd")),
            PathBuf::from("C:\\Users\\me")
        );
    }

    #[test]
    fn test_invocation_environment_pins_home_when_missing() {
        let linux = Platform::new("linux", "x86_64");
        let pinned = build_invocation_environment(env(&[("PATH", "/usr/bin")]), &linux, Path::new("/work"));
        assert_eq!(pinned.get(HOME_VAR).map(String::as_str), Some("/work"));
        assert_eq!(pinned.get("PATH").map(String::as_str), Some("/usr/bin"));
    }

    #[test]
    fn test_invocation_environment_untouched_when_home_set() {
        let linux = Platform::new("linux", "x86_64");
        let ambient = env(&[("HOME", "/home/me")]);
        let out = build_invocation_environment(ambient.clone(), &linux, Path::new("/work"));
        assert_eq!(out, ambient);

        let ambient = env(&[(HOME_VAR, "/srv/waka")]);
        let out = build_invocation_environment(ambient.clone(), &linux, Path::new("/work"));
        assert_eq!(out, ambient);
    }

    #[test]
    fn test_invocation_environment_untouched_on_windows() {
        let windows = Platform::new("windows", "x86_64");
        let out = build_invocation_environment(HashMap::new(), &windows, Path::new("C:\\work"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_ensure_resource_dir_creates() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join(RESOURCE_DIR_NAME);
        let logger = MemoryLogger::new();

        let out = ensure_resource_dir(&target, logger.as_ref());
        assert_eq!(out, target);
        assert!(target.is_dir());
        assert!(logger.entries().is_empty());
    }
}
