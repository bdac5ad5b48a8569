//! Shared test helpers for CLI integration tests.
//!
//! The external tools (objcopy, xxd and the outer build tool) are replaced
//! by `/bin/sh` scripts inside each test's temporary directory and handed
//! to the binary through the `FWSTITCH_*` environment overrides.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const CONFIG: &str = r#"
[host]
env = "avr_host"

[child]
env = "mcs51"
"#;

/// Compiles an environment by writing its hex image; uploads succeed.
/// The child's "hex" holds DE AD BE EF, which the fake objcopy copies.
pub const BUILD_TOOL: &str = r#"case "$*" in *upload*) exit 0 ;; esac
dir="$(dirname "$0")/build/$3"
mkdir -p "$dir"
if [ "$3" = "mcs51" ]; then printf '\336\255\276\357' > "$dir/firmware.hex"; else echo ':00000001FF' > "$dir/firmware.hex"; fi"#;

const OBJCOPY: &str = r#"[ "$1" = "-I" ] && [ "$2" = "ihex" ] && [ "$3" = "-O" ] && [ "$4" = "binary" ] || exit 64
cp "$5" "$6""#;

const XXD: &str = r#"[ "$1" = "-i" ] && [ "$2" = "-n" ] || exit 64
name="$3"
file="$4"
len=$(wc -c < "$file" | tr -d ' ')
echo "unsigned char ${name}[] = {"
od -An -v -tx1 "$file" | tr -s ' \n' '\n\n' | grep -v '^$' | sed 's/^/0x/' | paste -sd, - | sed 's/,/, /g; s/^/  /'
echo "};"
echo "unsigned int ${name}_len = ${len};""#;

/// Isolated project directory with a config file and fake tools.
pub struct TestEnv {
  pub temp: TempDir,
  pub root: PathBuf,
}

impl TestEnv {
  /// Project using `build_body` as the outer build tool.
  pub fn new(build_body: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let root = canonical_root(temp.path());
    std::fs::write(root.join("fwstitch.toml"), format!("build_root = \"build\"\n{}", CONFIG)).unwrap();

    let env = Self { temp, root };
    env.tool("pio", &format!("echo \"$*\" >> \"$(dirname \"$0\")/calls.log\"\n{}", build_body));
    env.tool("objcopy", OBJCOPY);
    env.tool("xxd", XXD);
    env
  }

  /// Project whose build tool compiles and uploads successfully.
  pub fn working() -> Self {
    Self::new(BUILD_TOOL)
  }

  /// Write an executable script into the project root.
  pub fn tool(&self, name: &str, body: &str) -> PathBuf {
    let path = self.root.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nset -e\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  /// Command running in the project root with the fake tools wired in.
  pub fn fwstitch_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("fwstitch");
    cmd
      .current_dir(&self.root)
      .env_remove("FWSTITCH_CONFIG")
      .env_remove("RUST_LOG")
      .env("FWSTITCH_BUILD_TOOL", self.root.join("pio"))
      .env("FWSTITCH_OBJCOPY", self.root.join("objcopy"))
      .env("FWSTITCH_XXD", self.root.join("xxd"));
    cmd
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root.join(relative)
  }

  /// Arguments the build tool was called with, one line per call.
  pub fn calls(&self) -> Vec<String> {
    std::fs::read_to_string(self.root.join("calls.log"))
      .unwrap_or_default()
      .lines()
      .map(str::to_string)
      .collect()
  }
}

fn canonical_root(path: &Path) -> PathBuf {
  std::fs::canonicalize(path).unwrap()
}
