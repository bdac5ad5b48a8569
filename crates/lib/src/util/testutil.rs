//! Test utilities for fwstitch-lib.
//!
//! External tools are replaced in tests by small `/bin/sh` scripts, so
//! nothing here needs a real `objcopy`, `xxd` or `pio` on the machine.

use std::path::{Path, PathBuf};

/// Write an executable shell script named `name` into `dir`.
///
/// `body` is placed after a `#!/bin/sh` line and `set -e`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\nset -e\n{}\n", body)).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// A converter that behaves like `objcopy -I ihex -O binary <src> <dst>`
/// by copying `<src>` to `<dst>` verbatim.
#[cfg(unix)]
pub fn fake_objcopy(dir: &Path) -> PathBuf {
  fake_tool(
    dir,
    "objcopy",
    r#"[ "$1" = "-I" ] && [ "$2" = "ihex" ] && [ "$3" = "-O" ] && [ "$4" = "binary" ] || exit 64
cp "$5" "$6""#,
  )
}

/// A converter that writes half a file and then fails.
#[cfg(unix)]
pub fn failing_objcopy(dir: &Path) -> PathBuf {
  fake_tool(dir, "objcopy-fail", "printf 'partial' > \"$6\"\necho 'objcopy: corrupt hex' >&2\nexit 1")
}

/// A dump tool that prints the same layout as `xxd -i -n <name> <file>`.
#[cfg(unix)]
pub fn fake_xxd(dir: &Path) -> PathBuf {
  fake_tool(
    dir,
    "xxd",
    r#"[ "$1" = "-i" ] && [ "$2" = "-n" ] || exit 64
name="$3"
file="$4"
len=$(wc -c < "$file" | tr -d ' ')
echo "unsigned char ${name}[] = {"
od -An -v -tx1 "$file" | tr -s ' \n' '\n\n' | grep -v '^$' | sed 's/^/0x/' | paste -sd, - | sed 's/,/, /g; s/^/  /'
echo "};"
echo "unsigned int ${name}_len = ${len};""#,
  )
}

/// An outer build tool that appends its arguments to `<dir>/calls.log`.
#[cfg(unix)]
pub fn recording_build_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
  let log = dir.join("calls.log");
  fake_tool(dir, name, &format!("echo \"$*\" >> '{}'\n{}", log.display(), body))
}

/// Lines recorded by `recording_build_tool`.
pub fn recorded_calls(dir: &Path) -> Vec<String> {
  std::fs::read_to_string(dir.join("calls.log"))
    .unwrap_or_default()
    .lines()
    .map(str::to_string)
    .collect()
}
