//! Build command integration tests.

use predicates::prelude::*;

use super::common::{BUILD_TOOL, TestEnv};

#[test]
fn build_all_embeds_child_firmware() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .args(["build", "all"])
    .assert()
    .success()
    .stdout(predicate::str::contains("build(host)"))
    .stdout(predicate::str::contains("Embedded"));

  let fragment = std::fs::read_to_string(env.path("build/avr_host/xxd_gen/firmware.c")).unwrap();
  assert!(fragment.starts_with("#include <stdint.h>\n#include <avr/pgmspace.h>\n"));
  assert!(fragment.contains("const uint8_t firmware[] PROGMEM = {"));
  assert!(fragment.contains("0xde, 0xad, 0xbe, 0xef"));
  assert!(fragment.contains("const uint16_t firmware_len = 4;"));
  assert!(!fragment.contains("unsigned char "));

  assert_eq!(
    env.calls(),
    vec!["run -e mcs51 --disable-auto-clean", "run -e avr_host --disable-auto-clean"]
  );
}

#[test]
fn build_defaults_to_all() {
  let env = TestEnv::working();

  env.fwstitch_cmd().arg("build").assert().success();

  assert_eq!(env.calls().len(), 2);
  assert!(env.path("build/avr_host/xxd_gen/firmware.c").is_file());
}

#[test]
fn build_child_converts_hex_image() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .args(["build", "child"])
    .assert()
    .success()
    .stdout(predicate::str::contains("bin(child)"));

  assert_eq!(
    std::fs::read(env.path("build/mcs51/firmware.bin")).unwrap(),
    vec![0xDE, 0xAD, 0xBE, 0xEF]
  );
  assert!(!env.path("build/avr_host").join("firmware.hex").exists());
}

#[test]
fn build_host_without_child_warns_and_continues() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .args(["build", "host"])
    .assert()
    .success()
    .stderr(predicate::str::contains("child firmware not found"));

  assert!(!env.path("build/avr_host/xxd_gen/firmware.bin").exists());
  assert!(!env.path("build/avr_host/xxd_gen/firmware.c").exists());
  assert_eq!(env.calls(), vec!["run -e avr_host --disable-auto-clean"]);
}

#[test]
fn build_host_after_child_uses_its_binary() {
  let env = TestEnv::working();

  env.fwstitch_cmd().args(["build", "child"]).assert().success();
  env.fwstitch_cmd().args(["build", "host"]).assert().success();

  assert_eq!(
    std::fs::read(env.path("build/avr_host/xxd_gen/firmware.bin")).unwrap(),
    vec![0xDE, 0xAD, 0xBE, 0xEF]
  );
  assert!(env.path("build/avr_host/xxd_gen/firmware.c").is_file());
}

#[test]
fn build_with_link_strategy_creates_symlink() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .args(["--strategy", "link", "build", "all"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Linked child firmware"));

  let bridged = env.path("build/avr_host/xxd_gen/firmware.bin");
  assert!(std::fs::symlink_metadata(&bridged).unwrap().file_type().is_symlink());
}

#[test]
fn build_json_report() {
  let env = TestEnv::working();

  let output = env
    .fwstitch_cmd()
    .args(["--output", "json", "build", "all"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["goal"], "build_all");
  assert_eq!(report["completed"].as_array().unwrap().len(), 5);
  assert_eq!(report["blobs"][0]["identifier"], "firmware");
  assert_eq!(report["blobs"][0]["len"], 4);
  assert_eq!(report["bridged"]["outcome"]["outcome"], "copied");
}

#[test]
fn failed_compile_fails_build() {
  let env = TestEnv::new("echo 'compiler exploded' >&2\nexit 2");

  env
    .fwstitch_cmd()
    .args(["build", "all"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build failed (tool invocation error)"));

  assert_eq!(env.calls().len(), 1);
}

#[test]
fn failed_conversion_leaves_no_binary() {
  let env = TestEnv::new(BUILD_TOOL);
  env.tool("objcopy", "printf 'partial' > \"$6\"\nexit 1");

  env.fwstitch_cmd().args(["build", "all"]).assert().failure();

  assert!(!env.path("build/mcs51/firmware.bin").exists());
  assert_eq!(env.calls(), vec!["run -e mcs51 --disable-auto-clean"]);
}
