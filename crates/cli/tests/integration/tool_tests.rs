//! Single-step command integration tests: convert, embed, bridge, info.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn convert_writes_binary() {
  let env = TestEnv::working();
  std::fs::write(env.path("in.hex"), [1u8, 2, 3]).unwrap();

  env
    .fwstitch_cmd()
    .args(["convert", "in.hex", "out.bin"])
    .assert()
    .success()
    .stdout(predicate::str::contains("out.bin"));

  assert_eq!(std::fs::read(env.path("out.bin")).unwrap(), vec![1u8, 2, 3]);
}

#[test]
fn convert_missing_input_fails() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .args(["convert", "nope.hex", "out.bin"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("hex input not found"));

  assert!(!env.path("out.bin").exists());
}

#[test]
fn convert_works_without_config() {
  let env = TestEnv::working();
  std::fs::remove_file(env.path("fwstitch.toml")).unwrap();
  std::fs::write(env.path("in.hex"), [9u8]).unwrap();

  env.fwstitch_cmd().args(["convert", "in.hex", "out.bin"]).assert().success();

  assert_eq!(std::fs::read(env.path("out.bin")).unwrap(), vec![9u8]);
}

#[test]
fn embed_with_mcs51_arch() {
  let env = TestEnv::working();
  std::fs::write(env.path("my-blob.v2.bin"), [0xDEu8, 0xAD, 0xBE, 0xEF]).unwrap();

  env
    .fwstitch_cmd()
    .args(["embed", "my-blob.v2.bin", "--out-dir", "gen", "--arch", "mcs51"])
    .assert()
    .success()
    .stdout(predicate::str::contains("my_blob_v2"));

  let fragment = std::fs::read_to_string(env.path("gen/my-blob.v2.c")).unwrap();
  assert!(fragment.contains("const uint8_t __code my_blob_v2[] = {"));
  assert!(fragment.contains("const uint16_t my_blob_v2_len = 4;"));
  assert!(!fragment.contains("pgmspace"));
}

#[test]
fn embed_defaults_to_host_generated_dir() {
  let env = TestEnv::working();
  std::fs::write(env.path("firmware.bin"), [1u8, 2]).unwrap();

  env.fwstitch_cmd().args(["embed", "firmware.bin"]).assert().success();

  let fragment = std::fs::read_to_string(env.path("build/avr_host/xxd_gen/firmware.c")).unwrap();
  assert!(fragment.contains("PROGMEM"));
}

#[test]
fn bridge_reports_copy_then_fresh() {
  let env = TestEnv::working();
  env.fwstitch_cmd().args(["build", "child"]).assert().success();

  env
    .fwstitch_cmd()
    .arg("bridge")
    .assert()
    .success()
    .stdout(predicate::str::contains("Copied child firmware"));

  env
    .fwstitch_cmd()
    .arg("bridge")
    .assert()
    .success()
    .stdout(predicate::str::contains("already current"));
}

#[test]
fn bridge_without_child_is_not_an_error() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .arg("bridge")
    .assert()
    .success()
    .stderr(predicate::str::contains("Child firmware not found"));
}

#[test]
fn info_lists_artifacts() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .arg("info")
    .assert()
    .success()
    .stdout(predicate::str::contains("avr_host"))
    .stdout(predicate::str::contains("child hex [absent]"));

  env.fwstitch_cmd().args(["build", "all"]).assert().success();

  env
    .fwstitch_cmd()
    .arg("info")
    .assert()
    .success()
    .stdout(predicate::str::contains("generated source [present]"));
}

#[test]
fn info_names_generated_sources_directory() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .arg("info")
    .assert()
    .success()
    .stdout(predicate::str::contains("Generated sources"))
    .stdout(predicate::str::contains("avr_host/xxd_gen (include in the avr_host source filter)"));
}
