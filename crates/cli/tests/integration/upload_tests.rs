//! Upload command integration tests.

use predicates::prelude::*;

use super::common::{BUILD_TOOL, TestEnv};

#[test]
fn upload_flashes_host_before_child() {
  let env = TestEnv::working();

  env
    .fwstitch_cmd()
    .arg("upload")
    .assert()
    .success()
    .stdout(predicate::str::contains("upload(child)"));

  assert_eq!(
    env.calls(),
    vec![
      "run -e mcs51 --disable-auto-clean",
      "run -e avr_host --disable-auto-clean",
      "run -e avr_host -t upload --disable-auto-clean",
      "run -e mcs51 -t upload --disable-auto-clean",
    ]
  );
}

#[test]
fn failed_child_upload_reports_inconsistent_state() {
  let env = TestEnv::new(&format!("case \"$*\" in *mcs51*upload*) exit 1 ;; esac\n{}", BUILD_TOOL));

  env
    .fwstitch_cmd()
    .arg("upload")
    .assert()
    .failure()
    .stderr(predicate::str::contains("avr_host is flashed but mcs51 is not"))
    .stderr(predicate::str::contains("upload sequence error"));

  assert_eq!(env.calls().last().unwrap(), "run -e mcs51 -t upload --disable-auto-clean");
}

#[test]
fn failed_host_upload_skips_child_upload() {
  let env = TestEnv::new(&format!("case \"$*\" in *avr_host*upload*) exit 1 ;; esac\n{}", BUILD_TOOL));

  env
    .fwstitch_cmd()
    .arg("upload")
    .assert()
    .failure()
    .stderr(predicate::str::contains("host upload failed"));

  assert!(!env.calls().iter().any(|c| c.starts_with("run -e mcs51 -t upload")));
}

#[test]
fn upload_without_child_image_flashes_nothing() {
  let env = TestEnv::new(&format!("[ \"$3\" = \"mcs51\" ] && exit 0\n{}", BUILD_TOOL));

  env.fwstitch_cmd().arg("upload").assert().failure();

  assert!(env.calls().iter().all(|c| !c.contains("upload")));
}
