use assert_cmd::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Write a program image (origin word first, big-endian) to a temp file.
fn write_image(name: &str, words: &[u16]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("braid-test-{name}-{}.obj", std::process::id()));
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
    fs::write(&path, bytes).unwrap();
    path
}

/// LEA R0, #2; PUTS; HALT; "ok\0"
const HELLO: &[u16] = &[
    0x3000, 0xE002, 0xF022, 0xF025, 0x006F, 0x006B, 0x0000,
];

#[test]
fn errors_without_arguments() {
    let output = Command::cargo_bin("braid").unwrap().output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn runs_image_to_halt() {
    let path = write_image("hello", HELLO);
    let output = Command::cargo_bin("braid")
        .unwrap()
        .arg(&path)
        .output()
        .unwrap();
    fs::remove_file(&path).unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ok"));
    assert!(stdout.contains("HALT"));
}

#[test]
fn later_images_overwrite_earlier_ones() {
    let base = write_image("base", HELLO);
    // Replace the string in-place
    let patch = write_image("patch", &[0x3003, 0x006E, 0x006F, 0x0000]);
    let output = Command::cargo_bin("braid")
        .unwrap()
        .arg(&base)
        .arg(&patch)
        .output()
        .unwrap();
    fs::remove_file(&base).unwrap();
    fs::remove_file(&patch).unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no"));
}

#[test]
fn reports_missing_image_file() {
    let output = Command::cargo_bin("braid")
        .unwrap()
        .arg("does-not-exist.obj")
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn kbsr_read_sees_empty_pipe_without_blocking() {
    // LDI R1, [0xFE00]; HALT - the status read must observe 0 and move on
    let path = write_image("kbsr", &[0x3000, 0xA201, 0xF025, 0xFE00]);
    let mut child = Command::cargo_bin("braid")
        .unwrap()
        .arg(&path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // The write end of the pipe stays open and empty for the whole run
    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            let _ = child.wait();
            fs::remove_file(&path).unwrap();
            panic!("machine blocked on a keyboard status read with an empty pipe");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    fs::remove_file(&path).unwrap();

    assert!(status.success());
}

#[test]
fn getc_at_end_of_input_reads_nul() {
    // GETC; OUT; HALT - with stdin closed, R0 receives NUL and OUT emits it
    let path = write_image("eof", &[0x3000, 0xF020, 0xF021, 0xF025]);
    let output = Command::cargo_bin("braid")
        .unwrap()
        .arg(&path)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    fs::remove_file(&path).unwrap();

    assert!(output.status.success());
    assert!(output.stdout.contains(&b'\0'));
}

#[test]
fn reserved_opcode_aborts_with_error() {
    // A single RTI word at the origin
    let path = write_image("rti", &[0x3000, 0x8000]);
    let output = Command::cargo_bin("braid")
        .unwrap()
        .arg(&path)
        .output()
        .unwrap();
    fs::remove_file(&path).unwrap();

    assert!(!output.status.success());
}
