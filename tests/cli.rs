use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("clip-captioner").unwrap();
    cmd.env("CLIP_FFMPEG", "/nonexistent/bin/ffmpeg")
        .env("CLIP_FFPROBE", "/nonexistent/bin/ffprobe")
        .env_remove("OPENAI_API_KEY");
    cmd
}

#[test]
fn test_help_lists_operations() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clip"))
        .stdout(predicate::str::contains("supercut"))
        .stdout(predicate::str::contains("burn"));
}

#[test]
fn test_custom_format_requires_ratio() {
    cli()
        .args(["clip", "--input", "missing.mp4", "--start", "0", "--end", "2", "--format", "custom"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a ratio"));
}

#[test]
fn test_missing_input_is_reported() {
    cli()
        .args(["clip", "--input", "/no/such/file.mp4", "--start", "0", "--end", "2", "--format", "short"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_supercut_rejects_backwards_segment() {
    cli()
        .args(["supercut", "--input", "/no/such/file.mp4", "--segments", "[[5, 2]]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be before end"));
}

#[test]
fn test_unknown_renderer() {
    cli()
        .args(["clip", "--input", "x.mp4", "--start", "0", "--end", "1", "--renderer", "opengl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown renderer"));
}
