use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn contents(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

fn run_with_stdin(bin: &str, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(bin)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let pipe = child.stdin.as_mut().unwrap();
        pipe.write_all(stdin.as_bytes()).unwrap();
    }
    child.wait_with_output().unwrap()
}

#[test]
fn cmdblock_creates_file_from_document() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out/hello.txt");
    let doc = dir.path().join("doc.txt");
    fs::write(&doc, format!(":create {}\n$content<H\nhello\nH\n", target.display())).unwrap();

    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let out = Command::new(bin).arg(&doc).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, format!("1: created {}\n", target.display()));
    assert_eq!(contents(&target), "hello");
}

#[test]
fn cmdblock_reads_stdin_and_resolves_against_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("f.txt"), "fn main() {\n    old();\n}\n").unwrap();

    let doc = "I changed the call for you:\n\
               :modify f.txt\n\
               $search<S\n    old();\nS\n\
               $replace<R\n    new();\nR\n";
    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let dir_arg = dir.path().to_str().unwrap();
    let out = run_with_stdin(bin, &["-C", dir_arg], doc);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(contents(&dir.path().join("f.txt")), "fn main() {\n    new();\n}\n");
}

#[test]
fn cmdblock_dry_run_does_not_write() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f.txt");
    fs::write(&file, "foo\nbar\n").unwrap();
    let doc = dir.path().join("doc.txt");
    fs::write(
        &doc,
        format!(":edit {}\n$action change\n$search foo\n$content baz\n", file.display()),
    )
    .unwrap();

    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let out = Command::new(bin)
        .arg("--dry-run")
        .arg(&doc)
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("edit:change"));
    assert_eq!(contents(&file), "foo\nbar\n");
}

#[test]
fn cmdblock_rejects_stale_search_and_leaves_files_unchanged() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "hello\n").unwrap();
    fs::write(&b, "HELLO\n").unwrap();
    let doc = dir.path().join("doc.txt");
    fs::write(
        &doc,
        format!(
            ":modify {}\n$search hello\n$replace bye\n\n:modify {}\n$search hello\n$replace bye\n",
            a.display(),
            b.display()
        ),
    )
    .unwrap();

    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let out = Command::new(bin).arg(&doc).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("search string not found"));

    // Verification runs for the whole batch before anything is applied.
    assert_eq!(contents(&a), "hello\n");
    assert_eq!(contents(&b), "HELLO\n");
}

#[test]
fn cmdblock_strict_rejects_stray_lines() {
    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("doc.txt");
    fs::write(&doc, "Sure, here you go!\n:delete nothing.txt\n").unwrap();

    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let out = Command::new(bin).arg("--strict").arg(&doc).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("line 1"));
}

#[cfg(unix)]
#[test]
fn cmdblock_exec_asks_before_running() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran.txt");
    let doc = dir.path().join("doc.txt");
    fs::write(&doc, format!(":exec touch {}\n", marker.display())).unwrap();

    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let doc_arg = doc.to_str().unwrap();

    let out = run_with_stdin(bin, &[doc_arg], "n\n");
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout).unwrap().contains("skipped"));
    assert!(!marker.exists());

    let out = run_with_stdin(bin, &[doc_arg], "y\n");
    assert!(out.status.success());
    assert!(marker.exists());
}

#[cfg(unix)]
#[test]
fn cmdblock_exec_from_stdin_needs_yes() {
    let dir = TempDir::new().unwrap();
    let created = dir.path().join("first.txt");
    let marker = dir.path().join("ran.txt");
    let doc = format!(
        ":create {}\n$content x\n\n:exec touch {}\n",
        created.display(),
        marker.display()
    );

    let bin = env!("CARGO_BIN_EXE_cmdblock");
    let out = run_with_stdin(bin, &[], &doc);
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("-y"), "{stderr}");
    assert!(!created.exists());
    assert!(!marker.exists());

    let out = run_with_stdin(bin, &["-y"], &doc);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(created.exists());
    assert!(marker.exists());
}

#[test]
fn cmdblockview_prints_json_lines() {
    let bin = env!("CARGO_BIN_EXE_cmdblockview");
    let doc = ":edit f.txt\n$action change\n$search a\n$content b\n$action delete\n$search c\n";
    let out = run_with_stdin(bin, &[], doc);
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["name"], "edit");
    assert_eq!(values[0]["payload"], "f.txt");
    assert_eq!(values[0]["params"][2]["payload"], "b");
    assert_eq!(values[1]["params"][0]["payload"], "delete");
    assert_eq!(values[1]["line_no"], 1);
}

#[test]
fn cmdblockview_reports_unclosed_heredoc() {
    let bin = env!("CARGO_BIN_EXE_cmdblockview");
    let out = run_with_stdin(bin, &[], ":create a\n$content<END\nnever closed\n");
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("END"));
}
