use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;
use universal::opcode::Instruction;
use universal::region::Image;
use universal::registers::RegisterId;
use universal::Word;

fn r(i: u32) -> RegisterId {
  RegisterId::from_bits(i)
}

fn lv(a: u32, value: Word) -> Instruction {
  Instruction::LoadValue { a: r(a), value }
}

fn write_image(dir: &TempDir, program: &[Instruction]) -> std::path::PathBuf {
  let words: Vec<Word> = program.iter().map(|i| i.encode().unwrap()).collect();
  let path = dir.path().join("program.um");
  std::fs::write(&path, Image::from(words).to_bytes()).unwrap();
  path
}

fn um(path: &Path, args: &[&str], stdin: &[u8]) -> Output {
  let mut child = Command::new(env!("CARGO_BIN_EXE_um"))
    .args(args)
    .arg(path)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .unwrap();
  child.stdin.take().unwrap().write_all(stdin).unwrap();
  child.wait_with_output().unwrap()
}

#[test]
fn prints_one_byte_then_runs_off_the_end() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(&dir, &[lv(0, 72), Instruction::Output { c: r(0) }]);
  let output = um(&path, &[], b"");
  assert!(output.status.success());
  assert_eq!(output.stdout, vec![0x48]);
}

#[test]
fn halt_first() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(&dir, &[Instruction::Halt, lv(0, 72), Instruction::Output { c: r(0) }]);
  let output = um(&path, &[], b"");
  assert_eq!(output.status.code(), Some(0));
  assert!(output.stdout.is_empty());
}

#[test]
fn echoes_input_until_exhausted() {
  let program = [
    Instruction::Input { c: r(1) },
    // r2 is zero only when r1 holds the end-of-input marker
    Instruction::Nand { a: r(2), b: r(1), c: r(1) },
    lv(3, 7),
    lv(4, 9),
    Instruction::ConditionalMove { a: r(4), b: r(3), c: r(2) },
    lv(0, 0),
    Instruction::LoadProgram { b: r(0), c: r(4) },
    Instruction::Output { c: r(1) },
    Instruction::LoadProgram { b: r(0), c: r(0) },
    Instruction::Halt,
  ];
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(&dir, &program);
  let output = um(&path, &[], b"hello");
  assert!(output.status.success());
  assert_eq!(output.stdout, b"hello");
}

#[test]
fn divide_by_zero_exits_nonzero() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(
    &dir,
    &[
      lv(0, b'x'.into()),
      Instruction::Output { c: r(0) },
      Instruction::Divide { a: r(1), b: r(0), c: r(2) },
      Instruction::Output { c: r(0) },
    ],
  );
  let output = um(&path, &[], b"");
  assert!(!output.status.success());
  // output written before the fault still reaches stdout
  assert_eq!(output.stdout, b"x");
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("division by zero"), "stderr: {stderr}");
}

#[test]
fn missing_argument() {
  let output = Command::new(env!("CARGO_BIN_EXE_um")).output().unwrap();
  assert!(!output.status.success());
  assert!(!output.stderr.is_empty());
}

#[test]
fn missing_file() {
  let dir = tempfile::tempdir().unwrap();
  let output = um(&dir.path().join("absent.um"), &[], b"");
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("absent.um"), "stderr: {stderr}");
}

#[test]
fn misaligned_image_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("short.um");
  std::fs::write(&path, [0x70, 0x00, 0x00]).unwrap();
  let output = um(&path, &[], b"");
  assert!(!output.status.success());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("not a multiple of 4"), "stderr: {stderr}");
}

#[test]
fn disassembles() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(&dir, &[lv(0, 72), Instruction::Output { c: r(0) }, Instruction::Halt]);
  let output = um(&path, &["--disassemble"], b"");
  assert!(output.status.success());
  let listing = String::from_utf8(output.stdout).unwrap();
  assert!(listing.contains("loadv r0, 0x48"));
  assert!(listing.contains("out r0"));
  assert!(listing.contains("halt"));
}
