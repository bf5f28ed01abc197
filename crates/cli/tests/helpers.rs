use std::fs;
use std::path::Path;

use recomp_correlate::{canonicalize_or_current, infer_project_name, parse_address, sha256_file};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");

    let result = canonicalize_or_current(subdir.to_str().expect("utf8 path")).expect("canonicalize");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path_onto_cwd() {
    let cwd = std::env::current_dir().expect("cwd");
    let result = canonicalize_or_current("does-not-exist-yet").expect("resolve");
    assert_eq!(result, cwd.join("does-not-exist-yet"));
}

#[test]
fn infer_project_name_uses_last_path_component() {
    assert_eq!(infer_project_name(Path::new("C:/work/lego-island")), "lego-island");
    assert_eq!(infer_project_name(Path::new("/tmp/project-root")), "project-root");
}

#[test]
fn infer_project_name_falls_back_when_missing() {
    assert_eq!(infer_project_name(Path::new("/")), "unnamed-project");
}

#[test]
fn addresses_parse_as_hex_or_decimal() {
    assert_eq!(parse_address("0x1000").unwrap(), 0x1000);
    assert_eq!(parse_address("0XfF").unwrap(), 0xff);
    assert_eq!(parse_address("4096").unwrap(), 4096);
    assert_eq!(parse_address(" 16 ").unwrap(), 16);
    assert!(parse_address("0x").is_err());
    assert!(parse_address("12ab").is_err());
    assert!(parse_address("-1").is_err());
}

#[test]
fn sha256_file_hashes_contents() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("input.txt");
    fs::write(&path, b"abc").expect("write");
    assert_eq!(
        sha256_file(&path).expect("hash"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(sha256_file(&tmp.path().join("absent")).is_err());
}
