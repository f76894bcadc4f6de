//! Directory-backed cache store behaviour.

use std::fs;
use std::io;
use std::sync::Arc;

use heron_bytecode::{
    CacheStore, Constant, ConstantIndex, Instruction, Program, SourceFile, StoreError,
    write_program,
};
use tempfile::TempDir;

fn compile(source: Arc<SourceFile>) -> Result<Program, io::Error> {
    Ok(Program::builder(source)
        .name("main")
        .constant(Constant::Int(2))
        .instruction(Instruction::LoadVal {
            idx: ConstantIndex(0),
        })
        .instruction(Instruction::Ret)
        .build())
}

fn source() -> Arc<SourceFile> {
    Arc::new(SourceFile::new("test.js", "1+1"))
}

#[test]
fn test_miss_then_hit() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path().join("cache"), 1);

    assert_eq!(store.load(&source()).unwrap(), None);

    let program = compile(source()).unwrap();
    let path = store.store(&program).unwrap();
    assert!(path.exists());
    assert_eq!(path, store.path_for(&source()));

    let loaded = store.load(&source()).unwrap();
    assert_eq!(loaded, Some(program));
}

#[test]
fn test_no_temp_files_left_behind() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path(), 1);
    store.store(&compile(source()).unwrap()).unwrap();

    let entries: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].ends_with(".hbc"));
}

#[test]
fn test_edited_source_misses() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path(), 1);
    store.store(&compile(source()).unwrap()).unwrap();

    let edited = SourceFile::new("test.js", "1+2");
    assert_eq!(store.load(&edited).unwrap(), None);
}

#[test]
fn test_other_version_is_discarded() {
    let dir = TempDir::new().unwrap();
    CacheStore::new(dir.path(), 1)
        .store(&compile(source()).unwrap())
        .unwrap();

    let store = CacheStore::new(dir.path(), 2);
    let path = store.path_for(&source());
    assert!(path.exists());
    assert_eq!(store.load(&source()).unwrap(), None);
    assert!(!path.exists(), "stale entry should be removed");
}

#[test]
fn test_truncated_entry_is_discarded() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path(), 1);
    let bytes = write_program(&compile(source()).unwrap(), 1);
    let path = store.path_for(&source());
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    assert_eq!(store.load(&source()).unwrap(), None);
    assert!(!path.exists());
}

#[test]
fn test_entry_for_other_source_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path(), 1);

    // plant a valid entry for a different source under our key
    let other = compile(Arc::new(SourceFile::new("other.js", "3"))).unwrap();
    let path = store.path_for(&source());
    fs::write(&path, write_program(&other, 1)).unwrap();

    assert_eq!(store.load(&source()).unwrap(), None);
    assert!(path.exists());
}

#[test]
fn test_load_or_compile() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path(), 1);

    let first = store.load_or_compile(source(), compile).unwrap();
    assert!(store.path_for(&source()).exists());

    let second = store
        .load_or_compile(source(), |_| -> Result<Program, io::Error> {
            panic!("cached program should be used")
        })
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_compile_error_propagates() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path(), 1);

    let err = store
        .load_or_compile(source(), |_| {
            Err::<Program, _>(io::Error::new(io::ErrorKind::InvalidData, "syntax error"))
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Compile(_)));
    assert!(err.to_string().contains("syntax error"));
}
