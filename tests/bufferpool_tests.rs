use lstore_engine::buffer_pool::{BufferPool, PageKey};
use lstore_engine::logical_page::PageKind;

#[test]
fn test_simple_write() {
    let bp = BufferPool::new(4);
    let key = PageKey::new("test_tbl", PageKind::Base, 0, 0);

    let slot = bp.write(&key, 42, None).unwrap();
    let val_read = bp.read(&key, slot).unwrap();

    assert_eq!(val_read, 42);
}

#[test]
fn test_overwrite_same_slot() {
    let bp = BufferPool::new(4);
    let key = PageKey::new("test_tbl", PageKind::Base, 0, 0);

    let slot = bp.write(&key, 1, None).unwrap();
    bp.write(&key, 2, Some(slot)).unwrap();

    assert_eq!(bp.read(&key, slot).unwrap(), 2);
}

#[test]
fn test_eviction_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let bp = BufferPool::new(1);
    bp.set_root(dir.path().to_path_buf());

    let k1 = PageKey::new("test_tbl", PageKind::Base, 0, 0);
    let k2 = PageKey::new("test_tbl", PageKind::Base, 1, 0);

    bp.write(&k1, 100, None).unwrap();
    bp.write(&k2, 200, None).unwrap(); // forces k1 out of the cache

    // k1 must still be readable: either still resident or reloaded from disk.
    assert_eq!(bp.read(&k1, 0).unwrap(), 100);
    assert_eq!(bp.read(&k2, 0).unwrap(), 200);
}
