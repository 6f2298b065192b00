mod common;

use common::TestDir;
use mmstore::storage::{ARRAY_SUFFIX, BLOCK_LIST_SUFFIX, STRTABLE_SUFFIX, backing_path};
use mmstore::{BlockList, DiskArray, StrTable};

#[test]
fn test_block_list_survives_reopen() {
    let dir = TestDir::new();
    let base = dir.base("log");

    let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![b'a' + i; 1 + i as usize * 7]).collect();
    let mut list = BlockList::open(&base, 4096).expect("create failed");
    for payload in &payloads {
        list.append(payload).unwrap().expect("block should fit");
    }
    list.close().unwrap();

    let mut list = BlockList::open(&base, 0).expect("reopen failed");
    let forward: Vec<Vec<u8>> = list.iter().map(|b| b.unwrap().to_vec()).collect();
    assert_eq!(forward, payloads);

    let mut backward: Vec<Vec<u8>> = list.iter_rev().unwrap().map(|b| b.unwrap().to_vec()).collect();
    backward.reverse();
    assert_eq!(backward, payloads);

    list.close().unwrap();
}

#[test]
fn test_strtable_survives_reopen() {
    let dir = TestDir::new();
    let base = dir.base("nav");

    let mut table = StrTable::open(&base, 1024).expect("create failed");
    for i in 0..25 {
        table.add(&format!("waypoint;{};{}", i, i * 3)).unwrap().expect("element should fit");
    }
    let before: Vec<String> = table.iter().map(|s| s.to_string_lossy().into_owned()).collect();
    table.close().unwrap();

    let table = StrTable::open(&base, 0).expect("reopen failed");
    assert_eq!(table.len(), 25);
    assert_eq!(table.size(), 1024);
    let after: Vec<String> = table.iter().map(|s| s.to_string_lossy().into_owned()).collect();
    assert_eq!(before, after);
    for i in 0..table.len() {
        assert_eq!(table.element_len(i).unwrap() as usize, before[i as usize].len() + 1);
    }

    table.close().unwrap();
}

#[test]
fn test_array_survives_reopen() {
    let dir = TestDir::new();
    let base = dir.base("params");

    let mut array = DiskArray::open(&base, 1000, 8).expect("create failed");
    for i in 0..array.len() {
        assert!(array.write(i, &(i.wrapping_mul(0x9E3779B97F4A7C15))));
    }
    array.flush().unwrap();
    array.close().unwrap();

    let array = DiskArray::open(&base, 0, 0).expect("reopen failed");
    assert_eq!(array.len(), 1000);
    assert_eq!(array.element_size(), 8);
    for i in 0..array.len() {
        assert_eq!(array.read::<u64>(i), Some(i.wrapping_mul(0x9E3779B97F4A7C15)));
    }

    array.close().unwrap();
}

#[test]
fn test_formats_share_a_base_name() {
    let dir = TestDir::new();
    let base = dir.base("shared");

    let mut list = BlockList::open(&base, 64).unwrap();
    let mut table = StrTable::open(&base, 64).unwrap();
    let mut array = DiskArray::open(&base, 4, 8).unwrap();

    list.append(b"block").unwrap().unwrap();
    table.add("string").unwrap().unwrap();
    assert!(array.write(3, &99u64));

    list.close().unwrap();
    table.close().unwrap();
    array.close().unwrap();

    for suffix in [BLOCK_LIST_SUFFIX, STRTABLE_SUFFIX, ARRAY_SUFFIX] {
        assert!(backing_path(&base, suffix).exists(), "missing {}", suffix);
    }

    let list = BlockList::open(&base, 0).unwrap();
    let table = StrTable::open(&base, 0).unwrap();
    let array = DiskArray::open(&base, 0, 0).unwrap();
    assert_eq!(list.iter().next().unwrap().unwrap(), b"block");
    assert_eq!(table.get(0).unwrap().to_bytes(), b"string");
    assert_eq!(array.read::<u64>(3), Some(99));

    list.close().unwrap();
    table.close().unwrap();
    array.close().unwrap();
}
