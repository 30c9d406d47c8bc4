use super::*;
use crate::file::{BufferPool, DbFile, FileManager, MemFile, PageId};
use crate::record::{
    DataType, DbTable, RecordError, RecordResult, TableScan, Tuple, TupleDesc, TupleId, Value,
};
use tempfile::TempDir;

fn create_test_schema() -> TupleDesc {
    TupleDesc::from_parts(&[DataType::Int, DataType::Text], &["id", "name"]).unwrap()
}

fn row(id: i32) -> Tuple {
    Tuple::new(vec![Value::Int(id), Value::Text(format!("user{id}"))])
}

fn setup_tree(capacity: usize) -> (BTreeFile, BufferPool) {
    let mut files = FileManager::new();
    files.add(Box::new(MemFile::new("users"))).unwrap();
    let pool = BufferPool::with_capacity(files, capacity);
    (BTreeFile::new("users", create_test_schema(), 0).unwrap(), pool)
}

fn scan_keys(tree: &BTreeFile, pool: &mut BufferPool) -> Vec<i32> {
    TableScan::new(tree, pool)
        .map(|t| t.unwrap().get_field(0).and_then(Value::as_int).unwrap())
        .collect()
}

#[test]
fn test_key_field_must_be_int() {
    let desc = create_test_schema();
    assert!(matches!(
        BTreeFile::new("t", desc.clone(), 1),
        Err(RecordError::InvalidKeyField { index: 1, .. })
    ));
    assert!(matches!(
        BTreeFile::new("t", desc, 5),
        Err(RecordError::InvalidKeyField { index: 5, .. })
    ));
}

#[test]
fn test_empty_tree() {
    let (tree, mut pool) = setup_tree(8);
    assert_eq!(tree.begin(&mut pool).unwrap(), tree.end(&mut pool).unwrap());
    assert_eq!(tree.height(&mut pool).unwrap(), 0);
    assert_eq!(tree.search(&mut pool, 1).unwrap(), None);
}

#[test]
fn test_first_insert_creates_root_and_leaf() {
    let (tree, mut pool) = setup_tree(8);
    tree.insert_tuple(&mut pool, &row(7)).unwrap();

    assert_eq!(pool.num_pages("users").unwrap(), 2);
    assert_eq!(tree.height(&mut pool).unwrap(), 2);
    assert_eq!(tree.begin(&mut pool).unwrap(), TupleId::new(1, 0));
    assert_eq!(tree.get_tuple(&mut pool, TupleId::new(1, 0)).unwrap(), row(7));
}

#[test]
fn test_unordered_inserts_scan_sorted() {
    let (tree, mut pool) = setup_tree(8);
    let n = tree.leaf_capacity() as i32 * 4;

    // Stride through the key space so inserts land all over the tree
    let mut keys: Vec<i32> = (0..n).map(|i| (i * 37) % n).collect();
    for &key in &keys {
        tree.insert_tuple(&mut pool, &row(key)).unwrap();
    }

    keys.sort_unstable();
    assert_eq!(scan_keys(&tree, &mut pool), keys);
}

#[test]
fn test_upsert_replaces_tuple() {
    let (tree, mut pool) = setup_tree(8);
    for id in 0..200 {
        tree.insert_tuple(&mut pool, &row(id)).unwrap();
    }

    let replacement = Tuple::new(vec![Value::Int(42), Value::from("replaced")]);
    tree.insert_tuple(&mut pool, &replacement).unwrap();

    assert_eq!(scan_keys(&tree, &mut pool).len(), 200);
    assert_eq!(tree.search(&mut pool, 42).unwrap(), Some(replacement));
    assert_eq!(tree.search(&mut pool, 43).unwrap(), Some(row(43)));
    assert_eq!(tree.search(&mut pool, 500).unwrap(), None);
}

#[test]
fn test_leaf_split_separator() {
    let (tree, mut pool) = setup_tree(8);
    let cap = tree.leaf_capacity() as i32;

    // The leaf splits as soon as it reaches capacity
    for id in 0..cap {
        tree.insert_tuple(&mut pool, &row(id)).unwrap();
    }
    assert_eq!(pool.num_pages("users").unwrap(), 3);

    let root = IndexPage::new(pool.get_page(&PageId::new("users", ROOT_PAGE)).unwrap()).unwrap();
    assert_eq!(root.size(), 1);
    assert!(!root.index_children());
    assert_eq!(root.key(0), cap / 2);
    assert_eq!((root.child(0), root.child(1)), (1, 2));

    let desc = create_test_schema();
    let (left_size, left_next) = {
        let left = LeafPage::new(pool.get_page(&PageId::new("users", 1)).unwrap(), &desc, 0).unwrap();
        (left.size(), left.next_leaf())
    };
    let (right_size, right_next, right_first) = {
        let right = LeafPage::new(pool.get_page(&PageId::new("users", 2)).unwrap(), &desc, 0).unwrap();
        (right.size(), right.next_leaf(), right.key_at(0).unwrap())
    };
    assert_eq!(left_size + right_size, cap as usize);
    assert_eq!(left_size, cap as usize / 2);
    assert_eq!(right_first, cap / 2);
    // Chain: 1 -> 2 -> end
    assert_eq!(left_next, 2);
    assert_eq!(right_next, 0);
    assert_eq!(scan_keys(&tree, &mut pool), (0..cap).collect::<Vec<_>>());
}

#[test]
fn test_get_tuple_on_internal_page_fails() {
    let (tree, mut pool) = setup_tree(16);
    let cap = tree.leaf_capacity();
    let n = ((IndexPage::CAPACITY + 2) * (cap - cap / 2) + cap) as i32;
    for id in 0..n {
        tree.insert_tuple(&mut pool, &row(id)).unwrap();
    }
    assert_eq!(tree.height(&mut pool).unwrap(), 3);

    let (internal, size) = {
        let root = IndexPage::new(pool.get_page(&PageId::new("users", ROOT_PAGE)).unwrap()).unwrap();
        let internal = root.child(0);
        let child = IndexPage::new(pool.get_page(&PageId::new("users", internal)).unwrap()).unwrap();
        (internal, child.size())
    };
    assert!(size > cap);

    for slot in [0, size - 1] {
        assert!(matches!(
            tree.get_tuple(&mut pool, TupleId::new(internal, slot)),
            Err(RecordError::Deserialization(_))
        ));
    }
}

#[test]
fn test_root_growth() {
    let (tree, mut pool) = setup_tree(16);
    let cap = tree.leaf_capacity();

    // Ascending inserts leave every left leaf half full, so the root fills
    // after about CAPACITY leaf splits
    let n = ((IndexPage::CAPACITY + 2) * (cap - cap / 2) + cap) as i32;
    let mut grew_at = None;
    for id in 0..n {
        tree.insert_tuple(&mut pool, &row(id)).unwrap();
        if grew_at.is_none() && tree.height(&mut pool).unwrap() == 3 {
            grew_at = Some(id);
        }
    }
    assert!(grew_at.is_some(), "root never split");

    let root = IndexPage::new(pool.get_page(&PageId::new("users", ROOT_PAGE)).unwrap()).unwrap();
    assert!(root.index_children());
    assert_eq!(root.size(), 1);

    let keys = scan_keys(&tree, &mut pool);
    assert_eq!(keys, (0..n).collect::<Vec<_>>());
    for id in [0, n / 3, n - 1] {
        assert_eq!(tree.search(&mut pool, id).unwrap(), Some(row(id)));
    }
}

#[test]
fn test_scan_terminates_after_n_steps() {
    let (tree, mut pool) = setup_tree(4);
    let n = tree.leaf_capacity() * 3 + 5;
    for id in 1..=n as i32 {
        tree.insert_tuple(&mut pool, &row(id)).unwrap();
    }

    let end = tree.end(&mut pool).unwrap();
    let mut cursor = tree.begin(&mut pool).unwrap();
    let mut steps = 0;
    while cursor != end {
        steps += 1;
        assert_eq!(tree.get_tuple(&mut pool, cursor).unwrap(), row(steps as i32));
        cursor = tree.next(&mut pool, cursor).unwrap();
    }
    assert_eq!(steps, n);
}

#[test]
fn test_delete_is_noop() {
    let (tree, mut pool) = setup_tree(8);
    tree.insert_tuple(&mut pool, &row(1)).unwrap();
    let first = tree.begin(&mut pool).unwrap();
    tree.delete_tuple(&mut pool, first).unwrap();
    assert_eq!(scan_keys(&tree, &mut pool), vec![1]);
}

#[test]
fn test_rejects_mismatched_tuple() {
    let (tree, mut pool) = setup_tree(8);
    let bad = Tuple::new(vec![Value::from("x"), Value::Int(1)]);
    assert!(tree.insert_tuple(&mut pool, &bad).is_err());
    assert_eq!(pool.num_pages("users").unwrap(), 1);
}

#[test]
fn test_tree_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("users.idx");
    let tree = BTreeFile::new("users", create_test_schema(), 0).unwrap();
    let n = 500;

    {
        let mut files = FileManager::new();
        files.add(Box::new(DbFile::open("users", &path).unwrap())).unwrap();
        let mut pool = BufferPool::with_capacity(files, 3);
        for id in (0..n).rev() {
            tree.insert_tuple(&mut pool, &row(id)).unwrap();
        }
    }

    let mut files = FileManager::new();
    files.add(Box::new(DbFile::open("users", &path).unwrap())).unwrap();
    let mut pool = BufferPool::with_capacity(files, 3);
    let scanned: Vec<Tuple> = TableScan::new(&tree, &mut pool)
        .collect::<RecordResult<_>>()
        .unwrap();
    assert_eq!(scanned.len(), n as usize);
    assert_eq!(scanned[0], row(0));
    assert_eq!(scanned[n as usize - 1], row(n - 1));
}
