use lstore_engine::Table;
use lstore_engine::buffer_pool::BufferPool;
use std::sync::Arc;

fn five_col_table() -> Table {
    Table::new("grades", 5, 0, Arc::new(BufferPool::new(256)), None)
}

fn all_cols(n: usize) -> Vec<bool> {
    vec![true; n]
}

#[test]
fn scenario_insert_and_select() {
    let t = five_col_table();
    assert!(t.insert(&[101, 90, 85, 88, 92]));
    assert!(t.insert(&[102, 78, 80, 79, 75]));
    assert!(t.insert(&[103, 95, 96, 90, 94]));

    let rows = t.select(102, 0, &all_cols(5)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].columns, vec![102, 78, 80, 79, 75]);
}

#[test]
fn scenario_update_and_versioned_select() {
    let t = five_col_table();
    t.insert(&[102, 78, 80, 79, 75]);

    assert!(t.update(102, &[None, Some(88), Some(85), Some(80), None]));
    let current = t.select(102, 0, &all_cols(5)).unwrap();
    assert_eq!(current[0].columns, vec![102, 88, 85, 80, 75]);

    let previous = t.select_version(102, 0, &all_cols(5), -1).unwrap();
    assert_eq!(previous[0].columns, vec![102, 78, 80, 79, 75]);
}

#[test]
fn scenario_primary_key_rename() {
    let t = five_col_table();
    t.insert(&[103, 95, 96, 90, 94]);

    assert!(t.update(103, &[Some(104), Some(100), Some(98), Some(99), Some(96)]));
    assert!(t.select(103, 0, &all_cols(5)).unwrap().is_empty());
    assert_eq!(
        t.select(104, 0, &all_cols(5)).unwrap()[0].columns,
        vec![104, 100, 98, 99, 96]
    );
}

#[test]
fn scenario_reinsert_freed_key_then_duplicate_fails() {
    let t = five_col_table();
    t.insert(&[103, 95, 96, 90, 94]);
    t.update(103, &[Some(104), Some(100), Some(98), Some(99), Some(96)]);

    // 103 no longer present as a primary key, so it can be reused.
    assert!(t.insert(&[103, 1, 2, 3, 4]));
    // A second insert of the same key must now fail.
    assert!(!t.insert(&[103, 9, 9, 9, 9]));
}

#[test]
fn scenario_sum_over_key_range() {
    let t = five_col_table();
    t.insert(&[101, 90, 85, 88, 92]);
    t.insert(&[102, 78, 80, 79, 75]);
    t.insert(&[103, 95, 96, 90, 94]);
    t.insert(&[104, 100, 98, 99, 96]);

    assert_eq!(t.sum(101, 104, 1), Some(90 + 78 + 95 + 100));
}

#[test]
fn scenario_merge_trigger_and_stability() {
    let t = Table::new("grades", 5, 0, Arc::new(BufferPool::new(256)), Some(2.0));
    for key in 0..4 {
        t.insert(&[key, 10, 20, 30, 40]);
    }
    assert!(!t.should_merge());

    // 2 * base_records updates trips the threshold.
    for _ in 0..9 {
        t.update(0, &[None, Some(11), None, None, None]);
    }
    assert!(t.should_merge());

    let before: Vec<_> = (0..4).map(|k| t.select(k, 0, &all_cols(5)).unwrap()[0].clone()).collect();
    assert!(t.merge());
    let after: Vec<_> = (0..4).map(|k| t.select(k, 0, &all_cols(5)).unwrap()[0].clone()).collect();

    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.columns, a.columns);
    }
}

#[test]
fn arity_mismatch_rejected() {
    let t = five_col_table();
    assert!(!t.insert(&[1, 2, 3]));
}

#[test]
fn update_arity_mismatch_rejected() {
    let t = five_col_table();
    t.insert(&[1, 2, 3, 4, 5]);
    assert!(!t.update(1, &[None, Some(9)]));
}

#[test]
fn delete_then_reads_empty() {
    let t = five_col_table();
    t.insert(&[1, 2, 3, 4, 5]);
    assert!(t.delete(1));
    assert!(t.select(1, 0, &all_cols(5)).unwrap().is_empty());
}

#[test]
fn create_index_enables_point_lookup_on_non_key_column() {
    let t = five_col_table();
    t.insert(&[1, 50, 0, 0, 0]);
    t.insert(&[2, 50, 0, 0, 0]);
    t.insert(&[3, 60, 0, 0, 0]);

    assert!(t.create_index(1));
    let matches = t.select(50, 1, &all_cols(5)).unwrap();
    assert_eq!(matches.len(), 2);

    assert!(t.drop_index(1));
    assert!(t.select(50, 1, &all_cols(5)).unwrap().is_empty());
}
