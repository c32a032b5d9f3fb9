// Merge tests for segdex
// These tests verify merge ordering, deletion handling and snapshot pinning

use segdex::{Document, Index, IndexSort, Options, SortField, Term};
use std::path::Path;
use tempfile::TempDir;

fn segment_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".seg"))
        .collect();
    files.sort();
    files
}

fn ascending(field: &str) -> IndexSort {
    IndexSort::new(vec![SortField::ascending(field)])
}

#[test]
fn test_merge_interleaves_sorted_segments() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().index_sort(ascending("v")).auto_merge(false);
    let index = Index::open(dir.path(), options).unwrap();

    for v in [1, 4, 7, 10] {
        index.add_document(Document::new().with_numeric("v", v)).unwrap();
    }
    index.flush().unwrap();
    for v in [2, 5, 8] {
        index.add_document(Document::new().with_numeric("v", v)).unwrap();
    }
    index.flush().unwrap();
    for v in [9, 6, 3] {
        index.add_document(Document::new().with_numeric("v", v)).unwrap();
    }
    index.flush().unwrap();
    assert_eq!(index.num_segments(), 3);

    index.force_merge(1).unwrap();
    assert_eq!(index.num_segments(), 1);

    let snapshot = index.snapshot();
    let reader = snapshot.reader(0).unwrap();
    let values: Vec<i64> = (0..reader.max_doc()).map(|ord| reader.numeric_value("v", ord).unwrap().unwrap()).collect();
    assert_eq!(values, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_merge_keeps_older_segment_first_on_ties() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().index_sort(ascending("v")).auto_merge(false);
    let index = Index::open(dir.path(), options).unwrap();

    for (v, tag) in [(1, "old-a"), (2, "old-b")] {
        index.add_document(Document::new().with_numeric("v", v).with_stored("tag", tag)).unwrap();
    }
    index.flush().unwrap();
    for (v, tag) in [(1, "new-a"), (2, "new-b")] {
        index.add_document(Document::new().with_numeric("v", v).with_stored("tag", tag)).unwrap();
    }
    index.flush().unwrap();

    index.force_merge(1).unwrap();
    let snapshot = index.snapshot();
    let tags: Vec<String> = (0..snapshot.num_docs())
        .map(|id| snapshot.stored_fields(id).unwrap().get_text("tag").unwrap().to_string())
        .collect();
    assert_eq!(tags, vec!["old-a", "new-a", "old-b", "new-b"]);
}

#[test]
fn test_merge_drops_deleted_documents() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().index_sort(ascending("v")).auto_merge(false);
    let index = Index::open(dir.path(), options).unwrap();

    for v in 0..10 {
        index.add_document(Document::new().with_numeric("v", v).with_stored("id", v)).unwrap();
    }
    index.flush().unwrap();
    for v in [3, 5, 7] {
        index.delete_documents(&Term::stored("id", v)).unwrap();
    }
    index.flush().unwrap();
    assert_eq!(index.num_deleted_docs(), 3);

    index.force_merge(1).unwrap();
    assert_eq!(index.num_deleted_docs(), 0);
    assert_eq!(index.num_docs(), 7);

    let snapshot = index.snapshot();
    assert_eq!(snapshot.max_doc(), 7);
    assert!(snapshot.find(&Term::stored("id", 5)).unwrap().is_empty());
}

#[test]
fn test_fully_deleted_segments_are_dropped() {
    let dir = TempDir::new().unwrap();
    let index = Index::open(dir.path(), Options::default().auto_merge(false)).unwrap();

    index.add_document(Document::new().with_stored("group", "a")).unwrap();
    index.add_document(Document::new().with_stored("group", "a")).unwrap();
    index.flush().unwrap();
    index.add_document(Document::new().with_stored("group", "b")).unwrap();
    index.flush().unwrap();

    index.delete_documents(&Term::stored("group", "a")).unwrap();
    index.force_merge(2).unwrap();

    assert_eq!(index.num_segments(), 1);
    assert_eq!(index.num_docs(), 1);
    assert_eq!(index.num_deleted_docs(), 0);
}

#[test]
fn test_pinned_snapshot_survives_merge() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let options = Options::default().index_sort(ascending("v")).auto_merge(false);
    let index = Index::open(dir.path(), options).unwrap();

    for batch in 0..3 {
        for i in 0..4 {
            index.add_document(Document::new().with_numeric("v", batch * 4 + i)).unwrap();
        }
        index.flush().unwrap();
    }
    assert_eq!(segment_files(dir.path()).len(), 3);

    let pinned = index.snapshot();
    index.force_merge(1).unwrap();

    // Old segments stay on disk and readable while pinned
    assert_eq!(segment_files(dir.path()).len(), 4);
    assert_eq!(pinned.num_segments(), 3);
    assert_eq!(pinned.numeric_value(11, "v").unwrap(), Some(11));

    drop(pinned);
    assert_eq!(segment_files(dir.path()).len(), 1);
    assert_eq!(index.snapshot().numeric_value(11, "v").unwrap(), Some(11));
}

#[test]
fn test_auto_merge_bounds_segment_count() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().max_buffered_docs(2).merge_factor(3);
    let index = Index::open(dir.path(), options).unwrap();

    for i in 0..40 {
        index.add_document(Document::new().with_numeric("i", i)).unwrap();
        assert!(index.num_segments() <= 3);
    }
    index.flush().unwrap();
    assert_eq!(index.num_docs(), 40);
}

#[test]
fn test_delete_heavy_segment_is_rewritten() {
    let dir = TempDir::new().unwrap();
    let index = Index::open(dir.path(), Options::default()).unwrap();

    for i in 0..10 {
        index.add_document(Document::new().with_numeric("i", i)).unwrap();
    }
    index.flush().unwrap();

    for i in 0..6 {
        index.delete_documents(&Term::numeric("i", i)).unwrap();
    }
    // Flush runs the merge policy
    index.flush().unwrap();

    assert_eq!(index.num_segments(), 1);
    assert_eq!(index.num_deleted_docs(), 0);
    assert_eq!(index.num_docs(), 4);
}

#[test]
fn test_merge_result_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().index_sort(ascending("v")).auto_merge(false);

    {
        let index = Index::open(dir.path(), options.clone()).unwrap();
        for v in [5, 1, 3] {
            index.add_document(Document::new().with_numeric("v", v)).unwrap();
            index.flush().unwrap();
        }
        index.delete_documents(&Term::numeric("v", 3)).unwrap();
        index.force_merge(1).unwrap();
    }

    let index = Index::open(dir.path(), options).unwrap();
    assert_eq!(index.num_segments(), 1);
    assert_eq!(index.num_docs(), 2);
    assert_eq!(segment_files(dir.path()).len(), 1);

    let snapshot = index.snapshot();
    assert_eq!(snapshot.numeric_value(0, "v").unwrap(), Some(1));
    assert_eq!(snapshot.numeric_value(1, "v").unwrap(), Some(5));
}
