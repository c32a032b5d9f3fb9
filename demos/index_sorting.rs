//! Index sorting example for segdex
//!
//! This example demonstrates:
//! - Sorting segments by a numeric field at flush time
//! - Updating documents by key
//! - Force merging down to a single segment

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segdex::{Document, Index, IndexSort, Options, SortField, Term};

fn print_sorted(index: &Index, sort: &IndexSort) -> anyhow::Result<()> {
    let snapshot = index.snapshot();
    for id in snapshot.search_sorted(sort, usize::MAX)? {
        let fields = snapshot.stored_fields(id)?;
        println!(
            "  id={:<3} dense_int={:<3} dense_string={}",
            id,
            snapshot.numeric_value(id, "dense_int")?.unwrap_or_default(),
            fields.get_text("dense_string").unwrap_or("-")
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let sort = IndexSort::new(vec![SortField::descending("dense_int")]);
    let options = Options::default().index_sort(sort.clone()).auto_merge(false);

    let dir = std::env::temp_dir().join("segdex_index_sorting");
    if dir.exists() {
        std::fs::remove_dir_all(&dir).context("clearing previous example data")?;
    }
    let index = Index::open(&dir, options)?;

    // Seeded so runs are reproducible
    let mut rng = StdRng::seed_from_u64(42);
    // Keyed by value, so an update replaces every document sharing it
    for _ in 0..20 {
        let value: i64 = rng.random_range(0..10);
        index.add_document(
            Document::new()
                .with_numeric("dense_int", value)
                .with_stored("dense_int", value)
                .with_stored("dense_string", value.to_string()),
        )?;
    }
    index.flush()?;

    let reader = index.snapshot().reader(0)?.clone();
    println!(
        "Segment {} sealed; ordinal 0 has dense_int={:?}",
        reader.name(),
        reader.numeric_value("dense_int", 0)?
    );

    println!("Sorted scan:");
    print_sorted(&index, &sort)?;

    // Update two documents by key
    for key in ["8", "7"] {
        let deleted = index.update_document(
            &Term::stored("dense_string", key),
            Document::new()
                .with_numeric("dense_int", 88)
                .with_stored("dense_int", 88)
                .with_stored("dense_string", "88"),
        )?;
        println!("Updated dense_string={} ({} replaced)", key, deleted);
    }
    index.flush()?;

    println!(
        "Before merge: {} live, {} deleted, {} segments",
        index.num_docs(),
        index.num_deleted_docs(),
        index.num_segments()
    );
    print_sorted(&index, &sort)?;

    index.force_merge(1)?;
    println!(
        "After merge: {} live, {} deleted, {} segments",
        index.num_docs(),
        index.num_deleted_docs(),
        index.num_segments()
    );
    print_sorted(&index, &sort)?;

    index.close()?;
    Ok(())
}
