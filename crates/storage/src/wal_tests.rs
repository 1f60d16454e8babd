use super::*;
use sched_core::{Event, JobId};
use std::io::Write;
use tempfile::tempdir;

fn test_event(tag: &str) -> Event {
    Event::JobDeactivated { id: JobId::from_string(format!("job-{tag}")) }
}

#[test]
fn open_creates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path, 0).unwrap();

    assert!(path.exists());
    assert_eq!(wal.write_seq(), 0);
    assert_eq!(wal.processed_seq(), 0);
}

#[test]
fn append_and_flush() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    let seq1 = wal.append(&test_event("cmd1")).unwrap();
    let seq2 = wal.append(&test_event("cmd2")).unwrap();
    assert_eq!(seq1, 1);
    assert_eq!(seq2, 2);

    wal.flush().unwrap();
    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.len() > 0);
}

#[test]
fn next_unprocessed_returns_entries_in_order_then_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event("cmd1")).unwrap();
    wal.append(&test_event("cmd2")).unwrap();

    let entry1 = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry1.seq, 1);
    let entry2 = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry2.seq, 2);
    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn mark_processed_updates_processed_seq() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event("cmd1")).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    wal.mark_processed(entry.seq);
    assert_eq!(wal.processed_seq(), 1);
}

#[test]
fn reopen_with_processed_seq_skips_already_folded_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&test_event("cmd1")).unwrap();
        wal.append(&test_event("cmd2")).unwrap();
        wal.append(&test_event("cmd3")).unwrap();
        wal.flush().unwrap();
    }

    let mut wal = Wal::open(&path, 2).unwrap();
    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 3);
    assert!(wal.next_unprocessed().unwrap().is_none());
}

#[test]
fn entries_after_returns_only_later_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event("cmd1")).unwrap();
    wal.append(&test_event("cmd2")).unwrap();
    wal.append(&test_event("cmd3")).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

#[test]
fn truncate_before_drops_earlier_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    wal.append(&test_event("cmd1")).unwrap();
    wal.append(&test_event("cmd2")).unwrap();
    wal.append(&test_event("cmd3")).unwrap();
    wal.flush().unwrap();

    wal.truncate_before(2).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

#[test]
fn needs_flush_trips_past_the_unflushed_count_threshold() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    assert!(!wal.needs_flush());
    for i in 0..101 {
        wal.append(&test_event(&format!("cmd{i}"))).unwrap();
    }
    assert!(wal.needs_flush());
}

#[test]
fn open_on_a_corrupt_tail_preserves_the_valid_prefix_and_rotates_a_backup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&test_event("cmd1")).unwrap();
        wal.append(&test_event("cmd2")).unwrap();
        wal.flush().unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not-valid-json\n").unwrap();
    }

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);

    let bak = path.with_extension("bak");
    assert!(bak.exists());

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn repeated_corruption_rotates_through_three_backup_generations() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    for i in 1..=4u8 {
        std::fs::write(&path, [i; 8]).unwrap();
        let wal = Wal::open(&path, 0).unwrap();
        assert_eq!(wal.write_seq(), 0);
    }

    assert_eq!(std::fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 8]);
    assert_eq!(std::fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 8]);
    assert_eq!(std::fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 8]);
    assert!(!path.with_extension("bak.4").exists());
}

#[test]
fn next_unprocessed_returns_none_rather_than_erroring_on_a_corrupt_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&test_event("cmd1")).unwrap();
    wal.flush().unwrap();

    let entry = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(entry.seq, 1);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"corrupt-line\n").unwrap();
    }
    assert!(wal.next_unprocessed().unwrap().is_none());
}
