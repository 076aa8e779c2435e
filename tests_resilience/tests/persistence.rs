//! Pairing Persistence Tests
//!
//! Validates that pairing written to disk outlives a restart of both nodes,
//! and that a damaged record degrades to "not paired" instead of failing.

use block_types::BlockType;
use blocod::DaemonConfig;
use sim_hal::FilePairingStore;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tests_resilience::{Testbed, BOARD, ROBO};

fn file_testbed(dir: &Path) -> Testbed {
    Testbed::build(
        DaemonConfig::default(),
        Box::new(FilePairingStore::new(dir.join("board.json"))),
        Box::new(FilePairingStore::new(dir.join("robo.json"))),
    )
}

/// Test: Pairing survives a restart of both nodes
///
/// This validates that:
/// 1. A successful handshake writes both records
/// 2. Fresh nodes reading the same files come up paired
/// 3. The restored pair can transfer without pairing again
#[test]
fn test_pairing_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut bed = file_testbed(dir.path());
        bed.pair();
        bed.run_for(200);
        assert_eq!(bed.board.peer(), Some(ROBO));
    }
    assert!(dir.path().join("board.json").exists());
    assert!(dir.path().join("robo.json").exists());

    let mut bed = file_testbed(dir.path());
    assert_eq!(bed.board.peer(), Some(ROBO));
    assert_eq!(bed.robo.peer(), Some(BOARD));

    bed.send_kinds(&[BlockType::Beep]).unwrap();
    bed.run_for(300);
    assert_eq!(bed.robo.executions().len(), 1);
}

/// Test: Unpairing removes the records so a restart comes up unpaired
#[test]
fn test_unpair_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut bed = file_testbed(dir.path());
        bed.pair();
        bed.board.unpair();
        bed.air.deliver_all(4);
        bed.run_for(300);
    }
    assert!(!dir.path().join("board.json").exists());
    assert!(!dir.path().join("robo.json").exists());

    let bed = file_testbed(dir.path());
    assert_eq!(bed.board.peer(), None);
    assert_eq!(bed.robo.peer(), None);
}

/// Test: A corrupt record is reported and treated as unpaired
#[test]
fn test_corrupt_record_is_unpaired() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("robo.json"), "{ not a record").unwrap();

    let mut bed = file_testbed(dir.path());
    assert_eq!(bed.robo.peer(), None);
    assert!(bed.capture.contains("could not load pairing"));

    // The node still pairs normally and overwrites the bad record.
    bed.pair();
    bed.run_for(200);
    assert_eq!(bed.robo.peer(), Some(BOARD));
    let mut reopened = FilePairingStore::new(dir.path().join("robo.json"));
    assert_eq!(hal::PairingStore::load(&mut reopened).unwrap(), Some(BOARD));
}
