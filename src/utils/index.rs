use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::defs::PipelineError;
use crate::utils::fastx::Barcode;


/// One bead as listed in the index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeadEntry {
    pub bead_id: String,
    pub barcode: Barcode,
    pub expected_reads: usize,
}

/// Expected read counts per barcode.
///
/// Only consulted for lookups, so the table may list barcodes that never
/// appear in the reads and vice versa.
#[derive(Debug, Default)]
pub struct BarcodeIndex {
    entries: HashMap<Barcode, BeadEntry>,
}

impl BarcodeIndex {
    /// Loads `bead_id<TAB>barcode<TAB>read_count[<TAB>...]` rows.
    /// Blank lines are ignored; anything else malformed is an error.
    pub async fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path).await.map_err(|e| PipelineError::io(path, e))?;
        let mut lines = BufReader::new(file).lines();
        let mut index = BarcodeIndex::default();
        let mut line_no = 0;
        let mut unsorted = false;
        let mut previous: Option<Barcode> = None;
        while let Some(line) = lines.next_line().await.map_err(|e| PipelineError::io(path, e))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let entry = parse_row(&line).map_err(|reason| PipelineError::IndexParse {
                path: path.to_path_buf(),
                line: line_no,
                reason,
            })?;
            if let Some(prev) = &previous {
                unsorted |= entry.barcode < *prev;
            }
            previous = Some(entry.barcode.clone());
            index.insert(entry).map_err(|reason| PipelineError::IndexParse {
                path: path.to_path_buf(),
                line: line_no,
                reason,
            })?;
        }
        if unsorted {
            warn!("Index {} is not sorted by barcode", path.display());
        }
        info!("Loaded {} beads from {}", index.len(), path.display());
        Ok(index)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = BeadEntry>) -> Result<Self, PipelineError> {
        let mut index = BarcodeIndex::default();
        for entry in entries {
            index.insert(entry).map_err(PipelineError::InvalidConfig)?;
        }
        Ok(index)
    }

    fn insert(&mut self, entry: BeadEntry) -> Result<(), String> {
        if let Some(existing) = self.entries.get(&entry.barcode) {
            return Err(format!(
                "barcode {} listed for both bead {} and bead {}",
                entry.barcode, existing.bead_id, entry.bead_id
            ));
        }
        self.entries.insert(entry.barcode.clone(), entry);
        Ok(())
    }

    pub fn get(&self, barcode: &Barcode) -> Option<&BeadEntry> {
        self.entries.get(barcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_row(line: &str) -> Result<BeadEntry, String> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
    let bead_id = fields.next().map(str::trim).filter(|s| !s.is_empty())
        .ok_or_else(|| "missing bead id".to_string())?;
    let barcode = fields.next().map(str::trim).filter(|s| !s.is_empty())
        .ok_or_else(|| "missing barcode".to_string())?;
    let count = fields.next().map(str::trim)
        .ok_or_else(|| "missing read count".to_string())?;
    let expected_reads = count.parse::<usize>()
        .map_err(|e| format!("read count '{}': {}", count, e))?;
    Ok(BeadEntry {
        bead_id: bead_id.to_string(),
        barcode: Barcode::new(barcode),
        expected_reads,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_index() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("beads.tsv");
        tokio::fs::write(&path, "1\t0001_0001_0001\t3\textra\n2\t0001_0001_0002\t5\n\n3\t0001_0001_0003\t0\n").await?;

        let index = BarcodeIndex::load(&path).await?;
        assert_eq!(index.len(), 3);
        let bc = Barcode::new("0001_0001_0002");
        let entry = index.get(&bc).unwrap();
        assert_eq!(entry.expected_reads, 5);
        assert_eq!(entry.bead_id, "2");
        assert_eq!(index.get(&Barcode::new("0001_0001_0003")).map(|e| e.expected_reads), Some(0));
        assert!(index.get(&Barcode::new("9999")).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_index_rejects_bad_count() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("beads.tsv");
        tokio::fs::write(&path, "1\t0001\t3\n2\t0002\tmany\n").await?;

        match BarcodeIndex::load(&path).await {
            Err(PipelineError::IndexParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected IndexParse error, got {:?}", other.map(|i| i.len())),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_load_index_rejects_duplicate_barcode() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("beads.tsv");
        tokio::fs::write(&path, "1\t0001_0002\t3\n2\t00010002\t4\n").await?;
        assert!(matches!(BarcodeIndex::load(&path).await, Err(PipelineError::IndexParse { line: 2, .. })));
        Ok(())
    }

    #[test]
    fn test_parse_row_missing_fields() {
        assert!(parse_row("1\t0001").is_err());
        assert!(parse_row("\t0001\t3").is_err());
        assert_eq!(parse_row("7\t0001\t3\r").unwrap().expected_reads, 3);
    }
}
