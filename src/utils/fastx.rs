use seq_io::fasta::Reader as FastaReader;
use seq_io::fastq::Reader as FastqReader;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use log::warn;
use crate::config::defs::{PipelineError, RecordFormat, BARCODE_DELIMITER, BARCODE_SEPARATOR};
use crate::utils::file::{open_reader, FileReader};


/// Sort and group key embedded in read labels.
///
/// Separators are dropped on construction so `0001_0002_0003` and
/// `000100020003` are the same key. Ordering is byte-wise, matching the
/// order the upstream barcode sort produces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Barcode(String);

impl Barcode {
    pub fn new(raw: &str) -> Self {
        Barcode(raw.trim().replace(BARCODE_SEPARATOR, ""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pulls the barcode out of a label such as `READ7/0001_0002_0003/1`.
///
/// # Arguments
///
/// * `label` - Record header with the prefix character already removed.
///
/// # Returns
/// The second `/`-delimited field as a Barcode, or None when absent or empty.
pub fn barcode_from_label(label: &[u8]) -> Option<Barcode> {
    let label = std::str::from_utf8(label).ok()?;
    let field = label.split(BARCODE_DELIMITER).nth(1)?;
    let field = field.split_whitespace().next()?;
    let barcode = Barcode::new(field);
    if barcode.as_str().is_empty() {
        None
    } else {
        Some(barcode)
    }
}


/// One mate of a read pair. `qual` is present for FASTQ only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    pub label: Vec<u8>,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

impl SeqRecord {
    pub fn label_str(&self) -> String {
        String::from_utf8_lossy(&self.label).into_owned()
    }
}

/// A mate-1/mate-2 pair and the barcode taken from the mate-1 label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    pub barcode: Barcode,
    pub r1: SeqRecord,
    pub r2: SeqRecord,
}


/// Either a FASTA or FASTQ reader
pub enum SequenceReader {
    Fasta(FastaReader<FileReader>),
    Fastq(FastqReader<FileReader>),
}

impl SequenceReader {
    pub fn open(path: &Path, format: RecordFormat) -> io::Result<Self> {
        let reader = open_reader(path)?;
        Ok(match format {
            RecordFormat::Fasta => SequenceReader::Fasta(FastaReader::new(reader)),
            RecordFormat::Fastq => SequenceReader::Fastq(FastqReader::new(reader)),
        })
    }

    /// Next record with the label prefix stripped, None at end of file.
    fn next_record(&mut self) -> Option<Result<SeqRecord, String>> {
        match self {
            SequenceReader::Fastq(reader) => reader.next().map(|res| {
                res.map(|rec| {
                    let owned = rec.to_owned_record();
                    SeqRecord { label: owned.head, seq: owned.seq, qual: Some(owned.qual) }
                })
                .map_err(|e| e.to_string())
            }),
            SequenceReader::Fasta(reader) => reader.next().map(|res| {
                res.map(|rec| {
                    let owned = rec.to_owned_record();
                    SeqRecord { label: owned.head, seq: owned.seq, qual: None }
                })
                .map_err(|e| e.to_string())
            }),
        }
    }
}


/// Reads two mate files in lockstep.
///
/// The mates must correspond record for record. If one file ends early the
/// rest of the other is unreachable: the reader logs it and reports end of
/// stream from then on.
pub struct PairedReader {
    r1: SequenceReader,
    r2: SequenceReader,
    path1: PathBuf,
    path2: PathBuf,
    pairs_read: u64,
    finished: bool,
}

impl PairedReader {
    pub fn open(path1: &Path, path2: &Path, format: RecordFormat) -> Result<Self, PipelineError> {
        let r1 = SequenceReader::open(path1, format).map_err(|e| PipelineError::io(path1, e))?;
        let r2 = SequenceReader::open(path2, format).map_err(|e| PipelineError::io(path2, e))?;
        Ok(PairedReader {
            r1,
            r2,
            path1: path1.to_path_buf(),
            path2: path2.to_path_buf(),
            pairs_read: 0,
            finished: false,
        })
    }

    pub fn pairs_read(&self) -> u64 {
        self.pairs_read
    }

    /// Next pair, or Ok(None) once either mate stream is exhausted.
    pub fn next_pair(&mut self) -> Result<Option<ReadPair>, PipelineError> {
        if self.finished {
            return Ok(None);
        }
        let rec1 = self.r1.next_record();
        let rec2 = self.r2.next_record();
        let (rec1, rec2) = match (rec1, rec2) {
            (Some(a), Some(b)) => (a, b),
            (None, None) => {
                self.finished = true;
                return Ok(None);
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!(
                    "Mate files {} and {} differ in length; stopping after {} pairs",
                    self.path1.display(),
                    self.path2.display(),
                    self.pairs_read
                );
                self.finished = true;
                return Ok(None);
            }
        };
        let r1 = rec1.map_err(|reason| PipelineError::RecordParse { path: self.path1.clone(), reason })?;
        let r2 = rec2.map_err(|reason| PipelineError::RecordParse { path: self.path2.clone(), reason })?;
        let barcode = barcode_from_label(&r1.label).ok_or_else(|| PipelineError::RecordParse {
            path: self.path1.clone(),
            reason: format!("no barcode field in label '{}'", r1.label_str()),
        })?;
        self.pairs_read += 1;
        Ok(Some(ReadPair { barcode, r1, r2 }))
    }
}

impl Iterator for PairedReader {
    type Item = Result<ReadPair, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}


/// Writes a record in the given layout, restoring the label prefix.
pub fn write_record<W: Write>(writer: &mut W, record: &SeqRecord, format: RecordFormat) -> io::Result<()> {
    match (format, &record.qual) {
        (RecordFormat::Fastq, Some(qual)) => write_fastq_record(writer, &record.label, &record.seq, qual),
        (RecordFormat::Fastq, None) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("FASTQ output requested for record '{}' without qualities", record.label_str()),
        )),
        (RecordFormat::Fasta, _) => write_fasta_record(writer, &record.label, &record.seq),
    }
}

pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    label: &[u8],
    seq: &[u8],
) -> io::Result<()> {
    writer.write_all(&[RecordFormat::Fasta.label_prefix()])?;
    writer.write_all(label)?;
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    label: &[u8],
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(&[RecordFormat::Fastq.label_prefix()])?;
    writer.write_all(label)?;
    writer.write_all(b"\n")?;

    // Write sequence
    writer.write_all(seq)?;
    writer.write_all(b"\n")?;

    // Write separator
    writer.write_all(b"+\n")?;

    // Write quality scores
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_barcode_from_label() {
        assert_eq!(barcode_from_label(b"READ1/0001_0002_0003/1"), Some(Barcode::new("000100020003")));
        assert_eq!(barcode_from_label(b"READ1/0001_0002_0003"), Some(Barcode::new("0001_0002_0003")));
        assert_eq!(barcode_from_label(b"READ1/12_34 extra"), Some(Barcode::new("1234")));
        assert_eq!(barcode_from_label(b"READ1"), None);
        assert_eq!(barcode_from_label(b"READ1//1"), None);
    }

    #[test]
    fn test_barcode_order() {
        assert!(Barcode::new("0001_0002") < Barcode::new("0001_0003"));
        assert!(Barcode::new("0002_0001") > Barcode::new("0001_1999"));
        assert_eq!(Barcode::new("0001_0002"), Barcode::new("00010002"));
    }

    #[test]
    fn test_paired_reader_fastq() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p1 = dir.path().join("r1.fq");
        let p2 = dir.path().join("r2.fq");
        fs::write(&p1, "@a/0001_0001/1\nACGT\n+\nIIII\n@b/0001_0002/1\nGGCC\n+\nJJJJ\n")?;
        fs::write(&p2, "@a/0001_0001/2\nTTTT\n+\nKKKK\n@b/0001_0002/2\nAAAA\n+\nLLLL\n")?;

        let mut reader = PairedReader::open(&p1, &p2, RecordFormat::Fastq)?;
        let first = reader.next_pair()?.unwrap();
        assert_eq!(first.barcode.as_str(), "00010001");
        assert_eq!(first.r1.label, b"a/0001_0001/1".to_vec());
        assert_eq!(first.r2.seq, b"TTTT".to_vec());
        assert_eq!(first.r2.qual, Some(b"KKKK".to_vec()));
        let second = reader.next_pair()?.unwrap();
        assert_eq!(second.barcode.as_str(), "00010002");
        assert!(reader.next_pair()?.is_none());
        assert_eq!(reader.pairs_read(), 2);
        Ok(())
    }

    #[test]
    fn test_paired_reader_uneven_mates_stop() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p1 = dir.path().join("r1.fa");
        let p2 = dir.path().join("r2.fa");
        fs::write(&p1, ">a/0001/1\nACGT\n>b/0002/1\nGGCC\n>c/0003/1\nTTAA\n")?;
        fs::write(&p2, ">a/0001/2\nTTTT\n")?;

        let pairs: Vec<ReadPair> = PairedReader::open(&p1, &p2, RecordFormat::Fasta)?
            .collect::<Result<_, _>>()?;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].r1.qual, None);
        Ok(())
    }

    #[test]
    fn test_paired_reader_missing_barcode_is_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p1 = dir.path().join("r1.fa");
        let p2 = dir.path().join("r2.fa");
        fs::write(&p1, ">plainread\nACGT\n")?;
        fs::write(&p2, ">plainread\nTTTT\n")?;

        let mut reader = PairedReader::open(&p1, &p2, RecordFormat::Fasta)?;
        assert!(matches!(reader.next_pair(), Err(PipelineError::RecordParse { .. })));
        Ok(())
    }

    #[test]
    fn test_write_records_restore_prefix() -> io::Result<()> {
        let rec = SeqRecord { label: b"a/0001/1".to_vec(), seq: b"ACGT".to_vec(), qual: Some(b"IIII".to_vec()) };
        let mut fq = Vec::new();
        write_record(&mut fq, &rec, RecordFormat::Fastq)?;
        assert_eq!(fq, b"@a/0001/1\nACGT\n+\nIIII\n".to_vec());

        let mut fa = Vec::new();
        write_record(&mut fa, &rec, RecordFormat::Fasta)?;
        assert_eq!(fa, b">a/0001/1\nACGT\n".to_vec());

        let bare = SeqRecord { qual: None, ..rec };
        assert!(write_record(&mut Vec::new(), &bare, RecordFormat::Fastq).is_err());
        Ok(())
    }
}
