use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};

/// Checks the first two bytes for the gzip magic number.
/// Files shorter than two bytes are treated as uncompressed.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file, transparently decompressing gzip (including bgzf / concatenated members).
pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = BufReader::new(File::open(path)?);
    if gz {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(file))
    }
}


/// Makes `path` absolute against `cwd` unless it already is.
pub fn absolute_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}


/// Removes every entry under `root` and then `root` itself.
///
/// # Arguments
///
/// * `root` - Scratch directory holding one sub-directory per shard.
///
/// # Returns
/// Number of leftover shard directories removed.
pub fn sweep_scratch(root: &Path) -> io::Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            warn!("Removing leftover scratch directory {}", path.display());
            fs::remove_dir_all(&path)?;
            removed += 1;
        } else {
            fs::remove_file(&path)?;
        }
    }
    fs::remove_dir(root)?;
    debug!("Removed scratch root {}", root.display());
    Ok(removed)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    #[test]
    fn test_open_reader_plain_and_gz() -> io::Result<()> {
        let dir = tempdir()?;
        let plain = dir.path().join("reads.fq");
        fs::write(&plain, b"@r/1_2/1\nACGT\n+\nIIII\n")?;

        let gz = dir.path().join("reads.fq.gz");
        let mut enc = GzEncoder::new(File::create(&gz)?, Compression::default());
        enc.write_all(b"@r/1_2/1\nACGT\n+\nIIII\n")?;
        enc.finish()?;

        assert!(!is_gzipped(&plain)?);
        assert!(is_gzipped(&gz)?);

        let mut a = String::new();
        open_reader(&plain)?.read_to_string(&mut a)?;
        let mut b = String::new();
        open_reader(&gz)?.read_to_string(&mut b)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_is_gzipped_empty_file() -> io::Result<()> {
        let dir = tempdir()?;
        let empty = dir.path().join("empty.fq");
        File::create(&empty)?;
        assert!(!is_gzipped(&empty)?);
        Ok(())
    }

    #[test]
    fn test_sweep_scratch() -> io::Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("Assemble_BI");
        fs::create_dir_all(root.join("BI00000001/megahit"))?;
        fs::create_dir_all(root.join("BI00000002"))?;
        fs::write(root.join("BI00000001/sort.1.fq"), b"x")?;

        assert_eq!(sweep_scratch(&root)?, 2);
        assert!(!root.exists());
        assert_eq!(sweep_scratch(&root)?, 0);
        Ok(())
    }

    #[test]
    fn test_absolute_path() {
        let cwd = Path::new("/work");
        assert_eq!(absolute_path(Path::new("out"), cwd), PathBuf::from("/work/out"));
        assert_eq!(absolute_path(Path::new("/data/out"), cwd), PathBuf::from("/data/out"));
    }
}
