//! Fixed-format PCM (RIFF/WAVE) container codec.
//!
//! Every file this crate produces is **16-bit signed little-endian PCM,
//! mono**, with a fixed 44-byte header.  Two write paths are provided:
//!
//! * [`WavStreamWriter`] — streaming capture path.  The header is written
//!   with a zero data length up front; once the stream ends the size fields
//!   are corrected in place ([`backpatch`]) at byte offsets 4 and 40.
//! * [`write_all`] — one-shot path used by the enhancement pass, which
//!   knows the full sample count before writing.
//!
//! # Header layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | `"RIFF"` |
//! | 4      | 4    | total file size − 8 |
//! | 8      | 4    | `"WAVE"` |
//! | 12     | 4    | `"fmt "` |
//! | 16     | 4    | fmt sub-chunk size (always 16) |
//! | 20     | 2    | audio format (1 = PCM) |
//! | 22     | 2    | channel count (1) |
//! | 24     | 4    | sample rate |
//! | 28     | 4    | byte rate (sample rate × 2) |
//! | 32     | 2    | block align (2) |
//! | 34     | 2    | bits per sample (16) |
//! | 36     | 4    | `"data"` |
//! | 40     | 4    | data length in bytes (samples × 2) |

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: u64 = 44;

const NUM_CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

// ---------------------------------------------------------------------------
// WavError
// ---------------------------------------------------------------------------

/// Errors raised by the container codec.
#[derive(Debug, Error)]
pub enum WavError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The file is shorter than the 44-byte header.
    #[error("file too short for a PCM header: {0} bytes")]
    Truncated(u64),
}

// ---------------------------------------------------------------------------
// Header write / backpatch
// ---------------------------------------------------------------------------

/// Write the 44-byte header for `data_len` bytes of sample data.
///
/// During streaming capture `data_len` is `0` and the size fields are
/// corrected later with [`backpatch`].
pub fn write_header<W: Write>(w: &mut W, sample_rate: u32, data_len: u32) -> io::Result<()> {
    let byte_rate = sample_rate * u32::from(NUM_CHANNELS) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = NUM_CHANNELS * BITS_PER_SAMPLE / 8;

    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_len).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&NUM_CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&byte_rate.to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_len.to_le_bytes())?;
    Ok(())
}

/// Correct the two size fields of an already-written file.
///
/// Seeks to byte offset 4 and writes `total_size − 8`, then to offset 40
/// and writes `sample_count × 2`.  The handle must be open for random
/// access writes.
pub fn backpatch<F: Write + Seek>(f: &mut F, total_size: u32, sample_count: u32) -> io::Result<()> {
    f.seek(SeekFrom::Start(4))?;
    f.write_all(&(total_size - 8).to_le_bytes())?;
    f.seek(SeekFrom::Start(40))?;
    f.write_all(&(sample_count * 2).to_le_bytes())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// WavStreamWriter
// ---------------------------------------------------------------------------

/// Streaming writer for the capture loop.
///
/// Created with a placeholder header; call [`append`](Self::append) once per
/// processed chunk and [`finalize`](Self::finalize) when the stream ends.
/// `finalize` flushes and closes the append handle, then reopens the file
/// for random access to backpatch the size fields.
pub struct WavStreamWriter {
    out: BufWriter<File>,
    path: PathBuf,
    samples_written: u64,
}

impl WavStreamWriter {
    /// Create `path` and write the placeholder header.
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, WavError> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        write_header(&mut out, sample_rate, 0)?;
        Ok(Self {
            out,
            path: path.to_path_buf(),
            samples_written: 0,
        })
    }

    /// Append one chunk of samples to the stream.
    pub fn append(&mut self, samples: &[i16]) -> Result<(), WavError> {
        for &s in samples {
            self.out.write_all(&s.to_le_bytes())?;
        }
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    /// Total samples appended so far.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Flush, close, reopen and backpatch.  Returns the final sample count.
    pub fn finalize(self) -> Result<u64, WavError> {
        let Self {
            mut out,
            path,
            samples_written,
        } = self;

        out.flush()?;
        let file = out
            .into_inner()
            .map_err(|e| WavError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        drop(file);

        let mut file = OpenOptions::new().write(true).open(&path)?;
        let total_size = HEADER_LEN as u32 + samples_written as u32 * 2;
        backpatch(&mut file, total_size, samples_written as u32)?;
        Ok(samples_written)
    }
}

// ---------------------------------------------------------------------------
// Whole-file read / write
// ---------------------------------------------------------------------------

/// Read every sample from `path`, skipping the 44-byte header.
///
/// The remainder of the file is interpreted as little-endian 16-bit
/// samples; a trailing odd byte is ignored.
pub fn read_all(path: &Path) -> Result<Vec<i16>, WavError> {
    let bytes = std::fs::read(path)?;
    if (bytes.len() as u64) < HEADER_LEN {
        return Err(WavError::Truncated(bytes.len() as u64));
    }
    Ok(bytes[HEADER_LEN as usize..]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Write header and samples to `path` in one pass (non-streaming form).
pub fn write_all(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), WavError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    write_header(&mut out, sample_rate, samples.len() as u32 * 2)?;
    for &s in samples {
        out.write_all(&s.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
