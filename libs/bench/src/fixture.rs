//! Vector fixtures for inserts and queries.
//!
//! Two sources feed the runner:
//!
//! - numbered NPY files (`{dir}/{prefix}{index:05}{suffix}`) read in order,
//!   each holding up to `rows_per_file` rows, sliced into insert batches;
//! - synthesized random unit vectors, used for every query and for inserts
//!   when no fixture files are available.
//!
//! NPY payloads may be float32 (`<f4`), float16 (`<f2`) or uint8 (`|u1`,
//! the SIFT1B "binary" files).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyResult};
use byteorder::{LittleEndian, ReadBytesExt};
use half::f16;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::error::{BenchError, Result};

/// ChaCha stream used for synthesized insert rows.
pub const INSERT_STREAM: u64 = 0;
/// ChaCha stream used for search query vectors.
pub const QUERY_STREAM: u64 = 1;

/// Naming and sizing of the numbered fixture files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLayout {
    pub dir: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub rows_per_file: usize,
    pub max_files: usize,
}

impl FixtureLayout {
    /// Path of the fixture file with the given index.
    pub fn path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{:05}{}", self.prefix, index, self.suffix))
    }
}

/// Draw `count` vectors with coordinates uniform in [0, 1), each scaled to
/// unit L2 norm.
pub fn random_unit_vectors<R: Rng + ?Sized>(rng: &mut R, count: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>()).collect();
            normalize(&v)
        })
        .collect()
}

/// Normalize a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    // Accumulate in f64 so that the result is unit length to within 1e-6
    // even for wide vectors.
    let norm = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|&x| (x as f64 / norm) as f32).collect()
}

/// Rows of one fixture file held in memory.
struct LoadedFile {
    index: usize,
    rows: Vec<Vec<f32>>,
    offset: usize,
}

enum Source {
    Files {
        layout: FixtureLayout,
        loader: NpyLoader,
        next_index: usize,
        current: Option<LoadedFile>,
    },
    Random {
        rng: ChaCha8Rng,
    },
}

/// Supplies batches of vectors in a fixed order.
pub struct VectorFixtureSource {
    source: Source,
    delivered: usize,
}

impl std::fmt::Debug for VectorFixtureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.source {
            Source::Files { layout, .. } => format!("files({})", layout.dir.display()),
            Source::Random { .. } => "random".to_string(),
        };
        f.debug_struct("VectorFixtureSource")
            .field("source", &kind)
            .field("delivered", &self.delivered)
            .finish()
    }
}

impl VectorFixtureSource {
    /// Read rows sequentially from numbered fixture files.
    pub fn files(layout: FixtureLayout) -> Self {
        Self {
            source: Source::Files {
                layout,
                loader: NpyLoader::new(),
                next_index: 0,
                current: None,
            },
            delivered: 0,
        }
    }

    /// Synthesize random unit vectors. A seed makes the sequence reproducible.
    pub fn random(seed: Option<u64>) -> Self {
        Self::random_stream(seed, INSERT_STREAM)
    }

    /// Like [`random`](Self::random), but on a separate ChaCha stream.
    /// Sources sharing a seed on different streams never yield the same rows.
    pub fn random_stream(seed: Option<u64>, stream: u64) -> Self {
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        rng.set_stream(stream);
        Self {
            source: Source::Random { rng },
            delivered: 0,
        }
    }

    /// Total vectors handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Next `count` vectors of width `dim`.
    ///
    /// File-backed sources continue where the previous batch stopped,
    /// crossing file boundaries as needed, and fail with
    /// [`BenchError::FixtureExhausted`] when the files run out.
    pub fn next_batch(&mut self, count: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
        let batch = match &mut self.source {
            Source::Random { rng } => random_unit_vectors(rng, count, dim),
            Source::Files {
                layout,
                loader,
                next_index,
                current,
            } => {
                let mut out = Vec::with_capacity(count);
                while out.len() < count {
                    let needs_file = current
                        .as_ref()
                        .map(|f| f.offset >= f.rows.len())
                        .unwrap_or(true);
                    if needs_file {
                        *current = None;
                        let index = *next_index;
                        let path = layout.path(index);
                        if index >= layout.max_files || !path.exists() {
                            return Err(BenchError::FixtureExhausted {
                                requested: count,
                                available: out.len(),
                            });
                        }
                        debug!(path = %path.display(), "loading fixture file");
                        let rows = loader.load(&path, layout.rows_per_file, dim)?;
                        info!(path = %path.display(), rows = rows.len(), "fixture file loaded");
                        *next_index += 1;
                        *current = Some(LoadedFile {
                            index,
                            rows,
                            offset: 0,
                        });
                        continue;
                    }

                    if let Some(file) = current.as_mut() {
                        let take = (count - out.len()).min(file.rows.len() - file.offset);
                        debug!(
                            file = file.index,
                            start = file.offset,
                            end = file.offset + take,
                            "fixture slice"
                        );
                        out.extend(file.rows[file.offset..file.offset + take].iter().cloned());
                        file.offset += take;
                    }
                }
                out
            }
        };
        self.delivered += batch.len();
        Ok(batch)
    }
}

/// Element type of an NPY payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    F32,
    F16,
    U8,
}

impl NpyDtype {
    fn parse(descr: &str) -> Option<Self> {
        match descr {
            "<f4" | "float32" => Some(NpyDtype::F32),
            "<f2" | "float16" => Some(NpyDtype::F16),
            "|u1" | "<u1" | "uint8" => Some(NpyDtype::U8),
            _ => None,
        }
    }
}

/// Parsed NPY header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub shape: Vec<usize>,
    pub descr: String,
    pub fortran_order: bool,
}

/// NPY file loader for two-dimensional float32/float16/uint8 arrays.
#[derive(Debug, Clone, Default)]
pub struct NpyLoader {
    verbose: bool,
}

impl NpyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the parsed header of every file at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Load up to `max_rows` rows from `path`, requiring rows of width `dim`.
    pub fn load(&self, path: &Path, max_rows: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
        self.load_rows(path, max_rows, dim)
            .map_err(|e| BenchError::fixture_format(path, format!("{:#}", e)))
    }

    fn load_rows(&self, path: &Path, max_rows: usize, dim: usize) -> AnyResult<Vec<Vec<f32>>> {
        let file = File::open(path).context("Failed to open NPY file")?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if self.verbose {
            info!(path = %path.display(), shape = ?header.shape, dtype = %header.descr, "NPY header");
        }

        if header.shape.len() != 2 {
            anyhow::bail!("expected a 2-D array, got shape {:?}", header.shape);
        }
        if header.fortran_order {
            anyhow::bail!("Fortran-ordered arrays are not supported");
        }
        let width = header.shape[1];
        if width != dim {
            anyhow::bail!("expected {}D rows, got {}D", dim, width);
        }
        let dtype = NpyDtype::parse(&header.descr).with_context(|| {
            format!(
                "unsupported dtype {}; expected <f4, <f2 or |u1",
                header.descr
            )
        })?;

        let num_rows = header.shape[0].min(max_rows);
        let mut rows = Vec::with_capacity(num_rows);
        for i in 0..num_rows {
            let mut row = vec![0.0f32; dim];
            match dtype {
                NpyDtype::F32 => {
                    for v in row.iter_mut() {
                        *v = reader.read_f32::<LittleEndian>()?;
                    }
                }
                NpyDtype::F16 => {
                    for v in row.iter_mut() {
                        *v = f16::from_bits(reader.read_u16::<LittleEndian>()?).to_f32();
                    }
                }
                NpyDtype::U8 => {
                    for v in row.iter_mut() {
                        *v = reader.read_u8()? as f32;
                    }
                }
            }
            rows.push(row);

            if (i + 1) % 50_000 == 0 {
                debug!("  Loaded {}/{} rows", i + 1, num_rows);
            }
        }

        Ok(rows)
    }
}

/// Read the NPY magic, version and header dictionary.
pub fn read_header<R: Read>(reader: &mut R) -> AnyResult<NpyHeader> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != b"\x93NUMPY" {
        anyhow::bail!("Invalid NPY magic number");
    }

    let major = reader.read_u8()?;
    let _minor = reader.read_u8()?;

    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        v => anyhow::bail!("Unsupported NPY version {}", v),
    };

    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes)?;
    let header = String::from_utf8_lossy(&header_bytes);

    Ok(NpyHeader {
        shape: parse_shape_from_header(&header)?,
        descr: parse_descr_from_header(&header)?,
        fortran_order: header.contains("'fortran_order': True"),
    })
}

/// Extract shape tuple from NPY header string.
fn parse_shape_from_header(header: &str) -> AnyResult<Vec<usize>> {
    let shape_start = header.find("'shape':").context("No shape in header")?;
    let rest = &header[shape_start..];
    let paren_start = rest.find('(').context("No shape tuple")?;
    let paren_end = rest.find(')').context("No shape end")?;

    rest[paren_start + 1..paren_end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .with_context(|| format!("Invalid shape entry: {}", s))
        })
        .collect()
}

/// Extract dtype descriptor from NPY header string.
fn parse_descr_from_header(header: &str) -> AnyResult<String> {
    let descr_start = header.find("'descr':").context("No descr in header")?;
    let rest = &header[descr_start + "'descr':".len()..];
    let quote_start = rest.find('\'').context("No dtype quote")?;
    let quote_end = rest[quote_start + 1..]
        .find('\'')
        .context("No dtype end")?;
    Ok(rest[quote_start + 1..quote_start + 1 + quote_end].to_string())
}

/// Write a 2-D array in NPY v1.0 format.
///
/// Used to produce fixture files for tests and local dry runs.
pub fn write_npy_f32(path: &Path, rows: &[Vec<f32>]) -> AnyResult<()> {
    use byteorder::WriteBytesExt;
    use std::io::Write;

    let dim = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != dim) {
        anyhow::bail!("all rows must have the same width");
    }

    let mut dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows.len(),
        dim
    );
    // Magic (6) + version (2) + length (2) + dict + newline, padded to 64 bytes.
    let unpadded = 10 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut file = std::io::BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    file.write_all(b"\x93NUMPY")?;
    file.write_all(&[1, 0])?;
    file.write_u16::<LittleEndian>(dict.len() as u16)?;
    file.write_all(dict.as_bytes())?;
    for row in rows {
        for &v in row {
            file.write_f32::<LittleEndian>(v)?;
        }
    }
    file.flush()?;
    Ok(())
}
