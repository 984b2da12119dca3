//! Dense exact-search index: a contiguous `f32` arena addressed by slot number.

use std::io::{self, Read, Write};

const MAGIC: &[u8; 8] = b"SIFTFLAT";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_capacity(dimension: usize, slots: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * slots),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its slot. Callers validate the length.
    pub fn push(&mut self, vector: &[f32]) -> usize {
        debug_assert_eq!(vector.len(), self.dimension);
        let slot = self.len();
        self.data.extend_from_slice(vector);
        slot
    }

    /// Read back the vector stored at `slot`.
    #[must_use]
    pub fn reconstruct(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// Exact k-nearest-neighbour search by Euclidean distance.
    ///
    /// Returns `(slot, distance)` pairs ordered by ascending distance; ties keep slot order.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || query.len() != self.dimension || self.dimension == 0 {
            return Vec::new();
        }
        let mut hits: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, vector)| (slot, euclidean_distance(query, vector)))
            .collect();
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        hits
    }

    /// Serialize as `MAGIC | version u32 | dimension u64 | count u64 | f32 data`, little-endian.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension as u64).to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()
    }

    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] if the header is wrong or the payload is
    /// truncated or contains non-finite values.
    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(invalid_data("not a flat index file"));
        }

        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let version = u32::from_le_bytes(word);
        if version != FORMAT_VERSION {
            return Err(invalid_data(&format!(
                "unsupported flat index version {version}"
            )));
        }

        let dimension = read_u64(&mut reader)?;
        let count = read_u64(&mut reader)?;
        let dimension = usize::try_from(dimension).map_err(|_| invalid_data("dimension overflow"))?;
        let count = usize::try_from(count).map_err(|_| invalid_data("count overflow"))?;
        let total = dimension
            .checked_mul(count)
            .ok_or_else(|| invalid_data("index size overflow"))?;

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.len() != total * 4 {
            return Err(invalid_data(&format!(
                "expected {} bytes of vector data, found {}",
                total * 4,
                bytes.len()
            )));
        }

        let mut data = Vec::with_capacity(total);
        for chunk in bytes.chunks_exact(4) {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !value.is_finite() {
                return Err(invalid_data("index contains non-finite values"));
            }
            data.push(value);
        }

        Ok(Self { dimension, data })
    }
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}

#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
