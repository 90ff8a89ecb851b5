//! Journal record types and serialization.
//!
//! Frame layout, little-endian:
//!
//! ```text
//! | record_len u32 | kind u8 | body ... | crc32 u32 |
//! ```
//!
//! `record_len` counts the whole frame including itself and the CRC. The
//! CRC covers everything before it.

use crate::error::{BagError, BagResult};
use crate::index::Cell;
use chrono::{DateTime, Utc};

/// Length prefix size.
const LEN_SIZE: usize = 4;
/// Kind byte size.
const KIND_SIZE: usize = 1;
/// CRC size.
const CRC_SIZE: usize = 4;

/// Smallest possible frame: length, kind and CRC with an empty body.
pub const MIN_FRAME_SIZE: usize = LEN_SIZE + KIND_SIZE + CRC_SIZE;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// A bag's primary table was created.
    CreateTable = 1,
    /// An index table was created.
    CreateIndexTable = 2,
    /// A batch of row operations committed as one unit.
    Commit = 3,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateTable),
            2 => Some(Self::CreateIndexTable),
            3 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Contents of a primary row as written.
#[derive(Debug, Clone, PartialEq)]
pub struct RowImage {
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
    /// Payload is JSON text.
    pub is_json: bool,
    /// Payload is compressed.
    pub is_compressed: bool,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

/// One row operation inside a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Insert a row at `(key, version)`.
    InsertRow {
        /// Bag name.
        bag: String,
        /// Row key.
        key: String,
        /// Row version.
        version: i64,
        /// Row contents.
        row: RowImage,
    },
    /// Remove the row at `(key, version)`.
    DeleteRow {
        /// Bag name.
        bag: String,
        /// Row key.
        key: String,
        /// Row version.
        version: i64,
    },
    /// Move a row from one version slot to another.
    Reversion {
        /// Bag name.
        bag: String,
        /// Row key.
        key: String,
        /// Current version.
        from: i64,
        /// New version.
        to: i64,
    },
    /// Remove every version of a key.
    DeleteKey {
        /// Bag name.
        bag: String,
        /// Row key.
        key: String,
    },
    /// Append a row to an index table. Ids are assigned on apply.
    InsertIndexRow {
        /// Index table name.
        table: String,
        /// Key of the indexed primary row.
        key: String,
        /// One cell per indexed field, in field order.
        cells: Vec<Cell>,
    },
}

impl Op {
    fn tag(&self) -> u8 {
        match self {
            Self::InsertRow { .. } => 1,
            Self::DeleteRow { .. } => 2,
            Self::Reversion { .. } => 3,
            Self::DeleteKey { .. } => 4,
            Self::InsertIndexRow { .. } => 5,
        }
    }
}

/// A journal record.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalRecord {
    /// Create a bag's primary table.
    CreateTable {
        /// Bag name.
        bag: String,
    },
    /// Create an index table for a bag.
    CreateIndexTable {
        /// Index table name.
        name: String,
        /// Bag the index belongs to.
        bag: String,
        /// Indexed fields, sorted.
        fields: Vec<String>,
    },
    /// Row operations applied together.
    Commit {
        /// Operations in apply order.
        ops: Vec<Op>,
    },
}

impl JournalRecord {
    /// Returns the record kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::CreateTable { .. } => RecordKind::CreateTable,
            Self::CreateIndexTable { .. } => RecordKind::CreateIndexTable,
            Self::Commit { .. } => RecordKind::Commit,
        }
    }

    /// Encodes the record into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a string, payload or the frame itself does not
    /// fit a 4-byte length.
    pub fn encode(&self) -> BagResult<Vec<u8>> {
        let mut w = Writer::default();
        // Placeholder for record_len, patched below
        w.buf.extend_from_slice(&[0; LEN_SIZE]);
        w.u8(self.kind().as_byte());

        match self {
            Self::CreateTable { bag } => w.str(bag)?,
            Self::CreateIndexTable { name, bag, fields } => {
                w.str(name)?;
                w.str(bag)?;
                w.len(fields.len())?;
                for field in fields {
                    w.str(field)?;
                }
            }
            Self::Commit { ops } => {
                w.len(ops.len())?;
                for op in ops {
                    w.op(op)?;
                }
            }
        }

        let record_len = w.buf.len() + CRC_SIZE;
        let record_len = u32::try_from(record_len)
            .map_err(|_| BagError::Encoding {
                message: format!("journal record of {record_len} bytes is too large"),
            })?;
        w.buf[..LEN_SIZE].copy_from_slice(&record_len.to_le_bytes());

        let crc = compute_crc32(&w.buf);
        w.buf.extend_from_slice(&crc.to_le_bytes());
        Ok(w.buf)
    }

    /// Decodes a complete frame.
    pub fn decode(data: &[u8]) -> BagResult<Self> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(BagError::journal_corruption("record too short"));
        }

        let record_len = frame_len(data);
        if record_len < MIN_FRAME_SIZE {
            return Err(BagError::journal_corruption(format!(
                "record length {record_len} below minimum"
            )));
        }
        if data.len() < record_len {
            return Err(BagError::journal_corruption("incomplete record"));
        }

        let crc_start = record_len - CRC_SIZE;
        let stored_crc = u32::from_le_bytes([
            data[crc_start],
            data[crc_start + 1],
            data[crc_start + 2],
            data[crc_start + 3],
        ]);
        let computed_crc = compute_crc32(&data[..crc_start]);
        if stored_crc != computed_crc {
            return Err(BagError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let kind_byte = data[LEN_SIZE];
        let kind = RecordKind::from_byte(kind_byte).ok_or_else(|| {
            BagError::journal_corruption(format!("unknown record kind {kind_byte}"))
        })?;

        let mut r = Reader::new(&data[LEN_SIZE + KIND_SIZE..crc_start]);
        let record = match kind {
            RecordKind::CreateTable => Self::CreateTable { bag: r.string()? },
            RecordKind::CreateIndexTable => {
                let name = r.string()?;
                let bag = r.string()?;
                let count = r.u32()? as usize;
                let mut fields = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    fields.push(r.string()?);
                }
                Self::CreateIndexTable { name, bag, fields }
            }
            RecordKind::Commit => {
                let count = r.u32()? as usize;
                let mut ops = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    ops.push(r.op()?);
                }
                Self::Commit { ops }
            }
        };
        r.finish(kind)?;
        Ok(record)
    }
}

/// Reads the length prefix of a frame. `data` must hold at least 4 bytes.
#[must_use]
pub fn frame_len(data: &[u8]) -> usize {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn len(&mut self, n: usize) -> BagResult<()> {
        let n = u32::try_from(n).map_err(|_| BagError::Encoding {
            message: format!("length {n} exceeds journal limit"),
        })?;
        self.u32(n);
        Ok(())
    }

    fn bytes(&mut self, data: &[u8]) -> BagResult<()> {
        self.len(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn str(&mut self, s: &str) -> BagResult<()> {
        self.bytes(s.as_bytes())
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn timestamp(&mut self, ts: &DateTime<Utc>) {
        self.i64(ts.timestamp());
        self.u32(ts.timestamp_subsec_nanos());
    }

    fn cell(&mut self, cell: &Cell) -> BagResult<()> {
        match cell {
            Cell::Null => self.u8(0),
            Cell::Number(n) => {
                self.u8(1);
                self.f64(*n);
            }
            Cell::Text(s) => {
                self.u8(2);
                self.str(s)?;
            }
        }
        Ok(())
    }

    fn op(&mut self, op: &Op) -> BagResult<()> {
        self.u8(op.tag());
        match op {
            Op::InsertRow {
                bag,
                key,
                version,
                row,
            } => {
                self.str(bag)?;
                self.str(key)?;
                self.i64(*version);
                self.bool(row.is_json);
                self.bool(row.is_compressed);
                self.timestamp(&row.created_at);
                self.bytes(&row.payload)?;
            }
            Op::DeleteRow { bag, key, version } => {
                self.str(bag)?;
                self.str(key)?;
                self.i64(*version);
            }
            Op::Reversion { bag, key, from, to } => {
                self.str(bag)?;
                self.str(key)?;
                self.i64(*from);
                self.i64(*to);
            }
            Op::DeleteKey { bag, key } => {
                self.str(bag)?;
                self.str(key)?;
            }
            Op::InsertIndexRow { table, key, cells } => {
                self.str(table)?;
                self.str(key)?;
                self.len(cells.len())?;
                for cell in cells {
                    self.cell(cell)?;
                }
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> BagResult<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(BagError::journal_corruption("unexpected end of record"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> BagResult<[u8; N]> {
        self.take(N)?
            .try_into()
            .map_err(|_| BagError::journal_corruption("short field"))
    }

    fn u8(&mut self) -> BagResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> BagResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BagError::journal_corruption(format!(
                "invalid bool byte {other}"
            ))),
        }
    }

    fn u32(&mut self) -> BagResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> BagResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> BagResult<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn bytes(&mut self) -> BagResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> BagResult<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|_| BagError::journal_corruption("invalid UTF-8 in name"))
    }

    fn timestamp(&mut self) -> BagResult<DateTime<Utc>> {
        let secs = self.i64()?;
        let nanos = self.u32()?;
        DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| BagError::journal_corruption("timestamp out of range"))
    }

    fn cell(&mut self) -> BagResult<Cell> {
        match self.u8()? {
            0 => Ok(Cell::Null),
            1 => Ok(Cell::number(self.f64()?)),
            2 => Ok(Cell::Text(self.string()?)),
            other => Err(BagError::journal_corruption(format!(
                "unknown cell tag {other}"
            ))),
        }
    }

    fn op(&mut self) -> BagResult<Op> {
        let tag = self.u8()?;
        let op = match tag {
            1 => {
                let bag = self.string()?;
                let key = self.string()?;
                let version = self.i64()?;
                let is_json = self.bool()?;
                let is_compressed = self.bool()?;
                let created_at = self.timestamp()?;
                let payload = self.bytes()?;
                Op::InsertRow {
                    bag,
                    key,
                    version,
                    row: RowImage {
                        payload,
                        is_json,
                        is_compressed,
                        created_at,
                    },
                }
            }
            2 => Op::DeleteRow {
                bag: self.string()?,
                key: self.string()?,
                version: self.i64()?,
            },
            3 => Op::Reversion {
                bag: self.string()?,
                key: self.string()?,
                from: self.i64()?,
                to: self.i64()?,
            },
            4 => Op::DeleteKey {
                bag: self.string()?,
                key: self.string()?,
            },
            5 => {
                let table = self.string()?;
                let key = self.string()?;
                let count = self.u32()? as usize;
                let mut cells = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    cells.push(self.cell()?);
                }
                Op::InsertIndexRow { table, key, cells }
            }
            other => {
                return Err(BagError::journal_corruption(format!(
                    "unknown op tag {other}"
                )))
            }
        };
        Ok(op)
    }

    fn finish(&self, kind: RecordKind) -> BagResult<()> {
        if self.pos != self.data.len() {
            return Err(BagError::journal_corruption(format!(
                "trailing bytes in {kind:?} record: expected {} bytes, got {}",
                self.pos,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_commit() -> JournalRecord {
        JournalRecord::Commit {
            ops: vec![
                Op::Reversion {
                    bag: "bag".into(),
                    key: "k".into(),
                    from: 0,
                    to: -1,
                },
                Op::InsertRow {
                    bag: "bag".into(),
                    key: "k".into(),
                    version: 0,
                    row: RowImage {
                        payload: b"{\"x\":1}".to_vec(),
                        is_json: true,
                        is_compressed: false,
                        created_at: Utc.with_ymd_and_hms(2022, 5, 6, 7, 8, 9).unwrap(),
                    },
                },
                Op::InsertIndexRow {
                    table: "idx_bag_x".into(),
                    key: "k".into(),
                    cells: vec![Cell::Number(1.0), Cell::Null, Cell::Text("t".into())],
                },
                Op::DeleteRow {
                    bag: "bag".into(),
                    key: "old".into(),
                    version: -3,
                },
                Op::DeleteKey {
                    bag: "bag".into(),
                    key: "gone".into(),
                },
            ],
        }
    }

    #[test]
    fn record_kind_bytes() {
        for kind in [
            RecordKind::CreateTable,
            RecordKind::CreateIndexTable,
            RecordKind::Commit,
        ] {
            assert_eq!(RecordKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(RecordKind::from_byte(0), None);
    }

    #[test]
    fn commit_record_reads_back() {
        let record = sample_commit();
        let frame = record.encode().unwrap();
        assert_eq!(frame_len(&frame), frame.len());
        assert_eq!(JournalRecord::decode(&frame).unwrap(), record);
    }

    #[test]
    fn index_table_record_reads_back() {
        let record = JournalRecord::CreateIndexTable {
            name: "idx_bag_x_y".into(),
            bag: "bag".into(),
            fields: vec!["x".into(), "y".into()],
        };
        let frame = record.encode().unwrap();
        assert_eq!(JournalRecord::decode(&frame).unwrap(), record);
    }

    #[test]
    fn detect_corruption() {
        let mut frame = JournalRecord::CreateTable { bag: "bag".into() }
            .encode()
            .unwrap();
        frame[6] ^= 0xFF;
        let result = JournalRecord::decode(&frame);
        assert!(matches!(result, Err(BagError::ChecksumMismatch { .. })));
    }

    #[test]
    fn short_frame_is_corrupt() {
        let result = JournalRecord::decode(&[1, 2, 3]);
        assert!(matches!(result, Err(BagError::JournalCorruption { .. })));
    }

    #[test]
    fn crc32_known_value() {
        // Standard check value for "123456789"
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
