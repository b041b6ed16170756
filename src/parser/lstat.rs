//! Packed stat (LStat) decoder
//!
//! The catalog stores file attributes as 16 space separated numbers, each
//! written in base 64 with the alphabet `A-Za-z0-9+/` and an optional
//! leading `-` for negative values. Values are unbounded: sizes and times
//! written by other platforms may not fit any fixed-width integer.

use num_bigint::BigInt;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Number of fields in a packed stat string
pub const LSTAT_FIELDS: usize = 16;

/// Field names in encoding order
pub const LSTAT_FIELD_NAMES: [&str; LSTAT_FIELDS] = [
    "dev", "inode", "mode", "nlink", "uid", "gid", "rdev", "size", "blocksize", "blocks", "atime",
    "mtime", "ctime", "linkfi", "flags", "data",
];

/// Decoded file attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LStat {
    /// Device number
    pub dev: BigInt,
    /// Inode number
    pub inode: BigInt,
    /// File mode and type bits
    pub mode: BigInt,
    /// Hard link count
    pub nlink: BigInt,
    /// Owner user id
    pub uid: BigInt,
    /// Owner group id
    pub gid: BigInt,
    /// Device id for special files
    pub rdev: BigInt,
    /// Size in bytes
    pub size: BigInt,
    /// Preferred block size
    pub blocksize: BigInt,
    /// Allocated blocks
    pub blocks: BigInt,
    /// Access time
    pub atime: BigInt,
    /// Modification time
    pub mtime: BigInt,
    /// Change time
    pub ctime: BigInt,
    /// File index of the hard link target
    pub linkfi: BigInt,
    /// File flags
    pub flags: BigInt,
    /// Stream data
    pub data: BigInt,
}

impl LStat {
    /// Decode a packed stat string.
    ///
    /// Returns `None` when fewer than 16 fields are present. Fields past the
    /// sixteenth are ignored and characters outside the alphabet count as
    /// digit zero.
    pub fn decode(encoded: &str) -> Option<Self> {
        let fields: Vec<&str> = encoded.trim().split(' ').collect();
        if fields.len() < LSTAT_FIELDS {
            return None;
        }

        let values: [BigInt; LSTAT_FIELDS] = std::array::from_fn(|i| decode_field(fields[i]));
        let [dev, inode, mode, nlink, uid, gid, rdev, size, blocksize, blocks, atime, mtime, ctime, linkfi, flags, data] =
            values;

        Some(Self {
            dev,
            inode,
            mode,
            nlink,
            uid,
            gid,
            rdev,
            size,
            blocksize,
            blocks,
            atime,
            mtime,
            ctime,
            linkfi,
            flags,
            data,
        })
    }

    /// Field values in encoding order
    pub fn values(&self) -> [&BigInt; LSTAT_FIELDS] {
        [
            &self.dev,
            &self.inode,
            &self.mode,
            &self.nlink,
            &self.uid,
            &self.gid,
            &self.rdev,
            &self.size,
            &self.blocksize,
            &self.blocks,
            &self.atime,
            &self.mtime,
            &self.ctime,
            &self.linkfi,
            &self.flags,
            &self.data,
        ]
    }

    /// Whether the mode describes a directory
    pub fn is_dir(&self) -> bool {
        i64::try_from(&self.mode)
            .map(|mode| mode & 0o170000 == 0o040000)
            .unwrap_or(false)
    }
}

/// Values that fit in 64 bits serialize as JSON numbers, wider ones as
/// decimal strings.
impl Serialize for LStat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LSTAT_FIELDS))?;
        for (name, value) in LSTAT_FIELD_NAMES.iter().zip(self.values()) {
            match i64::try_from(value) {
                Ok(v) => map.serialize_entry(name, &v)?,
                Err(_) => map.serialize_entry(name, &value.to_string())?,
            }
        }
        map.end()
    }
}

fn decode_field(field: &str) -> BigInt {
    let (negative, digits) = match field.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, field),
    };

    let mut result = BigInt::default();
    for byte in digits.bytes() {
        let digit = ALPHABET.iter().position(|&c| c == byte).unwrap_or(0) as u32;
        result = result * 64u32 + digit;
    }

    if negative {
        -result
    } else {
        result
    }
}
