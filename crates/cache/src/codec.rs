//! On-disk entry format.
//!
//! Every entry is a JSON envelope naming the kind it was written for and the
//! schema version, optionally gzip-compressed:
//!
//! ```json
//! { "kind": "commits", "schema": 1, "data": { "columns": [...], "rows": [...] } }
//! ```
//!
//! The envelope deliberately carries no timestamp; the file's modification
//! time is the only age the store trusts.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::io::{Read, Write};

/// Bumped whenever the envelope or a built-in payload changes shape. Entries
/// written under another version read as misses and get recomputed.
pub const SCHEMA_VERSION: u32 = 1;

// Cache files are rewritten weekly at most; favour a fast write over a few
// saved bytes.
const GZIP_LEVEL: GzCompression = GzCompression::fast();

/// Compression applied to entries before they hit storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain JSON (.json)
    #[default]
    None,
    /// Gzip-compressed JSON (.json.gz)
    Gzip,
}
impl Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
        }
    }
}
impl Compression {
    pub const ALL: [Compression; 2] = [Compression::None, Compression::Gzip];

    /// File name suffix for entries written with this compression.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => ".json",
            Self::Gzip => ".json.gz",
        }
    }

    /// Compression implied by a file name, or `None` if the file isn't a
    /// cache entry at all.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(Self::Gzip.extension()) {
            Some(Self::Gzip)
        } else if name.ends_with(Self::None.extension()) {
            Some(Self::None)
        } else {
            None
        }
    }

    fn compress(&self, input: Vec<u8>) -> std::io::Result<Vec<u8>> {
        match self {
            Self::None => Ok(input),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(input.len() / 4), GZIP_LEVEL);
                encoder.write_all(&input)?;
                encoder.finish()
            },
        }
    }

    fn decompress(&self, input: Vec<u8>) -> std::io::Result<Vec<u8>> {
        match self {
            Self::None => Ok(input),
            Self::Gzip => {
                let mut output = Vec::with_capacity(input.len() * 4);
                GzDecoder::new(input.as_slice()).read_to_end(&mut output)?;
                Ok(output)
            },
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    schema: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    kind: String,
    schema: u32,
    data: T,
}

/// Wrap `data` in an envelope for `kind` and encode it.
pub(crate) fn encode<T: Serialize>(kind: &str, data: &T, compression: Compression) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef { kind, schema: SCHEMA_VERSION, data };
    let json = serde_json::to_vec(&envelope).or_raise(|| ErrorKind::Serialize)?;
    compression.compress(json).or_raise(|| ErrorKind::Serialize)
}

/// Decode an entry, checking it was written for `kind` under the current
/// schema.
pub(crate) fn decode<T: DeserializeOwned>(kind: &str, bytes: Vec<u8>, compression: Compression) -> Result<T> {
    let json = compression.decompress(bytes).or_raise(|| ErrorKind::InvalidData)?;
    let envelope: Envelope<T> = serde_json::from_slice(&json).or_raise(|| ErrorKind::InvalidData)?;
    if envelope.kind != kind || envelope.schema != SCHEMA_VERSION {
        tracing::debug!(
            expected_kind = kind,
            found_kind = %envelope.kind,
            found_schema = envelope.schema,
            "Cache entry written for a different kind or schema"
        );
        exn::bail!(ErrorKind::InvalidData);
    }
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("project_1.json", Some(Compression::None))]
    #[case("project_1.json.gz", Some(Compression::Gzip))]
    #[case(".harvest-tmp-abc123", None)]
    #[case("project_1.pkl", None)]
    #[case("project_1.gz", None)]
    fn test_from_file_name(#[case] name: &str, #[case] expected: Option<Compression>) {
        assert_eq!(Compression::from_file_name(name), expected);
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    fn test_encode_decode(#[case] compression: Compression) {
        let data = vec![1u64, 2, 3];
        let bytes = encode("commits", &data, compression).unwrap();
        let decoded: Vec<u64> = decode("commits", bytes, compression).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_gzip_is_actually_compressed() {
        let data = vec!["the same row over and over"; 200];
        let plain = encode("commits", &data, Compression::None).unwrap();
        let gzip = encode("commits", &data, Compression::Gzip).unwrap();
        assert!(gzip.len() < plain.len() / 4);
        assert_eq!(&gzip[..2], &[0x1F, 0x8B]);
    }

    #[test]
    fn test_decode_wrong_kind() {
        let bytes = encode("commits", &vec![1u8], Compression::None).unwrap();
        let err = decode::<Vec<u8>>("pipelines", bytes, Compression::None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData));
    }

    #[test]
    fn test_decode_wrong_schema() {
        let bytes = br#"{"kind":"commits","schema":0,"data":[1]}"#.to_vec();
        let err = decode::<Vec<u8>>("commits", bytes, Compression::None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData));
    }

    #[rstest]
    #[case(b"not json at all".to_vec(), Compression::None)]
    #[case(br#"{"kind":"commits","schema":1,"data":[1]}"#.to_vec(), Compression::Gzip)]
    #[case(br#"{"kind":"commits","schema":1,"data":"text"}"#.to_vec(), Compression::None)]
    fn test_decode_corrupt(#[case] bytes: Vec<u8>, #[case] compression: Compression) {
        let err = decode::<Vec<u8>>("commits", bytes, compression).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData));
    }

    #[test]
    fn test_compression_serde() {
        assert_eq!(serde_json::to_string(&Compression::Gzip).unwrap(), "\"gzip\"");
        assert_eq!(serde_json::from_str::<Compression>("\"none\"").unwrap(), Compression::None);
    }
}
