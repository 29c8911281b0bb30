//! Stream compression codecs and their bundle-file suffixes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compression applied to every data stream of one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    None,
    Gzip,
    Zstd,
}

impl Codec {
    /// File suffix of a data stream written with this codec.
    pub fn stream_suffix(&self) -> &'static str {
        match self {
            Codec::None => ".zfs.stream",
            Codec::Gzip => ".zfs.stream.gz",
            Codec::Zstd => ".zfs.stream.zst",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::None => "none",
            Codec::Gzip => "gzip",
            Codec::Zstd => "zstd",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Codec::None),
            "gzip" => Ok(Codec::Gzip),
            "zstd" => Ok(Codec::Zstd),
            other => Err(format!(
                "unknown compression codec '{}' (expected none, gzip, or zstd)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes_are_codec_specific() {
        assert_eq!(Codec::None.stream_suffix(), ".zfs.stream");
        assert_eq!(Codec::Gzip.stream_suffix(), ".zfs.stream.gz");
        assert_eq!(Codec::Zstd.stream_suffix(), ".zfs.stream.zst");
    }

    #[test]
    fn test_parse_round_trip() {
        for codec in [Codec::None, Codec::Gzip, Codec::Zstd] {
            assert_eq!(codec.to_string().parse::<Codec>().unwrap(), codec);
        }
        assert!("lz4".parse::<Codec>().is_err());
    }
}
