//! TOML manifest describing the records and groups `minnow pack` writes.
//!
//! ```toml
//! [[headers]]
//! kind = "text"
//! value = "snapshot-042"
//!
//! [[headers]]
//! kind = "float64"
//! values = [0.25, 1.5]
//!
//! [[groups]]
//! kind = "int64"
//! width = 4
//! blocks = [[1, 2, 3, 4], [5, 6, 7, 8]]
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use minnow_core::{Element, MinnowSink};
use minnow_groups::GroupsExt;

/// Root of a pack manifest. Headers are written first, then groups in order.
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub headers: Vec<HeaderSpec>,

    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HeaderSpec {
    Text { value: String },
    Int64 { values: Vec<i64> },
    Float64 { values: Vec<f64> },
}

#[derive(Debug, Deserialize)]
pub struct GroupSpec {
    pub kind: GroupKind,
    /// Elements per block.
    pub width: usize,
    #[serde(default)]
    pub blocks: Vec<Vec<Number>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Int64,
    Int32,
    Int16,
    Int8,
    Uint64,
    Uint32,
    Uint16,
    Uint8,
    Float64,
    Float32,
    /// Bit-packed int64 blocks.
    Int,
}

/// A TOML number, kept exact until the group's element type is known.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// Conversion from a manifest number into a block element.
trait FromNumber: Element {
    fn from_number(n: Number) -> Option<Self>;
}

macro_rules! int_from_number {
    ($($ty:ty),*) => {$(
        impl FromNumber for $ty {
            fn from_number(n: Number) -> Option<Self> {
                match n {
                    Number::Int(i) => <$ty>::try_from(i).ok(),
                    Number::Float(_) => None,
                }
            }
        }
    )*};
}

int_from_number!(i64, i32, i16, i8, u64, u32, u16, u8);

impl FromNumber for f64 {
    fn from_number(n: Number) -> Option<Self> {
        Some(match n {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        })
    }
}

impl FromNumber for f32 {
    fn from_number(n: Number) -> Option<Self> {
        Some(match n {
            Number::Int(i) => i as f32,
            Number::Float(f) => f as f32,
        })
    }
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML manifest")
    }

    /// Write every header and group onto `sink`.
    pub fn write_to<S: MinnowSink>(&self, sink: &mut S) -> Result<()> {
        for (i, header) in self.headers.iter().enumerate() {
            let result = match header {
                HeaderSpec::Text { value } => sink.write_header(value.as_str()),
                HeaderSpec::Int64 { values } => sink.write_header(values),
                HeaderSpec::Float64 { values } => sink.write_header(values),
            };
            result.with_context(|| format!("writing header {}", i))?;
        }
        for (i, group) in self.groups.iter().enumerate() {
            group
                .write_to(sink)
                .with_context(|| format!("writing group {} ({:?})", i, group.kind))?;
        }
        Ok(())
    }
}

impl GroupSpec {
    fn write_to<S: MinnowSink>(&self, sink: &mut S) -> Result<()> {
        match self.kind {
            GroupKind::Int64 => self.write_fixed::<i64, S>(sink),
            GroupKind::Int32 => self.write_fixed::<i32, S>(sink),
            GroupKind::Int16 => self.write_fixed::<i16, S>(sink),
            GroupKind::Int8 => self.write_fixed::<i8, S>(sink),
            GroupKind::Uint64 => self.write_fixed::<u64, S>(sink),
            GroupKind::Uint32 => self.write_fixed::<u32, S>(sink),
            GroupKind::Uint16 => self.write_fixed::<u16, S>(sink),
            GroupKind::Uint8 => self.write_fixed::<u8, S>(sink),
            GroupKind::Float64 => self.write_fixed::<f64, S>(sink),
            GroupKind::Float32 => self.write_fixed::<f32, S>(sink),
            GroupKind::Int => {
                sink.int_group(self.width)?;
                self.write_blocks::<i64, S>(sink)
            }
        }
    }

    fn write_fixed<T: FromNumber, S: MinnowSink>(&self, sink: &mut S) -> Result<()> {
        sink.fixed_group::<T>(self.width)?;
        self.write_blocks::<T, S>(sink)
    }

    fn write_blocks<T: FromNumber, S: MinnowSink>(&self, sink: &mut S) -> Result<()> {
        for (b, block) in self.blocks.iter().enumerate() {
            let values = convert::<T>(block).with_context(|| format!("block {}", b))?;
            sink.write_data(T::to_block(&values))
                .with_context(|| format!("block {}", b))?;
        }
        Ok(())
    }
}

fn convert<T: FromNumber>(block: &[Number]) -> Result<Vec<T>> {
    block
        .iter()
        .enumerate()
        .map(|(i, &n)| match T::from_number(n) {
            Some(v) => Ok(v),
            None => bail!("element {} ({:?}) does not fit in {}", i, n, T::KIND),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use minnow_core::{Reader, Values, Writer};
    use minnow_groups::decoder_for;

    const SAMPLE: &str = r#"
        [[headers]]
        kind = "text"
        value = "run-7"

        [[headers]]
        kind = "float64"
        values = [0.5, 2]

        [[groups]]
        kind = "int64"
        width = 2
        blocks = [[1, 2], [3, 4]]

        [[groups]]
        kind = "float32"
        width = 1
        blocks = [[1.5], [2]]

        [[groups]]
        kind = "int"
        width = 3
        blocks = [[100, 90, 80]]
    "#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_str(SAMPLE).unwrap();
        assert_eq!(manifest.headers.len(), 2);
        assert_eq!(manifest.groups.len(), 3);
        assert_eq!(manifest.groups[0].kind, GroupKind::Int64);
        assert_eq!(manifest.groups[1].blocks[1], vec![Number::Int(2)]);
        assert_eq!(manifest.groups[2].kind, GroupKind::Int);
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::from_str("").unwrap();
        assert!(manifest.headers.is_empty());
        assert!(manifest.groups.is_empty());
    }

    #[test]
    fn test_pack_round_trip() {
        let manifest = Manifest::from_str(SAMPLE).unwrap();
        let mut w = Writer::new(Cursor::new(Vec::new())).unwrap();
        manifest.write_to(&mut w).unwrap();
        let (header, out) = w.finish().unwrap();
        assert_eq!(header.header_count, 2);
        assert_eq!(header.block_count, 5);

        let mut r = Reader::new(Cursor::new(out.into_inner())).unwrap();
        assert_eq!(r.read_header(0).unwrap(), b"run-7");
        let data = r.read_group_data(1).unwrap();
        let decoder = decoder_for(r.group_type(1).unwrap(), &[], r.block_count()).unwrap();
        assert_eq!(decoder.decode(&data).unwrap(), Values::F32(vec![1.5, 2.0]));
    }

    #[test]
    fn test_out_of_range_number_is_reported() {
        let manifest = Manifest::from_str(
            r#"
            [[groups]]
            kind = "uint8"
            width = 2
            blocks = [[1, 300]]
            "#,
        )
        .unwrap();
        let mut w = Writer::new(Cursor::new(Vec::new())).unwrap();
        let err = manifest.write_to(&mut w).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("300") && chain.contains("uint8"), "got: {chain}");
    }

    #[test]
    fn test_width_mismatch_is_reported() {
        let manifest = Manifest::from_str(
            r#"
            [[groups]]
            kind = "int16"
            width = 3
            blocks = [[1, 2]]
            "#,
        )
        .unwrap();
        let mut w = Writer::new(Cursor::new(Vec::new())).unwrap();
        let err = manifest.write_to(&mut w).unwrap_err();
        assert!(format!("{:#}", err).contains("encoding error"));
    }
}
