use std::fmt;

use crate::format::{
    GROUP_FLOAT32, GROUP_FLOAT64, GROUP_INT16, GROUP_INT32, GROUP_INT64, GROUP_INT8, GROUP_UINT16,
    GROUP_UINT32, GROUP_UINT64, GROUP_UINT8,
};

/// Numeric element types a block can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    I64,
    I32,
    I16,
    I8,
    U64,
    U32,
    U16,
    U8,
    F64,
    F32,
}

impl ElementKind {
    pub const ALL: [ElementKind; 10] = [
        ElementKind::I64,
        ElementKind::I32,
        ElementKind::I16,
        ElementKind::I8,
        ElementKind::U64,
        ElementKind::U32,
        ElementKind::U16,
        ElementKind::U8,
        ElementKind::F64,
        ElementKind::F32,
    ];

    /// Encoded width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            ElementKind::I64 | ElementKind::U64 | ElementKind::F64 => 8,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::I8 | ElementKind::U8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::I64 => "int64",
            ElementKind::I32 => "int32",
            ElementKind::I16 => "int16",
            ElementKind::I8 => "int8",
            ElementKind::U64 => "uint64",
            ElementKind::U32 => "uint32",
            ElementKind::U16 => "uint16",
            ElementKind::U8 => "uint8",
            ElementKind::F64 => "float64",
            ElementKind::F32 => "float32",
        }
    }

    /// Tag of the fixed-width group storing this element type.
    pub fn group_type(self) -> u64 {
        match self {
            ElementKind::I64 => GROUP_INT64,
            ElementKind::I32 => GROUP_INT32,
            ElementKind::I16 => GROUP_INT16,
            ElementKind::I8 => GROUP_INT8,
            ElementKind::U64 => GROUP_UINT64,
            ElementKind::U32 => GROUP_UINT32,
            ElementKind::U16 => GROUP_UINT16,
            ElementKind::U8 => GROUP_UINT8,
            ElementKind::F64 => GROUP_FLOAT64,
            ElementKind::F32 => GROUP_FLOAT32,
        }
    }

    pub fn from_group_type(tag: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.group_type() == tag)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive that can be stored little-endian inside a block.
pub trait Element: Copy + PartialOrd + fmt::Debug + fmt::Display + 'static {
    const KIND: ElementKind;

    fn put_le(self, out: &mut Vec<u8>);

    /// Decode from exactly `KIND.width()` bytes.
    fn get_le(bytes: &[u8]) -> Self;

    /// Borrow the elements of `block` if it carries this type.
    fn from_block<'a>(block: &Block<'a>) -> Option<&'a [Self]>;

    /// Wrap a slice of this type as a block.
    fn to_block(values: &[Self]) -> Block<'_>;

    fn into_values(values: Vec<Self>) -> Values;
}

macro_rules! elements {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        /// One data block handed to a group: a borrowed run of typed elements.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum Block<'a> {
            $($variant(&'a [$ty]),)*
        }

        impl Block<'_> {
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(Block::$variant(_) => ElementKind::$variant,)*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(Block::$variant(s) => s.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        /// Owned, decoded elements of one or more blocks.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Values {
            $($variant(Vec<$ty>),)*
        }

        impl Values {
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(Values::$variant(_) => ElementKind::$variant,)*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(Values::$variant(v) => v.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn as_block(&self) -> Block<'_> {
                match self {
                    $(Values::$variant(v) => Block::$variant(v),)*
                }
            }

            /// Render every element with its `Display` impl.
            pub fn to_strings(&self) -> Vec<String> {
                match self {
                    $(Values::$variant(v) => v.iter().map(|x| x.to_string()).collect(),)*
                }
            }
        }

        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$variant;

                fn put_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn get_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }

                fn from_block<'a>(block: &Block<'a>) -> Option<&'a [Self]> {
                    match *block {
                        Block::$variant(s) => Some(s),
                        _ => None,
                    }
                }

                fn to_block(values: &[Self]) -> Block<'_> {
                    Block::$variant(values)
                }

                fn into_values(values: Vec<Self>) -> Values {
                    Values::$variant(values)
                }
            }

            impl<'a> From<&'a [$ty]> for Block<'a> {
                fn from(s: &'a [$ty]) -> Self {
                    Block::$variant(s)
                }
            }

            impl<'a, const N: usize> From<&'a [$ty; N]> for Block<'a> {
                fn from(s: &'a [$ty; N]) -> Self {
                    Block::$variant(s.as_slice())
                }
            }

            impl<'a> From<&'a Vec<$ty>> for Block<'a> {
                fn from(s: &'a Vec<$ty>) -> Self {
                    Block::$variant(s.as_slice())
                }
            }
        )*
    };
}

elements! {
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
    u64 => U64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
    f64 => F64,
    f32 => F32,
}

/// A fixed-layout record written verbatim as a header block.
///
/// Implemented for strings and numeric sequences; callers implement it for
/// their own structs by appending each field little-endian.
pub trait HeaderRecord {
    fn encode(&self, out: &mut Vec<u8>);
}

impl HeaderRecord for str {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl<T: Element> HeaderRecord for [T] {
    fn encode(&self, out: &mut Vec<u8>) {
        for &x in self {
            x.put_le(out);
        }
    }
}

impl<T: Element, const N: usize> HeaderRecord for [T; N] {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out);
    }
}

impl<T: Element> HeaderRecord for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_type_round_trips_through_kind() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_group_type(kind.group_type()), Some(kind));
        }
        assert_eq!(ElementKind::from_group_type(crate::format::GROUP_INT), None);
    }

    #[test]
    fn test_block_conversions_keep_type() {
        let block: Block = (&[1i64, 2, 3]).into();
        assert_eq!(block.kind(), ElementKind::I64);
        assert_eq!(block.len(), 3);
        assert_eq!(i64::from_block(&block), Some(&[1i64, 2, 3][..]));
        assert_eq!(f32::from_block(&block), None);

        let floats = vec![0.5f32; 4];
        let block = Block::from(&floats);
        assert_eq!(block.kind(), ElementKind::F32);
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn test_header_record_encoding() {
        let mut out = Vec::new();
        [1u16, 0x0203].encode(&mut out);
        "ab".encode(&mut out);
        assert_eq!(out, vec![1, 0, 3, 2, b'a', b'b']);
    }

    #[test]
    fn test_values_render() {
        let values = Values::I16(vec![-1, 7]);
        assert_eq!(values.to_strings(), vec!["-1", "7"]);
        assert_eq!(values.as_block().kind(), ElementKind::I16);
    }
}
