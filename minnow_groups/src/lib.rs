pub mod bit;
mod decode;
mod ext;
mod fixed;
mod int_group;

pub use decode::{decoder_for, GroupDecoder};
pub use ext::GroupsExt;
pub use fixed::{FixedWidthDecoder, FixedWidthGroup, Int64Group};
pub use int_group::{IntGroup, IntGroupDecoder};
