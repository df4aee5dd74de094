pub mod error;
pub mod format;
pub mod group;
pub mod reader;
pub mod stream;
pub mod value;
pub mod writer;

pub use error::{MinnowError, Result, UsageError};
pub use format::{FileHeader, TailIndex, FILE_HEADER_SIZE, MAGIC, VERSION};
pub use group::Group;
pub use reader::Reader;
pub use stream::StreamWriter;
pub use value::{Block, Element, ElementKind, HeaderRecord, Values};
pub use writer::{MinnowSink, Writer};
