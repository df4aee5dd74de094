use minnow_core::{Element, MinnowSink, Result};

use crate::fixed::FixedWidthGroup;
use crate::int_group::IntGroup;

/// Opens the bundled group variants on any writer, wiring in the global index
/// of the group's first block.
pub trait GroupsExt: MinnowSink {
    /// Start a group whose blocks are `width` int64 values.
    fn int64_group(&mut self, width: usize) -> Result<u64> {
        self.fixed_group::<i64>(width)
    }

    /// Start a group whose blocks are `width` values of `T`.
    fn fixed_group<T: Element>(&mut self, width: usize) -> Result<u64> {
        let start = self.block_count();
        self.open_group(Box::new(FixedWidthGroup::<T>::new(start, width)))
    }

    /// Start a bit-packed int64 group with `width` values per block.
    fn int_group(&mut self, width: usize) -> Result<u64> {
        let start = self.block_count();
        self.open_group(Box::new(IntGroup::new(start, width)))
    }
}

impl<S: MinnowSink + ?Sized> GroupsExt for S {}
