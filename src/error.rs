use std::{alloc::Layout, error, fmt};

/// The global allocator refused to provide storage for a control block.
///
/// Returned by the `try_*` constructors. Nothing has been allocated and no
/// handle has been touched when this is reported.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocError
{
    layout: Layout,
}

impl AllocError
{
    pub(crate) fn new(layout: Layout) -> Self { Self { layout } }

    /// Layout of the block that could not be allocated.
    pub fn layout(&self) -> Layout { self.layout }
}

impl fmt::Debug for AllocError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("AllocError")
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

impl fmt::Display for AllocError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "failed to allocate control block of {} bytes (align {})",
            self.layout.size(),
            self.layout.align()
        )
    }
}

impl error::Error for AllocError {}
