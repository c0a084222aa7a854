//! Control blocks.
//!
//! A block carries the shared count of one ownership group and knows how to
//! destroy the object it owns. Handles only ever see `dyn ControlBlock`, so the
//! allocation strategy of the object is erased at construction time.

use std::{
    alloc::{self, Layout},
    cell::Cell,
    mem::{self, MaybeUninit},
    process,
    ptr::{self, NonNull},
};

use log::trace;

use crate::{
    error::AllocError,
    stats::{self, BlockKind},
};

pub(crate) trait ControlBlock
{
    /// Number of live handles sharing this block.
    fn count(&self) -> &Cell<usize>;

    fn kind(&self) -> BlockKind;

    /// Destroys the owned object without freeing the block.
    ///
    /// # Safety
    ///
    /// Must be called at most once, and only when no handle can reach the
    /// object any more.
    unsafe fn destroy_object(&mut self);
}

pub(crate) type BlockPtr = NonNull<dyn ControlBlock>;

/// Block owning a separately boxed object.
pub(crate) struct SeparateBlock<U: ?Sized>
{
    count: Cell<usize>,
    object: NonNull<U>,
}

impl<U: ?Sized> ControlBlock for SeparateBlock<U>
{
    fn count(&self) -> &Cell<usize> { &self.count }

    fn kind(&self) -> BlockKind { BlockKind::Separate }

    unsafe fn destroy_object(&mut self) { mem::drop(Box::from_raw(self.object.as_ptr())) }
}

/// Block storing its object inline, one allocation per ownership group.
#[repr(C)]
pub(crate) struct InlineBlock<T>
{
    count: Cell<usize>,
    data: MaybeUninit<T>,
}

impl<T> ControlBlock for InlineBlock<T>
{
    fn count(&self) -> &Cell<usize> { &self.count }

    fn kind(&self) -> BlockKind { BlockKind::Combined }

    unsafe fn destroy_object(&mut self) { self.data.assume_init_drop() }
}

unsafe fn allocate<B>() -> Result<NonNull<B>, AllocError>
{
    let layout = Layout::new::<B>();
    NonNull::new(alloc::alloc(layout).cast::<B>()).ok_or(AllocError::new(layout))
}

fn erase<B: ControlBlock + 'static>(block: NonNull<B>) -> BlockPtr
{
    let raw: *mut dyn ControlBlock = block.as_ptr();
    unsafe { NonNull::new_unchecked(raw) }
}

/// Deallocates raw block storage if initialisation unwinds.
struct UnwindGuard
{
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Drop for UnwindGuard
{
    fn drop(&mut self) { unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) } }
}

/// Puts `object` under a fresh separate block with a count of one.
///
/// On failure `object` is dropped and nothing else happens.
pub(crate) fn wrap<U: ?Sized + 'static>(object: Box<U>)
    -> Result<(NonNull<U>, BlockPtr), AllocError>
{
    let block = unsafe { allocate::<SeparateBlock<U>>()? };
    let object = unsafe { NonNull::new_unchecked(Box::into_raw(object)) };
    unsafe {
        block.as_ptr().write(SeparateBlock {
            count: Cell::new(1),
            object,
        });
    }

    let bytes = mem::size_of::<SeparateBlock<U>>();
    trace!("allocated separate block {:p} ({} bytes)", block, bytes);
    stats::record_allocated(BlockKind::Separate, bytes);
    Ok((object, erase(block)))
}

/// Allocates a combined block and constructs its object in place from `init`.
///
/// `init` runs exactly once, after the allocation succeeded. If it panics the
/// storage is released and no destructor runs.
pub(crate) fn emplace<T: 'static>(init: impl FnOnce() -> T)
    -> Result<(NonNull<T>, BlockPtr), AllocError>
{
    let block = unsafe { allocate::<InlineBlock<T>>()? };
    let guard = UnwindGuard {
        ptr: block.cast(),
        layout: Layout::new::<InlineBlock<T>>(),
    };

    let object = unsafe {
        let raw = block.as_ptr();
        ptr::addr_of_mut!((*raw).count).write(Cell::new(1));
        let data = ptr::addr_of_mut!((*raw).data).cast::<T>();
        data.write(init());
        NonNull::new_unchecked(data)
    };
    mem::forget(guard);

    let bytes = mem::size_of::<InlineBlock<T>>();
    trace!("allocated combined block {:p} ({} bytes)", block, bytes);
    stats::record_allocated(BlockKind::Combined, bytes);
    Ok((object, erase(block)))
}

/// Adds one handle to the group.
///
/// # Safety
///
/// `block` must be live.
pub(crate) unsafe fn retain(block: BlockPtr)
{
    let count = block.as_ref().count();
    match count.get().checked_add(1) {
        Some(n) => count.set(n),
        None => process::abort(),
    }
}

/// Removes one handle from the group, destroying the object and freeing the
/// block when it was the last one.
///
/// # Safety
///
/// `block` must be live and the caller must give up the handle it releases.
pub(crate) unsafe fn release(block: BlockPtr)
{
    let count = block.as_ref().count();
    let n = count.get() - 1;
    count.set(n);
    if n == 0 {
        free(block)
    }
}

/// Reads the count of a live block.
pub(crate) unsafe fn count_of(block: BlockPtr) -> usize { block.as_ref().count().get() }

#[cold]
unsafe fn free(mut block: BlockPtr)
{
    struct Dealloc
    {
        block: BlockPtr,
        kind: BlockKind,
        bytes: usize,
    }

    // Runs even if the object's destructor panics.
    impl Drop for Dealloc
    {
        fn drop(&mut self)
        {
            unsafe { mem::drop(Box::from_raw(self.block.as_ptr())) }
            trace!("released {:?} block {:p}", self.kind, self.block);
            stats::record_released(self.kind, self.bytes);
        }
    }

    let kind = block.as_ref().kind();
    let bytes = mem::size_of_val(block.as_ref());
    let dealloc = Dealloc { block, kind, bytes };

    block.as_mut().destroy_object();
    trace!("destroyed object of {:?} block {:p}", kind, block);
    stats::record_destroyed(kind);
    mem::drop(dealloc);
}

#[cfg(test)]
mod tests
{
    use std::{
        cell::Cell,
        panic::{self, AssertUnwindSafe},
        rc::Rc,
    };

    use super::*;
    use crate::stats::thread_local_stats;

    struct DropIncrementer(Rc<Cell<i32>>);
    impl Drop for DropIncrementer
    {
        fn drop(&mut self) { self.0.set(self.0.get() + 1); }
    }

    #[test]
    fn last_release_destroys_once()
    {
        let before = thread_local_stats();
        let drops = Rc::new(Cell::new(0));

        let (_, block) = wrap(Box::new(DropIncrementer(drops.clone()))).unwrap();
        unsafe {
            assert_eq!(count_of(block), 1);
            retain(block);
            assert_eq!(count_of(block), 2);
            release(block);
            assert_eq!(drops.get(), 0);
            release(block);
        }
        assert_eq!(drops.get(), 1);

        let delta = thread_local_stats().since(&before);
        assert_eq!(delta.separate.allocated, 1);
        assert_eq!(delta.separate.destroyed, 1);
        assert_eq!(delta.separate.released, 1);
    }

    #[test]
    fn combined_block_holds_object_inline()
    {
        let (object, block) = emplace(|| (5u32, 7u64)).unwrap();
        unsafe {
            assert_eq!(*object.as_ref(), (5, 7));
            let start = block.as_ptr() as *const u8 as usize;
            let end = start + mem::size_of_val(block.as_ref());
            let at = object.as_ptr() as usize;
            assert!(start < at && at < end);
            release(block);
        }
    }

    #[test]
    fn panicking_initializer_frees_storage()
    {
        let before = thread_local_stats();
        let calls = Cell::new(0);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            emplace::<DropIncrementer>(|| {
                calls.set(calls.get() + 1);
                panic!("constructor failed")
            })
        }));

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(thread_local_stats().since(&before).live_blocks(), 0);
        assert_eq!(thread_local_stats().since(&before).combined.allocated, 0);
    }

    #[test]
    fn panicking_destructor_still_releases_block()
    {
        struct Bomb;
        impl Drop for Bomb
        {
            fn drop(&mut self) { panic!("destructor failed") }
        }

        let before = thread_local_stats();
        let (_, block) = emplace(|| Bomb).unwrap();
        let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe { release(block) }));

        assert!(result.is_err());
        let delta = thread_local_stats().since(&before);
        assert_eq!(delta.combined.allocated, 1);
        assert_eq!(delta.combined.released, 1);
    }
}
