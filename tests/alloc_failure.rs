use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
    ptr,
};

use sharedptr::{thread_local_stats, AllocError, Shared};

/// System allocator that can be told to refuse the next allocation made on
/// the current thread.
struct Flaky;

thread_local! {
    static FAIL_NEXT: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for Flaky
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8
    {
        if FAIL_NEXT.with(|f| f.replace(false)) {
            ptr::null_mut()
        } else {
            System.alloc(layout)
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) { System.dealloc(ptr, layout) }
}

#[global_allocator]
static GLOBAL: Flaky = Flaky;

fn fail_next_allocation() { FAIL_NEXT.with(|f| f.set(true)) }

#[test]
fn failed_allocation_has_no_side_effects()
{
    let before = thread_local_stats();

    fail_next_allocation();
    let calls = Cell::new(0);
    let err = Shared::try_new_with(|| {
        calls.set(calls.get() + 1);
        [7u64; 4]
    })
    .unwrap_err();
    assert_eq!(calls.get(), 0);
    assert!(err.layout().size() >= 32);
    assert!(err.to_string().starts_with("failed to allocate control block"));

    let boxed = Box::new(5u32);
    fail_next_allocation();
    let err: AllocError = Shared::try_from_box(boxed).unwrap_err();
    assert!(err.layout().size() > 0);

    let mut h = Shared::new(1u32);
    let keep = h.clone();
    let replacement = Box::new(2u32);
    fail_next_allocation();
    assert!(Shared::try_reset_to(&mut h, replacement).is_err());
    assert_eq!(*h, 1);
    assert_eq!(Shared::use_count(&keep), 2);

    drop((h, keep));
    assert_eq!(thread_local_stats().since(&before).live_blocks(), 0);
}
