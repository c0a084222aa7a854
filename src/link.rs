//! Handles to self.
//!
//! A type opts in by embedding a [`SelfLink`] and implementing
//! [`SharedFromThis`]. The `*_linked` constructors of [`Shared`] then store a
//! copy of the new handle inside the object, and `shared_from_this` hands out
//! further copies of it.
//!
//! The stored handle is a full share of the object. An object that has been
//! linked therefore keeps itself alive after every external handle is gone,
//! until [`SelfLink::unlink`] is called while it is still reachable.
//!
//! ```
//! use sharedptr::{SelfLink, Shared, SharedFromThis};
//!
//! struct Node
//! {
//!     link: SelfLink<Node>,
//!     label: &'static str,
//! }
//!
//! impl SharedFromThis for Node
//! {
//!     fn self_link(&self) -> &SelfLink<Self> { &self.link }
//! }
//!
//! let node = Shared::new_linked(Node { link: SelfLink::new(), label: "a" });
//! let again = node.shared_from_this();
//!
//! assert!(again == node);
//! assert_eq!(again.label, "a");
//! assert_eq!(Shared::use_count(&node), 3);
//!
//! node.link.unlink();
//! assert_eq!(Shared::use_count(&node), 2);
//! ```

use std::{cell::RefCell, fmt};

use log::debug;

use crate::{error::AllocError, shared::Shared};

/// Back-link slot embedded in an object that can produce handles to itself.
pub struct SelfLink<T: ?Sized>
{
    this: RefCell<Shared<T>>,
}

impl<T: ?Sized> SelfLink<T>
{
    /// An unbound link. `get` returns empty handles until the owning object
    /// is put under a `Shared` by one of the linking constructors.
    pub const fn new() -> Self
    {
        SelfLink {
            this: RefCell::new(Shared::empty()),
        }
    }

    /// A new handle to the object holding this link, empty if it was never
    /// linked or has been unlinked.
    pub fn get(&self) -> Shared<T> { self.this.borrow().clone() }

    /// Whether a handle is currently stored in this link.
    pub fn is_linked(&self) -> bool { Shared::is_some(&self.this.borrow()) }

    /// Drops the stored handle, so that the object no longer keeps itself
    /// alive.
    pub fn unlink(&self)
    {
        let this = self.this.replace(Shared::empty());
        if Shared::is_some(&this) {
            debug!("unlinked {:p}", this);
        }
    }

    fn install(&self, handle: &Shared<T>)
    {
        let previous = self.this.replace(handle.clone());
        debug!("linked {:p}", handle);
        drop(previous);
    }
}

impl<T: ?Sized> Default for SelfLink<T>
{
    fn default() -> Self { Self::new() }
}

impl<T: ?Sized> fmt::Debug for SelfLink<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("SelfLink")
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Capability of minting handles to `self`.
pub trait SharedFromThis: 'static
{
    /// The link slot embedded in `self`.
    fn self_link(&self) -> &SelfLink<Self>;

    /// A new handle to `self`, sharing the group `self` is owned by.
    ///
    /// Empty if `self` was not built through a linking constructor.
    fn shared_from_this(&self) -> Shared<Self> { self.self_link().get() }
}

impl<T: SharedFromThis + ?Sized> Shared<T>
{
    fn linked(self) -> Self
    {
        if let Some(object) = Shared::get(&self) {
            object.self_link().install(&self);
        }
        self
    }

    /// `from_box`, then links the object to the new handle.
    pub fn from_box_linked(value: Box<T>) -> Self { Self::from_box(value).linked() }

    /// Fallible `from_box_linked`.
    pub fn try_from_box_linked(value: Box<T>) -> Result<Self, AllocError>
    {
        Ok(Self::try_from_box(value)?.linked())
    }

    /// `reset_to`, then links the new object.
    pub fn reset_to_linked(this: &mut Self, value: Box<T>) { *this = Self::from_box_linked(value) }
}

impl<T: SharedFromThis> Shared<T>
{
    /// `new`, then links the object to the new handle.
    pub fn new_linked(value: T) -> Self { Self::new(value).linked() }

    /// `new_with`, then links the object to the new handle.
    pub fn new_linked_with(init: impl FnOnce() -> T) -> Self { Self::new_with(init).linked() }

    /// Fallible `new_linked`.
    pub fn try_new_linked(value: T) -> Result<Self, AllocError>
    {
        Ok(Self::try_new(value)?.linked())
    }

    /// Fallible `new_linked_with`; `init` is not called if the block cannot be
    /// allocated.
    pub fn try_new_linked_with(init: impl FnOnce() -> T) -> Result<Self, AllocError>
    {
        Ok(Self::try_new_with(init)?.linked())
    }
}

#[cfg(test)]
mod tests
{
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::stats::thread_local_stats;

    struct Widget
    {
        link: SelfLink<Widget>,
        drops: Rc<Cell<i32>>,
    }

    impl Widget
    {
        fn new(drops: &Rc<Cell<i32>>) -> Self
        {
            Widget {
                link: SelfLink::new(),
                drops: drops.clone(),
            }
        }
    }

    impl Drop for Widget
    {
        fn drop(&mut self) { self.drops.set(self.drops.get() + 1) }
    }

    impl SharedFromThis for Widget
    {
        fn self_link(&self) -> &SelfLink<Self> { &self.link }
    }

    #[test]
    fn linked_wrap_mints_handles_to_self()
    {
        let drops = Rc::new(Cell::new(0));
        let h = Shared::from_box_linked(Box::new(Widget::new(&drops)));
        let before = Shared::use_count(&h);

        let h2 = h.shared_from_this();

        assert_eq!(Shared::as_ptr(&h2), Shared::as_ptr(&h));
        assert_eq!(Shared::use_count(&h), before + 1);
        assert!(Shared::same_owner(&h, &h2));
    }

    #[test]
    fn combined_allocation_links_too()
    {
        let drops = Rc::new(Cell::new(0));
        let h = Shared::new_linked_with(|| Widget::new(&drops));
        assert!(h.link.is_linked());
        assert!(h.shared_from_this() == h);
    }

    #[test]
    fn fallible_in_place_construction_links()
    {
        let drops = Rc::new(Cell::new(0));
        let calls = Cell::new(0);
        let h = Shared::try_new_linked_with(|| {
            calls.set(calls.get() + 1);
            Widget::new(&drops)
        })
        .unwrap();

        assert_eq!(calls.get(), 1);
        assert!(h.link.is_linked());
        assert_eq!(Shared::use_count(&h), 2);

        h.link.unlink();
        drop(h);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn unbound_object_yields_empty_handle()
    {
        let drops = Rc::new(Cell::new(0));
        let loose = Widget::new(&drops);
        assert!(Shared::is_empty(&loose.shared_from_this()));

        let plain = Shared::new(Widget::new(&drops));
        assert!(Shared::is_empty(&plain.shared_from_this()));
        assert_eq!(Shared::use_count(&plain), 1);
    }

    #[test]
    fn link_keeps_object_alive_until_unlinked()
    {
        let before = thread_local_stats();
        let drops = Rc::new(Cell::new(0));

        let h = Shared::new_linked(Widget::new(&drops));
        let observer = h.clone();
        drop(h);
        assert_eq!(Shared::use_count(&observer), 2);

        observer.link.unlink();
        assert_eq!(Shared::use_count(&observer), 1);
        assert_eq!(drops.get(), 0);

        drop(observer);
        assert_eq!(drops.get(), 1);
        assert_eq!(thread_local_stats().since(&before).live_blocks(), 0);
    }

    #[test]
    fn unreachable_linked_object_leaks()
    {
        let before = thread_local_stats();
        let drops = Rc::new(Cell::new(0));

        drop(Shared::new_linked(Widget::new(&drops)));

        assert_eq!(drops.get(), 0);
        let delta = thread_local_stats().since(&before);
        assert_eq!(delta.live_blocks(), 1);
        assert_eq!(delta.live_objects(), 1);
    }

    #[test]
    fn reset_to_linked_links_the_replacement()
    {
        let drops = Rc::new(Cell::new(0));
        let mut h = Shared::new(Widget::new(&drops));
        Shared::reset_to_linked(&mut h, Box::new(Widget::new(&drops)));

        assert_eq!(drops.get(), 1);
        assert!(h.link.is_linked());
        h.link.unlink();
        drop(h);
        assert_eq!(drops.get(), 2);
    }
}
