//! Single-threaded shared ownership with aliasing.
//!
//! [`Shared<T>`] is a reference-counted handle to a heap object, destroyed
//! exactly when the last handle of its ownership group goes away. It differs
//! from `std::rc::Rc` in a few ways that matter when porting code written
//! around manual memory management:
//!
//! - a handle can be empty;
//! - what a handle presents (its _view_) is stored apart from the control block
//!   that owns the object, so a handle can present a field of the object, or
//!   the object as a trait object, while keeping the whole allocation alive;
//! - objects can either be moved into a combined block holding count and object
//!   in one allocation ([`Shared::new`]), or adopted from an existing `Box`
//!   ([`Shared::from_box`]);
//! - types embedding a [`SelfLink`] can produce handles to themselves through
//!   [`SharedFromThis`].
//!
//! ```
//! use sharedptr::Shared;
//!
//! struct Point
//! {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let point = Shared::new(Point { x: 5, y: 7 });
//! let y = Shared::project(&point, |p| &p.y);
//! assert_eq!(Shared::use_count(&point), 2);
//!
//! drop(point);
//! assert_eq!(*y, 7);
//! ```
//!
//! Counting is plain arithmetic; handles cannot leave the thread they were
//! created on.
//!
//! Caveat: self-links are full handles, not weak ones. See [`link`].

pub(crate) mod block;
pub mod axioms;
pub mod error;
pub mod link;
pub mod shared;
pub mod stats;


pub use axioms::Axioms;
pub use error::AllocError;
pub use link::{SelfLink, SharedFromThis};
pub use shared::Shared;
#[cfg(feature = "global")]
pub use stats::global_stats;
pub use stats::{thread_local_stats, BlockKind, Stats, Tally};
