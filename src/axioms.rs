/// Simple axiomatic model of one ownership group.
///
/// The safety argument of `Shared` can be stated in terms of how each handle
/// operation changes a handful of counters of its group. Each operation below
/// is an axiom: it asserts the state it may be applied in and returns the state
/// it leaves behind, so a sequence of calls is a proof that the sequence never
/// frees twice or frees while reachable.
///
/// The crate tests replay every short operation sequence against both this
/// model and real handles.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Axioms
{
    /// Live handles of the group, aliases and the back-link included. This is
    /// the count stored in the control block.
    pub handles: usize,

    /// Whether the object holds a back-link to itself.
    pub linked: bool,

    /// Number of times the object has been destroyed.
    pub destroyed: usize,

    /// Number of times the block has been deallocated.
    pub released: usize,
}

impl Axioms
{
    /// Nothing allocated yet.
    ///
    /// ```text
    /// Self { handles: 0, linked: false, destroyed: 0, released: 0 }
    /// ```
    pub fn unallocated() -> Self
    {
        Self {
            handles: 0,
            linked: false,
            destroyed: 0,
            released: 0,
        }
    }

    /// Wrapping a box or allocating a combined block creates the block with
    /// exactly one handle.
    ///
    /// ```text
    /// assert_eq!(self, Self::unallocated());
    /// self.handles = 1;
    /// ```
    ///
    /// Sequencing property:
    ///
    /// ```
    /// sharedptr::Axioms::unallocated().wrap().reset().freed();
    /// ```
    pub fn wrap(mut self) -> Self
    {
        assert_eq!(self, Self::unallocated());
        self.handles = 1;
        self
    }

    /// Cloning a live handle adds one to the count.
    ///
    /// ```text
    /// assert!(self.reachable());
    /// self.handles += 1;
    /// ```
    pub fn copy(mut self) -> Self
    {
        assert!(self.reachable());
        self.handles += 1;
        self
    }

    /// An aliased handle is a copy that presents something else; the count
    /// does not care what a handle presents.
    pub fn alias(self) -> Self { self.copy() }

    /// Moving a handle out leaves an empty one behind and the count untouched.
    ///
    /// ```text
    /// assert!(self.reachable());
    /// ```
    pub fn take(self) -> Self
    {
        assert!(self.reachable());
        self
    }

    /// Resetting a live external handle removes one from the count. Reaching
    /// zero destroys the object, then frees the block, each for the first and
    /// only time.
    ///
    /// ```text
    /// assert!(self.reachable());
    /// self.handles -= 1;
    /// if self.handles == 0 {
    ///     assert_eq!(self.destroyed + self.released, 0);
    ///     self.destroyed += 1;
    ///     self.released += 1;
    /// }
    /// ```
    ///
    /// Sequencing property:
    ///
    /// ```
    /// sharedptr::Axioms::unallocated()
    ///     .wrap()
    ///     .copy()
    ///     .alias()
    ///     .reset()
    ///     .take()
    ///     .reset()
    ///     .reset()
    ///     .freed();
    /// ```
    pub fn reset(mut self) -> Self
    {
        assert!(self.reachable());
        self.handles -= 1;
        if self.handles == 0 {
            assert_eq!(self.destroyed + self.released, 0);
            self.destroyed += 1;
            self.released += 1;
        }
        self
    }

    /// Linking stores one more handle inside the object itself.
    ///
    /// ```text
    /// assert!(self.reachable() && !self.linked);
    /// self.handles += 1;
    /// self.linked = true;
    /// ```
    pub fn link(mut self) -> Self
    {
        assert!(self.reachable() && !self.linked);
        self.handles += 1;
        self.linked = true;
        self
    }

    /// Unlinking can only be done through a reachable object, so it never
    /// drops the last handle.
    ///
    /// ```text
    /// assert!(self.reachable() && self.linked);
    /// self.handles -= 1;
    /// self.linked = false;
    /// ```
    ///
    /// Sequencing property:
    ///
    /// ```
    /// sharedptr::Axioms::unallocated()
    ///     .wrap()
    ///     .link()
    ///     .unlink()
    ///     .reset()
    ///     .freed();
    /// ```
    pub fn unlink(mut self) -> Self
    {
        assert!(self.reachable() && self.linked);
        self.handles -= 1;
        self.linked = false;
        self
    }

    /// Number of handles user code can still reach the object through.
    pub fn external(&self) -> usize { self.handles - self.linked as usize }

    /// Whether some user-held handle still reaches the object.
    pub fn reachable(&self) -> bool { self.external() > 0 }

    /// The group is gone: destroyed once, released once.
    pub fn freed(self)
    {
        assert_eq!(self.handles, 0);
        assert_eq!(self.destroyed, 1);
        assert_eq!(self.released, 1);
    }

    /// The group is unreachable but still allocated.
    pub fn leaked(self)
    {
        assert!(!self.reachable());
        assert!(self.handles > 0);
        assert_eq!(self.destroyed + self.released, 0);
    }

    /// With these axioms we can show that the last of any number of copies
    /// frees the group exactly once:
    ///
    /// ```text
    /// Self::unallocated()
    ///     .wrap()
    ///     .copy()
    ///     .alias()
    ///     .reset()
    ///     .reset()
    ///     .reset()
    ///     .freed()
    /// ```
    ///
    /// Proof: the following doctest passes
    ///
    /// ```
    /// sharedptr::Axioms::drop_last()
    /// ```
    pub fn drop_last()
    {
        Self::unallocated()
            .wrap()
            .copy()
            .alias()
            .reset()
            .reset()
            .reset()
            .freed()
    }

    /// And that a linked object dropped by every user is never freed:
    ///
    /// ```
    /// sharedptr::Axioms::self_reference_leaks()
    /// ```
    pub fn self_reference_leaks() { Self::unallocated().wrap().link().reset().leaked() }
}
