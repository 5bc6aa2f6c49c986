//! Condition flags shared by every producer and consumer of the power gate.
//!
//! The register is an enum-indexed array of atomics. Single-flag reads and
//! writes are atomic; there is no atomicity across flags.
//! [`FlagRegister::snapshot`] returns the last known value of each flag, which
//! may have been written by different producers at different instants.

use core::fmt;

use portable_atomic::{AtomicBool, Ordering};

/// Total number of distinct [`Flag`] variants.
pub const FLAG_COUNT: usize = 9;

/// Independent boolean condition contributing to the gating decision.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flag {
    /// System suspend is being prepared; only the shallowest idle is allowed.
    DisabledBySuspend,
    /// Re-derived on every idle entry: shallow idle forced.
    ForceShallow,
    /// Re-derived on every idle entry: medium idle forced.
    ForceMedium,
    /// A consumer needs the full power rail kept up.
    NeedsFullRail,
    /// An external block reported activity.
    ExternalActive,
    /// A debounced clear of [`Flag::ExternalActive`] is pending.
    InactivePending,
    /// A debounced clear of [`Flag::NeedsFullRail`] is pending.
    TopOnCancelPending,
    /// Debounce infrastructure is ready to accept requests.
    WorkInitialized,
    /// The display is on (early suspend not active).
    ScreenOn,
}

/// Every flag in index order.
pub const ALL_FLAGS: [Flag; FLAG_COUNT] = [
    Flag::DisabledBySuspend,
    Flag::ForceShallow,
    Flag::ForceMedium,
    Flag::NeedsFullRail,
    Flag::ExternalActive,
    Flag::InactivePending,
    Flag::TopOnCancelPending,
    Flag::WorkInitialized,
    Flag::ScreenOn,
];

impl Flag {
    /// Deterministic index for lookups into per-flag tables.
    pub const fn as_index(self) -> usize {
        match self {
            Flag::DisabledBySuspend => 0,
            Flag::ForceShallow => 1,
            Flag::ForceMedium => 2,
            Flag::NeedsFullRail => 3,
            Flag::ExternalActive => 4,
            Flag::InactivePending => 5,
            Flag::TopOnCancelPending => 6,
            Flag::WorkInitialized => 7,
            Flag::ScreenOn => 8,
        }
    }

    /// Attempts to construct a [`Flag`] from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < FLAG_COUNT {
            Some(ALL_FLAGS[index])
        } else {
            None
        }
    }

    /// Short kebab-case label used in logs and status output.
    pub const fn name(self) -> &'static str {
        match self {
            Flag::DisabledBySuspend => "disabled-by-suspend",
            Flag::ForceShallow => "force-shallow",
            Flag::ForceMedium => "force-medium",
            Flag::NeedsFullRail => "needs-full-rail",
            Flag::ExternalActive => "external-active",
            Flag::InactivePending => "inactive-pending",
            Flag::TopOnCancelPending => "top-on-cancel-pending",
            Flag::WorkInitialized => "work-initialized",
            Flag::ScreenOn => "screen-on",
        }
    }

    /// Marker flag held asserted while a debounced clear of `self` is pending.
    pub const fn pending_clear_marker(self) -> Option<Flag> {
        match self {
            Flag::ExternalActive => Some(Flag::InactivePending),
            Flag::NeedsFullRail => Some(Flag::TopOnCancelPending),
            _ => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Copyable set of flags used for snapshots and masks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlagSet {
    members: [bool; FLAG_COUNT],
}

impl FlagSet {
    /// Creates a set with no members.
    pub const fn empty() -> Self {
        Self {
            members: [false; FLAG_COUNT],
        }
    }

    /// Builds a set from a list of flags.
    pub const fn of(flags: &[Flag]) -> Self {
        let mut set = Self::empty();
        let mut index = 0;
        while index < flags.len() {
            set.members[flags[index].as_index()] = true;
            index += 1;
        }
        set
    }

    /// Returns a copy of the set with `flag` added.
    #[must_use]
    pub const fn with(mut self, flag: Flag) -> Self {
        self.members[flag.as_index()] = true;
        self
    }

    /// Returns a copy of the set with `flag` removed.
    #[must_use]
    pub const fn without(mut self, flag: Flag) -> Self {
        self.members[flag.as_index()] = false;
        self
    }

    /// Returns `true` when `flag` is a member.
    pub const fn contains(&self, flag: Flag) -> bool {
        self.members[flag.as_index()]
    }

    /// Adds `flag` to the set.
    pub fn insert(&mut self, flag: Flag) {
        self.members[flag.as_index()] = true;
    }

    /// Removes `flag` from the set.
    pub fn remove(&mut self, flag: Flag) {
        self.members[flag.as_index()] = false;
    }

    /// Returns `true` when the sets share at least one member.
    pub fn intersects(&self, other: &FlagSet) -> bool {
        self.members
            .iter()
            .zip(other.members.iter())
            .any(|(left, right)| *left && *right)
    }

    /// Returns `true` when no flag is a member.
    pub fn is_empty(&self) -> bool {
        !self.members.iter().any(|member| *member)
    }

    /// Number of member flags.
    pub fn len(&self) -> usize {
        self.members.iter().filter(|member| **member).count()
    }

    /// Iterates over the member flags in index order.
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        ALL_FLAGS
            .iter()
            .copied()
            .filter(move |flag| self.contains(*flag))
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }

        for (position, flag) in self.iter().enumerate() {
            if position > 0 {
                f.write_str(",")?;
            }
            f.write_str(flag.name())?;
        }
        Ok(())
    }
}

/// Shared register holding the asserted/clear state of every [`Flag`].
///
/// All operations take `&self`; the register is meant to be shared by
/// reference between producers, the deferred-work context, and the idle path.
#[derive(Debug)]
pub struct FlagRegister {
    cells: [AtomicBool; FLAG_COUNT],
    tearing_down: AtomicBool,
}

impl FlagRegister {
    /// Creates a register with every flag clear.
    pub const fn new() -> Self {
        Self {
            cells: [const { AtomicBool::new(false) }; FLAG_COUNT],
            tearing_down: AtomicBool::new(false),
        }
    }

    /// Asserts `flag`, returning `true` when it was previously clear.
    pub fn set(&self, flag: Flag) -> bool {
        !self.cells[flag.as_index()].swap(true, Ordering::AcqRel)
    }

    /// Clears `flag`, returning `true` when it was previously asserted.
    pub fn clear(&self, flag: Flag) -> bool {
        self.cells[flag.as_index()].swap(false, Ordering::AcqRel)
    }

    /// Writes `flag` to the requested level, returning `true` on change.
    pub fn assign(&self, flag: Flag, asserted: bool) -> bool {
        if asserted {
            self.set(flag)
        } else {
            self.clear(flag)
        }
    }

    /// Returns the current level of `flag`.
    pub fn test(&self, flag: Flag) -> bool {
        self.cells[flag.as_index()].load(Ordering::Acquire)
    }

    /// Returns `true` when any flag in `mask` is asserted.
    pub fn test_any(&self, mask: FlagSet) -> bool {
        mask.iter().any(|flag| self.test(flag))
    }

    /// Captures the last known value of every flag.
    pub fn snapshot(&self) -> FlagSet {
        let mut set = FlagSet::empty();
        for flag in ALL_FLAGS {
            if self.test(flag) {
                set.insert(flag);
            }
        }
        set
    }

    /// Marks the register as being torn down. New debounce requests are
    /// rejected from this point on.
    pub fn begin_teardown(&self) {
        self.tearing_down.store(true, Ordering::Release);
    }

    /// Returns `true` once [`begin_teardown`](Self::begin_teardown) was called.
    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::Acquire)
    }
}

impl Default for FlagRegister {
    fn default() -> Self {
        Self::new()
    }
}
