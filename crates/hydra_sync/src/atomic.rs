//! # Atomic Cells
//!
//! Generic atomic storage with automatic strategy selection.
//!
//! ## Strategy Selection
//!
//! ```text
//!                          ┌──────────────┐
//!                          │  Atomic<T>   │
//!                          └──────┬───────┘
//!                                 │ size == 1/2/4/8 and aligned?
//!                   ┌─────────────┴─────────────┐
//!                   ▼ yes                       ▼ no
//!        ┌─────────────────────┐    ┌──────────────────────┐
//!        │ lock-free bit view  │    │ SpinMutex-guarded    │
//!        │ (native AtomicUN)   │    │ fallback             │
//!        └─────────────────────┘    └──────────────────────┘
//! ```
//!
//! The choice is a compile-time constant, reported truthfully by
//! [`Atomic::IS_LOCK_FREE`]. Callers must not assume lock-freedom for types
//! wider than 8 bytes; the guarded fallback is documented policy, not a
//! silent behavior change.
//!
//! Integers and pointers get dedicated cells ([`AtomicInt`],
//! [`AtomicPtrCell`]) with the full read-modify-write surface.

use core::cell::UnsafeCell;
use core::mem::{align_of, size_of};
use core::sync::atomic::{
    AtomicPtr, AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering,
};

use crate::backoff::Backoff;
use crate::spin::{RawLock, SpinMutex};

/// Atomic cell holding a single `bool` in one byte.
pub type AtomicBool8 = Atomic<bool>;
/// Atomic cell holding a single `f32`.
pub type AtomicFloat = Atomic<f32>;
/// Atomic cell holding a single `f64`.
pub type AtomicDouble = Atomic<f64>;

// ---------------------------------------------------------------------------
// Primitive layer
// ---------------------------------------------------------------------------

mod sealed {
    pub trait Sealed {}
}

/// A machine word with a native lock-free atomic cell.
///
/// The portable atomic backend: every operation maps to the matching
/// `core::sync::atomic` type with acquire-release discipline - `load` is
/// acquire, `store` is release, every read-modify-write is acquire-release
/// on success and acquire on failure. Sealed; implemented for the ten
/// primitive integers.
pub trait Primitive: Copy + Eq + sealed::Sealed {
    /// The native atomic cell for this width.
    #[doc(hidden)]
    type Cell: Send + Sync;

    #[doc(hidden)]
    fn cell_new(value: Self) -> Self::Cell;
    #[doc(hidden)]
    fn cell_load(cell: &Self::Cell) -> Self;
    #[doc(hidden)]
    fn cell_store(cell: &Self::Cell, value: Self);
    #[doc(hidden)]
    fn cell_swap(cell: &Self::Cell, value: Self) -> Self;
    #[doc(hidden)]
    fn cell_compare_and_swap(cell: &Self::Cell, current: Self, new: Self) -> bool;
    #[doc(hidden)]
    fn cell_fetch_add(cell: &Self::Cell, value: Self) -> Self;
    #[doc(hidden)]
    fn cell_fetch_sub(cell: &Self::Cell, value: Self) -> Self;
    #[doc(hidden)]
    fn cell_fetch_and(cell: &Self::Cell, value: Self) -> Self;
    #[doc(hidden)]
    fn cell_fetch_or(cell: &Self::Cell, value: Self) -> Self;
    #[doc(hidden)]
    fn cell_fetch_xor(cell: &Self::Cell, value: Self) -> Self;
}

macro_rules! impl_primitive {
    ($($int:ty => $atomic:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $int {}

            impl Primitive for $int {
                type Cell = $atomic;

                #[inline]
                fn cell_new(value: Self) -> Self::Cell {
                    <$atomic>::new(value)
                }
                #[inline]
                fn cell_load(cell: &Self::Cell) -> Self {
                    cell.load(Ordering::Acquire)
                }
                #[inline]
                fn cell_store(cell: &Self::Cell, value: Self) {
                    cell.store(value, Ordering::Release);
                }
                #[inline]
                fn cell_swap(cell: &Self::Cell, value: Self) -> Self {
                    cell.swap(value, Ordering::AcqRel)
                }
                #[inline]
                fn cell_compare_and_swap(
                    cell: &Self::Cell,
                    current: Self,
                    new: Self,
                ) -> bool {
                    cell.compare_exchange(
                        current,
                        new,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                }
                #[inline]
                fn cell_fetch_add(cell: &Self::Cell, value: Self) -> Self {
                    cell.fetch_add(value, Ordering::AcqRel)
                }
                #[inline]
                fn cell_fetch_sub(cell: &Self::Cell, value: Self) -> Self {
                    cell.fetch_sub(value, Ordering::AcqRel)
                }
                #[inline]
                fn cell_fetch_and(cell: &Self::Cell, value: Self) -> Self {
                    cell.fetch_and(value, Ordering::AcqRel)
                }
                #[inline]
                fn cell_fetch_or(cell: &Self::Cell, value: Self) -> Self {
                    cell.fetch_or(value, Ordering::AcqRel)
                }
                #[inline]
                fn cell_fetch_xor(cell: &Self::Cell, value: Self) -> Self {
                    cell.fetch_xor(value, Ordering::AcqRel)
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => core::sync::atomic::AtomicU8,
    i8 => core::sync::atomic::AtomicI8,
    u16 => core::sync::atomic::AtomicU16,
    i16 => core::sync::atomic::AtomicI16,
    u32 => core::sync::atomic::AtomicU32,
    i32 => core::sync::atomic::AtomicI32,
    u64 => core::sync::atomic::AtomicU64,
    i64 => core::sync::atomic::AtomicI64,
    usize => core::sync::atomic::AtomicUsize,
    isize => core::sync::atomic::AtomicIsize,
}

// ---------------------------------------------------------------------------
// Integer specialization
// ---------------------------------------------------------------------------

/// Atomic integer with the full read-modify-write surface.
///
/// Every `fetch_*` returns the **previous** value; the `*_fetch` variants
/// return the post-operation value, matching pre/post increment semantics.
///
/// ## Example
///
/// ```rust,ignore
/// let counter: AtomicInt<i32> = AtomicInt::new(0);
/// assert_eq!(counter.fetch_add(5), 0);
/// assert_eq!(counter.add_fetch(1), 6);
/// ```
#[derive(Debug)]
pub struct AtomicInt<T: Primitive> {
    cell: T::Cell,
}

impl<T: Primitive + Default> Default for AtomicInt<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Primitive> AtomicInt<T> {
    /// Creates a cell holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            cell: T::cell_new(value),
        }
    }

    /// This specialization is always lock-free.
    pub const IS_LOCK_FREE: bool = true;

    /// Atomic read (acquire).
    #[inline]
    pub fn load(&self) -> T {
        T::cell_load(&self.cell)
    }

    /// Atomic write (release).
    #[inline]
    pub fn store(&self, value: T) {
        T::cell_store(&self.cell, value);
    }

    /// Atomically replaces the value, returning the previous one.
    #[inline]
    pub fn swap(&self, value: T) -> T {
        T::cell_swap(&self.cell, value)
    }

    /// Atomic compare-and-swap: replaces only if the current value equals
    /// `current`. Returns whether the swap happened.
    #[inline]
    pub fn compare_and_swap(&self, current: T, new: T) -> bool {
        T::cell_compare_and_swap(&self.cell, current, new)
    }

    /// Blocks until a CAS from `current` to `new` succeeds.
    ///
    /// Unbounded spin with backoff.
    pub fn spin_lock(&self, current: T, new: T) {
        let mut backoff = Backoff::new();
        while !self.compare_and_swap(current, new) {
            loop {
                backoff.spin();
                if self.load() == current {
                    break;
                }
            }
        }
    }

    /// Blocks until the cell equals `value`, without changing it.
    #[inline]
    pub fn wait_value(&self, value: T) {
        self.spin_lock(value, value);
    }

    /// Atomic add; returns the previous value.
    #[inline]
    pub fn fetch_add(&self, value: T) -> T {
        T::cell_fetch_add(&self.cell, value)
    }

    /// Atomic subtract; returns the previous value.
    #[inline]
    pub fn fetch_sub(&self, value: T) -> T {
        T::cell_fetch_sub(&self.cell, value)
    }

    /// Atomic bitwise and; returns the previous value.
    #[inline]
    pub fn fetch_and(&self, value: T) -> T {
        T::cell_fetch_and(&self.cell, value)
    }

    /// Atomic bitwise or; returns the previous value.
    #[inline]
    pub fn fetch_or(&self, value: T) -> T {
        T::cell_fetch_or(&self.cell, value)
    }

    /// Atomic bitwise xor; returns the previous value.
    #[inline]
    pub fn fetch_xor(&self, value: T) -> T {
        T::cell_fetch_xor(&self.cell, value)
    }
}

macro_rules! impl_atomic_int_arith {
    ($($int:ty),* $(,)?) => {
        $(
            impl AtomicInt<$int> {
                /// Atomic increment; returns the previous value.
                #[inline]
                pub fn fetch_inc(&self) -> $int {
                    self.fetch_add(1)
                }

                /// Atomic decrement; returns the previous value.
                #[inline]
                pub fn fetch_dec(&self) -> $int {
                    self.fetch_sub(1)
                }

                /// Atomic increment; returns the post value.
                #[inline]
                pub fn inc_fetch(&self) -> $int {
                    self.fetch_add(1).wrapping_add(1)
                }

                /// Atomic decrement; returns the post value.
                #[inline]
                pub fn dec_fetch(&self) -> $int {
                    self.fetch_sub(1).wrapping_sub(1)
                }

                /// Atomic add; returns the post value.
                #[inline]
                pub fn add_fetch(&self, value: $int) -> $int {
                    self.fetch_add(value).wrapping_add(value)
                }

                /// Atomic subtract; returns the post value.
                #[inline]
                pub fn sub_fetch(&self, value: $int) -> $int {
                    self.fetch_sub(value).wrapping_sub(value)
                }
            }
        )*
    };
}

impl_atomic_int_arith!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

// ---------------------------------------------------------------------------
// Pointer specialization
// ---------------------------------------------------------------------------

/// Atomic pointer cell with scaled pointer arithmetic.
///
/// `fetch_add`/`fetch_sub` step in units of `size_of::<T>()`, like raw
/// pointer arithmetic. Arithmetic is implemented as CAS loops over
/// [`AtomicPtr`], so pointer provenance survives (no integer round-trips).
#[derive(Debug)]
pub struct AtomicPtrCell<T> {
    cell: AtomicPtr<T>,
}

impl<T> Default for AtomicPtrCell<T> {
    fn default() -> Self {
        Self::new(core::ptr::null_mut())
    }
}

impl<T> AtomicPtrCell<T> {
    /// Creates a cell holding `ptr`.
    #[inline]
    #[must_use]
    pub const fn new(ptr: *mut T) -> Self {
        Self {
            cell: AtomicPtr::new(ptr),
        }
    }

    /// This specialization is always lock-free.
    pub const IS_LOCK_FREE: bool = true;

    /// Atomic read (acquire).
    #[inline]
    #[must_use]
    pub fn load(&self) -> *mut T {
        self.cell.load(Ordering::Acquire)
    }

    /// Atomic write (release).
    #[inline]
    pub fn store(&self, ptr: *mut T) {
        self.cell.store(ptr, Ordering::Release);
    }

    /// Atomically replaces the pointer, returning the previous one.
    #[inline]
    pub fn swap(&self, ptr: *mut T) -> *mut T {
        self.cell.swap(ptr, Ordering::AcqRel)
    }

    /// Atomic compare-and-swap on the pointer value.
    #[inline]
    pub fn compare_and_swap(&self, current: *mut T, new: *mut T) -> bool {
        self.cell
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Blocks until a CAS from `current` to `new` succeeds.
    pub fn spin_lock(&self, current: *mut T, new: *mut T) {
        let mut backoff = Backoff::new();
        while !self.compare_and_swap(current, new) {
            loop {
                backoff.spin();
                if core::ptr::eq(self.load(), current) {
                    break;
                }
            }
        }
    }

    /// Blocks until the cell equals `ptr`, without changing it.
    #[inline]
    pub fn wait_value(&self, ptr: *mut T) {
        self.spin_lock(ptr, ptr);
    }

    /// Atomically advances the pointer by `count` elements of `T`.
    ///
    /// Returns the previous pointer.
    pub fn fetch_add(&self, count: usize) -> *mut T {
        let mut current = self.cell.load(Ordering::Relaxed);
        loop {
            let next = current.wrapping_add(count);
            match self.cell.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Atomically retreats the pointer by `count` elements of `T`.
    ///
    /// Returns the previous pointer.
    pub fn fetch_sub(&self, count: usize) -> *mut T {
        let mut current = self.cell.load(Ordering::Relaxed);
        loop {
            let next = current.wrapping_sub(count);
            match self.cell.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Atomically advances by one element; returns the previous pointer.
    #[inline]
    pub fn fetch_inc(&self) -> *mut T {
        self.fetch_add(1)
    }

    /// Atomically retreats by one element; returns the previous pointer.
    #[inline]
    pub fn fetch_dec(&self) -> *mut T {
        self.fetch_sub(1)
    }
}

// ---------------------------------------------------------------------------
// Generic Atomic<T>
// ---------------------------------------------------------------------------

/// Generic atomic cell over any `Copy` value.
///
/// Lock-free when the value's size is exactly a native atomic width
/// (1, 2, 4 or 8 bytes) and its alignment suffices for that width - the
/// value's bits are then reinterpreted as the matching unsigned integer.
/// Every other type (wider than 8 bytes, or under-aligned for its width
/// class) transparently falls back to an internal [`SpinMutex`]; the choice
/// is reported by [`IS_LOCK_FREE`](Atomic::IS_LOCK_FREE).
///
/// On the lock-free path, [`compare_and_swap`](Atomic::compare_and_swap)
/// compares **bit patterns**, exactly like the hardware CAS it compiles to.
/// For a type with padding bytes or multiple representations of equal
/// values (`-0.0` vs `+0.0`), bitwise equality is not value equality.
///
/// ## Example
///
/// ```rust,ignore
/// let cell: Atomic<f32> = Atomic::new(1.0);
/// assert!(Atomic::<f32>::IS_LOCK_FREE);
/// cell.store(2.5);
/// assert_eq!(cell.load(), 2.5);
/// ```
pub struct Atomic<T> {
    lock: SpinMutex,
    value: UnsafeCell<T>,
}

// SAFETY: all access to `value` goes through atomic instructions or the
// internal spin mutex; the cell is as thread-safe as sharing T by value.
unsafe impl<T: Copy + Send> Sync for Atomic<T> {}

impl<T: Copy> Atomic<T> {
    /// Whether this instantiation uses native atomic instructions.
    ///
    /// Compile-time constant. `false` means every operation takes the
    /// internal spin mutex.
    pub const IS_LOCK_FREE: bool = {
        let size = size_of::<T>();
        let align = align_of::<T>();
        (size == 1) || (size == 2 && align >= 2) || (size == 4 && align >= 4)
            || (size == 8 && align >= 8)
    };

    /// Creates a cell holding `value`.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            lock: SpinMutex::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Creates a cell holding the all-zero value of `T`.
    #[inline]
    pub fn zeroed() -> Self
    where
        T: bytemuck::Zeroable,
    {
        Self::new(T::zeroed())
    }

    /// Consumes the cell, returning the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        let Self { lock, value } = self;
        drop(lock);
        value.into_inner()
    }

    /// Returns a mutable reference to the value.
    ///
    /// Safe: exclusive access means no concurrent atomics are possible.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Atomic read (acquire).
    pub fn load(&self) -> T {
        if Self::IS_LOCK_FREE {
            // SAFETY: size/alignment checked by IS_LOCK_FREE.
            unsafe { self.lock_free_load() }
        } else {
            let _guard = self.lock.guard();
            // SAFETY: the spin mutex serializes every guarded access.
            unsafe { *self.value.get() }
        }
    }

    /// Atomic write (release).
    pub fn store(&self, value: T) {
        if Self::IS_LOCK_FREE {
            // SAFETY: size/alignment checked by IS_LOCK_FREE.
            unsafe { self.lock_free_store(value) };
        } else {
            let _guard = self.lock.guard();
            // SAFETY: the spin mutex serializes every guarded access.
            unsafe { *self.value.get() = value };
        }
    }

    /// Atomically replaces the value, returning the previous one.
    pub fn swap(&self, value: T) -> T {
        if Self::IS_LOCK_FREE {
            // SAFETY: size/alignment checked by IS_LOCK_FREE.
            unsafe { self.lock_free_swap(value) }
        } else {
            let _guard = self.lock.guard();
            // SAFETY: the spin mutex serializes every guarded access.
            unsafe {
                let slot = self.value.get();
                let previous = *slot;
                *slot = value;
                previous
            }
        }
    }

    /// Atomic compare-and-swap. Returns whether the swap happened.
    ///
    /// Bit-pattern comparison on the lock-free path, `PartialEq` on the
    /// guarded path (see the type-level note on padding).
    pub fn compare_and_swap(&self, current: T, new: T) -> bool
    where
        T: PartialEq,
    {
        if Self::IS_LOCK_FREE {
            // SAFETY: size/alignment checked by IS_LOCK_FREE.
            unsafe { self.lock_free_compare_and_swap(current, new) }
        } else {
            let _guard = self.lock.guard();
            // SAFETY: the spin mutex serializes every guarded access.
            unsafe {
                let slot = self.value.get();
                if *slot != current {
                    return false;
                }
                *slot = new;
                true
            }
        }
    }

    /// Blocks until a CAS from `current` to `new` succeeds.
    ///
    /// Unbounded spin with backoff; re-reads between CAS attempts to keep
    /// the line shared while waiting.
    pub fn spin_lock(&self, current: T, new: T)
    where
        T: PartialEq,
    {
        let mut backoff = Backoff::new();
        while !self.compare_and_swap(current, new) {
            loop {
                backoff.spin();
                if self.load() == current {
                    break;
                }
            }
        }
    }

    /// Blocks until the cell equals `value`, without logically changing it.
    #[inline]
    pub fn wait_value(&self, value: T)
    where
        T: PartialEq,
    {
        self.spin_lock(value, value);
    }

    // -- lock-free backend ---------------------------------------------------

    /// # Safety
    /// `IS_LOCK_FREE` must be true: `T` is exactly as wide as the selected
    /// atomic and at least as aligned.
    unsafe fn lock_free_load(&self) -> T {
        let ptr = self.value.get();
        debug_assert!((ptr as usize) % size_of::<T>() == 0, "unaligned atomic");
        match size_of::<T>() {
            1 => bits_to_value(AtomicU8::from_ptr(ptr.cast::<u8>()).load(Ordering::Acquire)),
            2 => bits_to_value(AtomicU16::from_ptr(ptr.cast::<u16>()).load(Ordering::Acquire)),
            4 => bits_to_value(AtomicU32::from_ptr(ptr.cast::<u32>()).load(Ordering::Acquire)),
            8 => bits_to_value(AtomicU64::from_ptr(ptr.cast::<u64>()).load(Ordering::Acquire)),
            _ => unreachable!("IS_LOCK_FREE admits only native widths"),
        }
    }

    /// # Safety
    /// `IS_LOCK_FREE` must be true (see [`Self::lock_free_load`]).
    unsafe fn lock_free_store(&self, value: T) {
        let ptr = self.value.get();
        debug_assert!((ptr as usize) % size_of::<T>() == 0, "unaligned atomic");
        match size_of::<T>() {
            1 => AtomicU8::from_ptr(ptr.cast::<u8>()).store(value_to_bits(value), Ordering::Release),
            2 => AtomicU16::from_ptr(ptr.cast::<u16>()).store(value_to_bits(value), Ordering::Release),
            4 => AtomicU32::from_ptr(ptr.cast::<u32>()).store(value_to_bits(value), Ordering::Release),
            8 => AtomicU64::from_ptr(ptr.cast::<u64>()).store(value_to_bits(value), Ordering::Release),
            _ => unreachable!("IS_LOCK_FREE admits only native widths"),
        }
    }

    /// # Safety
    /// `IS_LOCK_FREE` must be true (see [`Self::lock_free_load`]).
    unsafe fn lock_free_swap(&self, value: T) -> T {
        let ptr = self.value.get();
        debug_assert!((ptr as usize) % size_of::<T>() == 0, "unaligned atomic");
        match size_of::<T>() {
            1 => bits_to_value(
                AtomicU8::from_ptr(ptr.cast::<u8>()).swap(value_to_bits(value), Ordering::AcqRel),
            ),
            2 => bits_to_value(
                AtomicU16::from_ptr(ptr.cast::<u16>()).swap(value_to_bits(value), Ordering::AcqRel),
            ),
            4 => bits_to_value(
                AtomicU32::from_ptr(ptr.cast::<u32>()).swap(value_to_bits(value), Ordering::AcqRel),
            ),
            8 => bits_to_value(
                AtomicU64::from_ptr(ptr.cast::<u64>()).swap(value_to_bits(value), Ordering::AcqRel),
            ),
            _ => unreachable!("IS_LOCK_FREE admits only native widths"),
        }
    }

    /// # Safety
    /// `IS_LOCK_FREE` must be true (see [`Self::lock_free_load`]).
    unsafe fn lock_free_compare_and_swap(&self, current: T, new: T) -> bool {
        let ptr = self.value.get();
        debug_assert!((ptr as usize) % size_of::<T>() == 0, "unaligned atomic");
        match size_of::<T>() {
            1 => AtomicU8::from_ptr(ptr.cast::<u8>())
                .compare_exchange(
                    value_to_bits(current),
                    value_to_bits(new),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            2 => AtomicU16::from_ptr(ptr.cast::<u16>())
                .compare_exchange(
                    value_to_bits(current),
                    value_to_bits(new),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            4 => AtomicU32::from_ptr(ptr.cast::<u32>())
                .compare_exchange(
                    value_to_bits(current),
                    value_to_bits(new),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            8 => AtomicU64::from_ptr(ptr.cast::<u64>())
                .compare_exchange(
                    value_to_bits(current),
                    value_to_bits(new),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            _ => unreachable!("IS_LOCK_FREE admits only native widths"),
        }
    }
}

impl<T: Copy + Default> Default for Atomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy + core::fmt::Debug> core::fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Atomic")
            .field("value", &self.load())
            .field("lock_free", &Self::IS_LOCK_FREE)
            .finish()
    }
}

/// Explicit bit-pattern view: value bits as the matching unsigned integer.
///
/// # Safety
/// Caller guarantees `size_of::<T>() == size_of::<Bits>()`.
#[inline]
unsafe fn value_to_bits<T: Copy, Bits>(value: T) -> Bits {
    debug_assert_eq!(size_of::<T>(), size_of::<Bits>());
    core::mem::transmute_copy(&value)
}

/// Inverse of [`value_to_bits`].
///
/// # Safety
/// Caller guarantees `size_of::<T>() == size_of::<Bits>()` and that the bit
/// pattern was produced from a valid `T`.
#[inline]
unsafe fn bits_to_value<Bits, T: Copy>(bits: Bits) -> T {
    debug_assert_eq!(size_of::<Bits>(), size_of::<T>());
    core::mem::transmute_copy(&bits)
}
