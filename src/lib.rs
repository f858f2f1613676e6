pub mod error;
pub mod memory {
    pub mod compressed_pair;
    pub mod deleter;
    pub mod enable_shared;
    pub(crate) mod ref_count;
    pub mod shared_ptr;
    #[cfg(test)]
    pub(crate) mod test_support;
    pub mod unique_ptr;
    pub mod weak_ptr;
}

pub use allocator_api2::alloc::{ Allocator, Global };
pub use error::{ Error, Result };
pub use memory::{
    compressed_pair::CompressedPair,
    deleter::{ DefaultDelete, Deleter },
    enable_shared::{ EnableSharedFromThis, WeakThis },
    shared_ptr::{ IntoSharedPtr, SharedPtr },
    unique_ptr::UniquePtr,
    weak_ptr::WeakPtr
};

/// Build a [`SharedPtr`] with [`SharedPtr::make_shared`], binding the object's
/// [`WeakThis`] when its type implements [`EnableSharedFromThis`].
///
/// The check happens on the concrete type at the call site. Inside generic code where the
/// payload type is a parameter without that bound, nothing is bound; use
/// [`SharedPtr::make_shared_enabled`] there.
///
/// ```
/// use cpp_memory::{ make_shared, EnableSharedFromThis, WeakThis };
///
/// struct Session { this: WeakThis<Session> }
///
/// impl EnableSharedFromThis for Session {
///     fn weak_this(&self) -> &WeakThis<Self> { &self.this }
/// }
///
/// let session = make_shared!(Session { this: WeakThis::new() });
/// assert_eq!(session.shared_from_this().use_count(), 2);
/// let number = make_shared!(5u32);
/// assert_eq!(*number, 5);
/// ```
#[macro_export]
macro_rules! make_shared {
    ($data:expr) => {
        $crate::make_shared!($data, in $crate::Global)
    };
    ($data:expr, in $alloc:expr) => {{
        #[allow(unused_imports)]
        use $crate::memory::enable_shared::{ BindPlain as _, BindSelfAware as _ };
        let ptr = $crate::memory::shared_ptr::SharedPtr::make_shared_in($data, $alloc);
        (&$crate::memory::enable_shared::BindProbe(&ptr)).bind_weak_this();
        ptr
    }};
}

/// Hand a `Box` or [`UniquePtr`] over to a new [`SharedPtr`], binding the object's [`WeakThis`]
/// when its type implements [`EnableSharedFromThis`]. The detection works like
/// [`make_shared!`].
///
/// ```
/// use cpp_memory::{ adopt_shared, EnableSharedFromThis, UniquePtr, WeakThis };
///
/// struct Session { this: WeakThis<Session> }
///
/// impl EnableSharedFromThis for Session {
///     fn weak_this(&self) -> &WeakThis<Self> { &self.this }
/// }
///
/// let session = adopt_shared!(UniquePtr::make_unique(Session { this: WeakThis::new() }));
/// assert_eq!(session.shared_from_this().use_count(), 2);
/// let name = adopt_shared!(Box::new(String::from("plain")));
/// assert_eq!(name.as_str(), "plain");
/// ```
#[macro_export]
macro_rules! adopt_shared {
    ($owned:expr) => {{
        #[allow(unused_imports)]
        use $crate::memory::enable_shared::{ BindPlain as _, BindSelfAware as _ };
        let ptr = $crate::memory::shared_ptr::IntoSharedPtr::into_shared_ptr($owned);
        (&$crate::memory::enable_shared::BindProbe(&ptr)).bind_weak_this();
        ptr
    }};
}
