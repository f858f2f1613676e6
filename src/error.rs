use thiserror::Error;

// std::bad_weak_ptr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// Tried to promote a weak pointer whose managed object has already been destroyed, or
    /// which never referred to one.
    #[error("bad weak pointer: managed object has already been destroyed")]
    ExpiredReference
}

pub type Result<T> = std::result::Result<T, Error>;
