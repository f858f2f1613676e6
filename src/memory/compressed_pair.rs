// libc++ __compressed_pair
// Zero-sized members take no space in a Rust struct, so a stateless second member (like
// DefaultDelete) leaves the pair the size of its first member.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressedPair<F, S> {
    first: F,
    second: S
}

impl<F, S> CompressedPair<F, S> {
    pub fn new(first: F, second: S) -> Self { Self { first, second } }

    pub fn first(&self) -> &F { &self.first }
    pub fn first_mut(&mut self) -> &mut F { &mut self.first }
    pub fn second(&self) -> &S { &self.second }
    pub fn second_mut(&mut self) -> &mut S { &mut self.second }

    pub fn into_parts(self) -> (F, S) { (self.first, self.second) }
}

#[cfg(test)]
pub mod tests {
    use super::CompressedPair;
    use crate::memory::deleter::DefaultDelete;
    use std::{
        error::Error,
        mem::size_of,
        ptr::NonNull
    };
    type TestReturn = Result<(), Box<dyn Error>>;

    #[test]
    fn empty_second_takes_no_space() -> TestReturn {
        assert!(size_of::<CompressedPair<Option<NonNull<u64>>, DefaultDelete>>() == size_of::<usize>(),
            "Stateless second member shouldn't add to the size of the pair");
        assert!(size_of::<CompressedPair<usize, usize>>() == 2 * size_of::<usize>(),
            "Stateful members should both be stored");
        Ok(())
    }

    #[test]
    fn access_members() -> TestReturn {
        let mut pair = CompressedPair::new(10, "deleter");
        *pair.first_mut() += 5;
        assert!(*pair.first() == 15, "First member should be 15 instead of {}", pair.first());
        assert!(*pair.second() == "deleter", "Second member should be \"deleter\"");
        let (first, second) = pair.into_parts();
        assert!(first == 15 && second == "deleter", "Parts should come back unchanged");
        Ok(())
    }
}
