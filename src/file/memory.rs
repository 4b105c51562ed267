use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// An archive image held in an owned byte vector.
///
/// The base address of the image is the address of the vector's heap block, which does not move
/// for as long as the `Memory` lives, even when the `Memory` itself is moved.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Takes ownership of `data` as an archive image.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(OutOfBounds)
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices() {
        let mut image = vec![0u8; 256];
        image[64..72].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let memory = Memory::new(image);

        assert_eq!(memory.len(), 256);
        assert!(!memory.is_empty());
        assert_eq!(memory.data_slice(64, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(memory.data_slice(256, 0).unwrap(), &[] as &[u8]);

        assert!(matches!(memory.data_slice(250, 8), Err(OutOfBounds)));
        assert!(matches!(memory.data_slice(usize::MAX, 2), Err(OutOfBounds)));
    }

    #[test]
    fn base_survives_move() {
        let memory = Memory::new(vec![0xA5; 64]);
        let base = memory.data().as_ptr();

        let boxed: Box<dyn Backend> = Box::new(memory);
        assert_eq!(boxed.data().as_ptr(), base);
    }
}
