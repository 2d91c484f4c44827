/// Splits an ordered sequence into consecutive chunks of at most `size`.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    size: usize,
}

impl Batcher {
    pub const DEFAULT_SIZE: usize = 10;

    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn chunks<T: Clone>(&self, items: &[T]) -> Vec<Vec<T>> {
        items.chunks(self.size).map(|chunk| chunk.to_vec()).collect()
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_input_in_order() {
        let items: Vec<u32> = (0..23).collect();
        let chunks = Batcher::default().chunks(&items);
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10, 3]);
        assert_eq!(chunks.concat(), items);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(Batcher::new(4).chunks::<u8>(&[]).is_empty());
    }

    #[test]
    fn zero_size_behaves_as_one() {
        let batcher = Batcher::new(0);
        assert_eq!(batcher.size(), 1);
        assert_eq!(batcher.chunks(&["a", "b"]).len(), 2);
    }
}
