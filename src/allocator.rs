// 🔢 ID Allocator - Sequential roster ids for new students

/// Single-writer counter for one run
///
/// Seeded from the highest existing roster id; when the roster is empty the
/// school's base stands in for that maximum. An id is only consumed when the
/// insert that uses it succeeds, so failures leave no gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next: i64,
    issued: usize,
}

impl IdAllocator {
    pub fn seeded(existing_max: Option<i64>, base: i64) -> Self {
        IdAllocator {
            next: existing_max.unwrap_or(base) + 1,
            issued: 0,
        }
    }

    /// The id the next successful allocation will hand out
    pub fn peek(&self) -> i64 {
        self.next
    }

    /// Run `insert` with the next id, consuming it only on success
    pub fn allocate_with<T, E>(
        &mut self,
        insert: impl FnOnce(i64) -> Result<T, E>,
    ) -> Result<(i64, T), E> {
        let id = self.next;
        let value = insert(id)?;
        self.next += 1;
        self.issued += 1;
        Ok((id, value))
    }

    /// Number of ids handed out this run
    pub fn issued(&self) -> usize {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_from_existing_max() {
        let allocator = IdAllocator::seeded(Some(100042), 100000);
        assert_eq!(allocator.peek(), 100043);
    }

    #[test]
    fn test_seed_from_base_when_empty() {
        let allocator = IdAllocator::seeded(None, 500000);
        assert_eq!(allocator.peek(), 500001);
    }

    #[test]
    fn test_sequential_allocation() {
        let mut allocator = IdAllocator::seeded(Some(10), 0);

        let (a, _) = allocator.allocate_with(|_| Ok::<_, ()>(())).unwrap();
        let (b, _) = allocator.allocate_with(|_| Ok::<_, ()>(())).unwrap();

        assert_eq!((a, b), (11, 12));
        assert_eq!(allocator.issued(), 2);
    }

    #[test]
    fn test_failed_insert_does_not_consume() {
        let mut allocator = IdAllocator::seeded(Some(10), 0);

        let failed = allocator.allocate_with(|_| Err::<(), _>("constraint violation"));
        assert!(failed.is_err());
        assert_eq!(allocator.peek(), 11);
        assert_eq!(allocator.issued(), 0);

        let (id, _) = allocator.allocate_with(|_| Ok::<_, ()>(())).unwrap();
        assert_eq!(id, 11);
    }
}
