//! Lazy property cells — compute-on-first-read fields with overwrite support.
//!
//! [`Lazy`] models a field that is expensive to produce and rarely needed:
//! the first read runs a producer and caches its output, later reads are
//! plain field accesses, and a direct [`set`](Lazy::set) replaces whatever is
//! stored. The request decorator binds its `cookies`, `query` and `body`
//! fields through this type.

/// A memoizing cell: `Unresolved` until first read, then `Resolved(value)`.
///
/// # Examples
///
/// ```
/// use nowbridge::lazy::Lazy;
///
/// let mut field: Lazy<u32> = Lazy::new();
/// assert!(!field.is_resolved());
///
/// let v = *field.get_or_init(|| 40 + 2);
/// assert_eq!(v, 42);
///
/// // Second read never reruns the producer.
/// let v = *field.get_or_init(|| unreachable!());
/// assert_eq!(v, 42);
///
/// // Direct writes replace the cached value.
/// field.set(7);
/// assert_eq!(field.get(), Some(&7));
/// ```
#[derive(Debug, Default)]
pub enum Lazy<T> {
    /// No value has been produced or written yet.
    #[default]
    Unresolved,
    /// A value is cached; reads return it as-is.
    Resolved(T),
}

impl<T> Lazy<T> {
    /// Creates an unresolved cell.
    pub fn new() -> Self {
        Self::Unresolved
    }

    /// Returns the cached value, running `producer` first if the cell is
    /// still unresolved.
    pub fn get_or_init(&mut self, producer: impl FnOnce() -> T) -> &T {
        if let Self::Unresolved = self {
            *self = Self::Resolved(producer());
        }
        match self {
            Self::Resolved(value) => value,
            Self::Unresolved => unreachable!("cell resolved above"),
        }
    }

    /// Fallible variant of [`get_or_init`](Self::get_or_init).
    ///
    /// A producer failure propagates to the caller and caches nothing, so a
    /// later read runs the producer again.
    pub fn get_or_try_init<E>(
        &mut self,
        producer: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        if let Self::Unresolved = self {
            *self = Self::Resolved(producer()?);
        }
        match self {
            Self::Resolved(value) => Ok(value),
            Self::Unresolved => unreachable!("cell resolved above"),
        }
    }

    /// Replaces the stored value, resolved or not. Never fails.
    pub fn set(&mut self, value: T) {
        *self = Self::Resolved(value);
    }

    /// Returns the cached value without forcing resolution.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Unresolved => None,
        }
    }

    /// Returns `true` once a value is cached.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_runs_exactly_once() {
        let mut cell: Lazy<String> = Lazy::new();
        let mut calls = 0;
        for _ in 0..3 {
            let v = cell.get_or_init(|| {
                calls += 1;
                "computed".to_owned()
            });
            assert_eq!(v, "computed");
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn failure_is_not_cached() {
        let mut cell: Lazy<u32> = Lazy::new();
        let err: Result<&u32, &str> = cell.get_or_try_init(|| Err("boom"));
        assert_eq!(err, Err("boom"));
        assert!(!cell.is_resolved());

        // The next read retries and may succeed.
        let ok = cell.get_or_try_init(|| Ok::<_, &str>(5)).unwrap();
        assert_eq!(*ok, 5);
    }

    #[test]
    fn set_overrides_resolved_value() {
        let mut cell: Lazy<u32> = Lazy::new();
        cell.get_or_init(|| 1);
        cell.set(2);
        assert_eq!(cell.get_or_init(|| unreachable!()), &2);
    }

    #[test]
    fn set_before_first_read_skips_producer() {
        let mut cell: Lazy<u32> = Lazy::new();
        cell.set(9);
        assert_eq!(cell.get_or_init(|| unreachable!()), &9);
    }
}
