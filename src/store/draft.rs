use std::ops::{Deref, DerefMut};

/// Working copy of a state handed to a reducer.
///
/// Any mutable access marks the draft as written, whether or not the value
/// actually changes, and a written draft replaces the store's state.
#[derive(Debug)]
pub struct Draft<S> {
    value: S,
    written: bool,
}

impl<S> Draft<S> {
    pub(crate) fn new(value: S) -> Self {
        Self {
            value,
            written: false,
        }
    }

    /// Replace the whole working copy.
    pub fn set(&mut self, value: S) {
        self.value = value;
        self.written = true;
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub(crate) fn into_inner(self) -> S {
        self.value
    }
}

impl<S> Deref for Draft<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.value
    }
}

impl<S> DerefMut for Draft<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.written = true;
        &mut self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Counter {
        count: i32,
    }

    #[test]
    fn reads_do_not_mark_written() {
        let draft = Draft::new(Counter::default());
        assert_eq!(draft.count, 0);
        assert!(!draft.is_written());
    }

    #[test]
    fn any_write_marks_written() {
        let mut draft = Draft::new(Counter::default());
        draft.count = 0;
        assert!(draft.is_written());
        assert_eq!(draft.into_inner(), Counter::default());
    }

    #[test]
    fn set_replaces() {
        let mut draft = Draft::new(Counter::default());
        draft.set(Counter { count: 4 });
        assert!(draft.is_written());
        assert_eq!(draft.count, 4);
    }
}
