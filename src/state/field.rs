use std::fmt;

/// Identity of a field selector within one state type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A field selector on state `S` yielding a `T`.
///
/// Accessors return `None` when the field cannot be resolved on a given
/// value (for instance a field inside an enum variant). Observers are only
/// notified when both the old and the new value resolve and differ.
///
/// Build one with the [`field!`](crate::field) macro:
///
/// ```
/// use flowstore::{field, Field};
///
/// #[derive(Clone, Debug)]
/// struct Profile {
///     name: String,
/// }
///
/// let name: Field<Profile, String> = field!(Profile, name);
/// let mut profile = Profile { name: "x".to_string() };
/// assert_eq!(name.get(&profile), Some(&"x".to_string()));
/// *name.get_mut(&mut profile).unwrap() = "y".to_string();
/// assert_eq!(profile.name, "y");
/// ```
pub struct Field<S, T> {
    key: FieldKey,
    get: fn(&S) -> Option<&T>,
    get_mut: fn(&mut S) -> Option<&mut T>,
}

impl<S, T> Field<S, T> {
    pub const fn new(
        name: &'static str,
        get: fn(&S) -> Option<&T>,
        get_mut: fn(&mut S) -> Option<&mut T>,
    ) -> Self {
        Self {
            key: FieldKey(name),
            get,
            get_mut,
        }
    }

    pub fn key(&self) -> FieldKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.0
    }

    pub fn get<'a>(&self, state: &'a S) -> Option<&'a T> {
        (self.get)(state)
    }

    pub fn get_mut<'a>(&self, state: &'a mut S) -> Option<&'a mut T> {
        (self.get_mut)(state)
    }
}

impl<S, T: PartialEq> Field<S, T> {
    /// Whether the field differs between two snapshots. Unresolvable values
    /// never count as a change.
    pub fn changed(&self, new: &S, old: &S) -> bool {
        match (self.get(new), self.get(old)) {
            (Some(new), Some(old)) => new != old,
            _ => false,
        }
    }
}

impl<S, T> Clone for Field<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for Field<S, T> {}

impl<S, T> fmt::Debug for Field<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.key.0).finish()
    }
}

/// Build a [`Field`] for a (possibly nested) struct field.
///
/// `field!(State, a.b)` selects `state.a.b` and is keyed `"a.b"`.
#[macro_export]
macro_rules! field {
    ($state:ty, $first:ident $(. $rest:ident)*) => {
        $crate::Field::<$state, _>::new(
            concat!(stringify!($first) $(, ".", stringify!($rest))*),
            |state| ::std::option::Option::Some(&state.$first $(.$rest)*),
            |state| ::std::option::Option::Some(&mut state.$first $(.$rest)*),
        )
    };
}
