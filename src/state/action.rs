use std::any::{self, Any};
use std::fmt::Debug;

/// Upcast to `&dyn Any`, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Marker trait for events that can be sent to a store.
///
/// The concrete type is the action's identity: a store keeps at most one
/// reducer per action type, and two types never collide even when their
/// payloads look alike.
///
/// # Examples
///
/// ```
/// use flowstore::Action;
///
/// #[derive(Debug)]
/// struct Increment;
///
/// impl Action for Increment {}
/// ```
pub trait Action: AsAny + Debug + Send + Sync + 'static {
    /// Type name used in diagnostics.
    fn action_name(&self) -> &'static str {
        any::type_name::<Self>()
    }
}

impl dyn Action {
    pub fn is<A: Action>(&self) -> bool {
        self.as_any().is::<A>()
    }

    pub fn downcast_ref<A: Action>(&self) -> Option<&A> {
        self.as_any().downcast_ref::<A>()
    }
}
