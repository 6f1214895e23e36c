//! The equality bound every behaviour's value type must satisfy.

/// The generic value-equality constraint the propagation engine relies on to
/// suppress no-op updates. Blanket-implemented for anything `Clone + PartialEq`
/// — i.e. the default is structural equality for plain data.
///
/// Function-carrying behaviours (see [`applicative`](`crate::applicative::applicative`))
/// typically satisfy this with `Rc<dyn Fn(..)->..>`, whose `PartialEq` is
/// reference identity rather than structural comparison — see `bloom`'s
/// `DESIGN.md` for why that's the right default for closures.
pub trait Value: Clone + PartialEq {}
impl<T: Clone + PartialEq> Value for T {}
