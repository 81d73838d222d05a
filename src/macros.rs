pub use enclose::*;

/// Builds a computed observable, cloning the listed handles into the
/// closure first.
///
/// ```
/// use observe_lite::{computed, Observable};
///
/// let a = Observable::new(1);
/// let b = Observable::new(2);
/// let sum = computed!((a, b) => a.get() + b.get());
/// assert_eq!(sum.get(), 3);
/// ```
#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Observable::computed($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::Observable::computed(move || { $($b)* })
    };
}

/// Builds an asynchronously computed observable. The body runs
/// synchronously, where reads are tracked, and must evaluate to a
/// future of `Result<T, Error>`.
#[macro_export]
macro_rules! computed_async {
    ($initial:expr, ( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Observable::computed_async($initial, $crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
}
