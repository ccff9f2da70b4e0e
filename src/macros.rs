/// Creates a new [`Sequence`](crate::Sequence) with the passed block of code as its producer body.
///
/// The producer handle is bound to the given identifier.
///
/// # Example
///
/// ```rust
/// use seq_engine::seq;
///
/// let letters = seq!(co => {
///     co.emit('a').await;
///     co.emit('b').await;
/// });
///
/// assert_eq!(letters.pull().wait().unwrap(), Some('a'));
/// ```
#[macro_export]
macro_rules! seq {
    ($co:ident => $body:block) => {
        $crate::Sequence::new(move |$co: $crate::Co<_>| async move $body)
    };
}

/// Suspends the producer with an item. Only valid inside a [`#[sequence]`](crate::sequence) function.
#[macro_export]
macro_rules! emit {
    ($($tt:tt)*) => {
        compile_error!("`emit!` can only be used inside a #[sequence] function")
    };
}

/// Ends the sequence. Only valid inside a [`#[sequence]`](crate::sequence) function.
#[macro_export]
macro_rules! finish {
    ($($tt:tt)*) => {
        compile_error!("`finish!` can only be used inside a #[sequence] function")
    };
}

/// Splices a nested sequence. Only valid inside a [`#[sequence]`](crate::sequence) function.
#[macro_export]
macro_rules! delegate {
    ($($tt:tt)*) => {
        compile_error!("`delegate!` can only be used inside a #[sequence] function")
    };
}
