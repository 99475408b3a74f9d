/// Returns early with `$error` unless `$predicate` holds.
///
/// ```ignore
/// ensure!(!path.is_empty(), ParseError::InvalidUri);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
