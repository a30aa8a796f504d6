//! Path and name helpers shared by archives, the resolver, and archive discovery.

mod util;

pub use util::{
    Token, extension_of, is_hidden, name_key, natural_cmp, natural_cmp_path, normalize_extension,
    tokenize, validate_name, validate_path,
};

/// Shared result type for fs operations.
pub type Result<T> = crate::Result<T>;
