pub(crate) mod extractors;
pub mod identity;
