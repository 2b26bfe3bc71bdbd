pub(crate) mod metadata;
pub(crate) mod v14;
