pub(crate) mod tests;
