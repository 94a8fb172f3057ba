pub mod analysis;
pub mod dependencies;
pub mod downloads;
pub mod probe;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;
